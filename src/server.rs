//! HTTP control panel and status API for triggering runs from a browser.
//!
//! | Method | Path | Body / result |
//! |--------|------|---------------|
//! | GET | `/` | control panel: tag checkboxes, progress bar, live log |
//! | POST | `/start_scraping` | `{"tags": [...]}` starts a tab run in the background |
//! | GET | `/status` | current [`ScrapeStatus`] |
//! | GET | `/results` | outcome of the last finished run |
//! | GET | `/tags` | known tags |
//! | GET | `/refresh_tags` | re-discovers tags from the live site |
//! | POST | `/generate_static_site` | assembles the Netlify folder |
//! | GET | `/view_website` | redirects to the dashboard |
//! | GET | `/website/*` | the generated dashboard, served from disk |
//!
//! CORS is fully permissive and there is no authentication; bind to
//! loopback unless the network is trusted.

use crate::deploy::prepare_site;
use crate::error::Result;
use crate::models::RunOutcome;
use crate::outputs::dashboard::WEBSITE_DIR;
use crate::pipeline::{Pipeline, ProgressSink};
use crate::scrapers::tags::{discover_tags, expand_selection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, instrument};

/// Most recent log lines kept in the status.
pub const MAX_LOG_MESSAGES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Local time, `HH:MM:SS`.
    pub timestamp: String,
    pub message: String,
}

/// Progress of the current (or last) background run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeStatus {
    pub is_running: bool,
    pub progress: u8,
    pub current_step: String,
    pub results: Option<RunOutcome>,
    pub error: Option<String>,
    pub log_messages: VecDeque<LogMessage>,
}

impl ScrapeStatus {
    /// Append a timestamped log line, dropping the oldest past the cap.
    pub fn log(&mut self, message: impl Into<String>) {
        self.log_messages.push_back(LogMessage {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
        });
        while self.log_messages.len() > MAX_LOG_MESSAGES {
            self.log_messages.pop_front();
        }
    }

    /// Reset for a new run and mark it running.
    fn begin(&mut self) {
        *self = ScrapeStatus {
            is_running: true,
            current_step: "Initializing...".to_string(),
            ..Default::default()
        };
    }
}

/// Shared handle to the status, usable as a [`ProgressSink`].
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<RwLock<ScrapeStatus>>);

impl StatusHandle {
    pub fn read(&self) -> RwLockReadGuard<'_, ScrapeStatus> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ScrapeStatus> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for StatusHandle {
    fn update(&self, progress: u8, step: &str) {
        let mut status = self.write();
        status.progress = progress;
        status.current_step = step.to_string();
        status.log(step);
    }

    fn log(&self, message: &str) {
        self.write().log(message);
    }
}

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub status: StatusHandle,
    pub tags: RwLock<Vec<String>>,
    /// Where `/generate_static_site` assembles the deployable folder.
    pub site_dir: PathBuf,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, tags: Vec<String>) -> Self {
        Self {
            pipeline,
            status: StatusHandle::default(),
            tags: RwLock::new(tags),
            site_dir: PathBuf::from("netlify_site"),
        }
    }

    pub fn with_site_dir(mut self, site_dir: PathBuf) -> Self {
        self.site_dir = site_dir;
        self
    }

    fn known_tags(&self) -> Vec<String> {
        self.tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub tags: Vec<String>,
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    let website = ServeDir::new(state.pipeline.output_dir().join(WEBSITE_DIR));
    Router::new()
        .route("/", get(control_panel))
        .route("/start_scraping", post(start_scraping))
        .route("/status", get(get_status))
        .route("/results", get(get_results))
        .route("/tags", get(get_tags))
        .route("/refresh_tags", get(refresh_tags))
        .route("/generate_static_site", post(generate_static_site))
        .route("/view_website", get(|| async { Redirect::temporary("/website/index.html") }))
        .nest_service("/website", website)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until the process is stopped.
#[instrument(level = "info", skip(state))]
pub async fn serve(bind: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "Status API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn start_scraping(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Response {
    let tabs = expand_selection(&request.tags, &state.known_tags());
    {
        let mut status = state.status.write();
        if status.is_running {
            return bad_request("Scraping already running");
        }
        if tabs.is_empty() {
            return bad_request("No tags selected");
        }
        status.begin();
        if request.tags.iter().any(|t| t.trim() == crate::scrapers::tags::ALL_TAGS) {
            status.log(format!("'All' selected - scraping all {} categories", tabs.len()));
        }
    }

    tokio::spawn(run_scraping_task(Arc::clone(&state), tabs));
    Json(json!({ "success": true })).into_response()
}

/// Background body of `/start_scraping`.
#[instrument(level = "info", skip(state))]
pub async fn run_scraping_task(state: Arc<AppState>, tabs: Vec<String>) {
    state
        .status
        .write()
        .log(format!("Starting scraping for tags: {}", tabs.join(", ")));

    let result = state.pipeline.run_tabs(&tabs, &state.status).await;

    let mut status = state.status.write();
    match result {
        Ok(outcome) => {
            status.log(format!(
                "Successfully processed {} of {} articles",
                outcome.processed_articles, outcome.total_articles
            ));
            status.progress = 100;
            status.current_step = "Complete!".to_string();
            status.results = Some(outcome);
            status.log("Scraping completed successfully!");
        }
        Err(e) => {
            error!(error = %e, "Background run failed");
            status.error = Some(e.to_string());
            status.current_step = format!("Error: {e}");
            status.log(format!("ERROR: {e}"));
        }
    }
    status.is_running = false;
}

async fn control_panel() -> Html<&'static str> {
    Html(CONTROL_PANEL)
}

async fn generate_static_site(State(state): State<Arc<AppState>>) -> Response {
    match prepare_site(state.pipeline.output_dir(), &state.site_dir).await {
        Ok(manifest) => {
            state.status.write().log(format!(
                "Static site prepared in {} ({} files)",
                manifest.site_dir.display(),
                manifest.copied.len()
            ));
            Json(json!({ "success": true, "manifest": manifest })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Static site preparation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<ScrapeStatus> {
    Json(state.status.read().clone())
}

async fn get_results(State(state): State<Arc<AppState>>) -> Response {
    match state.status.read().results.clone() {
        Some(outcome) => Json(outcome).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No results yet" })),
        )
            .into_response(),
    }
}

async fn get_tags(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tags = state.known_tags();
    Json(json!({ "count": tags.len(), "tags": tags }))
}

async fn refresh_tags(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tags = discover_tags(state.pipeline.pages(), &state.pipeline.settings().site).await;
    *state.tags.write().unwrap_or_else(PoisonError::into_inner) = tags.clone();
    Json(json!({ "success": true, "count": tags.len(), "tags": tags }))
}

/// Single-page front end for the API above.
const CONTROL_PANEL: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Vault Digest</title>
<style>
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; max-width: 960px; margin: 0 auto; padding: 24px; color: #1f2933; background: #f5f7fa; }
h1 { margin-bottom: 4px; }
.panel { background: #fff; border-radius: 8px; padding: 16px 20px; margin: 16px 0; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
#tags { display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr)); gap: 6px; }
#tags label { cursor: pointer; }
button { background: #2563eb; color: #fff; border: 0; border-radius: 6px; padding: 8px 16px; margin-right: 8px; cursor: pointer; }
button:disabled { background: #9aa5b1; cursor: default; }
.bar { height: 18px; background: #e4e7eb; border-radius: 9px; overflow: hidden; }
.bar div { height: 100%; width: 0; background: #16a34a; transition: width .4s; }
#log { font-family: monospace; font-size: 13px; max-height: 260px; overflow-y: auto; background: #102a43; color: #d9e2ec; padding: 10px; border-radius: 6px; }
.error { color: #b91c1c; }
</style>
</head>
<body>
<h1>Vault Digest</h1>
<p>Pick categories, start a run, and watch it progress.</p>

<div class="panel">
  <h2>Categories</h2>
  <label><input type="checkbox" id="all" onchange="toggleAll(this.checked)"> <strong>All</strong></label>
  <div id="tags"></div>
  <p>
    <button id="start" onclick="startScraping()">Start scraping</button>
    <button onclick="refreshTags()">Refresh tags</button>
  </p>
</div>

<div class="panel">
  <h2>Progress</h2>
  <div class="bar"><div id="bar"></div></div>
  <p id="step">Idle</p>
  <div id="log"></div>
</div>

<div class="panel" id="results" hidden>
  <h2>Results</h2>
  <p id="summary"></p>
  <p>
    <a href="/view_website">Open dashboard</a>
    <button onclick="generateSite()">Generate static site</button>
  </p>
  <p id="site"></p>
</div>

<script>
let polling = null;

function renderTags(tags) {
  const box = document.getElementById('tags');
  box.replaceChildren();
  tags.forEach(tag => {
    const label = document.createElement('label');
    const input = document.createElement('input');
    input.type = 'checkbox';
    input.value = tag;
    label.append(input, ' ' + tag);
    box.append(label);
  });
}

function toggleAll(checked) {
  document.querySelectorAll('#tags input').forEach(i => { i.checked = checked; i.disabled = checked; });
}

async function loadTags() {
  const data = await (await fetch('/tags')).json();
  renderTags(data.tags);
}

async function refreshTags() {
  const data = await (await fetch('/refresh_tags')).json();
  renderTags(data.tags);
}

async function startScraping() {
  const tags = document.getElementById('all').checked
    ? ['All']
    : [...document.querySelectorAll('#tags input:checked')].map(i => i.value);
  const response = await fetch('/start_scraping', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ tags })
  });
  const data = await response.json();
  if (!response.ok) { alert(data.error); return; }
  document.getElementById('results').hidden = true;
  poll();
}

function render(status) {
  document.getElementById('bar').style.width = status.progress + '%';
  const step = document.getElementById('step');
  step.textContent = status.current_step || 'Idle';
  step.className = status.error ? 'error' : '';
  const log = document.getElementById('log');
  log.replaceChildren(...status.log_messages.map(m => {
    const line = document.createElement('div');
    line.textContent = '[' + m.timestamp + '] ' + m.message;
    return line;
  }));
  log.scrollTop = log.scrollHeight;
  document.getElementById('start').disabled = status.is_running;
  if (status.results) {
    document.getElementById('results').hidden = false;
    document.getElementById('summary').textContent =
      'Processed ' + status.results.processed_articles + ' of ' + status.results.total_articles +
      ' articles in ' + status.results.elapsed_secs.toFixed(1) + 's.';
  }
}

async function poll() {
  clearTimeout(polling);
  const status = await (await fetch('/status')).json();
  render(status);
  if (status.is_running) { polling = setTimeout(poll, 1000); }
}

async function generateSite() {
  const response = await fetch('/generate_static_site', { method: 'POST' });
  const data = await response.json();
  document.getElementById('site').textContent = response.ok
    ? 'Site prepared in ' + data.manifest.site_dir + ' (' + data.manifest.copied.length + ' files).'
    : 'Failed: ' + data.error;
}

loadTags();
poll();
</script>
</body>
</html>
"#;
