//! # Vault Digest
//!
//! Collects articles from the B2B Vault library, summarizes each one with an
//! LLM, and publishes the results as a PDF report and a static dashboard.
//!
//! ## Usage
//!
//! ```sh
//! PERPLEXITY_API_KEY=... vault_digest run --limit 20
//! vault_digest run --tags Sales,AI --preview
//! vault_digest serve
//! vault_digest deploy --netlify
//! ```
//!
//! ## Architecture
//!
//! 1. **Collection**: a headless browser renders listing pages; cards are
//!    parsed into articles (`scrapers`)
//! 2. **Fetching**: each linked article is loaded and its text extracted
//! 3. **Summarization**: article text goes to a chat-completion API, batched
//!    with bounded concurrency (`api`, `pipeline`)
//! 4. **Output**: JSON caches, a PDF report and an HTML dashboard (`outputs`),
//!    optionally published to Netlify (`deploy`)

use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

mod api;
mod browser;
mod cli;
mod config;
mod deploy;
mod error;
mod logging;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod server;
mod utils;

use api::build_summarizer;
use browser::ChromeBrowser;
use cli::{Cli, Command, RunArgs};
use config::Settings;
use error::Result;
use models::RunOutcome;
use pipeline::{ConsoleProgress, Pipeline};
use scrapers::tags::{ALL_TAGS, discover_tags, expand_selection};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let _log_guard = logging::init(args.verbose, &args.output_dir);

    info!(version = env!("CARGO_PKG_VERSION"), "vault_digest starting up");
    debug!(?args.config, output_dir = %args.output_dir.display(), "Parsed CLI arguments");

    let mut settings = Settings::load(args.config.as_deref())?;
    if args.api_key.is_some() {
        settings.llm.api_key = args.api_key.clone();
    }
    let settings = Arc::new(settings);

    let result = match &args.command {
        Command::Run(run) => run_digest(settings, &args.output_dir, run).await,
        Command::Tags { live } => list_tags(&settings, *live).await,
        Command::Serve { bind, site_dir } => {
            serve(settings, &args.output_dir, site_dir, bind).await
        }
        Command::Deploy { site_dir, netlify } => {
            deploy_site(&args.output_dir, site_dir, *netlify).await
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "vault_digest failed");
    }
    result
}

fn build_pipeline(
    settings: Arc<Settings>,
    output_dir: &Path,
    headless: bool,
) -> Result<Pipeline> {
    let chrome = Arc::new(ChromeBrowser::launch(headless)?);
    let asker = Arc::new(build_summarizer(&settings.llm)?);
    Ok(Pipeline::new(
        chrome.clone(),
        asker,
        chrome,
        settings,
        output_dir.to_path_buf(),
    ))
}

#[instrument(level = "info", skip(settings, output_dir))]
async fn run_digest(settings: Arc<Settings>, output_dir: &Path, args: &RunArgs) -> Result<()> {
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let pipeline = build_pipeline(settings, output_dir, !args.preview)?;
    let progress = ConsoleProgress {
        preview: args.preview,
    };

    let Some(minutes) = args.interval_minutes else {
        let outcome = run_once(&pipeline, args, &progress).await?;
        print_outcome(&outcome);
        return Ok(());
    };

    info!(minutes, "Running on a schedule");
    let mut ticker = interval(Duration::from_secs(minutes * 60));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match run_once(&pipeline, args, &progress).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => error!(error = %e, "Scheduled run failed; waiting for the next one"),
        }
    }
}

async fn run_once(
    pipeline: &Pipeline,
    args: &RunArgs,
    progress: &ConsoleProgress,
) -> Result<RunOutcome> {
    if args.reuse_cache {
        return pipeline.run_cached(progress).await;
    }
    if args.tags.is_empty() {
        return pipeline.run_homepage(args.limit, progress).await;
    }

    let site = &pipeline.settings().site;
    let available = if args.tags.iter().any(|t| t.trim() == ALL_TAGS) {
        discover_tags(pipeline.pages(), site).await
    } else {
        site.default_tags.clone()
    };
    let tabs = expand_selection(&args.tags, &available);
    pipeline.run_tabs(&tabs, progress).await
}

fn print_outcome(outcome: &RunOutcome) {
    println!(
        "Processed {} of {} articles in {:.1}s",
        outcome.processed_articles, outcome.total_articles, outcome.elapsed_secs
    );
    if let Some(pdf) = &outcome.pdf_path {
        println!("PDF report: {}", pdf.display());
    }
    if let Some(site) = &outcome.website_path {
        println!("Website: {}", site.display());
    }
}

async fn list_tags(settings: &Settings, live: bool) -> Result<()> {
    let tags = if live {
        let chrome = ChromeBrowser::launch(true)?;
        discover_tags(&chrome, &settings.site).await
    } else {
        settings.site.default_tags.clone()
    };
    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}

async fn serve(
    settings: Arc<Settings>,
    output_dir: &Path,
    site_dir: &Path,
    bind: &str,
) -> Result<()> {
    ensure_writable_dir(output_dir).await?;
    let pipeline = build_pipeline(settings, output_dir, true)?;
    let tags = discover_tags(pipeline.pages(), &pipeline.settings().site).await;
    info!(count = tags.len(), "Tags available to the status API");
    let state = Arc::new(
        server::AppState::new(Arc::new(pipeline), tags).with_site_dir(site_dir.to_path_buf()),
    );
    server::serve(bind, state).await
}

async fn deploy_site(output_dir: &Path, site_dir: &Path, netlify: bool) -> Result<()> {
    let manifest = deploy::prepare_site(output_dir, site_dir).await?;
    println!("Site prepared in {}", manifest.site_dir.display());
    for file in &manifest.copied {
        println!("  {file}");
    }
    if !manifest.dashboard {
        warn!("No dashboard found; run `vault_digest run` first");
    }

    if netlify {
        if deploy::deploy_with_netlify(site_dir).await {
            println!("Deployed to Netlify");
        } else {
            println!("Automatic deploy unavailable. Install the Netlify CLI (npm install -g netlify-cli),");
            println!("run `netlify login` and `netlify init` once, or upload {} manually.", site_dir.display());
        }
    }
    Ok(())
}
