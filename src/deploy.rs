//! Static-site preparation and Netlify deployment.
//!
//! [`prepare_site`] assembles a publishable folder from the latest run:
//!
//! ```text
//! site_dir/
//! ├── index.html        # from output_dir/website/
//! ├── *.css *.js ...    # any assets next to it
//! ├── <latest report>.pdf
//! ├── _redirects        # /pdf -> latest report, SPA fallback
//! └── netlify.toml      # publish ".", content types
//! ```
//!
//! [`deploy_with_netlify`] then shells out to the Netlify CLI. It never
//! returns an error: a missing CLI or a failed deploy is reported as `false`
//! so callers can print manual instructions instead.

use crate::error::Result;
use crate::outputs::dashboard::{INDEX_FILE, WEBSITE_DIR};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

pub const REDIRECTS_FILE: &str = "_redirects";
pub const NETLIFY_TOML: &str = "netlify.toml";

/// Website assets copied alongside the dashboard.
const ASSET_EXTENSIONS: &[&str] = &["css", "js", "png", "jpg", "ico"];
const REPORT_MARKER: &str = "comprehensive_report";

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(60);

const NETLIFY_CONFIG: &str = r#"[build]
  publish = "."

[[headers]]
  for = "*.pdf"
  [headers.values]
    Content-Type = "application/pdf"

[[headers]]
  for = "*.html"
  [headers.values]
    Content-Type = "text/html; charset=utf-8"
"#;

/// What [`prepare_site`] put into the site folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteManifest {
    pub site_dir: PathBuf,
    /// Whether a dashboard was found and copied.
    pub dashboard: bool,
    /// File names copied into `site_dir`, in copy order.
    pub copied: Vec<String>,
    /// File name of the report the `/pdf` redirect points at.
    pub pdf: Option<String>,
}

/// Contents of the `_redirects` file.
pub fn redirects(pdf: Option<&str>) -> String {
    let mut out = String::from("# Netlify redirects\n");
    if let Some(pdf) = pdf {
        out.push_str(&format!("/pdf /{pdf} 302\n"));
    }
    out.push_str("/* /index.html 200\n");
    out
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Most recently modified `*comprehensive_report*.pdf` directly in `dir`.
pub async fn latest_report(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(REPORT_MARKER) || !has_extension(&path, &["pdf"]) {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if best.as_ref().is_none_or(|(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, path)| path))
}

async fn copy_into(src: &Path, site_dir: &Path, manifest: &mut SiteManifest) -> Result<()> {
    let Some(name) = src.file_name() else {
        return Ok(());
    };
    fs::copy(src, site_dir.join(name)).await?;
    manifest.copied.push(name.to_string_lossy().into_owned());
    Ok(())
}

/// Assemble `site_dir` from the artifacts in `output_dir`.
#[instrument(level = "info", skip_all, fields(output = %output_dir.display(), site = %site_dir.display()))]
pub async fn prepare_site(output_dir: &Path, site_dir: &Path) -> Result<SiteManifest> {
    fs::create_dir_all(site_dir).await?;
    let mut manifest = SiteManifest {
        site_dir: site_dir.to_path_buf(),
        ..Default::default()
    };

    let website_dir = output_dir.join(WEBSITE_DIR);
    let index = website_dir.join(INDEX_FILE);
    if fs::try_exists(&index).await? {
        copy_into(&index, site_dir, &mut manifest).await?;
        manifest.dashboard = true;

        let mut assets = Vec::new();
        let mut entries = fs::read_dir(&website_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && has_extension(&path, ASSET_EXTENSIONS) {
                assets.push(path);
            }
        }
        assets.sort();
        for asset in assets {
            copy_into(&asset, site_dir, &mut manifest).await?;
        }
    } else {
        warn!(path = %index.display(), "No dashboard found; run the scraper first");
    }

    if let Some(pdf) = latest_report(output_dir).await? {
        match copy_into(&pdf, site_dir, &mut manifest).await {
            Ok(()) => {
                manifest.pdf = pdf.file_name().map(|n| n.to_string_lossy().into_owned());
            }
            Err(e) => error!(path = %pdf.display(), error = %e, "Could not copy PDF report"),
        }
    }

    fs::write(site_dir.join(REDIRECTS_FILE), redirects(manifest.pdf.as_deref())).await?;
    fs::write(site_dir.join(NETLIFY_TOML), NETLIFY_CONFIG).await?;

    info!(
        dashboard = manifest.dashboard,
        files = manifest.copied.len(),
        pdf = ?manifest.pdf,
        "Site prepared"
    );
    Ok(manifest)
}

async fn run_with_timeout(command: &mut Command, limit: Duration) -> Option<Output> {
    command.kill_on_drop(true);
    match timeout(limit, command.output()).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            warn!(error = %e, "Could not start command");
            None
        }
        Err(_) => {
            warn!(?limit, "Command timed out");
            None
        }
    }
}

/// Deploy `site_dir` to production with the Netlify CLI.
///
/// Returns `true` only when the CLI is installed and the deploy exits
/// successfully.
#[instrument(level = "info", skip_all, fields(site = %site_dir.display()))]
pub async fn deploy_with_netlify(site_dir: &Path) -> bool {
    deploy_with_cli("netlify", site_dir).await
}

async fn deploy_with_cli(program: &str, site_dir: &Path) -> bool {
    let mut check = Command::new(program);
    check.arg("--version");
    let Some(version) = run_with_timeout(&mut check, VERSION_TIMEOUT).await else {
        warn!("Netlify CLI not available");
        return false;
    };
    if !version.status.success() {
        warn!(status = %version.status, "Netlify CLI version check failed");
        return false;
    }
    info!(
        version = %String::from_utf8_lossy(&version.stdout).trim(),
        "Netlify CLI found"
    );

    let mut deploy_cmd = Command::new(program);
    deploy_cmd
        .args(["deploy", "--prod", "--dir", "."])
        .current_dir(site_dir);
    let deploy = run_with_timeout(&mut deploy_cmd, DEPLOY_TIMEOUT).await;

    match deploy {
        Some(output) if output.status.success() => {
            info!("Netlify deploy succeeded");
            true
        }
        Some(output) => {
            error!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Netlify deploy failed"
            );
            false
        }
        None => false,
    }
}
