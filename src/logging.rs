//! Tracing setup: a console layer plus `agent.log` in the output directory,
//! so unattended scheduled runs leave a trail next to their artifacts.

use std::io;
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt as tfmt};

pub const LOG_FILE: &str = "agent.log";

/// Plain-text layer appending to `{dir}/agent.log`. Keep the guard alive
/// for as long as events should reach the file.
pub fn file_layer<S>(dir: &Path) -> io::Result<(impl Layer<S> + Send + Sync, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE));
    let layer = tfmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(UtcTime::rfc_3339());
    Ok((layer, guard))
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool, output_dir: &Path) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = tfmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339());

    let (file, guard, file_error) = match file_layer(output_dir) {
        Ok((layer, guard)) => (Some(layer), Some(guard), None),
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    if let Some(e) = file_error {
        tracing::warn!(dir = %output_dir.display(), error = %e, "File logging disabled");
    }
    guard
}
