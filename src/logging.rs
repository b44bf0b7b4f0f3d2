//! Log output to stdout and a daily rotated file

use std::io;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_PREFIX: &str = "smtp_server";
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Log files are named `smtp_server.<date>.log` in `log_dir` and only the
/// newest `keep_days` are kept. `RUST_LOG` overrides the default `info`
/// filter. Hold the returned guard until exit so buffered lines are flushed.
pub fn init(log_dir: &Path, keep_days: usize) -> anyhow::Result<WorkerGuard> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(keep_days.max(1))
        .build(log_dir)
        .with_context(|| format!("failed to open log directory {}", log_dir.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stdout))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_init_writes_log_file() {
        let dir = tempfile::tempdir().unwrap();

        let guard = init(dir.path(), 2).unwrap();
        tracing::info!("log file check");
        drop(guard);

        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("smtp_server."));
        assert!(files[0].ends_with(".log"));

        let contents = fs::read_to_string(dir.path().join(&files[0])).unwrap();
        assert!(contents.contains("log file check"));

        // the global subscriber is already set
        assert!(init(dir.path(), 2).is_err());
    }
}
