//! Tracing setup: stdout plus a daily rolling file under the log directory.

use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt::Layer, prelude::*, EnvFilter, Registry};

const LOG_FILE_PREFIX: &str = "raven-agent";

/// Install the global subscriber. `RUST_LOG` overrides `level`. The returned guards must
/// live until exit or buffered lines are lost.
///
/// When the log directory cannot be used the agent keeps running with stdout only.
pub fn init_logging(dir: &Path, level: Level) -> Vec<WorkerGuard> {
    let mut guards = vec![];

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let stdout_logging_layer = Layer::new().with_writer(stdout_writer);
    guards.push(stdout_guard);

    let (file_logging_layer, file_error) = match rolling_appender(dir) {
        Ok(appender) => {
            let (rolling_writer, rolling_guard) = tracing_appender::non_blocking(appender);
            guards.push(rolling_guard);
            (
                Some(Layer::new().with_writer(rolling_writer).with_ansi(false)),
                None,
            )
        }
        Err(e) => (None, Some(e)),
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let installed = Registry::default()
        .with(env_filter)
        .with(stdout_logging_layer)
        .with(file_logging_layer)
        .try_init()
        .is_ok();

    if let (true, Some(e)) = (installed, file_error) {
        tracing::warn!(
            "file logging disabled, {} is not usable: {e}",
            dir.display()
        );
    }
    guards
}

fn rolling_appender(dir: &Path) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)?;
    Ok(appender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appender_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/logs");
        rolling_appender(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn unusable_dir_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(rolling_appender(&file.join("logs")).is_err());
    }
}
