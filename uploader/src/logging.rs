//! Logging setup.
//!
//! Events go to stderr and, when `log.dir` is configured, are appended to
//! `log.dir/log.filename` without ANSI colors. `RUST_LOG` overrides the
//! configured level.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;
use crate::error::{ConfigError, ConfigResult};

/// Build the filter for one output layer.
fn filter(level: &str) -> ConfigResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    // sqlx logs every statement at info
    EnvFilter::try_new(format!("{},sqlx=warn", level))
        .map_err(|e| ConfigError::Invalid(format!("log level '{}': {}", level, e)))
}

/// Install the global subscriber. `verbose` forces the `debug` level.
pub fn init(log: &LogConfig, verbose: bool) -> ConfigResult<()> {
    let level = if verbose { "debug" } else { log.level.as_str() };

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter(level)?);

    let file = match log.file_path() {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| ConfigError::Io { path, source })?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(filter(level)?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| ConfigError::LoggerInstalled(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directives() {
        assert!(filter("info").is_ok());
        assert!(filter("csvload=debug").is_ok());
    }

    #[test]
    fn test_log_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogConfig {
            dir: Some(dir.path().join("logs")),
            ..LogConfig::default()
        };
        // a subscriber may already be installed by another test
        match init(&log, false) {
            Ok(()) | Err(ConfigError::LoggerInstalled(_)) => {}
            Err(e) => panic!("unexpected logging error: {}", e),
        }
        assert!(dir.path().join("logs").join("uploader.log").exists());
    }
}
