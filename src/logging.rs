//! Structured logging setup.
//!
//! Library code only emits `tracing` events; hosts call [`init_logging`] once to
//! install a subscriber. Logs go to stderr unless `TRICODE_LOG_FILE` names a file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::env_string_opt;

pub const LOG_FILTER_ENV: &str = "TRICODE_LOG";
pub const LOG_FILE_ENV: &str = "TRICODE_LOG_FILE";
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `warn,session_manager=debug`.
    pub filter: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            filter: env_string_opt(LOG_FILTER_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            file: env_string_opt(LOG_FILE_ENV).map(PathBuf::from),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Installs the global subscriber. Returns `Ok(false)` when one is already set.
pub fn init_logging(config: &LogConfig) -> Result<bool, LoggingError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|source| LoggingError::InvalidFilter {
        filter: config.filter.clone(),
        source,
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::OpenFile {
                    path: path.clone(),
                    source,
                })?;
            builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
                .is_ok()
        }
        None => builder.with_writer(std::io::stderr).try_init().is_ok(),
    };

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_reported() {
        let config = LogConfig {
            filter: "tricode=loudest".to_string(),
            file: None,
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn second_init_is_harmless() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LogConfig {
            filter: "debug".to_string(),
            file: Some(dir.path().join("tricode.log")),
        };

        init_logging(&config).expect("first init");
        assert!(!init_logging(&config).expect("second init"));
        assert!(dir.path().join("tricode.log").exists());
    }
}
