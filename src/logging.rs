//! Tracing subscriber setup.
//!
//! Console output goes to stderr so the chat transport owns stdout. When a
//! log directory is configured, a daily-rolling file receives the same
//! events through a non-blocking writer; keep the returned guard alive for
//! the life of the process or buffered lines are lost.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::ledger_config::LoggingSection;

/// File name stem for rolled log files.
pub const LOG_FILE_PREFIX: &str = "ledgerbot.log";

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
    pub directory: Option<PathBuf>,
}

impl LoggingOptions {
    pub fn from_section(section: &LoggingSection, directory: Option<PathBuf>) -> Self {
        Self {
            level: section.level.clone(),
            json: section.json,
            directory,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install the global subscriber.
pub fn init(options: &LoggingOptions) -> Result<Option<WorkerGuard>> {
    let console = if options.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file, guard) = match &options.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(options.filter())
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_take_section_values() {
        let section = LoggingSection {
            level: "debug".into(),
            json: true,
            directory: Some(PathBuf::from("logs")),
        };
        let options = LoggingOptions::from_section(&section, Some(PathBuf::from("/srv/logs")));
        assert_eq!(options.level, "debug");
        assert!(options.json);
        assert_eq!(options.directory, Some(PathBuf::from("/srv/logs")));
    }
}
