//! Structured logging setup
//!
//! # Features
//!
//! * **Structured Logging** - `tracing` events with typed fields
//! * **Multiple Outputs** - console (pretty or JSON) and a daily rolling file
//! * **Filtering** - `RUST_LOG` wins over the configured level

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::errors::ConsoleError;

/// Log levels accepted in configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConsoleError::Config(format!("Unknown log level: {}", other))),
        }
    }
}

/// Keeps the background file writer alive; drop it last
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber
///
/// A second initialisation (tests, embedded use) is reported and ignored.
pub fn init(config: &LoggingConfig) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_str()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        if config.json_format {
            layers.push(fmt::layer().json().with_current_span(false).boxed());
        } else {
            layers.push(fmt::layer().pretty().boxed());
        }
    }

    let mut guard = None;
    if let Some(ref dir) = config.file_output {
        let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        if config.json_format {
            layers.push(fmt::layer().json().with_writer(writer).with_ansi(false).boxed());
        } else {
            layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
        }
    }

    if let Err(e) = tracing_subscriber::registry().with(layers).with(filter).try_init() {
        if config.console_output {
            eprintln!("Warning: Tracing subscriber already initialized: {}", e);
        }
    }

    LoggingGuard { _file: guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_double_init_is_tolerated() {
        let config = LoggingConfig {
            console_output: false,
            ..Default::default()
        };
        let _first = init(&config);
        let _second = init(&config);
    }
}
