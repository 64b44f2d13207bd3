//! Error taxonomy shared by the store, the DNS service, backups and monitoring
//!
//! Every mutating operation either returns its payload or one of these
//! variants, each carrying a message that can be shown to an operator as-is.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One failed item inside a batch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub index: usize,
    pub name: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ConsoleError {
    /// Input rejected by the validation engine; nothing was written
    Validation(Vec<String>),
    /// Referenced zone, record or key does not exist
    NotFound(String),
    /// Write would break a uniqueness rule (duplicate zone, CNAME clash, second SOA)
    Conflict(String),
    /// Optional upstream (DNS adapter, Kea agent) is not configured or unreachable
    UpstreamUnavailable(String),
    /// Upstream answered with an error
    Upstream(String),
    /// Bounded control-plane call ran out of time
    Timeout { operation: String, duration: Duration },
    /// Multi-statement operation rolled back
    Transaction {
        message: String,
        errors: Vec<BatchItemError>,
    },
    /// A load-bearing backup component failed and aborted the run
    BackupComponent { component: String, message: String },
    /// A single health probe failed
    Probe { check: String, message: String },
    Database(sqlx::Error),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Config(String),
    InvalidRequest(String),
}

impl ConsoleError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        ConsoleError::Validation(vec![message.into()])
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        ConsoleError::NotFound(message.into())
    }

    /// HTTP status the gateway answers with
    pub fn status_code(&self) -> u16 {
        match self {
            ConsoleError::Validation(_) => 422,
            ConsoleError::InvalidRequest(_) => 400,
            ConsoleError::NotFound(_) => 404,
            ConsoleError::Conflict(_) => 409,
            ConsoleError::UpstreamUnavailable(_) => 503,
            ConsoleError::Upstream(_) => 502,
            ConsoleError::Timeout { .. } => 504,
            ConsoleError::Transaction { .. } => 409,
            _ => 500,
        }
    }

    /// Stable machine-readable kind for API payloads
    pub fn kind(&self) -> &'static str {
        match self {
            ConsoleError::Validation(_) => "validation_error",
            ConsoleError::NotFound(_) => "not_found",
            ConsoleError::Conflict(_) => "conflict",
            ConsoleError::UpstreamUnavailable(_) => "setup_required",
            ConsoleError::Upstream(_) => "upstream_error",
            ConsoleError::Timeout { .. } => "timeout",
            ConsoleError::Transaction { .. } => "transaction_failed",
            ConsoleError::BackupComponent { .. } => "backup_failed",
            ConsoleError::Probe { .. } => "probe_failed",
            ConsoleError::Database(_) => "database_error",
            ConsoleError::Io(_) => "io_error",
            ConsoleError::Serialization(_) => "serialization_error",
            ConsoleError::Config(_) => "config_error",
            ConsoleError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Validation(errors) => write!(f, "Validation failed: {}", errors.join("; ")),
            ConsoleError::NotFound(what) => write!(f, "Not found: {}", what),
            ConsoleError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ConsoleError::UpstreamUnavailable(msg) => write!(f, "Setup required: {}", msg),
            ConsoleError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            ConsoleError::Timeout { operation, duration } => {
                write!(f, "{} timed out after {}s", operation, duration.as_secs())
            }
            ConsoleError::Transaction { message, errors } => {
                write!(f, "Transaction rolled back: {} ({} item errors)", message, errors.len())
            }
            ConsoleError::BackupComponent { component, message } => {
                write!(f, "Backup component '{}' failed: {}", component, message)
            }
            ConsoleError::Probe { check, message } => write!(f, "Health check '{}' failed: {}", check, message),
            ConsoleError::Database(e) => write!(f, "Database error: {}", e),
            ConsoleError::Io(e) => write!(f, "IO error: {}", e),
            ConsoleError::Serialization(e) => write!(f, "Serialization error: {}", e),
            ConsoleError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ConsoleError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for ConsoleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsoleError::Database(e) => Some(e),
            ConsoleError::Io(e) => Some(e),
            ConsoleError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ConsoleError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ConsoleError::NotFound("row not found".to_string()),
            other => ConsoleError::Database(other),
        }
    }
}

impl From<std::io::Error> for ConsoleError {
    fn from(err: std::io::Error) -> Self {
        ConsoleError::Io(err)
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        ConsoleError::Serialization(err)
    }
}

impl From<sqlx::migrate::MigrateError> for ConsoleError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ConsoleError::Database(sqlx::Error::Migrate(Box::new(err)))
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ConsoleError::validation("bad").status_code(), 422);
        assert_eq!(ConsoleError::not_found("zone").status_code(), 404);
        assert_eq!(ConsoleError::UpstreamUnavailable("dns".into()).status_code(), 503);
    }

    #[test]
    fn test_setup_required_message() {
        let err = ConsoleError::UpstreamUnavailable("DNS provider is not configured".into());
        assert_eq!(err.kind(), "setup_required");
        assert!(err.to_string().starts_with("Setup required"));
    }
}
