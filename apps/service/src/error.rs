use std::{io, path::PathBuf};

use thiserror::Error;

use crate::monitoring::validation::{MAX_RETRIES, MAX_RETRY_INTERVAL_SECONDS, MAX_TIMEOUT_SECONDS};

/// Reasons a monitor configuration is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Monitor name cannot be empty")]
    EmptyName,

    #[error("Monitor name '{name}' cannot be used as a file name: {reason}")]
    UnsafeName { name: String, reason: String },

    #[error("A monitor named '{0}' already exists")]
    DuplicateName(String),

    #[error("{0}")]
    InvalidUrl(String),

    #[error("Unknown check type '{0}'")]
    UnknownCheckType(String),

    #[error("Invalid check parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(String),

    #[error("Timeout must be above 0 and at most {max} seconds, got {0}", max = MAX_TIMEOUT_SECONDS)]
    InvalidTimeout(f64),

    #[error("Period must be between 1 and {max} seconds, got {value}")]
    InvalidPeriod { value: i64, max: i64 },

    #[error("Retries must be between 0 and {max}, got {0}", max = MAX_RETRIES)]
    InvalidRetries(i64),

    #[error("Retry interval must be between 0 and {max} seconds, got {0}", max = MAX_RETRY_INTERVAL_SECONDS)]
    InvalidRetryInterval(f64),
}

/// Failures reading or writing the registry file and history files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed data in {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Errors surfaced to the control surface.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("No monitor named '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
