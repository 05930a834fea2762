//! Error types for weakpub.
//!
//! Registry operations themselves never fail: attaching an expired handle or
//! detaching an absent one is a no-op. Errors only exist at the edges of the
//! crate, namely configuration and the background notifier queue. They are
//! strongly typed using thiserror so callers can match on specific conditions.

use std::path::PathBuf;

use thiserror::Error;

/// Validation errors raised while checking a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Field '{field}' must be at least 1, got {value}")]
    InvalidCapacity {
        field: String,
        value: usize,
    },

    #[error("Registry name cannot be empty")]
    EmptyName,

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },
}

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    Parse {
        message: String,
    },
}

/// Errors raised by the background notifier.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Queue '{path}' is full (capacity {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },

    #[error("Queue '{path}' is disconnected")]
    Disconnected {
        path: String,
    },

    #[error("Failed to spawn worker: {message}")]
    SpawnFailed {
        message: String,
    },
}

/// Top-level error type for weakpub.
#[derive(Debug, Error)]
pub enum WeakPubError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl WeakPubError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a config error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Config(_) => false,
            Self::Execution(e) => matches!(e, ExecutionError::QueueFull { .. }),
        }
    }
}

/// Result type alias for weakpub operations.
pub type WeakPubResult<T> = Result<T, WeakPubError>;
