//! Error types for formsync.
//!
//! All errors in formsync are strongly typed using thiserror.
//! Configuration problems surface synchronously at mount; store and view
//! failures propagate to whoever drives the engine.

use thiserror::Error;

use crate::engine::Lifecycle;
use crate::store::StoreError;
use crate::view::ViewError;

/// Configuration errors raised while mounting a form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Misuse of sync engine: no slice identifier configured")]
    MissingSlice,

    #[error("Supported form view not found")]
    MissingFormView,

    #[error("Slice store not supplied")]
    MissingStore,

    #[error("Invalid updateOn value '{value}' (expected change, blur or submit)")]
    InvalidUpdateOn {
        value: String,
    },

    #[error("Invalid reset mode '{value}' (expected initial, submitted or blank)")]
    InvalidResetMode {
        value: String,
    },

    #[error("Invalid form options: {reason}")]
    InvalidOptions {
        reason: String,
    },
}

/// Top-level error type for formsync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("View error: {0}")]
    View(#[from] ViewError),

    #[error("Engine is {actual:?}, expected {expected:?}")]
    Lifecycle {
        expected: Lifecycle,
        actual: Lifecycle,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SyncError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a disconnected-channel error.
    #[must_use]
    pub fn disconnected(path: impl Into<String>) -> Self {
        Self::Disconnected { path: path.into() }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this error came from the slice store.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::Lifecycle { .. } | Self::Internal { .. } => false,
            Self::Store(e) => matches!(e, StoreError::Disconnected(_)),
            Self::View(_) => false,
            Self::Disconnected { .. } | Self::Timeout { .. } => true,
        }
    }
}

/// Result type alias for formsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
