//! Unified error handling with Sentry integration.
//!
//! Each module has its own error enum; [`ClientError`] wraps them for
//! callers (such as the CLI) that drive several modules at once.

use thiserror::Error;

use shopfront_core::IdError;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::session::{DecodeError, LoginError};
use crate::shop::StoreError;
use crate::storage::StorageError;

/// Application-level error type for the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistent storage is unusable.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// REST API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Credential login failed.
    #[error(transparent)]
    Login(#[from] LoginError),

    /// A token could not be decoded.
    #[error("Invalid token: {0}")]
    Token(#[from] DecodeError),

    /// Cart or favorites mutation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A product id was rejected.
    #[error("Invalid product id: {0}")]
    InvalidId(#[from] IdError),
}

impl ClientError {
    /// Whether the error points at a bug or broken environment rather than
    /// user input or an expected server answer.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        match self {
            Self::Storage(_) | Self::Store(StoreError::Persistence { .. }) => true,
            Self::Api(e) | Self::Login(LoginError::Api(e)) => {
                matches!(e, ApiError::Parse(_) | ApiError::Url(_))
            }
            _ => false,
        }
    }

    /// Log the error and, if internal, send it to Sentry.
    pub fn report(&self) {
        if self.is_internal() {
            let event_id = sentry::capture_error(self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Client error");
        } else {
            tracing::debug!(error = %self, "Client error");
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
