//! Session error types.

use thiserror::Error;

use crate::api::ApiError;

use super::token::DecodeError;

/// Errors from confirming an identity against the profile endpoint.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The API rejected the token (401/403). The session must end.
    #[error("session expired ({status}): {message}")]
    SessionExpired {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason.
        message: String,
    },

    /// The profile could not be fetched. The optimistic identity stands.
    #[error("profile fetch failed: {0}")]
    Network(#[source] ApiError),
}

/// Errors from a credential login.
#[derive(Debug, Error)]
pub enum LoginError {
    /// The credential exchange failed.
    #[error("login failed: {0}")]
    Api(#[from] ApiError),

    /// The issued token could not be decoded.
    #[error("issued token is unusable: {0}")]
    Decode(#[from] DecodeError),
}
