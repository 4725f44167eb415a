//! Persisted slot for the current bearer token.

use std::sync::Arc;

use crate::storage::{Storage, StorageError, keys, read_or_absent};

use super::token::Token;

/// Holds the current bearer token across restarts.
///
/// Reads never fail: an unreadable or blank slot reads as `None`. Writes make
/// no network calls and are idempotent.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
}

impl TokenStore {
    /// Create a token store over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The persisted token, if any.
    #[must_use]
    pub fn get(&self) -> Option<Token> {
        read_or_absent(self.storage.as_ref(), keys::TOKEN)
            .map(|raw| raw.trim().to_owned())
            .filter(|raw| !raw.is_empty())
            .map(Token::new)
    }

    /// Persist `token`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the token was not durably written.
    pub fn set(&self, token: &Token) -> Result<(), StorageError> {
        self.storage.write(keys::TOKEN, token.expose())
    }

    /// Remove the persisted token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the slot could not be cleared.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(keys::TOKEN)
    }
}
