//! Durable key/value storage.
//!
//! The engine persists exactly three values: the bearer token, the cart, and
//! the favorites set. Each lives under a well-known key (see [`keys`]) in a
//! [`Storage`] backend that survives restarts.
//!
//! ## Backends
//!
//! - [`FileStorage`] - one file per key under a data directory
//! - [`MemoryStorage`] - in-process map, with write fault injection for tests
//!
//! There is no change notification between instances sharing a backend. An
//! instance only observes another's writes on its own next read.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed (permissions, disk full, ...).
    #[error("storage I/O error for key {key}: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backend refused the write (quota exceeded, read-only, ...).
    #[error("storage rejected write for key {0}")]
    Rejected(String),

    /// The key is not a valid storage key.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// A durable string key/value store.
///
/// Implementations must make `write` atomic per key: a reader sees either the
/// previous value or the new one, never a partial value.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value was not durably written.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be modified.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Well-known storage keys.
pub mod keys {
    /// Key for the current bearer token.
    pub const TOKEN: &str = "access_token";

    /// Key for the cart mapping (product id → quantity).
    pub const CART: &str = "cart";

    /// Key for the favorites set.
    pub const FAVORITES: &str = "favorites";
}

/// Read a key, treating backend failures as absence.
///
/// Stores use this on load: a corrupted or unreadable slot means "nothing
/// stored", never an error for the caller.
pub(crate) fn read_or_absent(storage: &dyn Storage, key: &str) -> Option<String> {
    match storage.read(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read persisted value, treating as absent");
            None
        }
    }
}
