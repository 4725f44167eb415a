//! Locally persisted cart and favorites.
//!
//! Both stores keep their full contents in memory and rewrite the whole
//! persisted value on every mutation. The in-memory state is authoritative
//! for the lifetime of the store; a failed write is reported to the caller
//! but not undone, so a later reload may not reflect it.
//!
//! Product metadata is never stored here. [`Hydrator`] fetches it separately,
//! keyed by the ids the stores return.

mod cart;
mod favorites;
mod hydrate;

pub use cart::LocalCartStore;
pub use favorites::FavoritesStore;
pub use hydrate::{CartLineView, CartView, FavoriteView, Hydrator};

use shopfront_core::ProductId;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors from cart and favorites mutations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Incrementing would overflow the quantity. Nothing changed.
    #[error("quantity for product {0} is already at its maximum")]
    QuantityOverflow(ProductId),

    /// The mutation was applied in memory but could not be persisted.
    #[error("change not saved to {key}: {source}")]
    Persistence {
        /// Storage key that failed to update.
        key: &'static str,
        /// Backend error.
        #[source]
        source: StorageError,
    },
}

impl StoreError {
    /// Whether the in-memory state reflects the mutation despite the error.
    #[must_use]
    pub const fn applied(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

/// The cart operations a favorites move needs.
///
/// Implemented by [`LocalCartStore`]; tests substitute failing sinks.
pub trait CartSink {
    /// Current quantity of `id`, `0` if absent.
    fn quantity(&self, id: &ProductId) -> u32;

    /// Add one of `id`, creating the entry at 1 if absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the cart was not updated, or was updated but
    /// not persisted (see [`StoreError::applied`]).
    fn increment(&mut self, id: &ProductId) -> Result<(), StoreError>;

    /// Set the quantity of `id`; `0` removes it.
    ///
    /// # Errors
    ///
    /// As for [`increment`](Self::increment).
    fn set_quantity(&mut self, id: &ProductId, quantity: u32) -> Result<(), StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_applied() {
        let id = ProductId::parse("1").unwrap();
        assert!(!StoreError::QuantityOverflow(id).applied());
        assert!(
            StoreError::Persistence {
                key: "cart",
                source: StorageError::Rejected("cart".to_string()),
            }
            .applied()
        );
    }
}
