//! Favorites store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use shopfront_core::ProductId;

use super::{CartSink, StoreError};
use crate::storage::{Storage, keys, read_or_absent};
use crate::telemetry;

/// Persisted set of favorited product ids.
///
/// Persisted as a JSON array of ids under [`keys::FAVORITES`]. An object
/// keyed by id is also accepted on load.
pub struct FavoritesStore {
    storage: Arc<dyn Storage>,
    ids: BTreeSet<ProductId>,
}

impl std::fmt::Debug for FavoritesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesStore")
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl FavoritesStore {
    /// Load the favorites persisted in `storage`.
    #[must_use]
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let ids = load_ids(storage.as_ref());
        Self { storage, ids }
    }

    /// Every favorited id.
    #[must_use]
    pub const fn get_all(&self) -> &BTreeSet<ProductId> {
        &self.ids
    }

    /// Whether `id` is a favorite.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.ids.contains(id)
    }

    /// Number of favorites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether there are no favorites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add `id`. Adding an existing favorite is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the change could not be saved.
    pub fn add(&mut self, id: &ProductId) -> Result<(), StoreError> {
        if !self.ids.insert(id.clone()) {
            return Ok(());
        }
        telemetry::add_breadcrumb("favorites", "Added favorite", &[("product_id", id.as_str())]);
        self.persist()
    }

    /// Remove `id`. Absent ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the change could not be saved.
    pub fn remove(&mut self, id: &ProductId) -> Result<(), StoreError> {
        if !self.ids.remove(id) {
            return Ok(());
        }
        self.persist()
    }

    /// Remove every favorite.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the change could not be saved.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.ids.clear();
        self.storage
            .remove(keys::FAVORITES)
            .map_err(|source| StoreError::Persistence {
                key: keys::FAVORITES,
                source,
            })
    }

    /// Replace the in-memory set with what is currently persisted.
    pub fn reload(&mut self) {
        self.ids = load_ids(self.storage.as_ref());
    }

    /// Move `id` from favorites into `cart`.
    ///
    /// The cart is incremented first; the favorite is removed only once that
    /// succeeded. If the cart step fails, neither side changes: a cart
    /// increment that was applied in memory but not persisted is rolled back.
    ///
    /// # Errors
    ///
    /// - The cart's error if the increment failed (favorite kept)
    /// - `StoreError::Persistence` if the favorite removal could not be
    ///   saved; the item is then in the cart and, after a reload, may also
    ///   reappear in favorites
    pub fn move_to_cart<C: CartSink + ?Sized>(
        &mut self,
        id: &ProductId,
        cart: &mut C,
    ) -> Result<(), StoreError> {
        let before = cart.quantity(id);

        if let Err(e) = cart.increment(id) {
            if e.applied() {
                roll_back(cart, id, before);
            }
            warn!(product_id = %id, error = %e, "Move to cart failed, favorite kept");
            return Err(e);
        }

        self.remove(id)?;
        info!(product_id = %id, "Moved favorite to cart");
        Ok(())
    }

    fn persist(&self) -> Result<(), StoreError> {
        let array = Value::Array(
            self.ids
                .iter()
                .map(|id| Value::String(id.to_string()))
                .collect(),
        );

        self.storage
            .write(keys::FAVORITES, &array.to_string())
            .map_err(|source| {
                warn!(error = %source, "Favorites change kept in memory only");
                StoreError::Persistence {
                    key: keys::FAVORITES,
                    source,
                }
            })
    }
}

/// Restore the in-memory cart quantity after a non-durable increment.
fn roll_back<C: CartSink + ?Sized>(cart: &mut C, id: &ProductId, quantity: u32) {
    match cart.set_quantity(id, quantity) {
        // The rollback write fails like the increment did; memory is restored.
        Ok(()) => {}
        Err(e) if e.applied() => {}
        Err(e) => error!(product_id = %id, error = %e, "Failed to roll back cart increment"),
    }
}

fn load_ids(storage: &dyn Storage) -> BTreeSet<ProductId> {
    let Some(raw) = read_or_absent(storage, keys::FAVORITES) else {
        return BTreeSet::new();
    };

    let candidates: Vec<String> = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
                other => {
                    warn!(value = %other, "Dropping invalid favorite");
                    None
                }
            })
            .collect(),
        Ok(Value::Object(object)) => object
            .into_iter()
            .filter(|(_, v)| !matches!(v, Value::Null | Value::Bool(false)))
            .map(|(k, _)| k)
            .collect(),
        Ok(_) => {
            warn!("Persisted favorites are neither an array nor an object, starting empty");
            return BTreeSet::new();
        }
        Err(e) => {
            warn!(error = %e, "Persisted favorites are not valid JSON, starting empty");
            return BTreeSet::new();
        }
    };

    candidates
        .iter()
        .filter_map(|raw| ProductId::parse(raw).ok())
        .collect()
}
