//! Cart store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use shopfront_core::ProductId;

use super::{CartSink, StoreError};
use crate::storage::{Storage, keys, read_or_absent};
use crate::telemetry;

/// Persisted mapping of product id to quantity.
///
/// Every stored quantity is at least 1. Persisted as a JSON object under
/// [`keys::CART`].
pub struct LocalCartStore {
    storage: Arc<dyn Storage>,
    items: BTreeMap<ProductId, u32>,
}

impl std::fmt::Debug for LocalCartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCartStore")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl LocalCartStore {
    /// Load the cart persisted in `storage`.
    ///
    /// Unreadable or malformed data loads as an empty cart; invalid entries
    /// are dropped individually.
    #[must_use]
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let items = load_items(storage.as_ref());
        Self { storage, items }
    }

    /// Every entry.
    #[must_use]
    pub const fn get_all(&self) -> &BTreeMap<ProductId, u32> {
        &self.items
    }

    /// Product ids in the cart.
    pub fn ids(&self) -> impl Iterator<Item = &ProductId> {
        self.items.keys()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.values().map(|&q| u64::from(q)).sum()
    }

    /// Whether the cart has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Quantity of `id`, `0` if absent.
    #[must_use]
    pub fn quantity(&self, id: &ProductId) -> u32 {
        self.items.get(id).copied().unwrap_or(0)
    }

    /// Set the quantity of `id`. A quantity of `0` removes the entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the change could not be saved.
    pub fn set_quantity(&mut self, id: &ProductId, quantity: u32) -> Result<(), StoreError> {
        if quantity == 0 {
            return self.remove(id);
        }
        if self.items.insert(id.clone(), quantity) == Some(quantity) {
            return Ok(());
        }
        self.persist()
    }

    /// Add one of `id`, creating the entry at 1 if absent.
    ///
    /// # Errors
    ///
    /// - `StoreError::QuantityOverflow` if the quantity is already `u32::MAX`
    /// - `StoreError::Persistence` if the change could not be saved
    pub fn increment(&mut self, id: &ProductId) -> Result<(), StoreError> {
        let next = self
            .quantity(id)
            .checked_add(1)
            .ok_or_else(|| StoreError::QuantityOverflow(id.clone()))?;
        self.items.insert(id.clone(), next);
        if next == 1 {
            telemetry::add_breadcrumb("cart", "Added item", &[("product_id", id.as_str())]);
        }
        self.persist()
    }

    /// Decrease the quantity of `id` by one, stopping at 1.
    ///
    /// Absent ids are ignored. Use [`remove`](Self::remove) to drop an entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the change could not be saved.
    pub fn decrement(&mut self, id: &ProductId) -> Result<(), StoreError> {
        match self.items.get_mut(id) {
            Some(quantity) if *quantity > 1 => {
                *quantity -= 1;
                self.persist()
            }
            Some(_) => {
                debug!(product_id = %id, "Quantity already at minimum");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Remove `id` from the cart. Absent ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the change could not be saved.
    pub fn remove(&mut self, id: &ProductId) -> Result<(), StoreError> {
        if self.items.remove(id).is_none() {
            return Ok(());
        }
        telemetry::add_breadcrumb("cart", "Removed item", &[("product_id", id.as_str())]);
        self.persist()
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the change could not be saved.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.items.clear();
        self.storage
            .remove(keys::CART)
            .map_err(|source| StoreError::Persistence {
                key: keys::CART,
                source,
            })
    }

    /// Replace the in-memory cart with what is currently persisted.
    pub fn reload(&mut self) {
        self.items = load_items(self.storage.as_ref());
    }

    fn persist(&self) -> Result<(), StoreError> {
        let object: Map<String, Value> = self
            .items
            .iter()
            .map(|(id, &quantity)| (id.to_string(), Value::from(quantity)))
            .collect();

        self.storage
            .write(keys::CART, &Value::Object(object).to_string())
            .map_err(|source| {
                warn!(error = %source, "Cart change kept in memory only");
                StoreError::Persistence {
                    key: keys::CART,
                    source,
                }
            })
    }
}

impl CartSink for LocalCartStore {
    fn quantity(&self, id: &ProductId) -> u32 {
        Self::quantity(self, id)
    }

    fn increment(&mut self, id: &ProductId) -> Result<(), StoreError> {
        Self::increment(self, id)
    }

    fn set_quantity(&mut self, id: &ProductId, quantity: u32) -> Result<(), StoreError> {
        Self::set_quantity(self, id, quantity)
    }
}

/// Parse the persisted cart, dropping anything that is not `id → n ≥ 1`.
fn load_items(storage: &dyn Storage) -> BTreeMap<ProductId, u32> {
    let Some(raw) = read_or_absent(storage, keys::CART) else {
        return BTreeMap::new();
    };

    let object = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            warn!("Persisted cart is not a JSON object, starting empty");
            return BTreeMap::new();
        }
        Err(e) => {
            warn!(error = %e, "Persisted cart is not valid JSON, starting empty");
            return BTreeMap::new();
        }
    };

    let mut items = BTreeMap::new();
    for (key, value) in object {
        let quantity = value
            .as_u64()
            .filter(|&q| q >= 1)
            .and_then(|q| u32::try_from(q).ok());
        match (ProductId::parse(&key), quantity) {
            (Ok(id), Some(quantity)) => {
                items.insert(id, quantity);
            }
            _ => warn!(product_id = %key, %value, "Dropping invalid cart entry"),
        }
    }
    items
}
