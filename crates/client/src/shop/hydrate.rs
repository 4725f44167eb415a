//! Display data for cart and favorites entries.
//!
//! Snapshots are fetched in one `GET /products` call per distinct id set and
//! cached with `moka`. The cache key is the sorted id set itself, so adding
//! or removing an entry always fetches fresh data for the new set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument, warn};

use shopfront_core::{CurrencyCode, Price, ProductId};

use crate::api::{ApiError, ProductCatalog, ProductSnapshot};

type SnapshotMap = Arc<HashMap<ProductId, ProductSnapshot>>;

/// One cart entry joined with its product snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub quantity: u32,
    /// `None` if the catalog no longer knows the product.
    pub product: Option<ProductSnapshot>,
    /// Unit price times quantity, when the product is known and the
    /// product does not overflow.
    pub line_total: Option<Price>,
}

impl CartLineView {
    /// Whether product data was found for this line.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.product.is_some()
    }
}

/// Cart display data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    /// Sum of available line totals. `None` if lines are priced in more than
    /// one currency or a total overflows.
    pub subtotal: Option<Price>,
    /// Sum of quantities, including unavailable lines.
    pub item_count: u64,
}

impl CartView {
    /// Join `entries` with `snapshots`.
    ///
    /// Entries without a snapshot are kept as unavailable lines.
    #[must_use]
    pub fn build(
        entries: &BTreeMap<ProductId, u32>,
        snapshots: &HashMap<ProductId, ProductSnapshot>,
    ) -> Self {
        let lines: Vec<CartLineView> = entries
            .iter()
            .map(|(id, &quantity)| {
                let product = snapshots.get(id).cloned();
                let line_total = product.as_ref().and_then(|p| {
                    let total = p.price.times(quantity);
                    if total.is_none() {
                        warn!(product_id = %id, quantity, "Line total overflows");
                    }
                    total
                });
                CartLineView {
                    product_id: id.clone(),
                    quantity,
                    product,
                    line_total,
                }
            })
            .collect();

        let subtotal = lines
            .iter()
            .filter(|line| line.is_available())
            .try_fold(None, |acc: Option<Price>, line| {
                let total = line.line_total?;
                match acc {
                    None => Some(Some(total)),
                    Some(sum) => sum.checked_add(total).map(Some),
                }
            })
            .map(|sum| sum.unwrap_or_else(|| Price::zero(CurrencyCode::default())));

        Self {
            item_count: lines.iter().map(|l| u64::from(l.quantity)).sum(),
            lines,
            subtotal,
        }
    }

    /// Number of lines whose product could not be found.
    #[must_use]
    pub fn unavailable_count(&self) -> usize {
        self.lines.iter().filter(|l| !l.is_available()).count()
    }
}

/// One favorite joined with its product snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteView {
    pub product_id: ProductId,
    pub product: Option<ProductSnapshot>,
}

/// Fetches and caches product snapshots.
pub struct Hydrator<C> {
    catalog: Arc<C>,
    cache: Cache<Vec<ProductId>, SnapshotMap>,
}

impl<C> Clone for Hydrator<C> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            cache: self.cache.clone(),
        }
    }
}

impl<C: ProductCatalog> Hydrator<C> {
    /// Create a hydrator whose snapshots live for `ttl`.
    #[must_use]
    pub fn new(catalog: Arc<C>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(256)
            .time_to_live(ttl)
            .build();

        Self { catalog, cache }
    }

    /// Snapshots for `ids`, keyed by id. Unknown ids are absent.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the catalog fetch fails. Nothing is cached then.
    pub async fn snapshots(&self, ids: &BTreeSet<ProductId>) -> Result<SnapshotMap, ApiError> {
        if ids.is_empty() {
            return Ok(Arc::default());
        }

        let key: Vec<ProductId> = ids.iter().cloned().collect();
        if let Some(cached) = self.cache.get(&key).await {
            debug!(count = key.len(), "Product snapshots served from cache");
            return Ok(cached);
        }

        let fetched = self.fetch(&key).await?;
        self.cache.insert(key, Arc::clone(&fetched)).await;
        Ok(fetched)
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    async fn fetch(&self, ids: &[ProductId]) -> Result<SnapshotMap, ApiError> {
        let products = self.catalog.fetch_products(ids).await.map_err(|e| {
            warn!(error = %e, "Product lookup failed");
            e
        })?;

        let requested: BTreeSet<&ProductId> = ids.iter().collect();
        let map: HashMap<ProductId, ProductSnapshot> = products
            .into_iter()
            .filter(|p| requested.contains(&p.id))
            .map(|p| (p.id.clone(), p))
            .collect();

        if map.len() < ids.len() {
            debug!(
                missing = ids.len() - map.len(),
                "Some products were not found"
            );
        }
        Ok(Arc::new(map))
    }

    /// Hydrate cart entries.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the catalog fetch fails.
    pub async fn cart_view(&self, entries: &BTreeMap<ProductId, u32>) -> Result<CartView, ApiError> {
        let ids: BTreeSet<ProductId> = entries.keys().cloned().collect();
        let snapshots = self.snapshots(&ids).await?;
        Ok(CartView::build(entries, &snapshots))
    }

    /// Hydrate favorites.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the catalog fetch fails.
    pub async fn favorites_view(
        &self,
        ids: &BTreeSet<ProductId>,
    ) -> Result<Vec<FavoriteView>, ApiError> {
        let snapshots = self.snapshots(ids).await?;
        Ok(ids
            .iter()
            .map(|id| FavoriteView {
                product_id: id.clone(),
                product: snapshots.get(id).cloned(),
            })
            .collect())
    }

    /// Drop every cached snapshot.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use rust_decimal::Decimal;

    use super::*;

    fn id(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn snapshot(product: &str, cents: i64, currency: CurrencyCode) -> ProductSnapshot {
        ProductSnapshot {
            id: id(product),
            name: format!("Product {product}"),
            price: Price::new(Decimal::new(cents, 2), currency),
            image: None,
        }
    }

    /// Catalog that records every request.
    struct RecordingCatalog {
        products: Vec<ProductSnapshot>,
        requests: Mutex<Vec<Vec<ProductId>>>,
        fail: bool,
    }

    impl RecordingCatalog {
        fn new(products: Vec<ProductSnapshot>) -> Self {
            Self {
                products,
                requests: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl ProductCatalog for RecordingCatalog {
        async fn fetch_products(&self, ids: &[ProductId]) -> Result<Vec<ProductSnapshot>, ApiError> {
            self.requests.lock().unwrap().push(ids.to_vec());
            if self.fail {
                return Err(ApiError::RateLimited(5));
            }
            Ok(self
                .products
                .iter()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        }
    }

    fn hydrator(catalog: RecordingCatalog) -> (Hydrator<RecordingCatalog>, Arc<RecordingCatalog>) {
        let catalog = Arc::new(catalog);
        (
            Hydrator::new(Arc::clone(&catalog), Duration::from_secs(60)),
            catalog,
        )
    }

    #[test]
    fn test_cart_view_totals() {
        let entries: BTreeMap<_, _> = [(id("a"), 2), (id("b"), 1), (id("gone"), 4)]
            .into_iter()
            .collect();
        let snapshots: HashMap<_, _> = [
            (id("a"), snapshot("a", 1250, CurrencyCode::USD)),
            (id("b"), snapshot("b", 399, CurrencyCode::USD)),
        ]
        .into_iter()
        .collect();

        let view = CartView::build(&entries, &snapshots);
        assert_eq!(view.item_count, 7);
        assert_eq!(view.unavailable_count(), 1);
        assert_eq!(view.subtotal.unwrap().to_string(), "$28.99");

        let line = view.lines.iter().find(|l| l.product_id == id("a")).unwrap();
        assert_eq!(line.line_total.unwrap().to_string(), "$25.00");
        let gone = view.lines.iter().find(|l| l.product_id == id("gone")).unwrap();
        assert!(!gone.is_available());
        assert_eq!(gone.quantity, 4);
    }

    #[test]
    fn test_cart_view_empty_and_mixed_currency() {
        let empty = CartView::build(&BTreeMap::new(), &HashMap::new());
        assert_eq!(empty.subtotal, Some(Price::zero(CurrencyCode::USD)));
        assert_eq!(empty.item_count, 0);

        let entries: BTreeMap<_, _> = [(id("a"), 1), (id("b"), 1)].into_iter().collect();
        let snapshots: HashMap<_, _> = [
            (id("a"), snapshot("a", 100, CurrencyCode::USD)),
            (id("b"), snapshot("b", 100, CurrencyCode::EUR)),
        ]
        .into_iter()
        .collect();
        assert_eq!(CartView::build(&entries, &snapshots).subtotal, None);
    }

    #[test]
    fn test_cart_view_overflowing_price_is_not_fatal() {
        let entries: BTreeMap<_, _> = [(id("big"), 2), (id("b"), 1)].into_iter().collect();
        let mut huge = snapshot("big", 0, CurrencyCode::USD);
        huge.price = Price::new(Decimal::MAX, CurrencyCode::USD);
        let snapshots: HashMap<_, _> = [
            (id("big"), huge),
            (id("b"), snapshot("b", 399, CurrencyCode::USD)),
        ]
        .into_iter()
        .collect();

        let view = CartView::build(&entries, &snapshots);
        let big = view.lines.iter().find(|l| l.product_id == id("big")).unwrap();
        assert!(big.is_available());
        assert_eq!(big.line_total, None);
        assert_eq!(view.subtotal, None);
        assert_eq!(view.item_count, 3);
    }

    #[test]
    fn test_cart_view_overflowing_subtotal_is_none() {
        let entries: BTreeMap<_, _> = [(id("a"), 1), (id("b"), 1)].into_iter().collect();
        let mut a = snapshot("a", 0, CurrencyCode::USD);
        a.price = Price::new(Decimal::MAX, CurrencyCode::USD);
        let snapshots: HashMap<_, _> = [
            (id("a"), a),
            (id("b"), snapshot("b", 100, CurrencyCode::USD)),
        ]
        .into_iter()
        .collect();

        let view = CartView::build(&entries, &snapshots);
        assert!(view.lines.iter().all(|l| l.line_total.is_some()));
        assert_eq!(view.subtotal, None);
    }

    #[tokio::test]
    async fn test_same_id_set_is_cached() {
        let (hydrator, catalog) = hydrator(RecordingCatalog::new(vec![
            snapshot("a", 100, CurrencyCode::USD),
            snapshot("b", 200, CurrencyCode::USD),
        ]));
        let entries: BTreeMap<_, _> = [(id("a"), 1), (id("b"), 3)].into_iter().collect();

        let first = hydrator.cart_view(&entries).await.unwrap();
        let second = hydrator.cart_view(&entries).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.request_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_id_set_refetches() {
        let (hydrator, catalog) = hydrator(RecordingCatalog::new(vec![
            snapshot("a", 100, CurrencyCode::USD),
            snapshot("b", 200, CurrencyCode::USD),
        ]));
        let mut ids: BTreeSet<_> = [id("a")].into_iter().collect();
        hydrator.snapshots(&ids).await.unwrap();
        ids.insert(id("b"));
        let snapshots = hydrator.snapshots(&ids).await.unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(catalog.request_count(), 2);
        assert_eq!(
            catalog.requests.lock().unwrap().last().unwrap(),
            &vec![id("a"), id("b")]
        );
    }

    #[tokio::test]
    async fn test_empty_set_skips_fetch() {
        let (hydrator, catalog) = hydrator(RecordingCatalog::new(Vec::new()));
        assert!(hydrator.snapshots(&BTreeSet::new()).await.unwrap().is_empty());
        assert_eq!(catalog.request_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let mut catalog = RecordingCatalog::new(Vec::new());
        catalog.fail = true;
        let (hydrator, catalog) = hydrator(catalog);
        let ids: BTreeSet<_> = [id("a")].into_iter().collect();

        assert!(hydrator.favorites_view(&ids).await.is_err());
        assert!(hydrator.favorites_view(&ids).await.is_err());
        assert_eq!(catalog.request_count(), 2);
    }

    #[tokio::test]
    async fn test_favorites_view_marks_unknown_products() {
        let (hydrator, _) = hydrator(RecordingCatalog::new(vec![snapshot(
            "a",
            100,
            CurrencyCode::USD,
        )]));
        let ids: BTreeSet<_> = [id("a"), id("z")].into_iter().collect();
        let view = hydrator.favorites_view(&ids).await.unwrap();
        assert_eq!(view.len(), 2);
        assert!(view.iter().any(|f| f.product_id == id("a") && f.product.is_some()));
        assert!(view.iter().any(|f| f.product_id == id("z") && f.product.is_none()));
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_refetch() {
        let (hydrator, catalog) = hydrator(RecordingCatalog::new(Vec::new()));
        let ids: BTreeSet<_> = [id("a")].into_iter().collect();
        hydrator.snapshots(&ids).await.unwrap();
        hydrator.invalidate_all().await;
        hydrator.snapshots(&ids).await.unwrap();
        assert_eq!(catalog.request_count(), 2);
    }
}
