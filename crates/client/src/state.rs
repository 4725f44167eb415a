//! Application state wiring every store to one storage backend.

use std::sync::Arc;

use shopfront_core::ProductId;
use tracing::info;

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::{
    ConfirmOutcome, GuardDecision, Identity, IdentityResolver, LoginError, RoutePolicy,
    SessionContext, SessionSnapshot, TokenStore,
};
use crate::shop::{CartView, FavoriteView, FavoritesStore, Hydrator, LocalCartStore, StoreError};
use crate::storage::{FileStorage, Storage};

/// Everything a front end needs, constructed once at startup.
///
/// The session is shared (clone it freely via [`session`](Self::session)).
/// The cart and favorites are owned here, so mutations go through `&mut self`
/// and are serialized by the borrow checker.
pub struct AppState {
    config: ClientConfig,
    api: ApiClient,
    session: SessionContext<ApiClient>,
    hydrator: Hydrator<ApiClient>,
    policy: RoutePolicy,
    cart: LocalCartStore,
    favorites: FavoritesStore,
}

impl AppState {
    /// Build the state on a [`FileStorage`] under `config.data_dir`, and
    /// restore any persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or HTTP client cannot be set up.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let storage = Arc::new(FileStorage::open(&config.data_dir)?);
        Self::with_storage(config, storage)
    }

    /// Build the state on an arbitrary storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_storage(
        config: ClientConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config)?;
        Ok(Self::with_parts(config, api, storage))
    }

    /// Build the state from an already-constructed API client.
    #[must_use]
    pub fn with_parts(config: ClientConfig, api: ApiClient, storage: Arc<dyn Storage>) -> Self {
        let shared_api = Arc::new(api.clone());
        let session = SessionContext::new(
            TokenStore::new(Arc::clone(&storage)),
            IdentityResolver::new(Arc::clone(&shared_api)),
        );
        let restored = session.restore();
        info!(state = ?restored.state, "Session restored");

        Self {
            hydrator: Hydrator::new(shared_api, config.product_cache_ttl),
            cart: LocalCartStore::load(Arc::clone(&storage)),
            favorites: FavoritesStore::load(storage),
            policy: RoutePolicy::default(),
            config,
            api,
            session,
        }
    }

    /// Replace the default route policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RoutePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Get a reference to the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get a reference to the REST API client.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Get a reference to the session.
    #[must_use]
    pub const fn session(&self) -> &SessionContext<ApiClient> {
        &self.session
    }

    /// Get a reference to the route policy.
    #[must_use]
    pub const fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Get a reference to the cart.
    #[must_use]
    pub const fn cart(&self) -> &LocalCartStore {
        &self.cart
    }

    /// Get a mutable reference to the cart.
    pub const fn cart_mut(&mut self) -> &mut LocalCartStore {
        &mut self.cart
    }

    /// Get a reference to the favorites.
    #[must_use]
    pub const fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    /// Get a mutable reference to the favorites.
    pub const fn favorites_mut(&mut self) -> &mut FavoritesStore {
        &mut self.favorites
    }

    /// Exchange credentials and start a session, then confirm it.
    ///
    /// # Errors
    ///
    /// Returns `LoginError` if the credentials are refused or the issued
    /// token is unusable.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, LoginError> {
        let identity = self
            .session
            .login_with_credentials(&self.api, email, password)
            .await?;

        Ok(match self.session.confirm().await {
            ConfirmOutcome::Confirmed(confirmed) => confirmed,
            _ => identity,
        })
    }

    /// Current session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Gate a navigation to `path` under the configured policy.
    #[must_use]
    pub fn check_route(&self, path: &str) -> GuardDecision {
        self.policy.check(path, &self.session.snapshot())
    }

    /// Move a favorite into the cart.
    ///
    /// # Errors
    ///
    /// See [`FavoritesStore::move_to_cart`].
    pub fn move_to_cart(&mut self, id: &ProductId) -> Result<(), StoreError> {
        self.favorites.move_to_cart(id, &mut self.cart)
    }

    /// Hydrated cart.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` if product lookup fails.
    pub async fn cart_view(&self) -> Result<CartView, ClientError> {
        Ok(self.hydrator.cart_view(self.cart.get_all()).await?)
    }

    /// Hydrated favorites.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` if product lookup fails.
    pub async fn favorites_view(&self) -> Result<Vec<FavoriteView>, ClientError> {
        Ok(self.hydrator.favorites_view(self.favorites.get_all()).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::session::SessionState;
    use crate::storage::{MemoryStorage, keys};

    fn state(storage: Arc<MemoryStorage>) -> AppState {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9").unwrap(), "unused");
        AppState::with_storage(config, storage).unwrap()
    }

    #[test]
    fn test_stores_share_one_backend() {
        let storage = Arc::new(MemoryStorage::new());
        let mut app = state(storage.clone());
        let id = ProductId::parse("42").unwrap();

        app.favorites_mut().add(&id).unwrap();
        app.move_to_cart(&id).unwrap();

        assert_eq!(
            storage.read(keys::CART).unwrap().as_deref(),
            Some(r#"{"42":1}"#)
        );
        assert_eq!(storage.read(keys::FAVORITES).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_starts_anonymous_without_token() {
        let app = state(Arc::new(MemoryStorage::new()));
        assert_eq!(app.snapshot().state, SessionState::Anonymous);
        assert_eq!(app.check_route("/admin"), GuardDecision::RedirectLogin);
        assert_eq!(app.check_route("/"), GuardDecision::Render);
    }
}
