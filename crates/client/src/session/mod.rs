//! Client-side session engine.
//!
//! # Components
//!
//! - [`TokenStore`] - persisted bearer token
//! - [`IdentityResolver`] - optimistic decode, then profile confirmation
//! - [`SessionContext`] - the session state machine built on both
//! - [`guard`] - pure route gating over a [`SessionSnapshot`]
//!
//! # State machine
//!
//! ```text
//!              login(token)            decode ok
//! Anonymous ───────────────► Pending ───────────► Authenticated
//!     ▲                         │                      │
//!     │        decode error     │                      │ logout()
//!     ├─────────────────────────┘                      │ or SessionExpired
//!     └────────────────────────────────────────────────┘
//! ```
//!
//! Entering `Authenticated` persists the token; entering `Anonymous` clears
//! it. Confirmation never changes the state, only the identity's display
//! fields.

mod error;
pub mod guard;
mod identity;
mod token;
mod token_store;

pub use error::{IdentityError, LoginError};
pub use guard::{GuardDecision, RoutePolicy};
pub use identity::{Identity, IdentityResolver};
pub use token::{Claims, DecodeError, Token};
pub use token_store::TokenStore;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shopfront_core::Role;

use crate::api::{Authenticator, ProfileSource};
use crate::telemetry;

/// Coarse session state used for gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No token.
    Anonymous,
    /// Token present, identity being resolved.
    Pending,
    /// Token present and decoded. Confirmation may or may not have finished.
    Authenticated,
}

impl SessionState {
    /// Every state, for exhaustive checks.
    pub const ALL: [Self; 3] = [Self::Anonymous, Self::Pending, Self::Authenticated];
}

/// A point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Coarse state.
    pub state: SessionState,
    /// Resolved identity, once available.
    pub identity: Option<Identity>,
}

impl SessionSnapshot {
    /// The snapshot of a session with no token.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            identity: None,
        }
    }

    /// Whether a token is present and decoded.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated)
    }

    /// The routing role, if an identity is resolved.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|identity| identity.role)
    }
}

/// Result of a [`SessionContext::confirm`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// The profile was merged into the identity.
    Confirmed(Identity),
    /// The profile fetch failed; the optimistic identity is kept.
    Unconfirmed(Identity),
    /// The API rejected the token and the session was ended.
    Expired,
    /// The session changed while the fetch was in flight; result discarded.
    Stale,
    /// There was no session to confirm.
    NoSession,
}

/// The session as seen by the rest of the application.
///
/// Constructed once and shared by cloning; all clones see the same session.
pub struct SessionContext<P> {
    inner: Arc<SessionInner<P>>,
}

impl<P> Clone for SessionContext<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<P> {
    tokens: TokenStore,
    resolver: IdentityResolver<P>,
    current: Mutex<Current>,
}

struct Current {
    state: SessionState,
    identity: Option<Identity>,
    token: Option<Token>,
    /// Bumped on every login and logout. A confirmation only applies if the
    /// epoch it started under is still current.
    epoch: u64,
}

impl Current {
    /// Drop to `Anonymous`, clearing the persisted token first.
    fn reset(&mut self, tokens: &TokenStore) {
        if let Err(e) = tokens.clear() {
            warn!(error = %e, "Failed to clear persisted token");
        }
        self.epoch += 1;
        self.state = SessionState::Anonymous;
        self.identity = None;
        self.token = None;
        telemetry::clear_user();
    }
}

impl<P: ProfileSource + 'static> SessionContext<P> {
    /// Create an anonymous session. Call [`restore`](Self::restore) to pick up
    /// a persisted token.
    #[must_use]
    pub fn new(tokens: TokenStore, resolver: IdentityResolver<P>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                tokens,
                resolver,
                current: Mutex::new(Current {
                    state: SessionState::Anonymous,
                    identity: None,
                    token: None,
                    epoch: 0,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Current> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state and identity.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let current = self.lock();
        SessionSnapshot {
            state: current.state,
            identity: current.identity.clone(),
        }
    }

    /// The bearer token of the current session.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.lock().token.clone()
    }

    /// Start a session from `token`.
    ///
    /// The identity is decoded synchronously, so on return the session is
    /// either `Authenticated` (token persisted) or `Anonymous` (token cleared).
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the token is unusable; the session is then
    /// anonymous.
    pub fn login(&self, token: Token) -> Result<Identity, DecodeError> {
        let mut current = self.lock();
        self.establish(&mut current, token)
    }

    fn establish(&self, current: &mut Current, token: Token) -> Result<Identity, DecodeError> {
        current.epoch += 1;
        current.state = SessionState::Pending;
        current.identity = None;
        current.token = None;

        match self.inner.resolver.resolve_optimistic(&token) {
            Ok(identity) => {
                if let Err(e) = self.inner.tokens.set(&token) {
                    warn!(error = %e, "Failed to persist token; session lasts until exit");
                }
                current.state = SessionState::Authenticated;
                current.identity = Some(identity.clone());
                current.token = Some(token);
                telemetry::set_user(&identity);
                info!(user_id = %identity.id, role = %identity.role, "Session started");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "Discarding undecodable token");
                current.reset(&self.inner.tokens);
                Err(e)
            }
        }
    }

    /// Exchange credentials for a token and start a session with it.
    ///
    /// # Errors
    ///
    /// Returns `LoginError::Api` if the exchange fails (the session is left
    /// untouched) or `LoginError::Decode` if the issued token is unusable.
    pub async fn login_with_credentials<A: Authenticator>(
        &self,
        authenticator: &A,
        email: &str,
        password: &str,
    ) -> Result<Identity, LoginError> {
        let pair = authenticator.obtain_token(email, password).await?;
        Ok(self.login(pair.access)?)
    }

    /// End the session. Idempotent.
    pub fn logout(&self) {
        let mut current = self.lock();
        let was_signed_in = current.state != SessionState::Anonymous;
        current.reset(&self.inner.tokens);
        if was_signed_in {
            info!("Session ended");
        } else {
            debug!("Logout with no active session");
        }
    }

    /// Resume the session from the persisted token, if any.
    ///
    /// A persisted token that fails to decode or has already expired is
    /// cleared and the session stays anonymous. If the persisted token is the
    /// one already active, the session is left untouched.
    pub fn restore(&self) -> SessionSnapshot {
        self.restore_at(Utc::now())
    }

    /// [`restore`](Self::restore) with an explicit clock.
    pub fn restore_at(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let mut current = self.lock();

        match self.inner.tokens.get() {
            None => {
                if current.state != SessionState::Anonymous {
                    current.reset(&self.inner.tokens);
                }
            }
            Some(token) => {
                let expired = Claims::decode(&token)
                    .map(|claims| claims.is_expired_at(now))
                    .unwrap_or(false);
                if expired {
                    info!("Persisted token has expired");
                    current.reset(&self.inner.tokens);
                } else if current.state == SessionState::Authenticated
                    && current.token.as_ref() == Some(&token)
                {
                    debug!("Persisted token is already active");
                } else {
                    // Decode failures are logged and cleared inside `establish`.
                    let _ = self.establish(&mut current, token);
                }
            }
        }

        SessionSnapshot {
            state: current.state,
            identity: current.identity.clone(),
        }
    }

    /// Confirm the current identity against the profile endpoint.
    ///
    /// The session is captured when this is called, not when the future is
    /// first polled. If a login or logout happens before the fetch completes,
    /// the result is discarded ([`ConfirmOutcome::Stale`]).
    pub fn confirm(&self) -> impl Future<Output = ConfirmOutcome> + Send + 'static {
        let pending = {
            let current = self.lock();
            match (&current.token, &current.identity) {
                (Some(token), Some(identity)) if current.state == SessionState::Authenticated => {
                    Some((current.epoch, token.clone(), identity.clone()))
                }
                _ => None,
            }
        };
        let inner = Arc::clone(&self.inner);

        async move {
            let Some((epoch, token, optimistic)) = pending else {
                return ConfirmOutcome::NoSession;
            };

            let result = inner.resolver.confirm(&token, optimistic).await;

            let mut current = inner
                .current
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if current.epoch != epoch {
                debug!("Discarding confirmation for a superseded session");
                return ConfirmOutcome::Stale;
            }

            match result {
                Ok(identity) => {
                    debug!(user_id = %identity.id, "Identity confirmed");
                    current.identity = Some(identity.clone());
                    ConfirmOutcome::Confirmed(identity)
                }
                Err(IdentityError::SessionExpired { status, message }) => {
                    warn!(status, %message, "Profile rejected the token, ending session");
                    current.reset(&inner.tokens);
                    ConfirmOutcome::Expired
                }
                Err(IdentityError::Network(e)) => {
                    warn!(error = %e, "Profile fetch failed, keeping optimistic identity");
                    current.identity.clone().map_or(
                        ConfirmOutcome::NoSession,
                        ConfirmOutcome::Unconfirmed,
                    )
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::{ApiError, Profile, TokenPair};
    use crate::storage::{MemoryStorage, Storage, keys};
    use super::token::tests::{make_token, token_for};

    /// Profile source whose answer is chosen per test.
    #[derive(Default)]
    struct StubProfiles {
        status: Option<u16>,
        name: Option<&'static str>,
        role: Option<&'static str>,
    }

    impl ProfileSource for StubProfiles {
        async fn fetch_profile(&self, _token: &Token) -> Result<Profile, ApiError> {
            match self.status {
                Some(status @ (401 | 403)) => Err(ApiError::Unauthorized {
                    status,
                    message: "token expired".to_string(),
                }),
                Some(status) => Err(ApiError::Rejected {
                    status,
                    message: "unavailable".to_string(),
                }),
                None => Ok(serde_json::from_value(serde_json::json!({
                    "name": self.name,
                    "role": self.role,
                }))
                .unwrap()),
            }
        }
    }

    fn session_with(
        profiles: StubProfiles,
    ) -> (SessionContext<StubProfiles>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let tokens = TokenStore::new(storage.clone());
        let resolver = IdentityResolver::new(Arc::new(profiles));
        (SessionContext::new(tokens, resolver), storage)
    }

    fn session() -> (SessionContext<StubProfiles>, Arc<MemoryStorage>) {
        session_with(StubProfiles::default())
    }

    #[test]
    fn test_starts_anonymous() {
        let (session, _) = session();
        assert_eq!(session.snapshot(), SessionSnapshot::anonymous());
        assert!(session.token().is_none());
    }

    #[test]
    fn test_login_authenticates_and_persists() {
        let (session, storage) = session();
        let token = token_for("1", "admin");
        let identity = session.login(token.clone()).unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Authenticated);
        assert_eq!(snapshot.identity, Some(identity));
        assert_eq!(snapshot.role(), Some(Role::Admin));
        assert_eq!(
            storage.read(keys::TOKEN).unwrap().as_deref(),
            Some(token.expose())
        );
    }

    #[test]
    fn test_login_with_malformed_token_is_anonymous_and_cleared() {
        let (session, storage) = session();
        session.login(token_for("1", "client")).unwrap();

        let err = session.login(Token::new("not-a-jwt")).unwrap_err();
        assert_eq!(err, DecodeError::Malformed);
        assert_eq!(session.snapshot(), SessionSnapshot::anonymous());
        assert!(storage.read(keys::TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_login_missing_claims_is_anonymous() {
        let (session, _) = session();
        let token = make_token(&serde_json::json!({"sub": "1", "iat": 1, "exp": 2}));
        assert!(session.login(token).is_err());
        assert_eq!(session.snapshot().state, SessionState::Anonymous);
    }

    #[test]
    fn test_login_survives_persistence_failure() {
        let (session, storage) = session();
        storage.fail_writes(true);
        session.login(token_for("1", "client")).unwrap();
        assert!(session.snapshot().is_authenticated());
        assert!(storage.read(keys::TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let (session, storage) = session();
        session.login(token_for("1", "client")).unwrap();

        session.logout();
        let once = session.snapshot();
        session.logout();
        let twice = session.snapshot();

        assert_eq!(once, SessionSnapshot::anonymous());
        assert_eq!(once, twice);
        assert!(storage.read(keys::TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_restore_picks_up_persisted_token() {
        let (session, storage) = session();
        storage
            .write(keys::TOKEN, token_for("5", "client").expose())
            .unwrap();

        let snapshot = session.restore();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.identity.unwrap().id.as_str(), "5");
    }

    #[test]
    fn test_restore_clears_expired_token() {
        let (session, storage) = session();
        let token = make_token(&serde_json::json!({
            "sub": "5", "role": "client", "iat": 1_000, "exp": 2_000,
        }));
        storage.write(keys::TOKEN, token.expose()).unwrap();

        let snapshot = session.restore_at(DateTime::from_timestamp(3_000, 0).unwrap());
        assert_eq!(snapshot, SessionSnapshot::anonymous());
        assert!(storage.read(keys::TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_restore_clears_corrupt_token() {
        let (session, storage) = session();
        storage.write(keys::TOKEN, "garbage").unwrap();
        assert_eq!(session.restore(), SessionSnapshot::anonymous());
        assert!(storage.read(keys::TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_restore_without_token_drops_stale_session() {
        let (session, storage) = session();
        session.login(token_for("1", "client")).unwrap();
        // Another instance logged out.
        storage.remove(keys::TOKEN).unwrap();
        assert_eq!(session.restore(), SessionSnapshot::anonymous());
    }

    #[tokio::test]
    async fn test_confirm_merges_profile_without_changing_state() {
        let (session, _) = session_with(StubProfiles {
            name: Some("Ada"),
            ..StubProfiles::default()
        });
        session.login(token_for("1", "client")).unwrap();

        let outcome = session.confirm().await;
        let ConfirmOutcome::Confirmed(identity) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert!(identity.confirmed);
        assert_eq!(identity.display_name.as_deref(), Some("Ada"));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Authenticated);
        assert_eq!(snapshot.identity, Some(identity));
    }

    #[tokio::test]
    async fn test_restore_keeps_active_session_and_confirmation() {
        let (session, _) = session_with(StubProfiles {
            name: Some("Ada"),
            ..StubProfiles::default()
        });
        session.login(token_for("1", "client")).unwrap();
        assert!(matches!(session.confirm().await, ConfirmOutcome::Confirmed(_)));

        let snapshot = session.restore();
        assert!(snapshot.identity.as_ref().unwrap().confirmed);
        assert_eq!(snapshot, session.snapshot());

        // A confirmation in flight across a no-op restore is not stale.
        let in_flight = session.confirm();
        session.restore();
        assert!(matches!(in_flight.await, ConfirmOutcome::Confirmed(_)));
    }

    #[test]
    fn test_restore_switches_to_other_persisted_token() {
        let (session, storage) = session();
        session.login(token_for("1", "client")).unwrap();
        // Another instance logged in as someone else.
        storage
            .write(keys::TOKEN, token_for("2", "admin").expose())
            .unwrap();

        let snapshot = session.restore();
        assert_eq!(snapshot.identity.as_ref().unwrap().id.as_str(), "2");
        assert_eq!(snapshot.role(), Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_confirm_role_mismatch_keeps_token_role() {
        let (session, _) = session_with(StubProfiles {
            role: Some("admin"),
            ..StubProfiles::default()
        });
        session.login(token_for("1", "client")).unwrap();
        session.confirm().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.role(), Some(Role::Client));
        assert_eq!(snapshot.identity.unwrap().role_mismatch, Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_confirm_expired_logs_out() {
        let (session, storage) = session_with(StubProfiles {
            status: Some(401),
            ..StubProfiles::default()
        });
        session.login(token_for("1", "admin")).unwrap();

        assert_eq!(session.confirm().await, ConfirmOutcome::Expired);
        assert_eq!(session.snapshot(), SessionSnapshot::anonymous());
        assert!(storage.read(keys::TOKEN).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirm_network_failure_keeps_optimistic_identity() {
        let (session, _) = session_with(StubProfiles {
            status: Some(503),
            ..StubProfiles::default()
        });
        let optimistic = session.login(token_for("1", "admin")).unwrap();

        assert_eq!(
            session.confirm().await,
            ConfirmOutcome::Unconfirmed(optimistic.clone())
        );
        assert_eq!(session.snapshot().identity, Some(optimistic));
    }

    #[tokio::test]
    async fn test_confirm_without_session() {
        let (session, _) = session();
        assert_eq!(session.confirm().await, ConfirmOutcome::NoSession);
    }

    #[tokio::test]
    async fn test_stale_confirmation_is_discarded() {
        let (session, _) = session_with(StubProfiles {
            name: Some("Old User"),
            ..StubProfiles::default()
        });
        session.login(token_for("old", "admin")).unwrap();

        let in_flight = session.confirm();
        session.logout();
        let fresh = session.login(token_for("new", "client")).unwrap();

        assert_eq!(in_flight.await, ConfirmOutcome::Stale);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.identity, Some(fresh));
        assert_eq!(snapshot.role(), Some(Role::Client));
    }

    #[tokio::test]
    async fn test_stale_expiry_does_not_end_new_session() {
        let (session, _) = session_with(StubProfiles {
            status: Some(401),
            ..StubProfiles::default()
        });
        session.login(token_for("old", "admin")).unwrap();
        let in_flight = session.confirm();
        session.login(token_for("new", "admin")).unwrap();

        assert_eq!(in_flight.await, ConfirmOutcome::Stale);
        assert!(session.snapshot().is_authenticated());
    }

    struct FixedAuthenticator(Result<String, u16>);

    impl Authenticator for FixedAuthenticator {
        async fn obtain_token(&self, _email: &str, _password: &str) -> Result<TokenPair, ApiError> {
            match &self.0 {
                Ok(access) => Ok(TokenPair {
                    access: Token::new(access.clone()),
                    refresh: None,
                }),
                Err(status) => Err(ApiError::Unauthorized {
                    status: *status,
                    message: "Invalid credentials".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_login_with_credentials() {
        let (session, _) = session();
        let auth = FixedAuthenticator(Ok(token_for("9", "client").expose().to_owned()));
        let identity = session
            .login_with_credentials(&auth, "a@example.com", "pw")
            .await
            .unwrap();
        assert_eq!(identity.id.as_str(), "9");
        assert!(session.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_credentials_leave_session_untouched() {
        let (session, _) = session();
        session.login(token_for("1", "admin")).unwrap();
        let auth = FixedAuthenticator(Err(401));
        let err = session
            .login_with_credentials(&auth, "a@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::Api(ApiError::Unauthorized { .. })));
        assert_eq!(session.snapshot().role(), Some(Role::Admin));
    }
}
