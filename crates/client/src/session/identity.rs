//! Two-phase identity resolution.
//!
//! An identity is first derived from the token alone (*optimistic*), then
//! enriched by one `GET /user` round trip (*confirmed*). Routing only ever
//! looks at the optimistic role, so it never waits on the network.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use shopfront_core::{Email, Role, UserId};

use crate::api::{ApiError, Profile, ProfileSource};

use super::error::IdentityError;
use super::token::{Claims, DecodeError, Token};

/// The user-facing view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// User id (token subject).
    pub id: UserId,
    /// Email, from the token or the profile.
    pub email: Option<Email>,
    /// Role from the token. Never replaced by the profile.
    pub role: Role,
    /// Name to show in the UI.
    pub display_name: Option<String>,
    /// Every claim in the token payload.
    pub raw_claims: Map<String, Value>,
    /// Whether a profile fetch has enriched this identity.
    pub confirmed: bool,
    /// The profile's role, when it disagrees with the token.
    pub role_mismatch: Option<Role>,
}

impl Identity {
    /// Build the optimistic identity for decoded claims.
    #[must_use]
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            id: claims.subject,
            email: claims.email,
            role: claims.role,
            display_name: claims.name,
            raw_claims: claims.raw,
            confirmed: false,
            role_mismatch: None,
        }
    }

    /// Best label for the identity: display name, then email, then id.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or_else(|| self.email.as_ref().map(Email::as_str))
            .unwrap_or_else(|| self.id.as_str())
    }

    /// Merge a fetched profile into this identity.
    ///
    /// Display fields from the profile win. The role does not: a profile role
    /// that differs from the token role is recorded in `role_mismatch` and
    /// reported, and `role` keeps the token's value.
    #[must_use]
    pub fn merge_profile(mut self, profile: &Profile) -> Self {
        if let Some(name) = profile.display_name() {
            self.display_name = Some(name);
        }
        if let Some(email) = &profile.email {
            self.email = Some(email.clone());
        }

        if let Some(profile_id) = profile.id.as_ref().filter(|id| **id != self.id) {
            warn!(
                token_subject = %self.id,
                profile_id = %profile_id,
                "Profile id differs from token subject"
            );
        }

        self.role_mismatch = match profile.role.as_deref().map(str::parse::<Role>) {
            Some(Ok(profile_role)) if profile_role != self.role => {
                report_role_mismatch(&self.id, self.role, profile_role);
                Some(profile_role)
            }
            Some(Err(e)) => {
                warn!(user_id = %self.id, error = %e, "Profile carries an unknown role");
                None
            }
            _ => None,
        };

        self.confirmed = true;
        self
    }
}

fn report_role_mismatch(user_id: &UserId, token_role: Role, profile_role: Role) {
    warn!(
        user_id = %user_id,
        %token_role,
        %profile_role,
        "Token role differs from profile role; routing keeps the token role"
    );
    sentry::capture_message(
        &format!(
            "Role mismatch for user {user_id}: token says {token_role}, profile says {profile_role}"
        ),
        sentry::Level::Warning,
    );
}

/// Resolves identities from tokens.
pub struct IdentityResolver<P> {
    profiles: Arc<P>,
}

impl<P> Clone for IdentityResolver<P> {
    fn clone(&self) -> Self {
        Self {
            profiles: Arc::clone(&self.profiles),
        }
    }
}

impl<P: ProfileSource> IdentityResolver<P> {
    /// Create a resolver backed by `profiles`.
    #[must_use]
    pub fn new(profiles: Arc<P>) -> Self {
        Self { profiles }
    }

    /// Decode the optimistic identity of `token`.
    ///
    /// Pure and synchronous; performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the token is structurally invalid. Callers
    /// treat this as "no session".
    #[allow(clippy::unused_self)]
    pub fn resolve_optimistic(&self, token: &Token) -> Result<Identity, DecodeError> {
        Claims::decode(token).map(Identity::from_claims)
    }

    /// Confirm `optimistic` with one profile fetch.
    ///
    /// # Errors
    ///
    /// - `IdentityError::SessionExpired` if the API answers 401/403
    /// - `IdentityError::Network` for any other failure; the optimistic
    ///   identity remains valid
    pub async fn confirm(
        &self,
        token: &Token,
        optimistic: Identity,
    ) -> Result<Identity, IdentityError> {
        match self.profiles.fetch_profile(token).await {
            Ok(profile) => Ok(optimistic.merge_profile(&profile)),
            Err(ApiError::Unauthorized { status, message }) => {
                Err(IdentityError::SessionExpired { status, message })
            }
            Err(e) => Err(IdentityError::Network(e)),
        }
    }
}
