//! Bearer tokens and their embedded claims.
//!
//! Tokens are JWTs issued by `POST /token`. The client never verifies the
//! signature (it has no key); it only reads the payload segment to obtain an
//! identity without a network round trip.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;

use shopfront_core::{Email, Role, UserId};

/// Errors raised when a token cannot be turned into claims.
///
/// Every variant means the same thing to the session: there is no usable
/// session and the token must be discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not three dot-separated segments.
    #[error("token is not a three-segment JWT")]
    Malformed,

    /// Payload segment is not valid base64url.
    #[error("token payload is not valid base64url")]
    Base64,

    /// Payload is not a JSON object.
    #[error("token payload is not a JSON object: {0}")]
    Json(String),

    /// A required claim is absent or null.
    #[error("token is missing required claim `{0}`")]
    MissingClaim(&'static str),

    /// A claim is present but has the wrong shape.
    #[error("token claim `{claim}` is invalid: {reason}")]
    InvalidClaim {
        /// Claim name.
        claim: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// An opaque bearer credential.
///
/// The raw value is held as a secret and never appears in `Debug` output or
/// logs.
#[derive(Clone)]
pub struct Token(SecretString);

impl Token {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    /// The raw token, for use as a bearer credential or for persistence.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Token {}

/// Validated claims carried by a token.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// Subject (`sub`, or `user_id` for tokens that use that name).
    pub subject: UserId,
    /// Access tier.
    pub role: Role,
    /// When the token was issued.
    pub issued_at: DateTime<Utc>,
    /// When the token stops being accepted by the API.
    pub expires_at: DateTime<Utc>,
    /// Email, if the issuer embeds it.
    pub email: Option<Email>,
    /// Display name, if the issuer embeds it.
    pub name: Option<String>,
    /// The complete payload, including claims not modelled above.
    pub raw: Map<String, Value>,
}

impl Claims {
    /// Decode the claims of a token.
    ///
    /// Pure: no I/O, no clock. The same token always yields the same result.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the token is structurally invalid or lacks a
    /// required claim (`sub`/`user_id`, `role`, `iat`, `exp`).
    pub fn decode(token: &Token) -> Result<Self, DecodeError> {
        let mut segments = token.expose().split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(DecodeError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| DecodeError::Base64)?;
        let raw: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))?;

        Self::from_payload(raw)
    }

    fn from_payload(raw: Map<String, Value>) -> Result<Self, DecodeError> {
        let subject_value = claim(&raw, "sub")
            .or_else(|| claim(&raw, "user_id"))
            .ok_or(DecodeError::MissingClaim("sub"))?;
        let subject: UserId =
            serde_json::from_value(subject_value.clone()).map_err(|e| DecodeError::InvalidClaim {
                claim: "sub",
                reason: e.to_string(),
            })?;

        let role = claim(&raw, "role")
            .ok_or(DecodeError::MissingClaim("role"))?
            .as_str()
            .ok_or_else(|| DecodeError::InvalidClaim {
                claim: "role",
                reason: "expected a string".to_owned(),
            })?
            .parse::<Role>()
            .map_err(|e| DecodeError::InvalidClaim {
                claim: "role",
                reason: e.to_string(),
            })?;

        let issued_at = timestamp_claim(&raw, "iat")?;
        let expires_at = timestamp_claim(&raw, "exp")?;

        let email = match claim(&raw, "email").and_then(Value::as_str) {
            Some(s) => Some(Email::parse(s).map_err(|e| DecodeError::InvalidClaim {
                claim: "email",
                reason: e.to_string(),
            })?),
            None => None,
        };
        let name = claim(&raw, "name")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Self {
            subject,
            role,
            issued_at,
            expires_at,
            email,
            name,
            raw,
        })
    }

    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A claim value, treating JSON `null` as absent.
fn claim<'a>(raw: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    raw.get(name).filter(|v| !v.is_null())
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp_claim(
    raw: &Map<String, Value>,
    name: &'static str,
) -> Result<DateTime<Utc>, DecodeError> {
    let value = claim(raw, name).ok_or(DecodeError::MissingClaim(name))?;
    let invalid = || DecodeError::InvalidClaim {
        claim: name,
        reason: format!("expected a unix timestamp, got {value}"),
    };
    let seconds = value
        .as_i64()
        // Some issuers emit fractional seconds.
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
        .ok_or_else(invalid)?;
    DateTime::from_timestamp(seconds, 0).ok_or_else(invalid)
}
