//! Request and response shapes of the REST collaborator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopfront_core::{CurrencyCode, Email, Price, ProductId, UserId};

use crate::session::Token;

/// Body of `POST /token`.
#[derive(Debug, Serialize)]
pub(crate) struct CredentialsBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Successful `POST /token` response as sent on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenPairBody {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(alias = "detail")]
    pub error: String,
}

/// Tokens issued by a successful credential exchange.
///
/// Only `access` is ever persisted. The refresh token is handed back to the
/// caller and otherwise dropped.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Bearer token for API calls.
    pub access: Token,
    /// Long-lived refresh token, if the issuer sends one.
    pub refresh: Option<Token>,
}

impl From<TokenPairBody> for TokenPair {
    fn from(body: TokenPairBody) -> Self {
        Self {
            access: Token::new(body.access),
            refresh: body.refresh.map(Token::new),
        }
    }
}

/// Profile returned by `GET /user`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    /// User id as known to the API.
    #[serde(default)]
    pub id: Option<UserId>,
    /// Account email.
    #[serde(default)]
    pub email: Option<Email>,
    /// Full display name, when the API sends one.
    #[serde(default)]
    pub name: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Role label as stored server-side.
    #[serde(default)]
    pub role: Option<String>,
}

impl Profile {
    /// Best display name available: `name`, else "first last".
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return Some(name.to_owned());
        }

        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

/// Product as returned by `GET /products`.
#[derive(Debug, Deserialize)]
pub(crate) struct ProductRecord {
    pub id: ProductId,
    #[serde(alias = "title")]
    pub name: String,
    pub price: Decimal,
    #[serde(default, alias = "currency")]
    pub currency_code: CurrencyCode,
    #[serde(default, alias = "image_url")]
    pub image: Option<String>,
}

/// `GET /products` answers with a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProductList {
    Plain(Vec<ProductRecord>),
    Paged { results: Vec<ProductRecord> },
}

impl ProductList {
    pub fn into_records(self) -> Vec<ProductRecord> {
        match self {
            Self::Plain(records) | Self::Paged { results: records } => records,
        }
    }
}

/// Display data for a cart or favorites entry.
///
/// Never persisted and never authoritative: the stores own the ids and
/// quantities, snapshots only decorate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    /// Product id.
    pub id: ProductId,
    /// Product name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Image URL, if any.
    pub image: Option<String>,
}

impl From<ProductRecord> for ProductSnapshot {
    fn from(record: ProductRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            price: Price::new(record.price, record.currency_code),
            image: record.image.filter(|url| !url.is_empty()),
        }
    }
}
