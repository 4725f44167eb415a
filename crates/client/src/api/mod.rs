//! REST API client.
//!
//! # Endpoints
//!
//! - `POST /token` - credentials → `{access, refresh}`
//! - `GET /user` - bearer token → profile
//! - `GET /products?ids=a,b,c` - product metadata for display
//!
//! The engine talks to these through three narrow traits ([`Authenticator`],
//! [`ProfileSource`], [`ProductCatalog`]) so that sessions and hydration can
//! be exercised without a network. [`ApiClient`] implements all three.

mod types;

pub use types::{Profile, ProductSnapshot, TokenPair};

use std::future::Future;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use shopfront_core::ProductId;

use crate::config::ClientConfig;
use crate::session::Token;
use types::{CredentialsBody, ErrorBody, ProductList, TokenPairBody};

/// Longest error body quoted back in `ApiError::Rejected`.
const MAX_ERROR_BODY: usize = 200;

/// Errors that can occur when calling the REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response: connection refused, timeout, TLS failure...
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the bearer token or credentials (401/403).
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason.
        message: String,
    },

    /// Any other non-2xx response.
    #[error("Request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason.
        message: String,
    },

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Whether the API refused the credential (as opposed to being unreachable).
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Exchanges credentials for tokens.
pub trait Authenticator: Send + Sync {
    /// Call `POST /token`.
    fn obtain_token(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<TokenPair, ApiError>> + Send;
}

/// Fetches the profile behind a bearer token.
pub trait ProfileSource: Send + Sync {
    /// Call `GET /user` with `token` as the bearer credential.
    fn fetch_profile(&self, token: &Token)
    -> impl Future<Output = Result<Profile, ApiError>> + Send;
}

/// Looks up display metadata for products.
pub trait ProductCatalog: Send + Sync {
    /// Fetch snapshots for `ids`. Unknown ids are simply absent from the result.
    fn fetch_products(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<ProductSnapshot>, ApiError>> + Send;
}

// =============================================================================
// ApiClient
// =============================================================================

/// HTTP client for the storefront REST API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("shopfront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, config.api_url.clone()))
    }

    /// Create a client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            inner: Arc::new(ApiClientInner { client, base_url }),
        }
    }

    /// The API root all endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }
}

impl Authenticator for ApiClient {
    #[instrument(skip(self, password))]
    async fn obtain_token(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let url = self.endpoint("token")?;
        let response = self
            .inner
            .client
            .post(url)
            .json(&CredentialsBody { email, password })
            .send()
            .await?;

        let body: TokenPairBody = read_json(response).await?;
        debug!("Token issued");
        Ok(body.into())
    }
}

impl ProfileSource for ApiClient {
    #[instrument(skip_all)]
    async fn fetch_profile(&self, token: &Token) -> Result<Profile, ApiError> {
        let url = self.endpoint("user")?;
        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(token.expose())
            .send()
            .await?;

        read_json(response).await
    }
}

impl ProductCatalog for ApiClient {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn fetch_products(&self, ids: &[ProductId]) -> Result<Vec<ProductSnapshot>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids
            .iter()
            .map(ProductId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut url = self.endpoint("products")?;
        url.query_pairs_mut().append_pair("ids", &joined);

        let response = self.inner.client.get(url).send().await?;
        let list: ProductList = read_json(response).await?;

        Ok(list
            .into_records()
            .into_iter()
            .map(ProductSnapshot::from)
            .collect())
    }
}

/// Map a response to `T` or to the matching `ApiError`.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ApiError::RateLimited(retry_after));
    }

    // Get response body as text first for better error diagnostics
    let body = response.text().await?;

    if !status.is_success() {
        let message = error_message(&body, status);
        return Err(
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                ApiError::Unauthorized {
                    status: status.as_u16(),
                    message,
                }
            } else {
                ApiError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            },
        );
    }

    Ok(serde_json::from_str(&body)?)
}

/// Extract `{error}` from an error body, falling back to the raw text.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_owned();
    }

    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
