//! Integration tests for Shopfront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopfront-integration-tests
//! ```
//!
//! Tests run the real [`shopfront_client`] engine against a [`FileStorage`]
//! in a temporary directory and an in-process mock of the REST API
//! ([`MockApi`]), so no external services are needed.
//!
//! [`FileStorage`]: shopfront_client::storage::FileStorage

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

/// Far-future expiry (2100-01-01) for issued tokens.
pub const FAR_FUTURE: i64 = 4_102_444_800;

/// Build an unsigned JWT carrying `claims`.
#[must_use]
pub fn make_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// An account the mock API accepts.
#[derive(Debug, Clone)]
pub struct MockUser {
    pub id: String,
    pub email: String,
    pub password: String,
    /// Role written into issued tokens.
    pub token_role: String,
    /// Role reported by `GET /user`.
    pub profile_role: String,
    pub name: String,
}

impl MockUser {
    /// A user whose token and profile agree on `role`.
    #[must_use]
    pub fn new(id: &str, email: &str, role: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
            token_role: role.to_string(),
            profile_role: role.to_string(),
            name: format!("User {id}"),
        }
    }

    /// The access token the mock issues for this user.
    #[must_use]
    pub fn token(&self) -> String {
        make_jwt(&json!({
            "user_id": self.id,
            "role": self.token_role,
            "email": self.email,
            "iat": 1_700_000_000,
            "exp": FAR_FUTURE,
        }))
    }
}

struct MockState {
    users: Vec<MockUser>,
    products: Vec<Value>,
    /// When non-zero, `GET /user` answers with this status.
    profile_status: AtomicU16,
    revoked: Mutex<HashSet<String>>,
    product_requests: AtomicUsize,
    profile_requests: AtomicUsize,
}

/// In-process stand-in for the storefront REST API.
///
/// Serves `POST /token`, `GET /user`, and `GET /products` on a random local
/// port until dropped.
pub struct MockApi {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockApi {
    /// Start a server knowing `users` and `products`.
    ///
    /// Products are JSON records as the API sends them
    /// (`{id, name, price, currency_code, image}`).
    pub async fn start(users: Vec<MockUser>, products: Vec<Value>) -> Self {
        let state = Arc::new(MockState {
            users,
            products,
            profile_status: AtomicU16::new(0),
            revoked: Mutex::new(HashSet::new()),
            product_requests: AtomicUsize::new(0),
            profile_requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/token", post(issue_token))
            .route("/api/user", get(profile))
            .route("/api/products", get(list_products))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// API root to configure the client with.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api/", self.addr)).unwrap()
    }

    /// Make `GET /user` fail with `status` (0 restores normal answers).
    pub fn set_profile_status(&self, status: u16) {
        self.state.profile_status.store(status, Ordering::SeqCst);
    }

    /// Reject `token` on `GET /user` from now on.
    pub fn revoke(&self, token: &str) {
        self.state
            .revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string());
    }

    /// Number of `GET /products` calls served.
    #[must_use]
    pub fn product_requests(&self) -> usize {
        self.state.product_requests.load(Ordering::SeqCst)
    }

    /// Number of `GET /user` calls served.
    #[must_use]
    pub fn profile_requests(&self) -> usize {
        self.state.profile_requests.load(Ordering::SeqCst)
    }
}

fn error(status: StatusCode, key: &str, message: &str) -> Response {
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), Value::from(message));
    (status, Json(Value::Object(body))).into_response()
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

async fn issue_token(
    State(state): State<Arc<MockState>>,
    Json(credentials): Json<Credentials>,
) -> Response {
    state
        .users
        .iter()
        .find(|u| u.email == credentials.email && u.password == credentials.password)
        .map_or_else(
            || error(StatusCode::UNAUTHORIZED, "error", "Invalid credentials"),
            |user| {
                Json(json!({
                    "access": user.token(),
                    "refresh": "refresh-token",
                }))
                .into_response()
            },
        )
}

async fn profile(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.profile_requests.fetch_add(1, Ordering::SeqCst);

    let status = state.profile_status.load(Ordering::SeqCst);
    if status != 0 {
        let status = StatusCode::from_u16(status).unwrap();
        return error(status, "detail", "Profile unavailable");
    }

    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return error(StatusCode::UNAUTHORIZED, "detail", "Missing credentials");
    };

    let revoked = state
        .revoked
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(token);
    if revoked {
        return error(StatusCode::UNAUTHORIZED, "detail", "Token is invalid or expired");
    }

    state
        .users
        .iter()
        .find(|u| u.token() == token)
        .map_or_else(
            || error(StatusCode::UNAUTHORIZED, "detail", "Token is invalid or expired"),
            |user| {
                Json(json!({
                    "id": user.id.parse::<i64>().map_or_else(|_| json!(user.id), |n| json!(n)),
                    "email": user.email,
                    "name": user.name,
                    "role": user.profile_role,
                }))
                .into_response()
            },
        )
}

#[derive(Deserialize)]
struct ProductQuery {
    #[serde(default)]
    ids: String,
}

async fn list_products(
    State(state): State<Arc<MockState>>,
    Query(query): Query<ProductQuery>,
) -> Json<Value> {
    state.product_requests.fetch_add(1, Ordering::SeqCst);

    let wanted: HashSet<&str> = query.ids.split(',').filter(|s| !s.is_empty()).collect();
    let results: Vec<Value> = state
        .products
        .iter()
        .filter(|p| {
            p.get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| wanted.contains(id))
        })
        .cloned()
        .collect();

    Json(json!({ "count": results.len(), "results": results }))
}
