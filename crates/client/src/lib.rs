//! Shopfront client engine.
//!
//! Client-side session, route-guard, cart, and favorites state for the
//! Shopfront storefront, consuming its REST API.
//!
//! - [`session`] - bearer token, identity, session state machine, route guard
//! - [`shop`] - locally persisted cart and favorites, product hydration
//! - [`storage`] - durable key/value backends the stores persist to
//! - [`api`] - REST client for `/token`, `/user`, `/products`
//! - [`state`] - [`AppState`](state::AppState) wiring it all together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod shop;
pub mod state;
pub mod storage;
pub mod telemetry;

pub use error::{ClientError, Result};
