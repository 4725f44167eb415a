//! Subcommand implementations.

pub mod cart;
pub mod favorites;
pub mod session;

use shopfront_core::ProductId;

use shopfront_client::ClientError;

/// Parse a product id argument.
fn product_id(raw: &str) -> Result<ProductId, ClientError> {
    Ok(ProductId::parse(raw)?)
}
