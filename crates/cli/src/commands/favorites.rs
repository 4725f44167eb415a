//! Favorites commands.

use shopfront_client::ClientError;
use shopfront_client::state::AppState;

use super::product_id;

/// Print favorites with product names.
#[allow(clippy::print_stdout)]
pub async fn list(app: &AppState) -> Result<(), ClientError> {
    if app.favorites().is_empty() {
        println!("No favorites");
        return Ok(());
    }

    let view = app.favorites_view().await?;

    for favorite in view {
        match favorite.product {
            Some(product) => println!("{} [{}] {}", product.name, favorite.product_id, product.price),
            None => println!("{} (unavailable)", favorite.product_id),
        }
    }
    Ok(())
}

/// Add a favorite.
#[allow(clippy::print_stdout)]
pub fn add(app: &mut AppState, id: &str) -> Result<(), ClientError> {
    let id = product_id(id)?;
    app.favorites_mut().add(&id)?;

    println!("{id}: added to favorites");
    Ok(())
}

/// Remove a favorite.
#[allow(clippy::print_stdout)]
pub fn remove(app: &mut AppState, id: &str) -> Result<(), ClientError> {
    let id = product_id(id)?;
    app.favorites_mut().remove(&id)?;

    println!("{id}: removed from favorites");
    Ok(())
}

/// Move a favorite into the cart.
#[allow(clippy::print_stdout)]
pub fn move_to_cart(app: &mut AppState, id: &str) -> Result<(), ClientError> {
    let id = product_id(id)?;
    if !app.favorites().contains(&id) {
        tracing::debug!(product_id = %id, "Moving a product that is not a favorite");
    }
    app.move_to_cart(&id)?;

    println!("{id}: moved to cart (quantity {})", app.cart().quantity(&id));
    Ok(())
}
