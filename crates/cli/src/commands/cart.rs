//! Cart commands.

use shopfront_client::ClientError;
use shopfront_client::shop::CartView;
use shopfront_client::state::AppState;

use super::product_id;

/// Print the cart with product names and totals.
///
/// If product lookup fails the bare ids and quantities are printed instead.
#[allow(clippy::print_stdout)]
pub async fn list(app: &AppState) -> Result<(), ClientError> {
    if app.cart().is_empty() {
        println!("Cart is empty");
        return Ok(());
    }

    match app.cart_view().await {
        Ok(view) => print_view(&view),
        Err(e) => {
            tracing::warn!(error = %e, "Product lookup failed, listing ids only");
            for (id, quantity) in app.cart().get_all() {
                println!("{quantity:>4} x {id}");
            }
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_view(view: &CartView) {
    for line in &view.lines {
        match (&line.product, line.line_total) {
            (Some(product), Some(total)) => println!(
                "{:>4} x {} [{}] @ {} = {total}",
                line.quantity, product.name, line.product_id, product.price
            ),
            (Some(product), None) => println!(
                "{:>4} x {} [{}] @ {} = (too large)",
                line.quantity, product.name, line.product_id, product.price
            ),
            (None, _) => println!(
                "{:>4} x {} (unavailable)",
                line.quantity, line.product_id
            ),
        }
    }

    println!("{} item(s)", view.item_count);
    match view.subtotal {
        Some(subtotal) => println!("Subtotal: {subtotal}"),
        None => println!("Subtotal: unavailable (mixed currencies or too large)"),
    }
}

/// Add one of a product.
pub fn increment(app: &mut AppState, id: &str) -> Result<(), ClientError> {
    let id = product_id(id)?;
    app.cart_mut().increment(&id)?;
    print_quantity(app, &id);
    Ok(())
}

/// Remove one of a product, keeping at least one.
pub fn decrement(app: &mut AppState, id: &str) -> Result<(), ClientError> {
    let id = product_id(id)?;
    app.cart_mut().decrement(&id)?;
    print_quantity(app, &id);
    Ok(())
}

/// Set a product's quantity.
pub fn set_quantity(app: &mut AppState, id: &str, quantity: u32) -> Result<(), ClientError> {
    let id = product_id(id)?;
    app.cart_mut().set_quantity(&id, quantity)?;
    print_quantity(app, &id);
    Ok(())
}

/// Remove a product.
pub fn remove(app: &mut AppState, id: &str) -> Result<(), ClientError> {
    let id = product_id(id)?;
    app.cart_mut().remove(&id)?;
    print_quantity(app, &id);
    Ok(())
}

/// Empty the cart.
#[allow(clippy::print_stdout)]
pub fn clear(app: &mut AppState) -> Result<(), ClientError> {
    app.cart_mut().clear()?;

    println!("Cart cleared");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_quantity(app: &AppState, id: &shopfront_core::ProductId) {
    match app.cart().quantity(id) {
        0 => println!("{id}: not in cart"),
        n => println!("{id}: {n}"),
    }
}
