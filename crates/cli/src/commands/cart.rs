//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! reboul cart add sku-veste-noire --price 189.00 --name "Veste noire" -q 2
//! reboul cart update sku-veste-noire 1
//! reboul cart remove sku-veste-noire
//! reboul cart show
//! ```

use reboul_core::{Cart, DisplayMeta, Price, QuantityChange};
use reboul_storefront::Storefront;
use rust_decimal::Decimal;

use super::CommandError;

/// Print the cart lines and subtotal.
#[allow(clippy::print_stdout)]
pub fn show(cart: &Cart) {
    if cart.is_empty() {
        println!("Votre panier est vide.");
        return;
    }

    for line in cart.items() {
        let name = if line.display.name.is_empty() {
            line.item_key.as_str()
        } else {
            line.display.name.as_str()
        };
        println!(
            "{:<24} {:<28} x{:<4} {:>12}",
            line.item_key.as_str(),
            name,
            line.quantity.get(),
            line.line_total().to_string()
        );
    }

    let subtotal = cart
        .subtotals()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" + ");
    println!(
        "{} article(s), sous-total {subtotal}",
        cart.total_quantity()
    );
}

/// Add units of a product.
///
/// # Errors
///
/// Returns an error for an invalid key, quantity or price.
pub async fn add(
    storefront: &Storefront,
    item_key: &str,
    quantity: i64,
    price: Decimal,
    name: String,
    image: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let unit_price = Price::eur(price)?;
    let line = storefront
        .add_item(item_key, quantity, unit_price, DisplayMeta::new(name, image))
        .await?;
    tracing::info!(item_key = %line.item_key, quantity = %line.quantity, "Cart line updated");
    show(&storefront.cart_snapshot());
    Ok(())
}

/// Set a line's quantity.
///
/// # Errors
///
/// Returns an error if the line is not in the cart.
pub async fn update(
    storefront: &Storefront,
    item_key: &str,
    quantity: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    match storefront.update_quantity(item_key, quantity).await? {
        QuantityChange::Updated(line) => {
            tracing::info!(item_key = %line.item_key, quantity = %line.quantity, "Quantity set");
        }
        QuantityChange::Removed(line) => {
            tracing::info!(item_key = %line.item_key, "Line removed");
        }
    }
    show(&storefront.cart_snapshot());
    Ok(())
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error for a malformed key.
pub async fn remove(storefront: &Storefront, item_key: &str) -> Result<(), Box<dyn std::error::Error>> {
    if storefront.remove_item(item_key).await?.is_none() {
        tracing::info!(item_key, "Line was not in the cart");
    }
    show(&storefront.cart_snapshot());
    Ok(())
}

/// Reload the cart from the server.
///
/// # Errors
///
/// Returns an error when nobody is logged in.
pub async fn refresh(storefront: &Storefront) -> Result<(), Box<dyn std::error::Error>> {
    if storefront.current_session().is_none() {
        return Err(CommandError::NotLoggedIn.into());
    }
    if let Some(cart) = storefront.refresh_cart().await {
        show(&cart);
    }
    Ok(())
}
