//! Customer portal commands: catalog, cart, and orders.

use staxtrade_client::StaxTradeClient;
use staxtrade_core::{Cart, CartProduct, ProductId};
use tracing::info;

use super::{CommandError, money};

/// # Errors
///
/// Returns `CommandError::Api` if the catalog cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn catalog(client: &StaxTradeClient) -> Result<(), CommandError> {
    let items = client.catalog().await?;
    if items.is_empty() {
        println!("The catalog is empty.");
        return Ok(());
    }

    println!("{:>5}  {:<32} {:<16} {:>10} {:>6}", "ID", "Product", "Brand", "Price", "Stock");
    for item in &items {
        let price = if item.discount_percent > 0 {
            format!("{} (-{}%)", money(item.effective_price), item.discount_percent)
        } else {
            money(item.effective_price)
        };
        println!(
            "{:>5}  {:<32} {:<16} {:>10} {:>6}",
            item.id, item.name, item.brand, price, item.stock
        );
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(cart: &Cart) {
    if cart.is_empty() {
        println!("Your cart is empty.");
        return;
    }

    for line in cart.lines() {
        println!(
            "{:>5}  {:<32} {:>4} x {:>9} = {:>10}",
            line.product_id,
            line.name,
            line.quantity,
            money(line.unit_price),
            money(line.subtotal())
        );
    }
    println!("Total: {} ({} items)", money(cart.total()), cart.item_count());
}

pub fn show_cart(client: &StaxTradeClient) {
    print_cart(&client.cart().snapshot());
}

/// Add a catalog product at the customer's price.
///
/// # Errors
///
/// Returns `CommandError::UnknownProduct` or `CommandError::OutOfStock`.
pub async fn add(
    client: &StaxTradeClient,
    product_id: ProductId,
    quantity: u32,
) -> Result<(), CommandError> {
    let items = client.catalog().await?;
    let item = items
        .iter()
        .find(|item| item.id == product_id)
        .ok_or(CommandError::UnknownProduct(product_id))?;
    if !item.in_stock() {
        return Err(CommandError::OutOfStock(product_id));
    }

    let cart = client
        .cart()
        .add_or_increment(CartProduct::from(item), i64::from(quantity))?;
    print_cart(&cart);
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Storage` if the cart could not be persisted.
pub fn change(client: &StaxTradeClient, product_id: ProductId, delta: i64) -> Result<(), CommandError> {
    let cart = client.cart().change_quantity(product_id, delta)?;
    print_cart(&cart);
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Storage` if the cart could not be persisted.
pub fn remove(client: &StaxTradeClient, product_id: ProductId) -> Result<(), CommandError> {
    let cart = client.cart().remove(product_id)?;
    print_cart(&cart);
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Storage` if the cart could not be persisted.
pub fn clear(client: &StaxTradeClient) -> Result<(), CommandError> {
    client.cart().clear()?;
    info!("Cart cleared");
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Cart` if the cart is empty or the order is rejected;
/// the cart is unchanged in that case.
#[allow(clippy::print_stdout)]
pub async fn place_order(client: &StaxTradeClient) -> Result<(), CommandError> {
    let confirmation = client.place_order().await?;
    println!(
        "Order {} placed: {} ({} lines)",
        confirmation.reference,
        money(confirmation.total),
        confirmation.created_order_ids.len()
    );
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` if the orders cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn list_orders(client: &StaxTradeClient) -> Result<(), CommandError> {
    let orders = client.list_orders().await?;
    if orders.is_empty() {
        println!("No orders yet.");
        return Ok(());
    }

    for order in &orders {
        println!(
            "#{:<6} {}  {:<32} {:<16} {:>4} {:>10}",
            order.id,
            order.created_at.format("%Y-%m-%d %H:%M"),
            order.product,
            order.brand,
            order.quantity,
            money(order.total_price)
        );
    }
    Ok(())
}
