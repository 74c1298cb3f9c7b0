//! Product and brand management commands.

use rust_decimal::Decimal;
use staxtrade_client::StaxTradeClient;
use staxtrade_core::{BrandId, Product, ProductId, ProductInput, ProductQuery};
use tracing::info;

use super::{CommandError, money};

#[allow(clippy::print_stdout)]
fn print_product(product: &Product) {
    println!(
        "{:>5}  {:<32} {:<16} {:>10} {:>6}",
        product.id,
        product.name,
        product
            .brand_name
            .clone()
            .unwrap_or_else(|| product.brand.to_string()),
        money(product.price),
        product.stock
    );
}

/// # Errors
///
/// Returns `CommandError::Api` if the list cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn list(
    client: &StaxTradeClient,
    search: Option<String>,
    brand: Option<BrandId>,
    page: Option<u32>,
) -> Result<(), CommandError> {
    let query = ProductQuery {
        page,
        search,
        brand,
        ordering: None,
    };
    let products = client.list_products(&query).await?;

    for product in &products.results {
        print_product(product);
    }
    println!(
        "{} of {} products{}",
        products.results.len(),
        products.count,
        if products.next.is_some() {
            " (more with --page)"
        } else {
            ""
        }
    );
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` with `Validation` if a field is rejected.
pub async fn create(
    client: &StaxTradeClient,
    name: String,
    brand: BrandId,
    price: Decimal,
    stock: u32,
) -> Result<(), CommandError> {
    let product = client
        .create_product(&ProductInput {
            name,
            brand,
            price,
            stock,
        })
        .await?;
    print_product(&product);
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` with `NotFound` or `Validation`.
pub async fn update(
    client: &StaxTradeClient,
    id: ProductId,
    name: String,
    brand: BrandId,
    price: Decimal,
    stock: u32,
) -> Result<(), CommandError> {
    let product = client
        .update_product(
            id,
            &ProductInput {
                name,
                brand,
                price,
                stock,
            },
        )
        .await?;
    print_product(&product);
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` with `NotFound` if the product does not exist.
pub async fn delete(client: &StaxTradeClient, id: ProductId) -> Result<(), CommandError> {
    client.delete_product(id).await?;
    info!("Deleted product {id}");
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` if the adjustment is rejected.
#[allow(clippy::print_stdout)]
pub async fn adjust_stock(
    client: &StaxTradeClient,
    id: ProductId,
    amount: i64,
) -> Result<(), CommandError> {
    let level = client.adjust_stock(id, amount).await?;
    println!("Product {id} stock: {}", level.stock);
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` if the brands cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn brands(client: &StaxTradeClient) -> Result<(), CommandError> {
    for brand in client.brands().await? {
        println!("{:>5}  {}", brand.id, brand.name);
    }
    Ok(())
}
