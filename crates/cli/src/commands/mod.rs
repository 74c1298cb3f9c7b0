//! Subcommand implementations.

pub mod analytics;
pub mod auth;
pub mod products;
pub mod shop;

use staxtrade_client::{ApiError, CartError, StorageError};
use staxtrade_core::{Price, ProductId};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Product {0} is not in the catalog")]
    UnknownProduct(ProductId),

    #[error("Product {0} is out of stock")]
    OutOfStock(ProductId),

    #[error("Failed to read input: {0}")]
    Input(#[from] std::io::Error),
}

/// Printed when the session could not be renewed.
#[allow(clippy::print_stderr)]
pub fn notify_session_expired() {
    eprintln!("Your session has expired. Please run `stx login` again.");
}

/// Format an amount in the store currency.
pub fn money(amount: rust_decimal::Decimal) -> String {
    Price::gbp(amount).display()
}
