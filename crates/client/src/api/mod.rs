//! Typed endpoint methods on [`StaxTradeClient`](crate::StaxTradeClient).
//!
//! Each submodule adds one group of endpoints:
//! - `auth` - login, registration, logout
//! - `products` - admin product and brand management
//! - `customer` - catalog, order placement, and order history
//! - `analytics` - dashboard datasets, demand forecast, inventory insights

mod analytics;
mod auth;
pub(crate) mod cache;
mod customer;
mod products;

pub use analytics::{AnalyticsSource, DEFAULT_INSIGHTS_LIMIT};
