//! Core types for StaxTrade.
//!
//! This module provides type-safe wrappers for common domain concepts and the
//! JSON shapes exchanged with the API.

pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod id;
pub mod orders;
pub mod price;
pub mod status;

pub use analytics::*;
pub use cart::{Cart, CartLine, CartProduct};
pub use catalog::*;
pub use id::*;
pub use orders::*;
pub use price::Price;
pub use status::*;
