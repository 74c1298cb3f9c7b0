//! StaxTrade Core - Shared types library.
//!
//! This crate provides the types shared by the StaxTrade client components:
//! - `client` - Session, cart, and analytics layer over the StaxTrade REST API
//! - `cli` - Command-line views built on the client
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no storage,
//! no HTTP clients. Cart mutation rules live here so they can be tested
//! without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, cart lines, and wire DTOs for every endpoint

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
