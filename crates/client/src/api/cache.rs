//! Cache types for read-mostly API responses.

use staxtrade_core::{Brand, CatalogItem};

/// Cache key for brand and catalog lists.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Brands,
    Catalog,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Brands(Vec<Brand>),
    Catalog(Vec<CatalogItem>),
}
