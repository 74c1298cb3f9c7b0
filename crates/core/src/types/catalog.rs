//! Products, brands, and the customer-facing catalog.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::CartProduct;
use super::id::{BrandId, ProductId};

/// A brand products are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A product as managed from the admin screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: BrandId,
    /// Read-only convenience field resolved by the server.
    #[serde(default)]
    pub brand_name: Option<String>,
    pub price: Decimal,
    pub stock: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body for creating or replacing a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInput {
    pub name: String,
    pub brand: BrandId,
    pub price: Decimal,
    pub stock: u32,
}

impl ProductInput {
    /// Stock given to new products when none is specified.
    pub const DEFAULT_STOCK: u32 = 50;
}

/// Filters and paging for the product list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub page: Option<u32>,
    /// Matches product name or brand name.
    pub search: Option<String>,
    pub brand: Option<BrandId>,
    /// One of `name`, `price`, `stock`, optionally prefixed with `-`.
    pub ordering: Option<String>,
}

impl ProductQuery {
    /// Query string pairs, omitting unset filters.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(brand) = self.brand {
            pairs.push(("brand", brand.to_string()));
        }
        if let Some(ordering) = self.ordering.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("ordering", ordering.to_string()));
        }
        pairs
    }
}

/// Response body of `POST products/{id}/adjust_stock/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StockLevel {
    pub stock: u32,
}

/// A page of results from a paginated list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// A list endpoint that may or may not be paginated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MaybePaged<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> MaybePaged<T> {
    /// The items regardless of pagination.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Paged(page) => page.results,
            Self::Plain(items) => items,
        }
    }

    /// Normalize to a [`Page`]; an unpaginated list becomes a single page.
    #[must_use]
    pub fn into_page(self) -> Page<T> {
        match self {
            Self::Paged(page) => page,
            Self::Plain(items) => Page {
                count: u64::try_from(items.len()).unwrap_or(u64::MAX),
                next: None,
                previous: None,
                results: items,
            },
        }
    }
}

/// A product as offered to the signed-in customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    /// List price before the loyalty discount.
    pub price: Decimal,
    /// Price the customer actually pays.
    pub effective_price: Decimal,
    #[serde(default)]
    pub discount_percent: u8,
    pub stock: u32,
}

impl CatalogItem {
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

impl From<&CatalogItem> for CartProduct {
    fn from(item: &CatalogItem) -> Self {
        Self {
            product_id: item.id,
            name: item.name.clone(),
            brand: item.brand.clone(),
            unit_price: item.effective_price,
        }
    }
}

/// Response body of `GET customer/catalog/`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogResponse {
    pub results: Vec<CatalogItem>,
}
