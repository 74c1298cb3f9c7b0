//! Admin product and brand management.

use serde_json::json;
use staxtrade_core::{Brand, MaybePaged, Page, Product, ProductId, ProductInput, ProductQuery, StockLevel};
use tracing::{debug, info, instrument};

use super::cache::{CacheKey, CacheValue};
use crate::client::StaxTradeClient;
use crate::error::ApiError;
use crate::http::PendingRequest;

const PRODUCTS_PATH: &str = "products/";
const BRANDS_PATH: &str = "brands/";

fn product_path(id: ProductId) -> String {
    format!("{PRODUCTS_PATH}{id}/")
}

impl StaxTradeClient {
    // =========================================================================
    // Products
    // =========================================================================

    /// List products, optionally filtered by search text or brand.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>, ApiError> {
        let request = PendingRequest::get(PRODUCTS_PATH).query(query.to_pairs());
        let products: MaybePaged<Product> = self.inner.http.send_json(&request).await?;
        Ok(products.into_page())
    }

    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if no product has this id.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        self.inner.http.get_json(&product_path(id)).await
    }

    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the server rejects a field.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, ApiError> {
        let product: Product = self.inner.http.post_json(PRODUCTS_PATH, input).await?;
        self.invalidate_cache().await;
        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Replace a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` or `ApiError::Validation`.
    #[instrument(skip(self, input), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, ApiError> {
        let product: Product = self.inner.http.put_json(&product_path(id), input).await?;
        self.invalidate_cache().await;
        info!("Product updated");
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if no product has this id.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), ApiError> {
        self.inner.http.delete(&product_path(id)).await?;
        self.invalidate_cache().await;
        info!("Product deleted");
        Ok(())
    }

    /// Add `amount` (possibly negative) to a product's stock.
    ///
    /// The server floors stock at zero and returns the new level.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` or `ApiError::Validation`.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn adjust_stock(&self, id: ProductId, amount: i64) -> Result<StockLevel, ApiError> {
        let path = format!("{}adjust_stock/", product_path(id));
        let level: StockLevel = self
            .inner
            .http
            .post_json(&path, &json!({ "amount": amount }))
            .await?;
        self.invalidate_cache().await;
        info!(stock = level.stock, "Stock adjusted");
        Ok(level)
    }

    // =========================================================================
    // Brands
    // =========================================================================

    /// All brands, cached for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    #[instrument(skip(self))]
    pub async fn brands(&self) -> Result<Vec<Brand>, ApiError> {
        if let Some(CacheValue::Brands(brands)) = self.inner.cache.get(&CacheKey::Brands).await {
            debug!("Cache hit for brands");
            return Ok(brands);
        }

        let brands: MaybePaged<Brand> = self.inner.http.get_json(BRANDS_PATH).await?;
        let brands = brands.into_items();

        self.inner
            .cache
            .insert(CacheKey::Brands, CacheValue::Brands(brands.clone()))
            .await;

        Ok(brands)
    }
}
