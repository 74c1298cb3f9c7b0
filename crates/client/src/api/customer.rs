//! Customer portal: catalog, order placement, and order history.

use staxtrade_core::{CatalogItem, CatalogResponse, CustomerOrder, OrderConfirmation};
use tracing::{debug, instrument};

use super::cache::{CacheKey, CacheValue};
use crate::cart::{CartError, ORDERS_PATH};
use crate::client::StaxTradeClient;
use crate::error::ApiError;

const CATALOG_PATH: &str = "customer/catalog/";

impl StaxTradeClient {
    /// Products with the signed-in customer's prices, cached for the
    /// configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    #[instrument(skip(self))]
    pub async fn catalog(&self) -> Result<Vec<CatalogItem>, ApiError> {
        if let Some(CacheValue::Catalog(items)) = self.inner.cache.get(&CacheKey::Catalog).await {
            debug!("Cache hit for catalog");
            return Ok(items);
        }

        let response: CatalogResponse = self.inner.http.get_json(CATALOG_PATH).await?;

        self.inner
            .cache
            .insert(CacheKey::Catalog, CacheValue::Catalog(response.results.clone()))
            .await;

        Ok(response.results)
    }

    /// Submit the cart as an order. See [`SharedCartStore::place_order`].
    ///
    /// Stock changes server-side, so the cached catalog is dropped afterwards.
    ///
    /// # Errors
    ///
    /// Returns `CartError::EmptyCart` or `CartError::Api`.
    ///
    /// [`SharedCartStore::place_order`]: crate::cart::SharedCartStore::place_order
    pub async fn place_order(&self) -> Result<OrderConfirmation, CartError> {
        let confirmation = self.inner.cart.place_order().await?;
        self.invalidate_cache().await;
        Ok(confirmation)
    }

    /// The signed-in customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<CustomerOrder>, ApiError> {
        self.inner.http.get_json(ORDERS_PATH).await
    }
}
