//! Dashboard datasets, demand forecast, and inventory insights.

use async_trait::async_trait;
use staxtrade_core::{
    BrandRevenue, DailyOrders, DashboardData, DemandForecast, ForecastWindow, InventoryInsights,
    LowStockItem, MonthlyRevenue, Summary, TopProduct,
};
use tracing::instrument;

use crate::client::StaxTradeClient;
use crate::error::ApiError;
use crate::http::{HttpClient, PendingRequest};
use crate::poller::SnapshotSource;

const SUMMARY_PATH: &str = "summary/";
const TOP_PRODUCTS_PATH: &str = "analytics/top-products/";
const MONTHLY_REVENUE_PATH: &str = "analytics/monthly-revenue/";
const DAILY_ORDERS_PATH: &str = "analytics/daily-orders/";
const BRAND_REVENUE_PATH: &str = "analytics/brand-revenue/";
const LOW_STOCK_PATH: &str = "analytics/low-stock/";
const DEMAND_FORECAST_PATH: &str = "analytics/demand-forecast/";
const INVENTORY_INSIGHTS_PATH: &str = "inventory-insights/";

/// Default number of rows returned by inventory insights.
pub const DEFAULT_INSIGHTS_LIMIT: u32 = 50;

/// Fetches the six dashboard datasets concurrently.
///
/// The join is all-or-nothing: if any request fails, the whole fetch fails
/// and the remaining requests are dropped.
#[derive(Debug, Clone)]
pub struct AnalyticsSource {
    http: HttpClient,
}

impl AnalyticsSource {
    #[must_use]
    pub const fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SnapshotSource for AnalyticsSource {
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<DashboardData, ApiError> {
        let http = &self.http;
        let (summary, top_products, monthly_revenue, daily_orders, brand_revenue, low_stock) = tokio::try_join!(
            http.get_json::<Summary>(SUMMARY_PATH),
            http.get_json::<Vec<TopProduct>>(TOP_PRODUCTS_PATH),
            http.get_json::<Vec<MonthlyRevenue>>(MONTHLY_REVENUE_PATH),
            http.get_json::<Vec<DailyOrders>>(DAILY_ORDERS_PATH),
            http.get_json::<Vec<BrandRevenue>>(BRAND_REVENUE_PATH),
            http.get_json::<Vec<LowStockItem>>(LOW_STOCK_PATH),
        )?;

        Ok(DashboardData {
            summary,
            top_products,
            monthly_revenue,
            daily_orders,
            brand_revenue,
            low_stock,
        })
    }
}

impl StaxTradeClient {
    /// Fetch the dashboard once, outside any poller.
    ///
    /// # Errors
    ///
    /// Returns the first `ApiError` among the six requests.
    pub async fn dashboard_once(&self) -> Result<DashboardData, ApiError> {
        AnalyticsSource::new(self.inner.http.clone()).fetch().await
    }

    /// Per-SKU demand projection.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    #[instrument(skip(self), fields(window = window.window_days(), horizon = window.horizon_days()))]
    pub async fn demand_forecast(&self, window: ForecastWindow) -> Result<DemandForecast, ApiError> {
        let request = PendingRequest::get(DEMAND_FORECAST_PATH).query(window.to_pairs());
        self.inner.http.send_json(&request).await
    }

    /// Restock suggestions, at most `limit` rows (raised to 1 if zero).
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    #[instrument(skip(self), fields(window = window.window_days(), horizon = window.horizon_days()))]
    pub async fn inventory_insights(
        &self,
        window: ForecastWindow,
        limit: u32,
    ) -> Result<InventoryInsights, ApiError> {
        let request = PendingRequest::get(INVENTORY_INSIGHTS_PATH)
            .query(window.to_pairs())
            .query([("limit", limit.max(1).to_string())]);
        self.inner.http.send_json(&request).await
    }
}
