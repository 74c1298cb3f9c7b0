//! Dashboard analytics, demand forecast, and inventory insight payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::status::RiskLevel;

// =============================================================================
// Dashboard
// =============================================================================

/// Headline counts from `GET summary/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub products: u64,
    pub brands: u64,
    pub orders: u64,
    #[serde(default)]
    pub by_brand: Vec<BrandCount>,
}

/// Number of products carried by a brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandCount {
    pub name: String,
    pub count: u64,
}

/// Row of `GET analytics/top-products/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    #[serde(rename = "product__name")]
    pub name: String,
    /// Units sold.
    #[serde(default)]
    pub total: u64,
}

/// Row of `GET analytics/monthly-revenue/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    /// First instant of the month; absent for orders without a timestamp.
    #[serde(default)]
    pub month: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revenue: Option<Decimal>,
}

/// Row of `GET analytics/daily-orders/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyOrders {
    #[serde(default)]
    pub day: Option<DateTime<Utc>>,
    pub count: u64,
}

/// Row of `GET analytics/brand-revenue/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandRevenue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub revenue: Option<Decimal>,
}

impl BrandRevenue {
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    #[must_use]
    pub fn revenue_or_zero(&self) -> Decimal {
        self.revenue.unwrap_or_default()
    }
}

/// Row of `GET analytics/low-stock/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub stock: u32,
}

/// The six dashboard datasets, fetched together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardData {
    pub summary: Summary,
    pub top_products: Vec<TopProduct>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub daily_orders: Vec<DailyOrders>,
    pub brand_revenue: Vec<BrandRevenue>,
    pub low_stock: Vec<LowStockItem>,
}

/// A committed dashboard snapshot.
///
/// `fetched_at_generation` orders snapshots: a lower generation never
/// replaces a higher one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsSnapshot {
    pub data: DashboardData,
    pub fetched_at_generation: u64,
    pub fetched_at: DateTime<Utc>,
}

// =============================================================================
// Forecasting
// =============================================================================

/// Look-back and look-ahead windows, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    window_days: u32,
    horizon_days: u32,
}

impl ForecastWindow {
    pub const DEFAULT_DAYS: u32 = 30;

    /// Create a window; zero values are raised to 1 as the server would.
    #[must_use]
    pub fn new(window_days: u32, horizon_days: u32) -> Self {
        Self {
            window_days: window_days.max(1),
            horizon_days: horizon_days.max(1),
        }
    }

    #[must_use]
    pub const fn window_days(&self) -> u32 {
        self.window_days
    }

    #[must_use]
    pub const fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("window", self.window_days.to_string()),
            ("horizon", self.horizon_days.to_string()),
        ]
    }
}

impl Default for ForecastWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DAYS, Self::DEFAULT_DAYS)
    }
}

/// Response of `GET analytics/demand-forecast/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemandForecast {
    pub window_days: u32,
    pub horizon_days: u32,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    pub summary: ForecastSummary,
    pub items: Vec<ForecastItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastSummary {
    pub total_skus: u64,
    pub tracked_skus: u64,
    #[serde(default)]
    pub avg_daily_units: f64,
    #[serde(default)]
    pub high_risk: u64,
    #[serde(default)]
    pub medium_risk: u64,
}

/// Per-SKU projection, sorted by the server with soonest stock-out first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastItem {
    pub product_id: ProductId,
    pub name: String,
    pub brand: String,
    pub stock: u32,
    pub daily_rate: f64,
    /// Week-over-week trend, clamped by the server to `[-0.8, 1.5]`.
    pub trend: f64,
    pub forecast_qty: u64,
    #[serde(default)]
    pub days_to_oos: Option<f64>,
    #[serde(default)]
    pub risk: RiskLevel,
}

/// Response of `GET inventory-insights/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InventoryInsights {
    pub window_days: u32,
    pub horizon_days: u32,
    pub summary: InsightsSummary,
    pub items: Vec<InsightItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InsightsSummary {
    pub total_skus: u64,
    pub tracked_skus: u64,
}

/// Restock suggestion for one SKU.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InsightItem {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub stock: u32,
    pub price: Decimal,
    pub daily_rate: f64,
    #[serde(default)]
    pub days_to_oos: Option<f64>,
    pub recommended_restock: u64,
}
