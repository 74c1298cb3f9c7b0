//! Dashboard, demand forecast, and restock insight commands.

use std::sync::Arc;
use std::time::Duration;

use staxtrade_client::api::AnalyticsSource;
use staxtrade_client::{PollingAggregator, StaxTradeClient};
use staxtrade_core::{DashboardData, ForecastWindow};
use tracing::info;

use super::{CommandError, money};

#[allow(clippy::print_stdout)]
fn print_dashboard(data: &DashboardData) {
    let summary = &data.summary;
    println!(
        "Products: {}   Brands: {}   Orders: {}",
        summary.products, summary.brands, summary.orders
    );

    if !data.top_products.is_empty() {
        println!("\nTop products");
        for product in &data.top_products {
            println!("  {:<32} {:>6}", product.name, product.total);
        }
    }

    if !data.monthly_revenue.is_empty() {
        println!("\nMonthly revenue");
        for month in &data.monthly_revenue {
            let label = month
                .month
                .map_or_else(|| "-".to_string(), |m| m.format("%Y-%m").to_string());
            println!(
                "  {label:<10} {:>12}",
                money(month.revenue.unwrap_or_default())
            );
        }
    }

    if !data.daily_orders.is_empty() {
        println!("\nDaily orders");
        for day in &data.daily_orders {
            let label = day
                .day
                .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
            println!("  {label:<10} {:>6}", day.count);
        }
    }

    if !data.brand_revenue.is_empty() {
        println!("\nRevenue by brand");
        for brand in &data.brand_revenue {
            println!(
                "  {:<20} {:>12}",
                brand.display_name(),
                money(brand.revenue_or_zero())
            );
        }
    }

    if !data.low_stock.is_empty() {
        println!("\nLow stock");
        for item in &data.low_stock {
            println!("  {:>5}  {:<32} {:<16} {:>4}", item.id, item.name, item.brand, item.stock);
        }
    }
}

/// Print the dashboard once, or keep it refreshing with `watch`.
///
/// # Errors
///
/// Returns `CommandError::Api` if a one-off fetch fails. In watch mode failed
/// cycles are logged and the last dashboard stays on screen.
#[allow(clippy::print_stdout)]
pub async fn dashboard(
    client: &StaxTradeClient,
    watch: bool,
    interval: Option<u64>,
) -> Result<(), CommandError> {
    if !watch {
        print_dashboard(&client.dashboard_once().await?);
        return Ok(());
    }

    let aggregator = match interval {
        Some(secs) => PollingAggregator::new(
            Arc::new(AnalyticsSource::new(client.http().clone())),
            Duration::from_secs(secs.max(1)),
        ),
        None => client.dashboard(),
    };
    let mut updates = aggregator.subscribe();
    aggregator.start().await;
    info!("Watching the dashboard, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    println!(
                        "\n=== {} (cycle {}) ===",
                        snapshot.fetched_at.format("%H:%M:%S"),
                        snapshot.fetched_at_generation
                    );
                    print_dashboard(&snapshot.data);
                }
            }
        }
    }

    aggregator.stop().await;
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` if the forecast cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn forecast(
    client: &StaxTradeClient,
    window: u32,
    horizon: u32,
) -> Result<(), CommandError> {
    let forecast = client
        .demand_forecast(ForecastWindow::new(window, horizon))
        .await?;

    let summary = &forecast.summary;
    println!(
        "{} of {} SKUs with sales in the last {} days, {:.1} units/day, risk: {} high, {} medium",
        summary.tracked_skus,
        summary.total_skus,
        forecast.window_days,
        summary.avg_daily_units,
        summary.high_risk,
        summary.medium_risk
    );
    println!(
        "{:>5}  {:<32} {:>6} {:>8} {:>8} {:>10} {:<6}",
        "ID", "Product", "Stock", "Rate", "Forecast", "Days left", "Risk"
    );
    for item in &forecast.items {
        let days = item
            .days_to_oos
            .map_or_else(|| "-".to_string(), |d| format!("{d:.1}"));
        println!(
            "{:>5}  {:<32} {:>6} {:>8.2} {:>8} {:>10} {:<6}",
            item.product_id, item.name, item.stock, item.daily_rate, item.forecast_qty, days, item.risk
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` if the insights cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn insights(
    client: &StaxTradeClient,
    window: u32,
    horizon: u32,
    limit: u32,
) -> Result<(), CommandError> {
    let insights = client
        .inventory_insights(ForecastWindow::new(window, horizon), limit)
        .await?;

    println!(
        "{} of {} SKUs tracked, covering the next {} days",
        insights.summary.tracked_skus, insights.summary.total_skus, insights.horizon_days
    );
    for item in &insights.items {
        if item.recommended_restock == 0 {
            continue;
        }
        println!(
            "{:>5}  {:<32} {:<16} stock {:>4}  restock {:>5}",
            item.product_id,
            item.name,
            item.brand.as_deref().unwrap_or("-"),
            item.stock,
            item.recommended_restock
        );
    }
    Ok(())
}
