//! Customer order placement and history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{OrderId, ProductId};

/// One `{product_id, quantity}` pair of an order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of `POST customer/orders/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    pub lines: Vec<OrderLine>,
}

/// Response body of a successful `POST customer/orders/`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderCreated {
    #[serde(default)]
    pub created_order_ids: Vec<OrderId>,
}

/// What the cart hands back after an order is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    /// Human-facing reference such as `STX-482913`.
    pub reference: String,
    pub created_order_ids: Vec<OrderId>,
    /// Cart total at the moment the order was submitted.
    pub total: Decimal,
}

/// One row of the customer's order history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomerOrder {
    pub id: OrderId,
    /// Product name.
    pub product: String,
    #[serde(default)]
    pub brand: String,
    pub quantity: u32,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_request_wire_shape() {
        let request = OrderRequest {
            lines: vec![OrderLine {
                product_id: ProductId::new(1),
                quantity: 2,
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"lines": [{"product_id": 1, "quantity": 2}]})
        );
    }

    #[test]
    fn test_order_created_tolerates_missing_ids() {
        let created: OrderCreated = serde_json::from_str("{}").unwrap();
        assert!(created.created_order_ids.is_empty());
    }
}
