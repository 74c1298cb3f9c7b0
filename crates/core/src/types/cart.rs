//! Shopping cart lines and their mutation rules.
//!
//! A [`Cart`] is an ordered collection of [`CartLine`]s, unique by product.
//! Every line held by a cart has a quantity of at least 1: any operation that
//! would bring a line to zero removes it instead.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::orders::OrderLine;

/// One product/quantity pair in the cart.
///
/// Persisted in camelCase so the stored document matches the shape other
/// views of the same storage expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    /// `quantity × unit_price` for this line.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The product fields a cart needs when a new line is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartProduct {
    pub product_id: ProductId,
    pub name: String,
    pub brand: String,
    pub unit_price: Decimal,
}

/// Ordered collection of cart lines, unique by `product_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

/// Lines that fail to parse are skipped, so one bad entry never costs the
/// rest of a persisted cart. The outer value must still be an array.
impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
        let lines = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value::<CartLine>(value).ok());
        Ok(Self::from_lines(lines))
    }
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from arbitrary lines, restoring the invariants.
    ///
    /// Zero-quantity lines are dropped and duplicate products are merged into
    /// the first occurrence, so a hand-edited or stale document still loads.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            match cart.position(line.product_id) {
                Some(idx) => {
                    if let Some(existing) = cart.lines.get_mut(idx) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                }
                None => cart.lines.push(line),
            }
        }
        cart
    }

    /// All lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct products in the cart.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// `Σ quantity × unit_price` over all lines.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// The `{product_id, quantity}` pairs submitted when ordering.
    #[must_use]
    pub fn order_lines(&self) -> Vec<OrderLine> {
        self.lines
            .iter()
            .map(|line| OrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect()
    }

    /// Add `delta` units of a product, inserting a new line if needed.
    ///
    /// If the resulting quantity is below 1 the line is removed (or never
    /// created). Returns `true` if the cart changed.
    pub fn add_or_increment(&mut self, product: CartProduct, delta: i64) -> bool {
        if let Some(idx) = self.position(product.product_id) {
            return self.apply_delta(idx, delta);
        }

        let Some(quantity) = quantity_from(delta) else {
            return false;
        };
        self.lines.push(CartLine {
            product_id: product.product_id,
            name: product.name,
            brand: product.brand,
            unit_price: product.unit_price,
            quantity,
        });
        true
    }

    /// Change an existing line's quantity by `delta`, clamped at zero.
    ///
    /// A line that reaches zero is removed. Unknown products are ignored.
    /// Returns `true` if the cart changed.
    pub fn change_quantity(&mut self, product_id: ProductId, delta: i64) -> bool {
        self.position(product_id)
            .is_some_and(|idx| self.apply_delta(idx, delta))
    }

    /// Delete a product's line unconditionally. Returns `true` if it existed.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.product_id != product_id);
        self.lines.len() != before
    }

    /// Empty the cart. Returns `true` if it had any lines.
    pub fn clear(&mut self) -> bool {
        let changed = !self.lines.is_empty();
        self.lines.clear();
        changed
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.product_id == product_id)
    }

    fn apply_delta(&mut self, idx: usize, delta: i64) -> bool {
        if delta == 0 {
            return false;
        }
        let Some(line) = self.lines.get_mut(idx) else {
            return false;
        };
        let next = i64::from(line.quantity).saturating_add(delta);
        match quantity_from(next) {
            Some(quantity) => line.quantity = quantity,
            None => {
                self.lines.remove(idx);
            }
        }
        true
    }
}

/// Convert a signed quantity into a line quantity, `None` when below 1.
fn quantity_from(value: i64) -> Option<u32> {
    if value < 1 {
        return None;
    }
    Some(u32::try_from(value).unwrap_or(u32::MAX))
}
