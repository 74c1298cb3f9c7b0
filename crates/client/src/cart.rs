//! Process-wide shopping cart.
//!
//! The cart rules live in [`staxtrade_core::Cart`]; this store adds
//! durability and notification. Every mutation is persisted first and only
//! then published as `cart-changed`, so a subscriber that re-reads storage
//! always sees the state it was told about.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use rust_decimal::Decimal;
use staxtrade_core::{Cart, CartProduct, OrderConfirmation, OrderCreated, OrderRequest, ProductId};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::events::{Event, EventBus};
use crate::http::HttpClient;
use crate::storage::{KeyValueStorage, StorageError, load};

pub const CART_KEY: &str = "cart";
pub const ORDERS_PATH: &str = "customer/orders/";

/// Errors from cart operations that leave the process.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct Inner {
    storage: Arc<dyn KeyValueStorage>,
    bus: EventBus,
    http: HttpClient,
    cart: Mutex<Cart>,
    /// Held across persist and publish so events go out in mutation order.
    publish: Mutex<()>,
}

/// Cloneable handle to the shared cart.
#[derive(Clone)]
pub struct SharedCartStore {
    inner: Arc<Inner>,
}

impl SharedCartStore {
    /// Load the persisted cart, starting empty if none is stored or the
    /// stored document is not an array. Unreadable lines are dropped
    /// individually.
    pub fn load(storage: Arc<dyn KeyValueStorage>, bus: EventBus, http: HttpClient) -> Self {
        let cart = load::<Cart>(storage.as_ref(), CART_KEY).unwrap_or_default();
        let stored = storage
            .get(CART_KEY)
            .and_then(|value| value.as_array().map(Vec::len))
            .unwrap_or(0);
        if stored > cart.line_count() {
            warn!(stored, kept = cart.line_count(), "Dropped cart lines on load");
        }
        Self {
            inner: Arc::new(Inner {
                storage,
                bus,
                http,
                cart: Mutex::new(cart),
                publish: Mutex::new(()),
            }),
        }
    }

    /// Copy of the current cart.
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        lock(&self.inner.cart).clone()
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        lock(&self.inner.cart).total()
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        lock(&self.inner.cart).line_count()
    }

    #[must_use]
    pub fn item_count(&self) -> u64 {
        lock(&self.inner.cart).item_count()
    }

    /// Add `delta` units of `product`, creating the line if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the new cart could not be persisted; the
    /// cart is then unchanged and nothing is published.
    pub fn add_or_increment(&self, product: CartProduct, delta: i64) -> Result<Cart, StorageError> {
        self.mutate(|cart| cart.add_or_increment(product, delta))
    }

    /// Change a line's quantity by `delta`; a line reaching zero is removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the new cart could not be persisted.
    pub fn change_quantity(&self, product_id: ProductId, delta: i64) -> Result<Cart, StorageError> {
        self.mutate(|cart| cart.change_quantity(product_id, delta))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the new cart could not be persisted.
    pub fn remove(&self, product_id: ProductId) -> Result<Cart, StorageError> {
        self.mutate(|cart| cart.remove(product_id))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the empty cart could not be persisted.
    pub fn clear(&self) -> Result<Cart, StorageError> {
        self.mutate(Cart::clear)
    }

    /// Submit the cart as an order and clear it on success.
    ///
    /// On failure the cart is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `CartError::EmptyCart` without any network call if the cart
    /// has no lines, or `CartError::Api` if the server rejected the order.
    #[instrument(skip(self))]
    pub async fn place_order(&self) -> Result<OrderConfirmation, CartError> {
        let cart = self.snapshot();
        if cart.is_empty() {
            return Err(CartError::EmptyCart);
        }

        let total = cart.total();
        let request = OrderRequest {
            lines: cart.order_lines(),
        };
        let created: OrderCreated = self.inner.http.post_json(ORDERS_PATH, &request).await?;

        // The order exists server-side now; a local persistence failure must
        // not be reported as a failed order.
        if let Err(e) = self.clear() {
            warn!(error = %e, "Order placed but the cart could not be cleared");
        }

        let reference = order_reference();
        info!(
            %reference,
            %total,
            orders = created.created_order_ids.len(),
            "Order placed"
        );
        Ok(OrderConfirmation {
            reference,
            created_order_ids: created.created_order_ids,
            total,
        })
    }

    /// Apply `op` to a copy, persist it, swap it in, then publish.
    fn mutate(&self, op: impl FnOnce(&mut Cart) -> bool) -> Result<Cart, StorageError> {
        let _ordering = lock(&self.inner.publish);

        let next = {
            let mut current = lock(&self.inner.cart);
            let mut next = current.clone();
            if !op(&mut next) {
                return Ok(next);
            }
            self.inner
                .storage
                .set(CART_KEY, serde_json::to_value(&next)?)?;
            *current = next.clone();
            next
        };

        self.inner.bus.publish(&Event::CartChanged(next.clone()));
        Ok(next)
    }
}

impl fmt::Debug for SharedCartStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCartStore")
            .field("cart", &*lock(&self.inner.cart))
            .finish_non_exhaustive()
    }
}

/// Human-facing confirmation reference, e.g. `STX-482913`.
fn order_reference() -> String {
    format!("STX-{}", rand::rng().random_range(100_000..1_000_000))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
