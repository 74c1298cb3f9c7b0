//! End-to-end tests for the StaxTrade client.
//!
//! Every test starts its own [`MockServer`] and points a client with
//! in-memory storage at it, so nothing touches the network or the disk.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p staxtrade-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session` - 401 handling, single-flight refresh, session expiry
//! - `orders` - Cart checkout against the orders endpoint
//! - `dashboard` - Polling aggregator over the analytics endpoints
//! - `errors` - Status code mapping

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use staxtrade_client::{
    ClientConfig, MemoryStorage, StaxTradeClient, Subscription, TokenPair, Topic,
};
use wiremock::MockServer;

/// Path prefix the mock API is served under.
pub const API_PREFIX: &str = "/api";

/// A client wired to a fresh mock server.
pub struct TestContext {
    pub server: MockServer,
    pub client: StaxTradeClient,
}

impl TestContext {
    /// Start a mock server and build a signed-out client against it.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let config = ClientConfig::new(&format!("{}{API_PREFIX}/", server.uri()))
            .unwrap_or_else(|e| panic!("Invalid mock server URL: {e}"));
        let client = StaxTradeClient::with_storage(config, Arc::new(MemoryStorage::new()))
            .unwrap_or_else(|e| panic!("Failed to create client: {e}"));
        Self { server, client }
    }

    /// Like [`TestContext::new`], with a stored token pair.
    ///
    /// # Panics
    ///
    /// Panics if the tokens cannot be stored.
    pub async fn signed_in(access: &str, refresh: &str) -> Self {
        let ctx = Self::new().await;
        ctx.client
            .session()
            .set(&TokenPair::new(access, refresh))
            .unwrap_or_else(|e| panic!("Failed to store tokens: {e}"));
        ctx
    }

    /// Full request path for an endpoint, e.g. `api("summary/")`.
    #[must_use]
    pub fn api(endpoint: &str) -> String {
        format!("{API_PREFIX}/{endpoint}")
    }

    /// Count `session-expired` events for as long as the returned
    /// subscription is alive.
    #[must_use]
    pub fn count_session_expired(&self) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let subscription = self.client.events().subscribe(Topic::SessionExpired, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, subscription)
    }
}
