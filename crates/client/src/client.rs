//! The [`StaxTradeClient`] facade wiring every component together.

use std::fmt;
use std::sync::Arc;

use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::AnalyticsSource;
use crate::api::cache::{CacheKey, CacheValue};
use crate::cart::SharedCartStore;
use crate::config::{ClientConfig, ConfigError};
use crate::events::{EventBus, Subscription, Topic};
use crate::http::HttpClient;
use crate::poller::PollingAggregator;
use crate::preferences::PortalModeStore;
use crate::refresh::TokenRefreshCoordinator;
use crate::session::PersistentSessionStore;
use crate::storage::{FileStorage, KeyValueStorage, StorageError};

const CACHE_CAPACITY: u64 = 16;

/// Errors that can occur while building a client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Client for the StaxTrade API.
///
/// Owns the process-wide session store, event bus, refresh coordinator, and
/// cart. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct StaxTradeClient {
    pub(crate) inner: Arc<StaxTradeClientInner>,
}

pub(crate) struct StaxTradeClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) session: PersistentSessionStore,
    pub(crate) bus: EventBus,
    pub(crate) refresher: TokenRefreshCoordinator,
    pub(crate) http: HttpClient,
    pub(crate) cart: SharedCartStore,
    pub(crate) portal_mode: PortalModeStore,
    pub(crate) cache: Cache<CacheKey, CacheValue>,
    _session_expired: Subscription,
}

impl StaxTradeClient {
    /// Create a client persisting its state to `config.state_file()`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the state file cannot be opened or the HTTP
    /// client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let storage = FileStorage::open(config.state_file())?;
        debug!(path = %storage.path().display(), "Opened state file");
        Self::with_storage(config, Arc::new(storage))
    }

    /// Create a client on top of the given storage.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the HTTP client cannot be built.
    pub fn with_storage(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("staxtrade-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let bus = EventBus::new();
        let session = PersistentSessionStore::new(Arc::clone(&storage));
        let refresher = TokenRefreshCoordinator::new(
            http.clone(),
            &config.api_url,
            session.clone(),
            bus.clone(),
        )?;
        let api = HttpClient::new(
            http,
            config.api_url.clone(),
            session.clone(),
            refresher.clone(),
        );
        let cart = SharedCartStore::load(Arc::clone(&storage), bus.clone(), api.clone());
        let portal_mode = PortalModeStore::new(storage);

        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(config.cache_ttl)
            .build();

        // Catalog prices are per-user, so nothing cached may outlive the session.
        let session_expired = {
            let cache: Cache<CacheKey, CacheValue> = cache.clone();
            bus.subscribe(Topic::SessionExpired, move |_| {
                cache.invalidate_all();
            })
        };

        info!(api_url = %config.api_url, "StaxTrade client ready");

        Ok(Self {
            inner: Arc::new(StaxTradeClientInner {
                config,
                session,
                bus,
                refresher,
                http: api,
                cart,
                portal_mode,
                cache,
                _session_expired: session_expired,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Durable token store.
    #[must_use]
    pub fn session(&self) -> &PersistentSessionStore {
        &self.inner.session
    }

    /// Bus for `cart-changed` and `session-expired`.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn refresher(&self) -> &TokenRefreshCoordinator {
        &self.inner.refresher
    }

    /// Request pipeline, for endpoints without a typed method.
    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.inner.http
    }

    #[must_use]
    pub fn cart(&self) -> &SharedCartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn portal_mode(&self) -> &PortalModeStore {
        &self.inner.portal_mode
    }

    /// Whether an access token is currently stored.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.session.get().is_authenticated()
    }

    /// A new dashboard poller using the configured interval.
    ///
    /// Each consuming view gets its own aggregator and stops it when done.
    #[must_use]
    pub fn dashboard(&self) -> PollingAggregator {
        PollingAggregator::new(
            Arc::new(AnalyticsSource::new(self.inner.http.clone())),
            self.inner.config.poll_interval,
        )
    }

    /// Invalidate all cached data.
    pub async fn invalidate_cache(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

impl fmt::Debug for StaxTradeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaxTradeClient")
            .field("api_url", &self.inner.config.api_url.as_str())
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
