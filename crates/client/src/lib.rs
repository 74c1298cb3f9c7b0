//! StaxTrade Client - session, cart, and analytics layer over the StaxTrade API.
//!
//! # Architecture
//!
//! ```text
//! StaxTradeClient
//!  ├─ PersistentSessionStore ──┐
//!  ├─ SharedCartStore ─────────┼── KeyValueStorage (state.json)
//!  ├─ PortalModeStore ─────────┘
//!  ├─ HttpClient ── TokenRefreshCoordinator (single-flight)
//!  ├─ EventBus (cart-changed, session-expired)
//!  └─ dashboard() -> PollingAggregator ── AnalyticsSource
//! ```
//!
//! The session and cart are process-wide: every view reads them through the
//! same client, and only their own methods mutate them. Cross-component
//! notification goes through the [`EventBus`].
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`storage`] - Durable key/value storage
//! - [`session`] - Access/refresh token store
//! - [`events`] - Publish/subscribe bus
//! - [`refresh`] - Single-flight token refresh
//! - [`http`] - Request pipeline with 401 retry-once
//! - [`cart`] - Shared shopping cart
//! - [`poller`] - Dashboard polling with staleness guard
//! - [`api`] - Typed endpoint methods

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod poller;
pub mod preferences;
pub mod refresh;
pub mod session;
pub mod storage;

pub use cart::{CartError, SharedCartStore};
pub use client::{ClientError, StaxTradeClient};
pub use config::{ClientConfig, ConfigError};
pub use error::ApiError;
pub use events::{Event, EventBus, Subscription, Topic};
pub use http::{HttpClient, PendingRequest};
pub use poller::{CycleOutcome, PollingAggregator, SnapshotSource};
pub use refresh::{RefreshError, RefreshState, TokenRefreshCoordinator};
pub use session::{PersistentSessionStore, Session, TokenPair};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
