//! Single-flight exchange of the refresh token for a new access token.
//!
//! Any number of callers may ask for a refresh at the same moment; exactly one
//! `POST token/refresh/` is made and every caller receives its outcome. This
//! matters when the backend rotates refresh tokens on use: two independent
//! refreshes would each invalidate the other's token.
//!
//! ```text
//! Idle --refresh()--> Refreshing --ok--> Succeeded --> Idle
//!                                 \--err--> Failed -----> Idle
//! ```
//!
//! The exchange runs on its own task, so it completes (and the session is
//! updated or cleared) even if every waiter is dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::events::{Event, EventBus};
use crate::session::PersistentSessionStore;

pub const REFRESH_PATH: &str = "token/refresh/";

/// Why a refresh did not produce a new access token.
///
/// Cloneable because one outcome is handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Refresh token rejected (HTTP {status})")]
    Rejected { status: u16 },

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist refreshed token: {0}")]
    Storage(String),
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Succeeded,
    Failed,
}

impl RefreshState {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Refreshing)
                | (Self::Refreshing, Self::Succeeded | Self::Failed)
                | (Self::Succeeded | Self::Failed, Self::Idle)
        )
    }
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Refreshing => write!(f, "refreshing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    refresh: Option<String>,
}

type RefreshOutcome = Result<SecretString, RefreshError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct Flight {
    state: RefreshState,
    in_flight: Option<SharedRefresh>,
    last_outcome: Option<RefreshState>,
    exchanges: u64,
}

impl Flight {
    fn transition(&mut self, next: RefreshState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal refresh transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "Refresh state transition");
        self.state = next;
    }
}

struct Inner {
    http: reqwest::Client,
    refresh_url: Url,
    session: PersistentSessionStore,
    bus: EventBus,
    flight: Mutex<Flight>,
}

/// Cloneable handle to the process-wide refresh coordinator.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    inner: Arc<Inner>,
}

impl TokenRefreshCoordinator {
    /// Create a coordinator posting to `token/refresh/` under `api_url`.
    ///
    /// `http` must be a plain client: the refresh call never goes through
    /// the 401 retry pipeline.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if the refresh path cannot be joined onto
    /// `api_url`.
    pub fn new(
        http: reqwest::Client,
        api_url: &Url,
        session: PersistentSessionStore,
        bus: EventBus,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                refresh_url: api_url.join(REFRESH_PATH)?,
                session,
                bus,
                flight: Mutex::new(Flight {
                    state: RefreshState::Idle,
                    in_flight: None,
                    last_outcome: None,
                    exchanges: 0,
                }),
            }),
        })
    }

    /// Obtain a new access token, joining the in-flight exchange if there is one.
    ///
    /// On success the new token is already persisted. On failure the session
    /// has been cleared and `session-expired` published before this returns,
    /// unless a different session was stored while the exchange ran; that
    /// session is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the shared `RefreshError` of the exchange.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SecretString, RefreshError> {
        let flight = {
            let mut flight = lock(&self.inner.flight);
            if let Some(shared) = &flight.in_flight {
                debug!("Joining in-flight token refresh");
                shared.clone()
            } else {
                flight.transition(RefreshState::Refreshing);
                flight.exchanges += 1;
                let inner = Arc::clone(&self.inner);
                // The task's final `finish()` waits on this lock, so
                // `in_flight` is always set before it can be cleared.
                let task = tokio::spawn(async move { inner.run().await });
                let shared = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(RefreshError::Transport(format!("refresh task failed: {e}")))
                    })
                }
                .boxed()
                .shared();
                flight.in_flight = Some(shared.clone());
                shared
            }
        };
        flight.await
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        lock(&self.inner.flight).state
    }

    /// `Succeeded` or `Failed` for the most recent completed exchange.
    #[must_use]
    pub fn last_outcome(&self) -> Option<RefreshState> {
        lock(&self.inner.flight).last_outcome
    }

    /// Number of exchanges started since creation.
    #[must_use]
    pub fn exchanges(&self) -> u64 {
        lock(&self.inner.flight).exchanges
    }
}

impl fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRefreshCoordinator")
            .field("refresh_url", &self.inner.refresh_url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    async fn run(&self) -> RefreshOutcome {
        let Some(sent) = self.session.refresh_token() else {
            return self.expire(RefreshError::NoRefreshToken);
        };
        match self.exchange(&sent).await {
            Ok(access) => {
                info!("Access token refreshed");
                self.finish(RefreshState::Succeeded);
                Ok(access)
            }
            Err(e) if !self.session.holds_refresh(&sent) => {
                debug!(error = %e, "Refresh failed after the session changed, leaving it in place");
                self.finish(RefreshState::Failed);
                Err(e)
            }
            Err(e) => self.expire(e),
        }
    }

    /// Clear the session and announce it.
    fn expire(&self, e: RefreshError) -> RefreshOutcome {
        warn!(error = %e, "Token refresh failed, clearing session");
        if let Err(clear_err) = self.session.clear() {
            warn!(error = %clear_err, "Failed to clear session after refresh failure");
        }
        self.finish(RefreshState::Failed);
        self.bus.publish(&Event::SessionExpired);
        Err(e)
    }

    /// Post the refresh token and persist what comes back.
    ///
    /// If the session was replaced while the request was in flight, the
    /// newer tokens are kept and the current access token is returned.
    async fn exchange(&self, refresh_token: &SecretString) -> RefreshOutcome {
        let response = self
            .http
            .post(self.refresh_url.clone())
            .json(&serde_json::json!({ "refresh": refresh_token.expose_secret() }))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let tokens: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        if tokens.access.is_empty() {
            return Err(RefreshError::InvalidResponse(
                "empty access token".to_string(),
            ));
        }

        let access = SecretString::from(tokens.access);
        let rotated = tokens
            .refresh
            .filter(|token| !token.is_empty())
            .map(SecretString::from);
        let stored = self
            .session
            .set_access_if_current(refresh_token, &access, rotated.as_ref())
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        if !stored {
            debug!("Session changed during refresh, keeping the newer tokens");
            return self
                .session
                .access_token()
                .ok_or(RefreshError::NoRefreshToken);
        }

        Ok(access)
    }

    /// Record the outcome and return to `Idle`.
    fn finish(&self, outcome: RefreshState) {
        let mut flight = lock(&self.flight);
        flight.transition(outcome);
        flight.last_outcome = Some(outcome);
        flight.in_flight = None;
        flight.transition(RefreshState::Idle);
    }
}

fn lock(flight: &Mutex<Flight>) -> MutexGuard<'_, Flight> {
    flight.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::events::Topic;
    use crate::session::TokenPair;
    use crate::storage::MemoryStorage;

    struct Fixture {
        server: MockServer,
        session: PersistentSessionStore,
        bus: EventBus,
        coordinator: TokenRefreshCoordinator,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        let session = PersistentSessionStore::new(Arc::new(MemoryStorage::new()));
        let bus = EventBus::new();
        let api_url = Url::parse(&format!("{}/api/", server.uri())).unwrap();
        let coordinator = TokenRefreshCoordinator::new(
            reqwest::Client::new(),
            &api_url,
            session.clone(),
            bus.clone(),
        )
        .unwrap();
        Fixture {
            server,
            session,
            bus,
            coordinator,
        }
    }

    #[test]
    fn test_transitions() {
        use RefreshState::{Failed, Idle, Refreshing, Succeeded};
        assert!(Idle.can_transition_to(Refreshing));
        assert!(Refreshing.can_transition_to(Succeeded));
        assert!(Refreshing.can_transition_to(Failed));
        assert!(Succeeded.can_transition_to(Idle));
        assert!(Failed.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Succeeded));
        assert!(!Refreshing.can_transition_to(Refreshing));
        assert!(!Succeeded.can_transition_to(Refreshing));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let f = fixture().await;
        f.session.set(&TokenPair::new("old", "r1")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(serde_json::json!({ "refresh": "r1" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access": "new" }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&f.server)
            .await;

        let (a, b, c) = tokio::join!(
            f.coordinator.refresh(),
            f.coordinator.refresh(),
            f.coordinator.refresh()
        );

        for token in [a, b, c] {
            assert_eq!(token.unwrap().expose_secret(), "new");
        }
        assert_eq!(f.coordinator.exchanges(), 1);
        assert_eq!(f.coordinator.state(), RefreshState::Idle);
        assert_eq!(f.coordinator.last_outcome(), Some(RefreshState::Succeeded));
        assert_eq!(f.session.access_token().unwrap().expose_secret(), "new");
        assert_eq!(f.session.refresh_token().unwrap().expose_secret(), "r1");
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted() {
        let f = fixture().await;
        f.session.set(&TokenPair::new("old", "r1")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access": "a2", "refresh": "r2" })),
            )
            .mount(&f.server)
            .await;

        f.coordinator.refresh().await.unwrap();
        assert_eq!(f.session.refresh_token().unwrap().expose_secret(), "r2");
    }

    #[tokio::test]
    async fn test_rejection_clears_session_and_publishes_once() {
        let f = fixture().await;
        f.session.set(&TokenPair::new("old", "r1")).unwrap();
        let expired = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let expired = Arc::clone(&expired);
            f.bus.subscribe(Topic::SessionExpired, move |_| {
                expired.fetch_add(1, Ordering::SeqCst);
            })
        };

        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "detail": "Token is invalid or expired" }))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&f.server)
            .await;

        let (a, b) = tokio::join!(f.coordinator.refresh(), f.coordinator.refresh());

        assert_eq!(a.unwrap_err(), RefreshError::Rejected { status: 401 });
        assert_eq!(b.unwrap_err(), RefreshError::Rejected { status: 401 });
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        let session = f.session.get();
        assert!(session.access.is_none());
        assert!(session.refresh.is_none());
        assert_eq!(f.coordinator.last_outcome(), Some(RefreshState::Failed));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_network() {
        let f = fixture().await;
        let expired = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let expired = Arc::clone(&expired);
            f.bus.subscribe(Topic::SessionExpired, move |_| {
                expired.fetch_add(1, Ordering::SeqCst);
            })
        };

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&f.server)
            .await;

        let result = f.coordinator.refresh().await;
        assert_eq!(result.unwrap_err(), RefreshError::NoRefreshToken);
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_is_failure() {
        let f = fixture().await;
        f.session.set(&TokenPair::new("old", "r1")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&f.server)
            .await;

        let result = f.coordinator.refresh().await;
        assert!(matches!(result, Err(RefreshError::InvalidResponse(_))));
        assert!(!f.session.get().can_refresh());
    }

    #[tokio::test]
    async fn test_new_exchange_after_completion() {
        let f = fixture().await;
        f.session.set(&TokenPair::new("old", "r1")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": "a" })))
            .expect(2)
            .mount(&f.server)
            .await;

        f.coordinator.refresh().await.unwrap();
        f.coordinator.refresh().await.unwrap();
        assert_eq!(f.coordinator.exchanges(), 2);
    }

    #[tokio::test]
    async fn test_login_during_refresh_is_not_overwritten() {
        let f = fixture().await;
        f.session.set(&TokenPair::new("old", "r1")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access": "stale", "refresh": "stale-r" }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&f.server)
            .await;

        let login = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.session.set(&TokenPair::new("login-a", "login-r")).unwrap();
        };
        let (result, ()) = tokio::join!(f.coordinator.refresh(), login);

        assert_eq!(result.unwrap().expose_secret(), "login-a");
        let session = f.session.get();
        assert_eq!(session.access.unwrap().expose_secret(), "login-a");
        assert_eq!(session.refresh.unwrap().expose_secret(), "login-r");
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_newer_login_in_place() {
        let f = fixture().await;
        f.session.set(&TokenPair::new("old", "r1")).unwrap();
        let expired = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let expired = Arc::clone(&expired);
            f.bus.subscribe(Topic::SessionExpired, move |_| {
                expired.fetch_add(1, Ordering::SeqCst);
            })
        };

        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&f.server)
            .await;

        let login = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.session.set(&TokenPair::new("login-a", "login-r")).unwrap();
        };
        let (result, ()) = tokio::join!(f.coordinator.refresh(), login);

        assert_eq!(result.unwrap_err(), RefreshError::Rejected { status: 401 });
        assert_eq!(expired.load(Ordering::SeqCst), 0);
        assert_eq!(f.session.access_token().unwrap().expose_secret(), "login-a");
    }
}
