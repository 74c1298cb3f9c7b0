//! Outbound request pipeline with 401-driven retry-once.
//!
//! Every call is described by an immutable [`PendingRequest`] and sent as at
//! most two [`Attempt`]s:
//!
//! 1. The initial attempt carries the current access token, if any.
//! 2. A 401 on a bearer request triggers a coordinated refresh, then one
//!    retry with the new token. A 401 on the retry is final: it surfaces as
//!    [`ApiError::AuthExpired`] and is never retried again.
//!
//! Anonymous requests (login, register) skip the refresh path entirely, so a
//! wrong password is reported as [`ApiError::Unauthorized`].

use std::fmt;
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::error::ApiError;
use crate::refresh::TokenRefreshCoordinator;
use crate::session::PersistentSessionStore;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

// =============================================================================
// Requests
// =============================================================================

/// Whether a request carries the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Attach the access token when present; eligible for refresh-and-retry.
    Bearer,
    /// Never attach a token; a 401 is reported as-is.
    Anonymous,
}

/// An outbound call, fixed before the first attempt.
///
/// The same value (and the same request id) is replayed on retry.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    id: Uuid,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    auth: AuthMode,
}

impl PendingRequest {
    /// Create a bearer request for `path`, relative to the API base URL.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: AuthMode::Bearer,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if `body` cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Append query parameters.
    #[must_use]
    pub fn query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Send without the session's token.
    #[must_use]
    pub const fn anonymous(mut self) -> Self {
        self.auth = AuthMode::Anonymous;
        self
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn auth(&self) -> AuthMode {
        self.auth
    }
}

/// Which send of a request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    Initial,
    Retry,
}

/// One send of a [`PendingRequest`] and the token it carries.
#[derive(Clone)]
pub struct Attempt {
    kind: AttemptKind,
    token: Option<SecretString>,
}

impl Attempt {
    const fn initial(token: Option<SecretString>) -> Self {
        Self {
            kind: AttemptKind::Initial,
            token,
        }
    }

    /// The follow-up attempt, or `None` if this already was the retry.
    fn retry(&self, token: SecretString) -> Option<Self> {
        match self.kind {
            AttemptKind::Initial => Some(Self {
                kind: AttemptKind::Retry,
                token: Some(token),
            }),
            AttemptKind::Retry => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> AttemptKind {
        self.kind
    }
}

impl fmt::Debug for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attempt")
            .field("kind", &self.kind)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

/// A passed-through (2xx or 3xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decode the body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

// =============================================================================
// Client
// =============================================================================

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    session: PersistentSessionStore,
    refresher: TokenRefreshCoordinator,
}

/// Cloneable API client that decorates, sends, and retries requests.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

/// What to do after an attempt came back.
enum Step {
    Done(Result<ApiResponse, ApiError>),
    Retry(Attempt),
}

impl HttpClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        session: PersistentSessionStore,
        refresher: TokenRefreshCoordinator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                session,
                refresher,
            }),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Send a request through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport failures and 4xx/5xx responses; see
    /// the module docs for how 401 is handled.
    #[instrument(
        skip(self, request),
        fields(request_id = %request.id, method = %request.method, path = %request.path)
    )]
    pub async fn send(&self, request: &PendingRequest) -> Result<ApiResponse, ApiError> {
        let token = match request.auth {
            AuthMode::Bearer => self.inner.session.access_token(),
            AuthMode::Anonymous => None,
        };
        let mut attempt = Attempt::initial(token);

        loop {
            let (status, body) = self.dispatch(request, &attempt).await?;
            match self.next_step(request, &attempt, status, body).await {
                Step::Done(result) => return result,
                Step::Retry(next) => attempt = next,
            }
        }
    }

    /// Send and decode a JSON response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` as [`Self::send`] does, or `ApiError::Decode`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &PendingRequest,
    ) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    /// `GET path` and decode the response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` as [`Self::send`] does, or `ApiError::Decode`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(&PendingRequest::get(path)).await
    }

    /// `POST path` with a JSON body and decode the response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` as [`Self::send`] does, or `ApiError::Decode`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(&PendingRequest::post(path).json(body)?)
            .await
    }

    /// `PUT path` with a JSON body and decode the response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` as [`Self::send`] does, or `ApiError::Decode`.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(&PendingRequest::put(path).json(body)?).await
    }

    /// `DELETE path`, ignoring any response body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` as [`Self::send`] does.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(&PendingRequest::delete(path)).await.map(|_| ())
    }

    /// Build and send one attempt, returning the status and body text.
    async fn dispatch(
        &self,
        request: &PendingRequest,
        attempt: &Attempt,
    ) -> Result<(StatusCode, String), ApiError> {
        let mut url = self.inner.base_url.join(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, request.id.to_string());
        if let Some(token) = &attempt.token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, attempt = ?attempt.kind, "Request failed without a response");
            ApiError::NetworkUnreachable(e)
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(ApiError::NetworkUnreachable)?;

        debug!(status = status.as_u16(), attempt = ?attempt.kind, "Response received");
        Ok((status, body))
    }

    /// Classify a response, refreshing the session when a retry is warranted.
    async fn next_step(
        &self,
        request: &PendingRequest,
        attempt: &Attempt,
        status: StatusCode,
        body: String,
    ) -> Step {
        if status.is_success() || status.is_redirection() {
            return Step::Done(Ok(ApiResponse { status, body }));
        }
        if status != StatusCode::UNAUTHORIZED {
            return Step::Done(Err(ApiError::from_status(status, &body, &request.path)));
        }
        if request.auth == AuthMode::Anonymous {
            return Step::Done(Err(ApiError::unauthorized(&body)));
        }
        if attempt.kind == AttemptKind::Retry {
            warn!("Request rejected again after refresh");
            return Step::Done(Err(ApiError::AuthExpired));
        }

        match self.token_for_retry(attempt).await {
            Some(token) => attempt
                .retry(token)
                .map_or(Step::Done(Err(ApiError::AuthExpired)), Step::Retry),
            None => Step::Done(Err(ApiError::AuthExpired)),
        }
    }

    /// Token to replay with after a 401, or `None` if the session is gone.
    ///
    /// If the session already holds a different token than the one this
    /// attempt carried, another request refreshed (or a login happened) while
    /// this one was in flight, so that token is used without a new refresh.
    /// If the attempt carried a token and the session is now empty, the
    /// session was cleared while in flight and the request ends here. A
    /// signed-out request with no refresh token never starts an exchange.
    async fn token_for_retry(&self, attempt: &Attempt) -> Option<SecretString> {
        let current = self.inner.session.access_token();
        match (&attempt.token, current) {
            (Some(sent), Some(current)) if sent.expose_secret() != current.expose_secret() => {
                debug!("Session token changed while in flight, replaying with it");
                Some(current)
            }
            (None, Some(current)) => Some(current),
            (Some(_), None) => {
                debug!("Session cleared while in flight");
                None
            }
            (None, None) if self.inner.session.refresh_token().is_none() => {
                debug!("Signed out, nothing to refresh");
                None
            }
            _ => match self.inner.refresher.refresh().await {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!(error = %e, "Refresh failed, giving up on request");
                    None
                }
            },
        }
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::events::EventBus;
    use crate::session::TokenPair;
    use crate::storage::MemoryStorage;

    async fn client(server: &MockServer) -> (HttpClient, PersistentSessionStore) {
        client_at(&format!("{}/api/", server.uri()))
    }

    fn client_at(base: &str) -> (HttpClient, PersistentSessionStore) {
        let session = PersistentSessionStore::new(Arc::new(MemoryStorage::new()));
        let base = Url::parse(base).unwrap();
        let http = reqwest::Client::new();
        let refresher =
            TokenRefreshCoordinator::new(http.clone(), &base, session.clone(), EventBus::new())
                .unwrap();
        (
            HttpClient::new(http, base, session.clone(), refresher),
            session,
        )
    }

    #[tokio::test]
    async fn test_attaches_bearer_and_request_id() {
        let server = MockServer::start().await;
        let (http, session) = client(&server).await;
        session.set(&TokenPair::new("a1", "r1")).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/summary/"))
            .and(header("authorization", "Bearer a1"))
            .and(header_exists("x-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let value: Value = http.get_json("summary/").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_anonymous_request_has_no_token() {
        let server = MockServer::start().await;
        let (http, session) = client(&server).await;
        session.set(&TokenPair::new("a1", "r1")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/register/"))
            .respond_with(|req: &Request| {
                assert!(!req.headers.contains_key("authorization"));
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"message": "ok"}))
            })
            .mount(&server)
            .await;

        let request = PendingRequest::post("register/")
            .json(&serde_json::json!({"username": "u"}))
            .unwrap()
            .anonymous();
        assert_eq!(http.send(&request).await.unwrap().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_query_pairs_are_encoded() {
        let server = MockServer::start().await;
        let (http, _) = client(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/products/"))
            .and(query_param("search", "blue widget"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let request = PendingRequest::get("products/").query([("search", "blue widget"), ("page", "2")]);
        let items: Vec<Value> = http.send_json(&request).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_retry_reuses_request_id_and_new_token() {
        let server = MockServer::start().await;
        let (http, session) = client(&server).await;
        session.set(&TokenPair::new("stale", "r1")).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/summary/"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "fresh"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/summary/"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let request = PendingRequest::get("summary/");
        http.send(&request).await.unwrap();

        let ids: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/summary/")
            .filter_map(|r| r.headers.get("x-request-id"))
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], request.id().to_string());
        assert_eq!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_second_401_is_auth_expired() {
        let server = MockServer::start().await;
        let (http, session) = client(&server).await;
        session.set(&TokenPair::new("stale", "r1")).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/summary/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "fresh"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = http.get_json::<Value>("summary/").await;
        assert!(matches!(result, Err(ApiError::AuthExpired)));
        // The refresh itself succeeded, so the new token stays.
        assert_eq!(session.access_token().unwrap().expose_secret(), "fresh");
    }

    #[tokio::test]
    async fn test_anonymous_401_is_unauthorized_without_refresh() {
        let server = MockServer::start().await;
        let (http, session) = client(&server).await;
        session.set(&TokenPair::new("a1", "r1")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"detail": "No active account found"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let request = PendingRequest::post("login/")
            .json(&serde_json::json!({"username": "u", "password": "p"}))
            .unwrap()
            .anonymous();
        let result = http.send(&request).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(msg)) if msg == "No active account found"));
        assert!(session.get().can_refresh());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        let (http, _) = client(&server).await;

        Mock::given(path("/api/products/99/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/api/summary/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(
            http.get_json::<Value>("products/99/").await,
            Err(ApiError::NotFound(p)) if p == "products/99/"
        ));
        assert!(matches!(
            http.get_json::<Value>("summary/").await,
            Err(ApiError::Server { status: 503 })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Reserve a free port, then release it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (http, _) = client_at(&format!("http://127.0.0.1:{port}/api/"));
        let result = http.get_json::<Value>("summary/").await;
        assert!(matches!(result, Err(ApiError::NetworkUnreachable(_))));
        assert!(result.unwrap_err().is_retryable_by_user());
    }
}
