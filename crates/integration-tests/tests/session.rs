//! 401 handling across concurrent requests.
//!
//! Run with: cargo test -p staxtrade-integration-tests --test session

use std::sync::atomic::Ordering;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use staxtrade_client::{ApiError, RefreshState};
use staxtrade_core::Summary;
use staxtrade_integration_tests::TestContext;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn summary_body() -> serde_json::Value {
    json!({"products": 12, "brands": 3, "orders": 40, "by_brand": []})
}

// ============================================================================
// Single-flight Refresh
// ============================================================================

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let ctx = TestContext::signed_in("stale", "r1").await;

    Mock::given(method("GET"))
        .and(path(TestContext::api("summary/")))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path(TestContext::api("summary/")))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
        .expect(3)
        .mount(&ctx.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TestContext::api("token/refresh/")))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "fresh"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;

    let http = ctx.client.http();
    let (a, b, c) = tokio::join!(
        http.get_json::<Summary>("summary/"),
        http.get_json::<Summary>("summary/"),
        http.get_json::<Summary>("summary/"),
    );

    for result in [a, b, c] {
        assert_eq!(result.expect("request should succeed after refresh").products, 12);
    }
    assert_eq!(ctx.client.refresher().exchanges(), 1);
    assert_eq!(
        ctx.client.refresher().last_outcome(),
        Some(RefreshState::Succeeded)
    );
    let access = ctx.client.session().access_token().expect("token stored");
    assert_eq!(access.expose_secret(), "fresh");
}

#[tokio::test]
async fn test_refresh_failure_expires_session_once() {
    let ctx = TestContext::signed_in("stale", "r1").await;
    let (expired, _subscription) = ctx.count_session_expired();

    Mock::given(method("GET"))
        .and(path(TestContext::api("summary/")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&ctx.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TestContext::api("token/refresh/")))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Token is invalid or expired"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;

    let http = ctx.client.http();
    let (a, b, c) = tokio::join!(
        http.get_json::<Summary>("summary/"),
        http.get_json::<Summary>("summary/"),
        http.get_json::<Summary>("summary/"),
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(ApiError::AuthExpired)));
    }
    assert_eq!(expired.load(Ordering::SeqCst), 1);
    assert!(!ctx.client.is_authenticated());
    assert!(!ctx.client.session().get().can_refresh());
    assert_eq!(
        ctx.client.refresher().last_outcome(),
        Some(RefreshState::Failed)
    );

    // Signed out now: a later 401 neither refreshes nor expires again.
    let later = http.get_json::<Summary>("summary/").await;
    assert!(matches!(later, Err(ApiError::AuthExpired)));
    assert_eq!(expired.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.client.refresher().exchanges(), 1);
}

#[tokio::test]
async fn test_retry_is_attempted_at_most_once() {
    let ctx = TestContext::signed_in("stale", "r1").await;

    Mock::given(method("GET"))
        .and(path(TestContext::api("summary/")))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&ctx.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TestContext::api("token/refresh/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "fresh"})))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let result = ctx.client.http().get_json::<Summary>("summary/").await;
    assert!(matches!(result, Err(ApiError::AuthExpired)));
}

// ============================================================================
// Login & Logout
// ============================================================================

#[tokio::test]
async fn test_wrong_password_is_unauthorized_not_expired() {
    let ctx = TestContext::new().await;
    let (expired, _subscription) = ctx.count_session_expired();

    Mock::given(method("POST"))
        .and(path(TestContext::api("login/")))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "No active account found with the given credentials"})),
        )
        .mount(&ctx.server)
        .await;
    Mock::given(method("POST"))
        .and(path(TestContext::api("token/refresh/")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ctx.server)
        .await;

    let result = ctx
        .client
        .login("alice", &SecretString::from("wrong".to_string()))
        .await;

    assert!(
        matches!(result, Err(ApiError::Unauthorized(msg)) if msg.starts_with("No active account"))
    );
    assert_eq!(expired.load(Ordering::SeqCst), 0);
    assert!(!ctx.client.is_authenticated());
}

#[tokio::test]
async fn test_login_then_logout() {
    let ctx = TestContext::new().await;

    Mock::given(method("POST"))
        .and(path(TestContext::api("login/")))
        .and(body_json(json!({"username": "alice", "password": "s3cret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a1", "refresh": "r1"})))
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path(TestContext::api("summary/")))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
        .expect(1)
        .mount(&ctx.server)
        .await;

    ctx.client
        .login("alice", &SecretString::from("s3cret".to_string()))
        .await
        .expect("login should succeed");
    assert!(ctx.client.is_authenticated());
    ctx.client
        .http()
        .get_json::<Summary>("summary/")
        .await
        .expect("authenticated request should succeed");

    ctx.client.logout().await.expect("logout should succeed");
    assert!(!ctx.client.is_authenticated());
    assert!(!ctx.client.session().get().can_refresh());
}
