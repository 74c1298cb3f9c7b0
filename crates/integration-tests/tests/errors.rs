//! Status code mapping seen through the product endpoints.
//!
//! Run with: cargo test -p staxtrade-integration-tests --test errors

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::json;
use staxtrade_client::ApiError;
use staxtrade_core::{BrandId, ProductId, ProductInput, ProductQuery};
use staxtrade_integration_tests::TestContext;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn input() -> ProductInput {
    ProductInput {
        name: "Widget".to_string(),
        brand: BrandId::new(1),
        price: Decimal::from_str("4.99").expect("decimal"),
        stock: ProductInput::DEFAULT_STOCK,
    }
}

#[tokio::test]
async fn test_missing_product_is_not_found() {
    let ctx = TestContext::signed_in("a1", "r1").await;
    Mock::given(method("GET"))
        .and(path(TestContext::api("products/99/")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&ctx.server)
        .await;

    let result = ctx.client.get_product(ProductId::new(99)).await;
    assert!(matches!(result, Err(ApiError::NotFound(ref p)) if p == "products/99/"));
    assert_eq!(result.err().and_then(|e| e.status()), Some(404));
}

#[tokio::test]
async fn test_field_errors_are_validation() {
    let ctx = TestContext::signed_in("a1", "r1").await;
    Mock::given(method("POST"))
        .and(path(TestContext::api("products/")))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"name": ["This field may not be blank."]})),
        )
        .mount(&ctx.server)
        .await;

    let result = ctx.client.create_product(&input()).await;
    let Err(ApiError::Validation { fields, .. }) = result else {
        panic!("expected a validation error, got {result:?}");
    };
    assert_eq!(
        fields.get("name").map(Vec::as_slice),
        Some(["This field may not be blank.".to_string()].as_slice())
    );
}

#[tokio::test]
async fn test_server_errors_are_retryable_by_user() {
    let ctx = TestContext::signed_in("a1", "r1").await;
    Mock::given(method("GET"))
        .and(path(TestContext::api("products/")))
        .respond_with(ResponseTemplate::new(502))
        .mount(&ctx.server)
        .await;

    let error = ctx
        .client
        .list_products(&ProductQuery::default())
        .await
        .expect_err("502 should fail");
    assert!(matches!(error, ApiError::Server { status: 502 }));
    assert!(error.is_retryable_by_user());
}

#[tokio::test]
async fn test_list_products_sends_filters() {
    let ctx = TestContext::signed_in("a1", "r1").await;
    Mock::given(method("GET"))
        .and(path(TestContext::api("products/")))
        .and(query_param("search", "wid"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 21,
            "next": null,
            "previous": "http://localhost/api/products/?search=wid",
            "results": [{
                "id": 21,
                "name": "Widget",
                "brand": 1,
                "brand_name": "Acme",
                "price": "4.99",
                "stock": 50
            }]
        })))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let query = ProductQuery {
        page: Some(2),
        search: Some("wid".to_string()),
        ..ProductQuery::default()
    };
    let page = ctx.client.list_products(&query).await.expect("page");
    assert_eq!(page.count, 21);
    assert_eq!(page.results.len(), 1);
}

#[tokio::test]
async fn test_stock_adjustment_posts_amount() {
    let ctx = TestContext::signed_in("a1", "r1").await;
    Mock::given(method("POST"))
        .and(path(TestContext::api("products/21/adjust_stock/")))
        .and(body_json(json!({"amount": -5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stock": 45})))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let level = ctx
        .client
        .adjust_stock(ProductId::new(21), -5)
        .await
        .expect("adjusted");
    assert_eq!(level.stock, 45);
}
