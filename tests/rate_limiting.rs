//! Per-client request budget.

mod common;

use common::{test_config, TestApp};
use reqwest::StatusCode;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn requests_beyond_budget_return_429() {
    let mut config = test_config();
    config.security.rate_limiting_enabled = true;
    config.security.rate_limit_requests_per_minute = 3;
    let app = TestApp::spawn_with(config).await;

    for _ in 0..3 {
        let response = app.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "3");
    }

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
#[serial]
async fn disabled_limiter_never_rejects() {
    let app = TestApp::spawn().await;

    for _ in 0..20 {
        let response = app.get("/health").await;
        assert!(response.status().is_success());
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}
