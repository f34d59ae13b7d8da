mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, BUYER_ID};

#[tokio::test]
async fn new_login_revokes_previous_token() {
    let app = TestApp::new().await;

    let (status, _) = app
        .call(Method::GET, "/api/v1/orders", None, Some(&app.buyer_token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let fresh = app
        .state
        .auth
        .issue_token(BUYER_ID, vec![])
        .await
        .expect("second login");

    let (status, body) = app
        .call(Method::GET, "/api/v1/orders", None, Some(&app.buyer_token))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_REVOKED_TOKEN");

    let (status, _) = app
        .call(Method::GET, "/api/v1/orders", None, Some(&fresh.token))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_revokes_the_presented_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(Method::POST, "/api/v1/auth/logout", None, Some(&app.buyer_token))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["data"]["token_id"].is_string());

    let (status, _) = app
        .call(Method::GET, "/api/v1/orders", None, Some(&app.buyer_token))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other users are unaffected
    let (status, _) = app
        .call(
            Method::GET,
            "/api/v1/orders",
            None,
            Some(&app.other_buyer_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn forced_invalidation_locks_out_current_session() {
    let app = TestApp::new().await;

    let revoked = app.state.auth.force_invalidate_all(BUYER_ID).await.unwrap();
    assert!(revoked.is_some());

    let (status, _) = app
        .call(Method::GET, "/api/v1/orders", None, Some(&app.buyer_token))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.state.auth.force_invalidate_all(BUYER_ID).await.unwrap(), None);
}

#[tokio::test]
async fn health_endpoints_report_up() {
    let app = TestApp::new().await;

    let (status, _) = app.call(Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.call(Method::GET, "/health/details", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.to_string().contains("database"));

    let (status, body) = app.call(Method::GET, "/health/version", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn api_status_is_public_and_carries_request_id() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/status", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = common::response_json(response).await;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["service"], "storefront-orders");
    assert_eq!(body["data"]["environment"], "test");
}
