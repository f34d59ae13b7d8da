mod common;

use axum::http::{Method, StatusCode};
use common::{proof_payload, TestApp, BUYER_ID, OTHER_BUYER_ID};
use serde_json::{json, Value};

async fn set_status(app: &TestApp, order_id: &Value, status: &str) -> (StatusCode, Value) {
    app.call(
        Method::PUT,
        &format!("/api/v1/admin/orders/{}/status", order_id),
        Some(json!({ "status": status })),
        Some(&app.admin_token),
    )
    .await
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER_ID, &app.buyer_token, "A-1").await;

    let (status, body) = app
        .call(Method::GET, "/api/v1/admin/orders", None, Some(&app.buyer_token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "AUTH_INSUFFICIENT_PERMISSIONS");

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order["id"]),
            Some(json!({ "status": "shipped" })),
            Some(&app.buyer_token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::GET, "/api/v1/admin/orders", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_walks_order_through_fulfilment() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER_ID, &app.buyer_token, "A-1").await;

    for next in ["confirmed", "processing", "shipped", "delivered"] {
        let (status, body) = set_status(&app, &order["id"], next).await;
        assert_eq!(status, StatusCode::OK, "{next}: {body}");
        assert_eq!(body["data"]["status"], next);
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    }

    // Delivered is terminal
    let (status, body) = set_status(&app, &order["id"], "cancelled").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("delivered"));
}

#[tokio::test]
async fn status_updates_reject_bad_input() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER_ID, &app.buyer_token, "A-1").await;

    let (status, body) = set_status(&app, &order["id"], "teleported").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("teleported"));

    // Skipping ahead from pending is not a listed transition
    let (status, _) = set_status(&app, &order["id"], "delivered").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = set_status(&app, &json!(987654), "confirmed").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/orders/{}", order["id"]),
            None,
            Some(&app.buyer_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
}

#[tokio::test]
async fn admin_listing_spans_users_and_includes_proofs() {
    let app = TestApp::new().await;
    let first = app.place_order(BUYER_ID, &app.buyer_token, "A-1").await;
    let second = app
        .place_order(OTHER_BUYER_ID, &app.other_buyer_token, "B-1")
        .await;

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/orders/{}/payment-proof", first["id"]),
            Some(proof_payload("TXN-001", "20.00")),
            Some(&app.buyer_token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::GET, "/api/v1/admin/orders", None, Some(&app.admin_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);

    let orders = body["data"]["orders"].as_array().unwrap();
    assert_eq!(orders[0]["id"], second["id"]);

    let with_proof = orders.iter().find(|o| o["id"] == first["id"]).unwrap();
    let proofs = with_proof["payment_proofs"].as_array().unwrap();
    assert_eq!(proofs.len(), 1);
    assert_eq!(proofs[0]["transaction_id"], "TXN-001");

    let without_proof = orders.iter().find(|o| o["id"] == second["id"]).unwrap();
    assert_eq!(without_proof["payment_proofs"].as_array().unwrap().len(), 0);
}
