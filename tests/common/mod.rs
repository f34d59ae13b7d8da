#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use storefront_orders::{
    app_router, build_components,
    config::AppConfig,
    db,
    entities::commerce::{cart, cart_item, product},
    events,
    notifications::{EmailMessage, Mailer, NotificationError, OrderNotifier},
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str =
    "Xk9vQ2mN7pL4wR8tY3uJ6hG1fD5sA0zC-storefront-orders-signing-key-for-tests";
pub const STORE_INBOX: &str = "store@example.com";
pub const BUYER_ID: i32 = 11;
pub const OTHER_BUYER_ID: i32 = 12;
pub const ADMIN_ID: i32 = 1;

/// Mailer that keeps every message so tests can assert on notifications.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Router plus state over a throwaway SQLite file, with one admin and two buyers.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub buyer_token: String,
    pub other_buyer_token: String,
    pub admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "redis://127.0.0.1:6379".to_string(),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.store_notification_email = STORE_INBOX.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let components = build_components(cfg, Arc::new(pool)).await;

        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Arc::new(OrderNotifier::new(mailer.clone(), STORE_INBOX));
        let event_task = tokio::spawn(events::process_events(components.events, notifier));

        let state = components.state;
        let buyer_token = state
            .auth
            .issue_token(BUYER_ID, vec![])
            .await
            .expect("buyer token")
            .token;
        let other_buyer_token = state
            .auth
            .issue_token(OTHER_BUYER_ID, vec![])
            .await
            .expect("second buyer token")
            .token;
        let admin_token = state
            .auth
            .issue_token(ADMIN_ID, vec!["admin".to_string()])
            .await
            .expect("admin token")
            .token;

        let router = app_router(state.clone(), components.health);

        Self {
            router,
            state,
            mailer,
            buyer_token,
            other_buyer_token,
            admin_token,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Issues the request and returns status plus parsed JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    /// Creates a product and puts `quantity` of it into the user's cart.
    pub async fn seed_cart(&self, user_id: i32, sku: &str, price: Decimal, quantity: i32) -> i32 {
        let now = Utc::now();
        let db = self.state.db.as_ref();

        let product = product::ActiveModel {
            name: Set(format!("Product {}", sku)),
            sku: Set(sku.to_string()),
            price: Set(price),
            image: Set(Some(format!("{}.png", sku.to_lowercase()))),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert product");

        let existing = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(db)
            .await
            .expect("load cart");
        let cart = match existing {
            Some(cart) => cart,
            None => cart::ActiveModel {
                user_id: Set(user_id),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await
            .expect("insert cart"),
        };

        cart_item::ActiveModel {
            cart_id: Set(cart.id),
            product_id: Set(product.id),
            quantity: Set(quantity),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert cart item");

        product.id
    }

    /// Seeds a cart and checks out, returning the created order JSON.
    pub async fn place_order(&self, user_id: i32, token: &str, sku: &str) -> Value {
        self.seed_cart(user_id, sku, Decimal::new(1000, 2), 2).await;
        let (status, body) = self
            .call(Method::POST, "/api/v1/orders", Some(order_payload()), Some(token))
            .await;
        assert_eq!(status, StatusCode::CREATED, "checkout failed: {body}");
        body["data"].clone()
    }

    /// Waits for the notification worker to deliver a message with `subject`.
    pub async fn wait_for_email(&self, subject: &str) -> bool {
        for _ in 0..50 {
            if self.mailer.subjects().iter().any(|s| s == subject) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_payload() -> Value {
    serde_json::json!({
        "shipping_address": "House 12, Road 5, Dhanmondi, Dhaka",
        "customer_name": "Rahim Uddin",
        "customer_phone": "01711000000",
        "payment_method": "bkash",
        "notes": "Call before delivery"
    })
}

pub fn proof_payload(transaction_id: &str, amount: &str) -> Value {
    serde_json::json!({
        "transaction_id": transaction_id,
        "payment_method": "bkash",
        "amount": amount,
        "screenshot": "https://cdn.example.com/proofs/1.png",
        "sender_number": "01711000000",
        "sender_name": "Rahim Uddin",
        "payment_date": "2024-05-01"
    })
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }
}

/// Decimal fields come back as strings; compare by value, not by scale.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not a decimal: {other}"),
    }
}
