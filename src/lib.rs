//! Storefront Orders
//!
//! Order lifecycle, manual payment verification and session revocation for
//! the storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService, ADMIN_ROLE};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn with_message_keeps_payload() {
        let response = ApiResponse::success(3).with_message("Order cancelled successfully");
        assert_eq!(response.data, Some(3));
        assert_eq!(response.message.as_deref(), Some("Order cancelled successfully"));
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    let buyer = Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cancel", put(handlers::orders::cancel_order))
        .route(
            "/orders/:id/payment-proof",
            get(handlers::payment_proofs::get_payment_proof)
                .post(handlers::payment_proofs::submit_payment_proof)
                .put(handlers::payment_proofs::update_payment_proof),
        )
        .route("/auth/logout", post(handlers::auth::logout))
        .with_auth();

    let admin = Router::new()
        .route("/orders", get(handlers::admin::list_all_orders))
        .route(
            "/orders/:id/status",
            put(handlers::admin::update_order_status),
        )
        .route(
            "/payment-proofs/:id/review",
            put(handlers::admin::review_payment_proof),
        )
        .with_role(ADMIN_ROLE);

    Router::new()
        .route("/status", get(api_status))
        .merge(buyer)
        .nest("/admin", admin)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "service": "storefront-orders",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

/// Everything the router and the notification worker need.
pub struct AppComponents {
    pub state: AppState,
    pub health: Arc<health::HealthState>,
    pub events: tokio::sync::mpsc::Receiver<events::Event>,
}

/// Wires services, session store and the event queue from configuration.
pub async fn build_components(
    config: config::AppConfig,
    db: Arc<DatabaseConnection>,
) -> AppComponents {
    let (event_sender, event_rx) = events::channel(config.event_channel_capacity);

    let auth_config = auth::AuthConfig::new(config.jwt_secret.clone());
    let sessions = auth::build_session_store(&config, auth_config.token_lifetime).await;
    let auth = Arc::new(AuthService::new(auth_config, sessions.clone()));

    let app_services = handlers::AppServices::new(
        db.clone(),
        event_sender.clone(),
        Arc::new(services::commerce::SeaOrmCartSource::new()),
    );

    let health = Arc::new(health::HealthState::new(db.clone(), sessions));

    AppComponents {
        state: AppState {
            db,
            config,
            event_sender,
            auth,
            services: app_services,
        },
        health,
        events: event_rx,
    }
}

/// Full application router: API, health and Swagger UI, with the request id,
/// auth injection and HTTP tracing layers applied.
///
/// Transport layers (CORS, compression, timeouts) are added by the binary.
pub fn app_router(state: AppState, health: Arc<health::HealthState>) -> Router {
    let auth_service = state.auth.clone();

    Router::<AppState>::new()
        .route("/", get(|| async { "storefront-orders up" }))
        .nest("/api/v1", api_v1_routes())
        .nest("/health", health::health_routes(health))
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |State(auth): State<Arc<AuthService>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
