/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`) - last known status
 * - Readiness check (`/health/ready`) - checks the database and session store, 503 when the database is down
 * - Liveness check (`/health/live`) - always 200 while the process serves requests
 * - Detailed health check (`/health/details`) - per-component status
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::auth::SessionStore;

pub const DATABASE_COMPONENT: &str = "database";
pub const SESSION_STORE_COMPONENT: &str = "session_store";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

impl HealthStatus {
    fn status_code(self) -> StatusCode {
        match self {
            HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: HashMap<String, HealthDetail>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub sessions: Arc<dyn SessionStore>,
    pub health_cache: Arc<RwLock<HealthInfo>>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            db_pool,
            sessions,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: HashMap::new(),
            })),
            start_time: SystemTime::now(),
        }
    }

    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    /// Check every component and refresh the cached status.
    ///
    /// A session store outage degrades the service; a database outage takes
    /// it down.
    pub async fn update_health(&self) {
        let database = match self.db_pool.ping().await {
            Ok(_) => detail(HealthStatus::Up, None),
            Err(e) => {
                error!("Database health check failed: {}", e);
                detail(HealthStatus::Down, Some(e.to_string()))
            }
        };

        let sessions = match self.sessions.ping().await {
            Ok(_) => detail(HealthStatus::Up, None),
            Err(e) => {
                warn!("Session store health check failed: {}", e);
                detail(HealthStatus::Degraded, Some(e.to_string()))
            }
        };

        let mut health = self.health_cache.write().await;
        health.timestamp = Utc::now();
        health.uptime_seconds = self.uptime();
        health
            .details
            .insert(DATABASE_COMPONENT.to_string(), database);
        health
            .details
            .insert(SESSION_STORE_COMPONENT.to_string(), sessions);

        let any_down = health
            .details
            .values()
            .any(|detail| detail.status == HealthStatus::Down);
        let any_degraded = health
            .details
            .values()
            .any(|detail| detail.status == HealthStatus::Degraded);

        health.status = if any_down {
            HealthStatus::Down
        } else if any_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };
    }
}

fn detail(status: HealthStatus, message: Option<String>) -> HealthDetail {
    HealthDetail {
        status,
        message,
        timestamp: Utc::now(),
    }
}

pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
    }))
}

pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.health_cache.read().await;

    (
        health.status.status_code(),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;

    (
        health.status.status_code(),
        Json(json!({
            "ready": health.status != HealthStatus::Down,
            "status": health.status,
            "timestamp": health.timestamp,
        })),
    )
}

pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now(),
        })),
    )
}

pub async fn detailed_health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;

    (health.status.status_code(), Json(health.clone()))
}

/// Refreshes the cached status every 30 seconds
pub async fn run_health_checker(state: Arc<HealthState>) {
    info!("Starting periodic health checker");

    let mut interval = tokio::time::interval(Duration::from_secs(30));

    loop {
        interval.tick().await;
        state.update_health().await;

        let health = state.health_cache.read().await;
        if health.status != HealthStatus::Up {
            warn!("System health is not optimal: {:?}", health.status);

            for (name, detail) in &health.details {
                if detail.status != HealthStatus::Up {
                    warn!("Component {name} is not healthy: {:?}", detail.status);
                }
            }
        }
    }
}

/// Health routes, to be nested under `/health`
pub fn health_routes<S>(state: Arc<HealthState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/details", get(detailed_health))
        .route("/version", get(version_info))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{session_store::MockSessionStore, InMemorySessionStore, SessionStoreError};
    use crate::db::testing::migrated_memory_pool;

    #[tokio::test]
    async fn healthy_components_report_up() {
        let db = Arc::new(migrated_memory_pool().await);
        let state = HealthState::new(db, Arc::new(InMemorySessionStore::new()));

        state.update_health().await;
        let health = state.health_cache.read().await;
        assert_eq!(health.status, HealthStatus::Up);
        assert_eq!(health.details.len(), 2);
    }

    #[tokio::test]
    async fn session_store_outage_degrades_but_stays_ready() {
        let db = Arc::new(migrated_memory_pool().await);
        let mut sessions = MockSessionStore::new();
        sessions
            .expect_ping()
            .returning(|| Err(SessionStoreError::Backend("connection refused".into())));
        let state = HealthState::new(db, Arc::new(sessions));

        state.update_health().await;
        let health = state.health_cache.read().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.status.status_code(), StatusCode::OK);
        assert_eq!(
            health.details[SESSION_STORE_COMPONENT].message.as_deref(),
            Some("Session backend error: connection refused")
        );
    }

    #[test]
    fn down_maps_to_service_unavailable() {
        assert_eq!(
            HealthStatus::Down.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
