pub mod admin;
pub mod auth;
pub mod common;
pub mod orders;
pub mod payment_proofs;

use std::sync::Arc;

use crate::events::EventSender;
use crate::services::{
    commerce::CartSnapshotSource, order_status::OrderStatusService, orders::OrderService,
    payment_proofs::PaymentProofService,
};
use sea_orm::DatabaseConnection;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payment_proofs: Arc<PaymentProofService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        cart: Arc<dyn CartSnapshotSource>,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                cart,
                event_sender.clone(),
            )),
            order_status: Arc::new(OrderStatusService::new(db_pool.clone())),
            payment_proofs: Arc::new(PaymentProofService::new(db_pool, event_sender)),
        }
    }
}
