use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::notifications::OrderNotifier;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Enqueues an event without waiting for queue capacity.
    ///
    /// A full or closed queue is reported to the caller, which only logs it.
    pub fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .try_send(event)
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted by the order workflow after their transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i32,
        order_number: String,
        user_id: i32,
        total: Decimal,
    },
    PaymentProofSubmitted {
        order_id: i32,
        order_number: String,
        proof_id: i32,
    },
    PaymentApproved {
        order_id: i32,
        order_number: String,
        user_id: i32,
    },
}

impl Event {
    pub fn order_id(&self) -> i32 {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::PaymentProofSubmitted { order_id, .. }
            | Event::PaymentApproved { order_id, .. } => *order_id,
        }
    }
}

/// Creates the bounded notification queue.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the queue until every sender is dropped. Delivery failures are
/// logged and never retried.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<OrderNotifier>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let order_id = event.order_id();
        if let Err(e) = notifier.notify(&event).await {
            error!(
                order_id,
                error = %e,
                "Failed to deliver order notification"
            );
        }
    }

    info!("Event processing loop stopped");
}
