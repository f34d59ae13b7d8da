//! Outbound order notifications.
//!
//! Messages are rendered from [`Event`]s by [`OrderNotifier`] and handed to a
//! [`Mailer`]. Delivery is best effort: callers log failures and move on.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::events::Event;

pub mod email;

pub use email::SmtpMailer;

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Plain-text email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

/// Mailer used when no SMTP relay is configured; writes messages to the log.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Notification email (log only)"
        );
        Ok(())
    }
}

/// Renders workflow events into emails for the store inbox.
#[derive(Clone)]
pub struct OrderNotifier {
    mailer: Arc<dyn Mailer>,
    store_inbox: String,
}

impl OrderNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, store_inbox: impl Into<String>) -> Self {
        Self {
            mailer,
            store_inbox: store_inbox.into(),
        }
    }

    pub fn render(&self, event: &Event) -> EmailMessage {
        let (subject, body) = match event {
            Event::OrderCreated { order_number, .. } => (
                "Order Created - Pending Payment".to_string(),
                format!(
                    "Your order has been created and is currently pending. Please complete your payment and submit the payment proof.\n\nOrder: {}",
                    order_number
                ),
            ),
            Event::PaymentProofSubmitted { order_number, .. } => (
                format!("Payment Proof Submitted - {}", order_number),
                format!(
                    "Payment proof has been submitted for order #{}. Please review and approve/reject.",
                    order_number
                ),
            ),
            Event::PaymentApproved { order_number, .. } => (
                format!("Payment Approved - {}", order_number),
                "Your payment has been approved and your order is confirmed. Thank you!"
                    .to_string(),
            ),
        };

        EmailMessage {
            to: self.store_inbox.clone(),
            subject,
            body,
        }
    }

    #[instrument(skip(self, event), fields(order_id = event.order_id()))]
    pub async fn notify(&self, event: &Event) -> Result<(), NotificationError> {
        self.mailer.send(self.render(event)).await
    }
}

/// Picks the SMTP mailer when a relay host is configured, otherwise logs.
pub fn build_mailer(config: &AppConfig) -> Result<Arc<dyn Mailer>, NotificationError> {
    match config.smtp_host.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(host) => {
            let mailer = SmtpMailer::new(
                host,
                config.smtp_port,
                config.smtp_username.clone(),
                config.smtp_password.clone(),
                config.mail_from.clone(),
            )?;
            info!(smtp_host = %host, "Using SMTP mailer for notifications");
            Ok(Arc::new(mailer))
        }
        None => Ok(Arc::new(LogMailer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn notifier_with(mailer: MockMailer) -> OrderNotifier {
        OrderNotifier::new(Arc::new(mailer), "store@example.com")
    }

    #[test]
    fn order_created_message_goes_to_store_inbox() {
        let notifier = OrderNotifier::new(Arc::new(LogMailer), "store@example.com");
        let message = notifier.render(&Event::OrderCreated {
            order_id: 1,
            order_number: "ORD1700000000000123".into(),
            user_id: 4,
            total: dec!(20.00),
        });

        assert_eq!(message.to, "store@example.com");
        assert_eq!(message.subject, "Order Created - Pending Payment");
        assert!(message
            .body
            .starts_with("Your order has been created and is currently pending."));
    }

    #[test]
    fn proof_submitted_message_names_order() {
        let notifier = OrderNotifier::new(Arc::new(LogMailer), "store@example.com");
        let message = notifier.render(&Event::PaymentProofSubmitted {
            order_id: 2,
            order_number: "ORD42".into(),
            proof_id: 9,
        });
        assert_eq!(
            message.body,
            "Payment proof has been submitted for order #ORD42. Please review and approve/reject."
        );
    }

    #[tokio::test]
    async fn notify_hands_rendered_message_to_mailer() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|m| {
                m.body == "Your payment has been approved and your order is confirmed. Thank you!"
            })
            .times(1)
            .returning(|_| Ok(()));

        let notifier = notifier_with(mailer);
        notifier
            .notify(&Event::PaymentApproved {
                order_id: 3,
                order_number: "ORD3".into(),
                user_id: 1,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn worker_keeps_running_after_delivery_failure() {
        let mut mailer = MockMailer::new();
        let mut seq = mockall::Sequence::new();
        mailer
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(NotificationError::Internal("relay down".into())));
        mailer
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let (sender, rx) = crate::events::channel(4);
        let worker = tokio::spawn(crate::events::process_events(
            rx,
            Arc::new(notifier_with(mailer)),
        ));

        for order_id in [1, 2] {
            sender
                .send(Event::PaymentApproved {
                    order_id,
                    order_number: format!("ORD{}", order_id),
                    user_id: 1,
                })
                .unwrap();
        }
        drop(sender);

        worker.await.unwrap();
    }

    #[test]
    fn log_mailer_is_default_without_smtp_host() {
        let config = AppConfig::new(
            "sqlite::memory:".into(),
            "redis://127.0.0.1:6379".into(),
            "x".repeat(64),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        assert!(build_mailer(&config).is_ok());
    }
}
