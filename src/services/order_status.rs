use std::str::FromStr;
use std::sync::Arc;

use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait};
use tracing::{error, info, instrument, warn};

use crate::{
    entities::order::{
        ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus,
    },
    errors::OrderError,
};

/// Targets reachable from `from` through the admin status update.
pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Confirmed, Processing, Cancelled],
        Confirmed => &[Processing, Shipped, Cancelled],
        Processing => &[Shipped, Cancelled],
        Shipped => &[Delivered],
        Delivered | Cancelled => &[],
    }
}

/// Validates if a status transition is allowed. Same-status moves are not.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Buyers may only cancel orders nobody has started working on.
pub fn ensure_buyer_can_cancel(current: OrderStatus) -> Result<(), OrderError> {
    if current == OrderStatus::Pending {
        Ok(())
    } else {
        Err(OrderError::InvalidTransition {
            from: current,
            to: OrderStatus::Cancelled,
        })
    }
}

pub fn parse_status(raw: &str) -> Result<OrderStatus, OrderError> {
    OrderStatus::from_str(raw.trim()).map_err(|_| OrderError::UnknownStatus(raw.to_string()))
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Admin status update, checked against the transition table
    #[instrument(skip(self), fields(order_id = order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: i32,
        new_status: &str,
    ) -> Result<OrderModel, OrderError> {
        let target = parse_status(new_status).map_err(|e| {
            warn!(status = new_status, "Rejected unknown order status");
            e
        })?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            OrderError::from(e)
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                warn!("Order not found");
                OrderError::OrderNotFound
            })?;

        let old_status = order.status;
        if !is_valid_transition(old_status, target) {
            warn!(from = %old_status, to = %target, "Invalid status transition");
            return Err(OrderError::InvalidTransition {
                from: old_status,
                to: target,
            });
        }

        let mut active: OrderActiveModel = order.into();
        active.status = Set(target);

        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to update order status");
            OrderError::from(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit status update");
            OrderError::from(e)
        })?;

        info!(from = %old_status, to = %target, "Order status updated");

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use OrderStatus::*;

    #[rstest]
    #[case(Pending, Confirmed, true)]
    #[case(Pending, Processing, true)]
    #[case(Pending, Cancelled, true)]
    #[case(Pending, Shipped, false)]
    #[case(Pending, Delivered, false)]
    #[case(Confirmed, Processing, true)]
    #[case(Confirmed, Shipped, true)]
    #[case(Confirmed, Cancelled, true)]
    #[case(Confirmed, Pending, false)]
    #[case(Processing, Shipped, true)]
    #[case(Processing, Cancelled, true)]
    #[case(Processing, Confirmed, false)]
    #[case(Shipped, Delivered, true)]
    #[case(Shipped, Cancelled, false)]
    #[case(Delivered, Cancelled, false)]
    #[case(Delivered, Pending, false)]
    #[case(Cancelled, Pending, false)]
    #[case(Cancelled, Confirmed, false)]
    fn transition_table(#[case] from: OrderStatus, #[case] to: OrderStatus, #[case] ok: bool) {
        assert_eq!(is_valid_transition(from, to), ok);
    }

    #[rstest]
    #[case(Pending)]
    #[case(Confirmed)]
    #[case(Processing)]
    #[case(Shipped)]
    #[case(Delivered)]
    #[case(Cancelled)]
    fn same_status_is_never_a_transition(#[case] status: OrderStatus) {
        assert!(!is_valid_transition(status, status));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(allowed_targets(Delivered).is_empty());
        assert!(allowed_targets(Cancelled).is_empty());
        assert!(Delivered.is_terminal() && Cancelled.is_terminal());
    }

    #[rstest]
    #[case(Confirmed)]
    #[case(Processing)]
    #[case(Shipped)]
    #[case(Delivered)]
    #[case(Cancelled)]
    fn buyer_cancel_only_from_pending(#[case] status: OrderStatus) {
        assert!(ensure_buyer_can_cancel(Pending).is_ok());
        assert_matches!(
            ensure_buyer_can_cancel(status),
            Err(OrderError::InvalidTransition { from, to: Cancelled }) if from == status
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn transitions_are_logged_as_fields() {
        use crate::entities::order::{ActiveModel, PaymentStatus};
        use rust_decimal_macros::dec;

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        let _guard = ::tracing::subscriber::set_default(subscriber);

        let db = Arc::new(crate::db::testing::migrated_memory_pool().await);
        let order = ActiveModel {
            user_id: Set(5),
            order_number: Set("ORD17000000000000001".into()),
            status: Set(Pending),
            payment_status: Set(PaymentStatus::Pending),
            total: Set(dec!(20.00)),
            shipping_address: Set("Dhaka".into()),
            customer_name: Set("Rahim".into()),
            customer_phone: Set("01700000000".into()),
            payment_method: Set("bkash".into()),
            notes: Set(String::new()),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();
        let svc = OrderStatusService::new(db);

        assert_matches!(
            svc.update_status(order.id, "delivered").await,
            Err(OrderError::InvalidTransition { .. })
        );
        svc.update_status(order.id, "confirmed").await.unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        let rejected = lines
            .iter()
            .find(|l| l["fields"]["message"] == "Invalid status transition")
            .expect("rejection logged");
        assert_eq!(rejected["fields"]["from"], "pending");
        assert_eq!(rejected["fields"]["to"], "delivered");

        let applied = lines
            .iter()
            .find(|l| l["fields"]["message"] == "Order status updated")
            .expect("update logged");
        assert_eq!(applied["fields"]["from"], "pending");
        assert_eq!(applied["fields"]["to"], "confirmed");
        assert_eq!(applied["span"]["order_id"], order.id);
    }

    #[test]
    fn parses_known_statuses_only() {
        assert_eq!(parse_status("shipped").unwrap(), Shipped);
        assert_eq!(parse_status(" delivered ").unwrap(), Delivered);
        assert_matches!(parse_status("lost_in_transit"), Err(OrderError::UnknownStatus(s)) if s == "lost_in_transit");
    }
}
