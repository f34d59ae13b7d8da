use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
        payment_proof::{self, Entity as PaymentProofEntity, Model as PaymentProofModel, ProofStatus},
    },
    errors::OrderError,
    events::{Event, EventSender},
    services::orders::find_owned_order,
};

fn validate_non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount < Decimal::ZERO {
        let mut err = ValidationError::new("amount");
        err.message = Some("Amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Buyer-supplied evidence of an off-platform payment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PaymentProofRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Transaction id is required"))]
    pub transaction_id: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 20, message = "Payment method is required"))]
    pub payment_method: String,
    #[validate(required, custom = "validate_non_negative")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    #[validate(length(min = 1, max = 500, message = "Screenshot is required"))]
    pub screenshot: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 20, message = "Sender number is required"))]
    pub sender_number: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Sender name is required"))]
    pub sender_name: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "Payment date is required"))]
    pub payment_date: String,
}

/// Validated proof fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentProofInput {
    pub transaction_id: String,
    pub payment_method: String,
    pub amount: Decimal,
    pub screenshot: String,
    pub sender_number: String,
    pub sender_name: String,
    pub payment_date: String,
}

impl PaymentProofRequest {
    /// Call after `validate()`; a missing amount has already been rejected.
    pub fn into_input(self) -> PaymentProofInput {
        PaymentProofInput {
            transaction_id: self.transaction_id,
            payment_method: self.payment_method,
            amount: self.amount.unwrap_or_default(),
            screenshot: self.screenshot,
            sender_number: self.sender_number,
            sender_name: self.sender_name,
            payment_date: self.payment_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReviewPaymentProofRequest {
    /// `approved` or `rejected`
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Admin notes must be at most 1000 characters"))]
    pub admin_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentProofResponse {
    pub id: i32,
    pub order_id: i32,
    pub transaction_id: String,
    pub payment_method: String,
    pub amount: Decimal,
    pub screenshot: String,
    pub sender_number: String,
    pub sender_name: String,
    pub payment_date: String,
    pub status: ProofStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentProofModel> for PaymentProofResponse {
    fn from(proof: PaymentProofModel) -> Self {
        Self {
            id: proof.id,
            order_id: proof.order_id,
            transaction_id: proof.transaction_id,
            payment_method: proof.payment_method,
            amount: proof.amount,
            screenshot: proof.screenshot,
            sender_number: proof.sender_number,
            sender_name: proof.sender_name,
            payment_date: proof.payment_date,
            status: proof.status,
            admin_notes: proof.admin_notes,
            reviewed_by: proof.reviewed_by,
            reviewed_at: proof.reviewed_at,
            created_at: proof.created_at,
            updated_at: proof.updated_at,
        }
    }
}

/// Only terminal decisions are accepted from a reviewer.
pub fn parse_review_decision(raw: &str) -> Result<ProofStatus, OrderError> {
    match ProofStatus::from_str(raw.trim()) {
        Ok(status @ (ProofStatus::Approved | ProofStatus::Rejected)) => Ok(status),
        _ => Err(OrderError::InvalidReviewDecision(raw.to_string())),
    }
}

/// Payment proof submission by buyers and one-time review by admins.
#[derive(Clone)]
pub struct PaymentProofService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl PaymentProofService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(user_id = user_id, order_id = order_id))]
    pub async fn submit(
        &self,
        user_id: i32,
        order_id: i32,
        input: PaymentProofInput,
    ) -> Result<PaymentProofResponse, OrderError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            OrderError::from(e)
        })?;

        let order = find_owned_order(&txn, user_id, order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::OrderCancelled);
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(OrderError::AlreadyPaid);
        }

        let pending = PaymentProofEntity::find()
            .filter(payment_proof::Column::OrderId.eq(order.id))
            .filter(payment_proof::Column::Status.eq(ProofStatus::Pending))
            .count(&txn)
            .await?;
        if pending > 0 {
            warn!("Payment proof already awaiting review");
            return Err(OrderError::ProofAlreadyPending);
        }

        let proof = payment_proof::ActiveModel {
            order_id: Set(order.id),
            transaction_id: Set(input.transaction_id),
            payment_method: Set(input.payment_method),
            amount: Set(input.amount),
            screenshot: Set(input.screenshot),
            sender_number: Set(input.sender_number),
            sender_name: Set(input.sender_name),
            payment_date: Set(input.payment_date),
            status: Set(ProofStatus::Pending),
            admin_notes: Set(None),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit payment proof");
            OrderError::from(e)
        })?;

        if let Err(e) = self.event_sender.send(Event::PaymentProofSubmitted {
            order_id: order.id,
            order_number: order.order_number.clone(),
            proof_id: proof.id,
        }) {
            warn!(error = %e, "Failed to enqueue PaymentProofSubmitted event");
        }

        info!(proof_id = proof.id, "Payment proof submitted");
        Ok(proof.into())
    }

    /// Latest proof on one of the buyer's orders.
    #[instrument(skip(self))]
    pub async fn get_latest(
        &self,
        user_id: i32,
        order_id: i32,
    ) -> Result<PaymentProofResponse, OrderError> {
        let order = find_owned_order(&*self.db, user_id, order_id).await?;
        Ok(latest_proof(&*self.db, order.id).await?.into())
    }

    /// Replaces the fields of the latest proof while it is still pending.
    #[instrument(skip(self, input), fields(user_id = user_id, order_id = order_id))]
    pub async fn update(
        &self,
        user_id: i32,
        order_id: i32,
        input: PaymentProofInput,
    ) -> Result<PaymentProofResponse, OrderError> {
        let txn = self.db.begin().await?;

        let order = find_owned_order(&txn, user_id, order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::OrderCancelled);
        }
        let proof = latest_proof(&txn, order.id).await?;
        if proof.status != ProofStatus::Pending {
            warn!(proof_id = proof.id, status = %proof.status, "Proof no longer editable");
            return Err(OrderError::ProofAlreadyReviewed);
        }

        let mut active: payment_proof::ActiveModel = proof.into();
        active.transaction_id = Set(input.transaction_id);
        active.payment_method = Set(input.payment_method);
        active.amount = Set(input.amount);
        active.screenshot = Set(input.screenshot);
        active.sender_number = Set(input.sender_number);
        active.sender_name = Set(input.sender_name);
        active.payment_date = Set(input.payment_date);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(proof_id = updated.id, "Payment proof updated");
        Ok(updated.into())
    }

    /// One-time admin decision on a pending proof.
    ///
    /// The proof is claimed with a write conditional on `pending`, so of two
    /// concurrent reviews exactly one matches a row. Approval marks the order
    /// paid and confirms a pending order in the same transaction; a cancelled
    /// order rolls the whole review back.
    #[instrument(skip(self, admin_notes), fields(proof_id = proof_id, reviewer = admin_id))]
    pub async fn review(
        &self,
        admin_id: i32,
        proof_id: i32,
        decision: &str,
        admin_notes: String,
    ) -> Result<PaymentProofResponse, OrderError> {
        let decision = parse_review_decision(decision)?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin review transaction");
            OrderError::from(e)
        })?;

        let now = Utc::now();
        let claimed = PaymentProofEntity::update_many()
            .set(payment_proof::ActiveModel {
                status: Set(decision),
                admin_notes: Set(Some(admin_notes)),
                reviewed_by: Set(Some(admin_id)),
                reviewed_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(payment_proof::Column::Id.eq(proof_id))
            .filter(payment_proof::Column::Status.eq(ProofStatus::Pending))
            .exec(&txn)
            .await?;

        let reviewed = PaymentProofEntity::find_by_id(proof_id)
            .one(&txn)
            .await?
            .ok_or(OrderError::ProofNotFound)?;
        if claimed.rows_affected == 0 {
            warn!(status = %reviewed.status, "Proof already reviewed");
            return Err(OrderError::ProofAlreadyReviewed);
        }

        let approved_order = if decision == ProofStatus::Approved {
            // Conditional on the row so a cancellation committed meanwhile wins
            let paid = OrderEntity::update_many()
                .set(order::ActiveModel {
                    payment_status: Set(PaymentStatus::Paid),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(order::Column::Id.eq(reviewed.order_id))
                .filter(order::Column::Status.ne(OrderStatus::Cancelled))
                .exec(&txn)
                .await?;
            if paid.rows_affected == 0 {
                warn!(order_id = reviewed.order_id, "Refusing to approve payment on cancelled order");
                return Err(OrderError::OrderCancelled);
            }

            OrderEntity::update_many()
                .set(order::ActiveModel {
                    status: Set(OrderStatus::Confirmed),
                    ..Default::default()
                })
                .filter(order::Column::Id.eq(reviewed.order_id))
                .filter(order::Column::Status.eq(OrderStatus::Pending))
                .exec(&txn)
                .await?;

            Some(
                OrderEntity::find_by_id(reviewed.order_id)
                    .one(&txn)
                    .await?
                    .ok_or(OrderError::OrderNotFound)?,
            )
        } else {
            None
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit review");
            OrderError::from(e)
        })?;

        if let Some(order) = approved_order {
            if let Err(e) = self.event_sender.send(Event::PaymentApproved {
                order_id: order.id,
                order_number: order.order_number.clone(),
                user_id: order.user_id,
            }) {
                warn!(error = %e, "Failed to enqueue PaymentApproved event");
            }
        }

        info!(decision = %decision, order_id = reviewed.order_id, "Payment proof reviewed");
        Ok(reviewed.into())
    }
}

async fn latest_proof<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
) -> Result<PaymentProofModel, OrderError> {
    PaymentProofEntity::find()
        .filter(payment_proof::Column::OrderId.eq(order_id))
        .order_by_desc(payment_proof::Column::Id)
        .one(conn)
        .await?
        .ok_or(OrderError::ProofNotFound)
}
