use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, LoaderTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
        payment_proof::Entity as PaymentProofEntity,
    },
    errors::OrderError,
    events::{Event, EventSender},
    services::{
        commerce::{CartLine, CartSnapshotSource},
        order_status::ensure_buyer_can_cancel,
        payment_proofs::PaymentProofResponse,
    },
};

pub const PAYMENT_METHODS: [&str; 4] = ["bkash", "nagad", "rocket", "cod"];

fn validate_payment_method(method: &str) -> Result<(), ValidationError> {
    if PAYMENT_METHODS.contains(&method) {
        Ok(())
    } else {
        let mut err = ValidationError::new("payment_method");
        err.message = Some("Payment method must be one of bkash, nagad, rocket, cod".into());
        Err(err)
    }
}

/// Checkout details supplied by the buyer; the items come from their cart.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 500, message = "Shipping address is required"))]
    pub shipping_address: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Customer name is required"))]
    pub customer_name: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 20, message = "Customer phone is required"))]
    pub customer_phone: String,
    #[serde(default)]
    #[validate(custom = "validate_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub product_sku: String,
    pub product_image: String,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

impl From<OrderItemModel> for OrderItemResponse {
    fn from(item: OrderItemModel) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            product_sku: item.product_sku,
            product_image: item.product_image,
            quantity: item.quantity,
            price: item.price,
            subtotal: item.subtotal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: i32,
    pub order_number: String,
    pub user_id: i32,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub shipping_address: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub payment_method: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
    /// Present on admin views only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_proofs: Option<Vec<PaymentProofResponse>>,
}

impl OrderResponse {
    pub fn from_parts(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            total: order.total,
            shipping_address: order.shipping_address,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            payment_method: order.payment_method,
            notes: order.notes,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            payment_proofs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub count: usize,
}

impl From<Vec<OrderResponse>> for OrderListResponse {
    fn from(orders: Vec<OrderResponse>) -> Self {
        let count = orders.len();
        Self { orders, count }
    }
}

/// `ORD` + epoch millis + 4 random digits, backed by a unique index.
pub fn generate_order_number() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD{}{:04}", Utc::now().timestamp_millis(), suffix)
}

/// Sum of line subtotals; the value frozen on the order.
pub fn order_total(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::subtotal).sum()
}

/// Order aggregate: checkout, buyer reads and cancel, admin listing.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    cart: Arc<dyn CartSnapshotSource>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cart: Arc<dyn CartSnapshotSource>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            cart,
            event_sender,
        }
    }

    /// Turns the buyer's cart into an order.
    ///
    /// Order, items and the cart clear share one transaction. The
    /// notification is queued only after commit.
    #[instrument(skip(self, request), fields(user_id = user_id))]
    pub async fn create_order(
        &self,
        user_id: i32,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, OrderError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin checkout transaction");
            OrderError::from(e)
        })?;

        let lines = self.cart.snapshot(&txn, user_id).await.map_err(|e| {
            error!(error = %e, "Failed to read cart");
            OrderError::from(e)
        })?;

        if lines.is_empty() {
            warn!("Checkout attempted with an empty cart");
            return Err(OrderError::EmptyCart);
        }

        let order_number = generate_order_number();
        let total = order_total(&lines);

        let order = order::ActiveModel {
            user_id: Set(user_id),
            order_number: Set(order_number.clone()),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            total: Set(total),
            shipping_address: Set(request.shipping_address),
            customer_name: Set(request.customer_name),
            customer_phone: Set(request.customer_phone),
            payment_method: Set(request.payment_method),
            notes: Set(request.notes),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_number = %order_number, "Failed to insert order");
            OrderError::from(e)
        })?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                product_sku: Set(line.product_sku.clone()),
                product_image: Set(line.product_image.clone()),
                quantity: Set(line.quantity),
                price: Set(line.unit_price),
                subtotal: Set(line.subtotal()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        self.cart.clear(&txn, user_id).await.map_err(|e| {
            error!(error = %e, "Failed to clear cart");
            OrderError::from(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit checkout transaction");
            OrderError::from(e)
        })?;

        if let Err(e) = self.event_sender.send(Event::OrderCreated {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id,
            total,
        }) {
            warn!(error = %e, order_id = order.id, "Failed to enqueue OrderCreated event");
        }

        info!(
            order_id = order.id,
            order_number = %order.order_number,
            total = %total,
            items = items.len(),
            "Order created"
        );

        Ok(OrderResponse::from_parts(order, items))
    }

    /// The buyer's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_user_orders(&self, user_id: i32) -> Result<Vec<OrderResponse>, OrderError> {
        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let items = orders.load_many(OrderItemEntity, &*self.db).await?;

        Ok(orders
            .into_iter()
            .zip(items)
            .map(|(order, items)| OrderResponse::from_parts(order, items))
            .collect())
    }

    /// A single order; orders owned by someone else are reported as missing.
    #[instrument(skip(self))]
    pub async fn get_user_order(
        &self,
        user_id: i32,
        order_id: i32,
    ) -> Result<OrderResponse, OrderError> {
        let order = find_owned_order(&*self.db, user_id, order_id).await?;
        let items = load_items(&*self.db, order.id).await?;
        Ok(OrderResponse::from_parts(order, items))
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: i32,
        order_id: i32,
    ) -> Result<OrderResponse, OrderError> {
        let txn = self.db.begin().await?;

        let order = find_owned_order(&txn, user_id, order_id).await?;
        ensure_buyer_can_cancel(order.status).map_err(|e| {
            warn!(status = %order.status, "Cancel rejected");
            e
        })?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        let updated = active.update(&txn).await?;
        let items = load_items(&txn, updated.id).await?;

        txn.commit().await?;

        info!(order_id, "Order cancelled by buyer");
        Ok(OrderResponse::from_parts(updated, items))
    }

    /// Every order with items and proofs, newest first.
    #[instrument(skip(self))]
    pub async fn admin_list_orders(&self) -> Result<Vec<OrderResponse>, OrderError> {
        let orders = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let items = orders.load_many(OrderItemEntity, &*self.db).await?;
        let proofs = orders.load_many(PaymentProofEntity, &*self.db).await?;

        Ok(orders
            .into_iter()
            .zip(items)
            .zip(proofs)
            .map(|((order, items), proofs)| {
                let mut response = OrderResponse::from_parts(order, items);
                response.payment_proofs = Some(
                    proofs
                        .into_iter()
                        .map(PaymentProofResponse::from)
                        .collect(),
                );
                response
            })
            .collect())
    }

    /// Order with items, no ownership check. Used after admin updates.
    pub async fn get_order_any_owner(&self, order_id: i32) -> Result<OrderResponse, OrderError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        let items = load_items(&*self.db, order.id).await?;
        Ok(OrderResponse::from_parts(order, items))
    }
}

pub(crate) async fn find_owned_order<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    order_id: i32,
) -> Result<OrderModel, OrderError> {
    OrderEntity::find_by_id(order_id)
        .filter(order::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or(OrderError::OrderNotFound)
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
) -> Result<Vec<OrderItemModel>, OrderError> {
    Ok(OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::migrated_memory_pool;
    use crate::events::channel;
    use crate::services::commerce::{CartError, MockCartSnapshotSource};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use sea_orm::PaginatorTrait;

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            shipping_address: "House 12, Road 4, Dhaka".into(),
            customer_name: "Rahim".into(),
            customer_phone: "01700000000".into(),
            payment_method: "bkash".into(),
            notes: String::new(),
        }
    }

    fn line(product_id: i32, quantity: i32, unit_price: Decimal) -> CartLine {
        CartLine {
            product_id,
            product_name: format!("Product {}", product_id),
            product_sku: format!("SKU-{}", product_id),
            product_image: String::new(),
            quantity,
            unit_price,
        }
    }

    async fn service(
        cart: MockCartSnapshotSource,
    ) -> (
        OrderService,
        Arc<DatabaseConnection>,
        tokio::sync::mpsc::Receiver<Event>,
    ) {
        let db = Arc::new(migrated_memory_pool().await);
        let (sender, rx) = channel(8);
        (
            OrderService::new(db.clone(), Arc::new(cart), sender),
            db,
            rx,
        )
    }

    #[test]
    fn request_validation() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.payment_method = "paypal".into();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.shipping_address.clear();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.customer_phone = "0".repeat(21);
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.notes = "n".repeat(1001);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn order_number_format() {
        let a = generate_order_number();
        assert!(a.starts_with("ORD"));
        assert!(a[3..].chars().all(|c| c.is_ascii_digit()));
        assert!(a.len() >= 3 + 13 + 4);
    }

    #[tokio::test]
    async fn checkout_freezes_cart_into_order() {
        let mut cart = MockCartSnapshotSource::new();
        cart.expect_snapshot()
            .returning(|_, _| Ok(vec![line(1, 2, dec!(10.00)), line(2, 1, dec!(3.50))]));
        cart.expect_clear().times(1).returning(|_, _| Ok(()));

        let (svc, _db, mut rx) = service(cart).await;
        let order = svc.create_order(5, request()).await.unwrap();

        assert_eq!(order.total, dec!(23.50));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].subtotal, dec!(20.00));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);

        assert_matches!(
            rx.try_recv(),
            Ok(Event::OrderCreated { order_id, user_id: 5, total, .. })
                if order_id == order.id && total == dec!(23.50)
        );
    }

    #[tokio::test]
    async fn empty_cart_persists_nothing() {
        let mut cart = MockCartSnapshotSource::new();
        cart.expect_snapshot().returning(|_, _| Ok(vec![]));
        cart.expect_clear().never();

        let (svc, db, mut rx) = service(cart).await;
        assert_matches!(svc.create_order(5, request()).await, Err(OrderError::EmptyCart));
        assert_eq!(OrderEntity::find().count(&*db).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cart_failure_is_unavailable() {
        let mut cart = MockCartSnapshotSource::new();
        cart.expect_snapshot()
            .returning(|_, _| Err(CartError::MissingProduct(9)));

        let (svc, db, _rx) = service(cart).await;
        assert_matches!(
            svc.create_order(5, request()).await,
            Err(OrderError::CartUnavailable(_))
        );
        assert_eq!(OrderEntity::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_cart_clear_rolls_back_order() {
        let mut cart = MockCartSnapshotSource::new();
        cart.expect_snapshot()
            .returning(|_, _| Ok(vec![line(1, 1, dec!(5.00))]));
        cart.expect_clear()
            .returning(|_, _| Err(CartError::MissingProduct(1)));

        let (svc, db, mut rx) = service(cart).await;
        assert!(svc.create_order(5, request()).await.is_err());
        assert_eq!(OrderEntity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(OrderItemEntity::find().count(&*db).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_and_ownership_rules() {
        let mut cart = MockCartSnapshotSource::new();
        cart.expect_snapshot()
            .returning(|_, _| Ok(vec![line(1, 1, dec!(5.00))]));
        cart.expect_clear().returning(|_, _| Ok(()));

        let (svc, _db, _rx) = service(cart).await;
        let order = svc.create_order(5, request()).await.unwrap();

        assert_matches!(
            svc.get_user_order(6, order.id).await,
            Err(OrderError::OrderNotFound)
        );
        assert_matches!(
            svc.cancel_order(6, order.id).await,
            Err(OrderError::OrderNotFound)
        );

        let cancelled = svc.cancel_order(5, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.total, order.total);

        assert_matches!(
            svc.cancel_order(5, order.id).await,
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Cancelled
            })
        );

        let listed = svc.list_user_orders(5).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].payment_proofs.is_none());
        assert!(svc.list_user_orders(6).await.unwrap().is_empty());

        let admin = svc.admin_list_orders().await.unwrap();
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].payment_proofs.as_deref().map(<[_]>::len), Some(0));
    }
}
