use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{debug, instrument};

use crate::{
    entities::commerce::{cart, cart_item, Cart, CartItem, Product},
    errors::OrderError,
};

/// One cart line as seen at checkout time, with catalog data resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: i32,
    pub product_name: String,
    pub product_sku: String,
    pub product_image: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("product {0} in cart no longer exists")]
    MissingProduct(i32),

    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i32, quantity: i32 },

    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<CartError> for OrderError {
    fn from(err: CartError) -> Self {
        OrderError::CartUnavailable(err.to_string())
    }
}

/// Source of the buyer's cart during checkout.
///
/// Both calls run on the checkout transaction so the snapshot and the clear
/// commit or roll back together with the order rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartSnapshotSource: Send + Sync {
    async fn snapshot(
        &self,
        txn: &DatabaseTransaction,
        user_id: i32,
    ) -> Result<Vec<CartLine>, CartError>;

    async fn clear(&self, txn: &DatabaseTransaction, user_id: i32) -> Result<(), CartError>;
}

/// Reads the cart tables directly.
#[derive(Clone, Default)]
pub struct SeaOrmCartSource;

impl SeaOrmCartSource {
    pub fn new() -> Self {
        Self
    }

    async fn find_cart(
        txn: &DatabaseTransaction,
        user_id: i32,
    ) -> Result<Option<cart::Model>, DbErr> {
        Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(txn)
            .await
    }
}

#[async_trait]
impl CartSnapshotSource for SeaOrmCartSource {
    #[instrument(skip(self, txn))]
    async fn snapshot(
        &self,
        txn: &DatabaseTransaction,
        user_id: i32,
    ) -> Result<Vec<CartLine>, CartError> {
        // No cart row yet means nothing was ever added
        let Some(cart) = Self::find_cart(txn, user_id).await? else {
            debug!(user_id, "No cart for user");
            return Ok(Vec::new());
        };

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::Id)
            .find_also_related(Product)
            .all(txn)
            .await?;

        rows.into_iter()
            .map(|(item, product)| {
                let product = product.ok_or(CartError::MissingProduct(item.product_id))?;
                if item.quantity <= 0 {
                    return Err(CartError::InvalidQuantity {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    });
                }
                Ok(CartLine {
                    product_id: product.id,
                    product_name: product.name,
                    product_sku: product.sku,
                    product_image: product.image.unwrap_or_default(),
                    quantity: item.quantity,
                    unit_price: product.price,
                })
            })
            .collect()
    }

    #[instrument(skip(self, txn))]
    async fn clear(&self, txn: &DatabaseTransaction, user_id: i32) -> Result<(), CartError> {
        if let Some(cart) = Self::find_cart(txn, user_id).await? {
            let result = CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(txn)
                .await?;
            debug!(user_id, cleared = result.rows_affected, "Cleared cart items");
        }
        Ok(())
    }
}
