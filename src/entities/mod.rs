pub mod commerce;
pub mod order;
pub mod order_item;
pub mod payment_proof;

pub use order::{Entity as Order, Model as OrderModel, OrderStatus, PaymentStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment_proof::{Entity as PaymentProof, Model as PaymentProofModel, ProofStatus};
