/// Cart access used by checkout
pub mod cart_service;

pub use cart_service::{CartError, CartLine, CartSnapshotSource, SeaOrmCartSource};
#[cfg(test)]
pub use cart_service::MockCartSnapshotSource;
