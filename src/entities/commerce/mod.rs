//! Cart-side tables read at checkout. The cart and catalog services own writes.
pub mod cart;
pub mod cart_item;
pub mod product;

pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use product::{Entity as Product, Model as ProductModel};
