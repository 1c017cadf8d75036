// Order lifecycle models
pub mod delivery_entity;
pub mod order;
pub mod order_entity;
pub mod order_item_entity;

// Read-only collaborators owned by the identity and catalog services
pub mod product_sku_entity;
pub mod user_entity;

pub use order::OrderStatus;

pub use delivery_entity::{Entity as Delivery, Model as DeliveryModel};
pub use order_entity::{Entity as Order, Model as OrderModel};
pub use order_item_entity::{Entity as OrderItem, Model as OrderItemModel};
pub use product_sku_entity::{Entity as ProductSku, Model as ProductSkuModel};
pub use user_entity::{Entity as User, Model as UserModel};
