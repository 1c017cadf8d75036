use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order line item. `price` is the unit price captured when the order was
/// placed and is never re-read from the catalog.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub order_id: String,

    pub barcode: String,

    pub variation_name: String,

    pub quantity: i32,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,
}

/// Order Item entity relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::models::order_entity::Entity",
        from = "Column::OrderId",
        to = "crate::models::order_entity::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Order,
    #[sea_orm(
        belongs_to = "crate::models::product_sku_entity::Entity",
        from = "Column::Barcode",
        to = "crate::models::product_sku_entity::Column::Barcode",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ProductSku,
}

impl Related<crate::models::order_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<crate::models::product_sku_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductSku.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
