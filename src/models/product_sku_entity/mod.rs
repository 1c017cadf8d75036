use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog SKU, owned by the catalog service. Orders only need the product
/// name and the selling seller.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_skus")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub barcode: String,

    pub name: String,

    pub seller_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::models::order_item_entity::Entity")]
    OrderItems,
}

impl Related<crate::models::order_item_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
