use crate::models::order::OrderStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order entity model.
///
/// `total` is derived from the order's line items and is only ever written by
/// the repository's total recomputation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub buyer_id: String,

    pub address: String,

    pub status: OrderStatus,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total: Decimal,

    pub created_at: DateTime<Utc>,
}

/// Order entity relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::models::order_item_entity::Entity")]
    OrderItems,
    #[sea_orm(has_many = "crate::models::delivery_entity::Entity")]
    Deliveries,
    #[sea_orm(
        belongs_to = "crate::models::user_entity::Entity",
        from = "Column::BuyerId",
        to = "crate::models::user_entity::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Buyer,
}

impl Related<crate::models::order_item_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<crate::models::delivery_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deliveries.def()
    }
}

impl Related<crate::models::user_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Buyer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.buyer_id == user_id
    }
}
