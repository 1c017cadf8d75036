use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Delivery claim binding a shipper to an order.
///
/// Created with both timestamps null when the order is claimed;
/// `departure_time` is stamped when delivery starts and `finish_time` when it
/// is confirmed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deliveries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub shipper_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub order_id: String,

    pub departure_time: Option<DateTime<Utc>>,

    pub finish_time: Option<DateTime<Utc>>,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub shipping_fee: Option<Decimal>,
}

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
}

impl Related<crate::models::order_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
