use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User record owned by the identity service. Only read here: for role
/// resolution and for the buyer profile columns of order projections.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub username: String,

    pub email: String,

    pub full_name: Option<String>,

    pub address: Option<String>,

    pub role: String,

    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::models::order_entity::Entity")]
    Orders,
}

impl Related<crate::models::order_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
