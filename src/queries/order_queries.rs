use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, SelectStatement},
    ColumnTrait, Condition, EntityTrait, FromQueryResult, JoinType, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, RelationTrait, Select,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use crate::{
    auth::policy::OrderScope,
    db::DbPool,
    errors::ServiceError,
    models::{
        delivery_entity, order_entity, order_item_entity, product_sku_entity, user_entity,
        OrderModel, OrderStatus,
    },
};

/// Trait representing a generic asynchronous query.
#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    /// Executes the query using the provided database connection
    async fn execute(&self, db: &DbPool) -> Result<Self::Result, ServiceError>;
}

fn query_failed(query: &'static str) -> impl Fn(sea_orm::DbErr) -> ServiceError {
    move |e| {
        error!(query, "Query failed: {}", e);
        ServiceError::DatabaseError(e)
    }
}

/// Order as listed to its buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: String,
    pub status: OrderStatus,
    #[schema(value_type = String, example = "59.97")]
    pub total: Decimal,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub buyer_id: String,
}

impl From<OrderModel> for OrderSummary {
    fn from(order: OrderModel) -> Self {
        Self {
            id: order.id,
            status: order.status,
            total: order.total,
            address: order.address,
            created_at: order.created_at,
            buyer_id: order.buyer_id,
        }
    }
}

/// Order joined with the buyer's public profile. Credential columns are never selected.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailsRow {
    pub id: String,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub buyer_id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub buyer_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopSellingProduct {
    pub barcode: String,
    pub name: String,
    pub seller_id: String,
    pub total_quantity_sold: i64,
}

/// Order containing at least one of the seller's SKUs, with a summary of all its items.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SellerOrder {
    pub id: String,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub buyer_id: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub item_count: usize,
    /// `"Name (Variation)"` per line item, comma separated
    pub product_names: String,
}

#[derive(Debug, FromQueryResult)]
struct SellerOrderRow {
    id: String,
    status: OrderStatus,
    total: Decimal,
    address: String,
    created_at: DateTime<Utc>,
    buyer_id: String,
    username: String,
    email: String,
    full_name: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct ItemSummaryRow {
    order_id: String,
    variation_name: String,
    product_name: String,
}

/// Order ids containing at least one SKU of `seller_id`.
fn seller_order_ids(seller_id: &str) -> SelectStatement {
    order_item_entity::Entity::find()
        .select_only()
        .column(order_item_entity::Column::OrderId)
        .join(
            JoinType::InnerJoin,
            order_item_entity::Relation::ProductSku.def(),
        )
        .filter(product_sku_entity::Column::SellerId.eq(seller_id))
        .into_query()
}

fn shipper_order_ids(shipper_id: &str) -> SelectStatement {
    delivery_entity::Entity::find()
        .select_only()
        .column(delivery_entity::Column::OrderId)
        .filter(delivery_entity::Column::ShipperId.eq(shipper_id))
        .into_query()
}

/// Order ids with at least `min_items` line items.
fn orders_with_min_items(min_items: u64) -> SelectStatement {
    let item_count = Expr::col((order_item_entity::Entity, order_item_entity::Column::Id)).count();
    order_item_entity::Entity::find()
        .select_only()
        .column(order_item_entity::Column::OrderId)
        .group_by(order_item_entity::Column::OrderId)
        .having(Expr::expr(item_count).gte(i64::try_from(min_items).unwrap_or(i64::MAX)))
        .into_query()
}

fn apply_scope(query: Select<order_entity::Entity>, scope: &OrderScope) -> Select<order_entity::Entity> {
    match scope {
        OrderScope::All => query,
        OrderScope::Buyer(buyer_id) => {
            query.filter(order_entity::Column::BuyerId.eq(buyer_id.as_str()))
        }
        OrderScope::Seller(seller_id) => {
            query.filter(order_entity::Column::Id.in_subquery(seller_order_ids(seller_id)))
        }
        OrderScope::Shipper(shipper_id) => {
            query.filter(order_entity::Column::Id.in_subquery(shipper_order_ids(shipper_id)))
        }
    }
}

/// Orders placed by a buyer, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOrdersByBuyerQuery {
    pub buyer_id: String,
}

#[async_trait]
impl Query for GetOrdersByBuyerQuery {
    type Result = Vec<OrderSummary>;

    #[instrument(skip(self, db), fields(buyer_id = %self.buyer_id))]
    async fn execute(&self, db: &DbPool) -> Result<Self::Result, ServiceError> {
        debug!("Executing GetOrdersByBuyerQuery");

        let orders = order_entity::Entity::find()
            .filter(order_entity::Column::BuyerId.eq(self.buyer_id.as_str()))
            .order_by_desc(order_entity::Column::CreatedAt)
            .order_by_asc(order_entity::Column::Id)
            .all(db)
            .await
            .map_err(query_failed("orders by buyer"))?;

        Ok(orders.into_iter().map(OrderSummary::from).collect())
    }
}

/// Orders with buyer profile, newest first. `min_items` drops orders with
/// fewer line items.
#[derive(Debug, Clone)]
pub struct GetOrderDetailsQuery {
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    pub min_items: Option<u64>,
}

#[async_trait]
impl Query for GetOrderDetailsQuery {
    type Result = Vec<OrderDetailsRow>;

    #[instrument(skip(self, db), fields(scope = ?self.scope, status = ?self.status))]
    async fn execute(&self, db: &DbPool) -> Result<Self::Result, ServiceError> {
        debug!("Executing GetOrderDetailsQuery");

        let mut query = order_entity::Entity::find()
            .select_only()
            .columns([
                order_entity::Column::Id,
                order_entity::Column::Status,
                order_entity::Column::Total,
                order_entity::Column::Address,
                order_entity::Column::CreatedAt,
                order_entity::Column::BuyerId,
            ])
            .column_as(user_entity::Column::Username, "username")
            .column_as(user_entity::Column::Email, "email")
            .column_as(user_entity::Column::FullName, "full_name")
            .column_as(user_entity::Column::Address, "buyer_address")
            .join(JoinType::InnerJoin, order_entity::Relation::Buyer.def());

        query = apply_scope(query, &self.scope);

        if let Some(status) = self.status {
            query = query.filter(order_entity::Column::Status.eq(status));
        }
        if let Some(min_items) = self.min_items.filter(|n| *n > 0) {
            query = query.filter(order_entity::Column::Id.in_subquery(orders_with_min_items(min_items)));
        }

        query
            .order_by_desc(order_entity::Column::CreatedAt)
            .order_by_asc(order_entity::Column::Id)
            .into_model::<OrderDetailsRow>()
            .all(db)
            .await
            .map_err(query_failed("order details"))
    }
}

/// Best selling SKUs across delivered orders, by quantity sold.
#[derive(Debug, Clone, Default)]
pub struct GetTopSellingProductsQuery {
    pub min_quantity: Option<i64>,
    pub seller_id: Option<String>,
}

#[async_trait]
impl Query for GetTopSellingProductsQuery {
    type Result = Vec<TopSellingProduct>;

    #[instrument(skip(self, db), fields(seller_id = ?self.seller_id, min_quantity = ?self.min_quantity))]
    async fn execute(&self, db: &DbPool) -> Result<Self::Result, ServiceError> {
        debug!("Executing GetTopSellingProductsQuery");

        let quantity_sold = || {
            Expr::col((
                order_item_entity::Entity,
                order_item_entity::Column::Quantity,
            ))
            .sum()
        };

        let mut query = order_item_entity::Entity::find()
            .select_only()
            .column_as(product_sku_entity::Column::Barcode, "barcode")
            .column_as(product_sku_entity::Column::Name, "name")
            .column_as(product_sku_entity::Column::SellerId, "seller_id")
            .column_as(quantity_sold(), "total_quantity_sold")
            .join(JoinType::InnerJoin, order_item_entity::Relation::Order.def())
            .join(
                JoinType::InnerJoin,
                order_item_entity::Relation::ProductSku.def(),
            )
            .filter(order_entity::Column::Status.eq(OrderStatus::Delivered))
            .group_by(product_sku_entity::Column::Barcode)
            .group_by(product_sku_entity::Column::Name)
            .group_by(product_sku_entity::Column::SellerId);

        if let Some(seller_id) = &self.seller_id {
            query = query.filter(product_sku_entity::Column::SellerId.eq(seller_id.as_str()));
        }
        if let Some(min_quantity) = self.min_quantity.filter(|q| *q > 0) {
            query = query.having(Expr::expr(quantity_sold()).gte(min_quantity));
        }

        query
            .order_by_desc(quantity_sold())
            .order_by_asc(product_sku_entity::Column::Barcode)
            .into_model::<TopSellingProduct>()
            .all(db)
            .await
            .map_err(query_failed("top selling products"))
    }
}

/// Orders containing the seller's SKUs, newest first, one page at a time.
/// `search` matches an order id or buyer full name substring.
#[derive(Debug, Clone)]
pub struct GetSellerOrdersQuery {
    pub seller_id: String,
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
impl Query for GetSellerOrdersQuery {
    type Result = Vec<SellerOrder>;

    #[instrument(skip(self, db), fields(seller_id = %self.seller_id, limit = self.limit, offset = self.offset))]
    async fn execute(&self, db: &DbPool) -> Result<Self::Result, ServiceError> {
        debug!("Executing GetSellerOrdersQuery");

        let mut query = order_entity::Entity::find()
            .select_only()
            .columns([
                order_entity::Column::Id,
                order_entity::Column::Status,
                order_entity::Column::Total,
                order_entity::Column::Address,
                order_entity::Column::CreatedAt,
                order_entity::Column::BuyerId,
            ])
            .column_as(user_entity::Column::Username, "username")
            .column_as(user_entity::Column::Email, "email")
            .column_as(user_entity::Column::FullName, "full_name")
            .join(JoinType::InnerJoin, order_entity::Relation::Buyer.def())
            .filter(order_entity::Column::Id.in_subquery(seller_order_ids(&self.seller_id)));

        if let Some(status) = self.status {
            query = query.filter(order_entity::Column::Status.eq(status));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(order_entity::Column::Id.contains(search))
                    .add(user_entity::Column::FullName.contains(search)),
            );
        }

        let rows = query
            .order_by_desc(order_entity::Column::CreatedAt)
            .order_by_asc(order_entity::Column::Id)
            .limit(self.limit)
            .offset(self.offset)
            .into_model::<SellerOrderRow>()
            .all(db)
            .await
            .map_err(query_failed("seller orders"))?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let items = order_item_entity::Entity::find()
            .select_only()
            .column(order_item_entity::Column::OrderId)
            .column(order_item_entity::Column::VariationName)
            .column_as(product_sku_entity::Column::Name, "product_name")
            .join(
                JoinType::InnerJoin,
                order_item_entity::Relation::ProductSku.def(),
            )
            .filter(order_item_entity::Column::OrderId.is_in(order_ids))
            .order_by_asc(order_item_entity::Column::Id)
            .into_model::<ItemSummaryRow>()
            .all(db)
            .await
            .map_err(query_failed("seller order items"))?;

        let mut summaries: HashMap<String, Vec<String>> = HashMap::new();
        for item in items {
            summaries
                .entry(item.order_id)
                .or_default()
                .push(format!("{} ({})", item.product_name, item.variation_name));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let products = summaries.remove(&row.id).unwrap_or_default();
                SellerOrder {
                    buyer_name: row.full_name.unwrap_or(row.username),
                    buyer_email: row.email,
                    item_count: products.len(),
                    product_names: products.join(", "),
                    id: row.id,
                    status: row.status,
                    total: row.total,
                    address: row.address,
                    created_at: row.created_at,
                    buyer_id: row.buyer_id,
                }
            })
            .collect())
    }
}
