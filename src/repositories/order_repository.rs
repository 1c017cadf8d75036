use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Set,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::db::with_transaction;
use crate::errors::ServiceError;
use crate::ids::IdGenerator;
use crate::models::{
    delivery_entity, order_entity, order_item_entity, product_sku_entity, DeliveryModel,
    OrderItemModel, OrderModel, OrderStatus,
};

use super::{BaseRepository, Repository};

/// Line item of a new order. `price` is the unit price at purchase time.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub barcode: String,
    pub variation_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: String,
    pub address: String,
    pub status: OrderStatus,
    pub item: NewLineItem,
}

/// Fields of an order update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub address: Option<String>,
}

impl OrderChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.address.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Timestamp of a delivery claim to set to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStamp {
    Departure,
    Finish,
}

fn logged(operation: &'static str) -> impl Fn(DbErr) -> ServiceError {
    move |e| {
        error!(operation, "Database error: {}", e);
        ServiceError::DatabaseError(e)
    }
}

/// Order Store: persistence of orders, their line items and delivery claims.
///
/// Methods taking `&self` run on the pool and open their own transaction when
/// they write more than one statement. The associated functions generic over
/// `ConnectionTrait` are the primitives the lifecycle engine composes inside
/// its own transactions.
pub struct OrderRepository {
    base: BaseRepository,
    ids: Arc<dyn IdGenerator>,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            base: BaseRepository::new(db),
            ids,
        }
    }

    fn db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, order_id: &str) -> Result<Option<OrderModel>, ServiceError> {
        Self::find_in(self.db(), order_id).await
    }

    /// Find an order together with all of its line items
    pub async fn find_with_items(
        &self,
        order_id: &str,
    ) -> Result<Option<OrderWithItems>, ServiceError> {
        let Some(order) = Self::find_in(self.db(), order_id).await? else {
            return Ok(None);
        };
        let items = Self::items_in(self.db(), order_id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// Stored total of an order
    pub async fn get_total_by_order_id(&self, order_id: &str) -> Result<Decimal, ServiceError> {
        Self::find_in(self.db(), order_id)
            .await?
            .map(|order| order.total)
            .ok_or_else(|| ServiceError::order_not_found(order_id))
    }

    /// Inserts the order with a zero total, inserts its line item and then
    /// derives the total from the stored items, all in one transaction.
    #[instrument(skip(self, new_order), fields(buyer_id = %new_order.buyer_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderWithItems, ServiceError> {
        let order_id = self.ids.next_id();
        let item_id = self.ids.next_id();

        with_transaction(self.db(), move |txn| {
            Box::pin(async move {
                order_entity::ActiveModel {
                    id: Set(order_id.clone()),
                    buyer_id: Set(new_order.buyer_id),
                    address: Set(new_order.address),
                    status: Set(new_order.status),
                    total: Set(Decimal::ZERO),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await
                .map_err(logged("insert order"))?;

                let item = order_item_entity::ActiveModel {
                    id: Set(item_id),
                    order_id: Set(order_id.clone()),
                    barcode: Set(new_order.item.barcode),
                    variation_name: Set(new_order.item.variation_name),
                    quantity: Set(new_order.item.quantity),
                    price: Set(new_order.item.price),
                }
                .insert(txn)
                .await
                .map_err(logged("insert order item"))?;

                Self::recompute_total(txn, &order_id).await?;

                let order = Self::find_in(txn, &order_id)
                    .await?
                    .ok_or_else(|| ServiceError::order_not_found(&order_id))?;

                debug!(order_id = %order.id, total = %order.total, "Order inserted");
                Ok(OrderWithItems {
                    order,
                    items: vec![item],
                })
            })
        })
        .await
    }

    /// Applies the supplied fields. With `allowed_from`, the write only
    /// happens while the order is in one of those statuses.
    #[instrument(skip(self, changes))]
    pub async fn update_order(
        &self,
        order_id: &str,
        changes: OrderChanges,
        allowed_from: Option<&'static [OrderStatus]>,
    ) -> Result<OrderModel, ServiceError> {
        if changes.is_empty() {
            return Err(ServiceError::ValidationError(
                "Nothing to update: provide newStatus or newAddress".to_string(),
            ));
        }
        let order_id = order_id.to_string();

        with_transaction(self.db(), move |txn| {
            Box::pin(async move {
                let mut update = order_entity::Entity::update_many()
                    .filter(order_entity::Column::Id.eq(order_id.as_str()));
                if let Some(status) = changes.status {
                    update = update.col_expr(order_entity::Column::Status, Expr::value(status));
                }
                if let Some(address) = changes.address {
                    update = update.col_expr(order_entity::Column::Address, Expr::value(address));
                }
                if let Some(from) = allowed_from {
                    update = update.filter(order_entity::Column::Status.is_in(from.iter().copied()));
                }

                let result = update.exec(txn).await.map_err(logged("update order"))?;
                if result.rows_affected == 0 {
                    return Err(match allowed_from {
                        Some(from) => Self::explain_rejection(txn, &order_id, from).await,
                        None => ServiceError::order_not_found(&order_id),
                    });
                }

                Self::find_in(txn, &order_id)
                    .await?
                    .ok_or_else(|| ServiceError::order_not_found(&order_id))
            })
        })
        .await
    }

    /// Deletes a `Pending` or `Processing` order with its line items and
    /// claims. `owner` restricts the delete to that buyer's order.
    /// Returns the order as it was before deletion.
    #[instrument(skip(self))]
    pub async fn delete_order(
        &self,
        order_id: &str,
        owner: Option<&str>,
    ) -> Result<OrderModel, ServiceError> {
        let order_id = order_id.to_string();
        let owner = owner.map(str::to_string);

        with_transaction(self.db(), move |txn| {
            Box::pin(async move {
                let order = Self::find_in(txn, &order_id)
                    .await?
                    .ok_or_else(|| ServiceError::order_not_found(&order_id))?;

                if let Some(owner) = owner.as_deref() {
                    if !order.is_owned_by(owner) {
                        return Err(ServiceError::Forbidden(format!(
                            "Order {} does not belong to you",
                            order_id
                        )));
                    }
                }
                if !order.status.is_cancellable() {
                    return Err(ServiceError::invalid_state(
                        &OrderStatus::CANCELLABLE,
                        order.status,
                    ));
                }

                delivery_entity::Entity::delete_many()
                    .filter(delivery_entity::Column::OrderId.eq(order_id.as_str()))
                    .exec(txn)
                    .await
                    .map_err(logged("delete delivery claims"))?;

                order_item_entity::Entity::delete_many()
                    .filter(order_item_entity::Column::OrderId.eq(order_id.as_str()))
                    .exec(txn)
                    .await
                    .map_err(logged("delete order items"))?;

                let result = order_entity::Entity::delete_many()
                    .filter(order_entity::Column::Id.eq(order_id.as_str()))
                    .filter(order_entity::Column::Status.is_in(OrderStatus::CANCELLABLE))
                    .exec(txn)
                    .await
                    .map_err(logged("delete order"))?;

                if result.rows_affected == 0 {
                    return Err(
                        Self::explain_rejection(txn, &order_id, &OrderStatus::CANCELLABLE).await,
                    );
                }

                Ok(order)
            })
        })
        .await
    }

    pub async fn find_in<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        order_entity::Entity::find_by_id(order_id.to_string())
            .one(conn)
            .await
            .map_err(logged("find order"))
    }

    pub async fn items_in<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        order_item_entity::Entity::find()
            .filter(order_item_entity::Column::OrderId.eq(order_id))
            .order_by_asc(order_item_entity::Column::Id)
            .all(conn)
            .await
            .map_err(logged("find order items"))
    }

    /// Recomputes `total = sum(price * quantity)` over the stored line items
    /// and persists it. Every path writing line items calls this before commit.
    pub async fn recompute_total<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
    ) -> Result<Decimal, ServiceError> {
        let total: Decimal = Self::items_in(conn, order_id)
            .await?
            .iter()
            .map(OrderItemModel::line_total)
            .sum();

        let result = order_entity::Entity::update_many()
            .col_expr(order_entity::Column::Total, Expr::value(total))
            .filter(order_entity::Column::Id.eq(order_id))
            .exec(conn)
            .await
            .map_err(logged("update order total"))?;

        if result.rows_affected == 0 {
            return Err(ServiceError::order_not_found(order_id));
        }
        Ok(total)
    }

    /// Moves the order to `to` only if its current status is one of `from`.
    /// Check and write are a single conditional update, so a concurrent
    /// transition makes this one fail with `InvalidState`.
    pub async fn transition_status<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<(), ServiceError> {
        let result = order_entity::Entity::update_many()
            .col_expr(order_entity::Column::Status, Expr::value(to))
            .filter(order_entity::Column::Id.eq(order_id))
            .filter(order_entity::Column::Status.is_in(from.iter().copied()))
            .exec(conn)
            .await
            .map_err(logged("transition order status"))?;

        if result.rows_affected == 0 {
            return Err(Self::explain_rejection(conn, order_id, from).await);
        }
        Ok(())
    }

    /// Unconditional status write, reserved for the administrative override.
    pub async fn set_status<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
        to: OrderStatus,
    ) -> Result<(), ServiceError> {
        let result = order_entity::Entity::update_many()
            .col_expr(order_entity::Column::Status, Expr::value(to))
            .filter(order_entity::Column::Id.eq(order_id))
            .exec(conn)
            .await
            .map_err(logged("set order status"))?;

        if result.rows_affected == 0 {
            return Err(ServiceError::order_not_found(order_id));
        }
        Ok(())
    }

    /// Turns a conditional write that touched no row into `NotFound` or
    /// `InvalidState` depending on what is stored now.
    async fn explain_rejection<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
        expected: &[OrderStatus],
    ) -> ServiceError {
        match Self::find_in(conn, order_id).await {
            Ok(Some(order)) => ServiceError::invalid_state(expected, order.status),
            Ok(None) => ServiceError::order_not_found(order_id),
            Err(e) => e,
        }
    }

    /// Creates the delivery claim with both timestamps and the fee unset.
    pub async fn insert_claim<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
        shipper_id: &str,
    ) -> Result<DeliveryModel, ServiceError> {
        delivery_entity::ActiveModel {
            shipper_id: Set(shipper_id.to_string()),
            order_id: Set(order_id.to_string()),
            departure_time: Set(None),
            finish_time: Set(None),
            shipping_fee: Set(None),
        }
        .insert(conn)
        .await
        .map_err(logged("insert delivery claim"))
    }

    /// The order's claim, restricted to `shipper_id` when given.
    pub async fn find_claim<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
        shipper_id: Option<&str>,
    ) -> Result<Option<DeliveryModel>, ServiceError> {
        let mut query = delivery_entity::Entity::find()
            .filter(delivery_entity::Column::OrderId.eq(order_id));
        if let Some(shipper_id) = shipper_id {
            query = query.filter(delivery_entity::Column::ShipperId.eq(shipper_id));
        }
        query.one(conn).await.map_err(logged("find delivery claim"))
    }

    pub async fn stamp_claim<C: ConnectionTrait>(
        conn: &C,
        claim: DeliveryModel,
        stamp: ClaimStamp,
    ) -> Result<DeliveryModel, ServiceError> {
        let now = Some(Utc::now());
        let mut active: delivery_entity::ActiveModel = claim.into();
        match stamp {
            ClaimStamp::Departure => active.departure_time = Set(now),
            ClaimStamp::Finish => active.finish_time = Set(now),
        }
        active
            .update(conn)
            .await
            .map_err(logged("stamp delivery claim"))
    }

    /// Whether at least one line item of the order is a SKU sold by `seller_id`.
    pub async fn seller_owns_sku_in_order<C: ConnectionTrait>(
        conn: &C,
        order_id: &str,
        seller_id: &str,
    ) -> Result<bool, ServiceError> {
        let matching = order_item_entity::Entity::find()
            .join(
                JoinType::InnerJoin,
                order_item_entity::Relation::ProductSku.def(),
            )
            .filter(order_item_entity::Column::OrderId.eq(order_id))
            .filter(product_sku_entity::Column::SellerId.eq(seller_id))
            .count(conn)
            .await
            .map_err(logged("check seller ownership"))?;
        Ok(matching > 0)
    }
}
