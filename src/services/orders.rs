use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::{
    auth::{
        policy::{self, OrderOperation},
        Principal,
    },
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{OrderItemModel, OrderModel, OrderStatus},
    queries::order_queries::{
        GetOrderDetailsQuery, GetOrdersByBuyerQuery, GetSellerOrdersQuery,
        GetTopSellingProductsQuery, OrderDetailsRow, OrderSummary, Query, SellerOrder,
        TopSellingProduct,
    },
    repositories::{NewLineItem, NewOrder, OrderChanges, OrderRepository, OrderWithItems},
};

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("price_must_not_be_negative"));
    }
    Ok(())
}

/// Request/Response types for the order service
#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Address must not be empty"))]
    pub address: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: Option<i32>,
    #[validate(custom = "validate_price")]
    #[schema(value_type = Option<String>, example = "19.99")]
    pub price: Option<Decimal>,
    #[validate(length(min = 1, message = "Barcode must not be empty"))]
    pub barcode: Option<String>,
    #[serde(alias = "variationname")]
    #[validate(length(min = 1, message = "Variation name must not be empty"))]
    pub variation_name: Option<String>,
    /// Defaults to `Pending`
    pub status: Option<String>,
}

impl CreateOrderRequest {
    fn into_new_order(self, buyer_id: String) -> Result<NewOrder, ServiceError> {
        let mut missing = Vec::new();
        if self.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
            missing.push("address");
        }
        if self.quantity.is_none() {
            missing.push("quantity");
        }
        if self.price.is_none() {
            missing.push("price");
        }
        if self.barcode.as_deref().map_or(true, |b| b.trim().is_empty()) {
            missing.push("barcode");
        }
        if self
            .variation_name
            .as_deref()
            .map_or(true, |v| v.trim().is_empty())
        {
            missing.push("variationName");
        }
        if !missing.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        self.validate()?;

        let status = match self.status.as_deref() {
            Some(raw) => raw.parse::<OrderStatus>()?,
            None => OrderStatus::default(),
        };

        let (Some(address), Some(quantity), Some(price), Some(barcode), Some(variation_name)) = (
            self.address,
            self.quantity,
            self.price,
            self.barcode,
            self.variation_name,
        ) else {
            return Err(ServiceError::ValidationError(
                "Missing required fields".to_string(),
            ));
        };

        Ok(NewOrder {
            buyer_id,
            address: address.trim().to_string(),
            status,
            item: NewLineItem {
                barcode: barcode.trim().to_string(),
                variation_name: variation_name.trim().to_string(),
                quantity,
                price,
            },
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    /// Administrators only
    pub new_status: Option<String>,
    pub new_address: Option<String>,
}

impl UpdateOrderRequest {
    fn into_changes(self) -> Result<OrderChanges, ServiceError> {
        let status = self
            .new_status
            .as_deref()
            .map(OrderStatus::parse_update_target)
            .transpose()?;

        let address = match self.new_address {
            Some(address) if address.trim().is_empty() => {
                return Err(ServiceError::ValidationError(
                    "newAddress must not be empty".to_string(),
                ))
            }
            Some(address) => Some(address.trim().to_string()),
            None => None,
        };

        let changes = OrderChanges { status, address };
        if changes.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one of newStatus or newAddress is required".to_string(),
            ));
        }
        Ok(changes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: String,
    pub order_id: String,
    pub barcode: String,
    pub variation_name: String,
    pub quantity: i32,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
}

impl From<OrderItemModel> for OrderItemResponse {
    fn from(item: OrderItemModel) -> Self {
        Self {
            id: item.id,
            order_id: item.order_id,
            barcode: item.barcode,
            variation_name: item.variation_name,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub address: String,
    pub status: OrderStatus,
    #[schema(value_type = String, example = "59.97")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

impl From<OrderWithItems> for OrderResponse {
    fn from(OrderWithItems { order, items }: OrderWithItems) -> Self {
        Self {
            id: order.id,
            buyer_id: order.buyer_id,
            address: order.address,
            status: order.status,
            total: order.total,
            created_at: order.created_at,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrderDetailsFilter {
    pub status: Option<String>,
    /// Omit orders with fewer line items
    pub min_items: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TopSellingFilter {
    pub min_quantity: Option<i64>,
    pub seller_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SellerOrderFilter {
    /// Administrators only; sellers always see their own orders
    pub seller_id: Option<String>,
    pub status: Option<String>,
    /// Order id or buyer full name substring
    pub search: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Page size bounds of the seller listing.
#[derive(Debug, Clone, Copy)]
pub struct ListingLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl ListingLimits {
    fn clamp(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

/// Service for order creation, mutation, cancellation and the read projections
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    repository: Arc<OrderRepository>,
    event_sender: Arc<EventSender>,
    limits: ListingLimits,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        repository: Arc<OrderRepository>,
        event_sender: Arc<EventSender>,
        limits: ListingLimits,
    ) -> Self {
        Self {
            db_pool,
            repository,
            event_sender,
            limits,
        }
    }

    /// Creates an order with its single line item for the requesting buyer
    #[instrument(skip(self, request), fields(principal = %principal.id))]
    pub async fn create_order(
        &self,
        principal: &Principal,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        policy::authorize(principal, OrderOperation::CreateOrder)?;
        let new_order = request.into_new_order(principal.id.clone())?;

        let created = self.repository.create_order(new_order).await?;

        metrics::ORDERS_CREATED.inc();
        self.event_sender
            .publish(Event::OrderCreated {
                order_id: created.order.id.clone(),
                buyer_id: created.order.buyer_id.clone(),
            })
            .await;
        info!(order_id = %created.order.id, total = %created.order.total, "Order created");

        Ok(created.into())
    }

    /// Changes the address and, for administrators, the status of an order
    #[instrument(skip(self, request), fields(principal = %principal.id))]
    pub async fn update_order(
        &self,
        principal: &Principal,
        order_id: &str,
        request: UpdateOrderRequest,
    ) -> Result<OrderSummary, ServiceError> {
        policy::authorize(principal, OrderOperation::UpdateOrder)?;
        let changes = request.into_changes()?;

        if changes.status.is_some() && !principal.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only administrators may set the status through an order update".to_string(),
            ));
        }

        let current = self
            .repository
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::order_not_found(order_id))?;
        policy::ensure_order_owner(principal, &current)?;

        let allowed_from: Option<&'static [OrderStatus]> = if principal.is_admin() {
            None
        } else {
            Some(&OrderStatus::CANCELLABLE)
        };
        let result = self
            .repository
            .update_order(order_id, changes, allowed_from)
            .await;
        metrics::record_rejection("update_order", &result);
        let updated = result?;

        self.event_sender
            .publish(Event::OrderUpdated(updated.id.clone()))
            .await;
        if updated.status != current.status {
            self.event_sender
                .publish(Event::OrderStatusChanged {
                    order_id: updated.id.clone(),
                    old_status: current.status,
                    new_status: updated.status,
                })
                .await;
        }
        info!(order_id = %updated.id, "Order updated");

        Ok(updated.into())
    }

    /// Cancels an order by deleting it with its line items. Only `Pending`
    /// and `Processing` orders can be cancelled.
    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn delete_order(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<OrderSummary, ServiceError> {
        policy::authorize(principal, OrderOperation::DeleteOrder)?;

        let owner = (!principal.is_admin()).then_some(principal.id.as_str());
        let result = self.repository.delete_order(order_id, owner).await;
        metrics::record_rejection("delete_order", &result);
        let deleted = result?;

        metrics::ORDERS_CANCELLED.inc();
        self.event_sender
            .publish(Event::OrderCancelled(deleted.id.clone()))
            .await;
        info!(order_id = %deleted.id, "Order cancelled");

        Ok(deleted.into())
    }

    /// The order with all of its line items
    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn get_order(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<OrderResponse, ServiceError> {
        policy::authorize(principal, OrderOperation::ReadOrders)?;

        match self.repository.find_with_items(order_id).await? {
            Some(found) if policy::can_view_order(principal, &found.order) => Ok(found.into()),
            _ => Err(ServiceError::order_not_found(order_id)),
        }
    }

    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn get_order_total(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<Decimal, ServiceError> {
        policy::authorize(principal, OrderOperation::ReadOrders)?;

        if !principal.is_admin() {
            self.visible_order(principal, order_id).await?;
        }
        self.repository.get_total_by_order_id(order_id).await
    }

    async fn visible_order(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<OrderModel, ServiceError> {
        match self.repository.find_by_id(order_id).await? {
            Some(order) if policy::can_view_order(principal, &order) => Ok(order),
            _ => Err(ServiceError::order_not_found(order_id)),
        }
    }

    /// Orders placed by the requester, newest first
    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn list_my_orders(
        &self,
        principal: &Principal,
    ) -> Result<Vec<OrderSummary>, ServiceError> {
        policy::authorize(principal, OrderOperation::ReadOrders)?;

        GetOrdersByBuyerQuery {
            buyer_id: principal.id.clone(),
        }
        .execute(&self.db_pool)
        .await
    }

    /// Orders with buyer profiles, limited to the rows the requester's role may see
    #[instrument(skip(self, filter), fields(principal = %principal.id))]
    pub async fn order_details(
        &self,
        principal: &Principal,
        filter: OrderDetailsFilter,
    ) -> Result<Vec<OrderDetailsRow>, ServiceError> {
        policy::authorize(principal, OrderOperation::ReadOrders)?;
        let status = parse_status_filter(filter.status.as_deref())?;

        GetOrderDetailsQuery {
            scope: policy::order_scope(principal),
            status,
            min_items: filter.min_items,
        }
        .execute(&self.db_pool)
        .await
    }

    /// Quantities sold per SKU over delivered orders. Admins see every
    /// seller; everyone else only their own SKUs.
    #[instrument(skip(self, filter), fields(principal = %principal.id))]
    pub async fn top_selling_products(
        &self,
        principal: &Principal,
        filter: TopSellingFilter,
    ) -> Result<Vec<TopSellingProduct>, ServiceError> {
        policy::authorize(principal, OrderOperation::ReadOrders)?;

        // Non-admins only ever see sales of their own SKUs.
        let seller_id = if principal.is_admin() {
            filter.seller_id
        } else {
            match filter.seller_id {
                Some(requested) if requested != principal.id => {
                    return Err(ServiceError::Forbidden(
                        "Sales reports are limited to your own products".to_string(),
                    ))
                }
                _ => Some(principal.id.clone()),
            }
        };

        GetTopSellingProductsQuery {
            min_quantity: filter.min_quantity,
            seller_id,
        }
        .execute(&self.db_pool)
        .await
    }

    /// Orders containing the seller's products. Sellers are scoped to their
    /// own id; administrators must name the seller.
    #[instrument(skip(self, filter), fields(principal = %principal.id))]
    pub async fn seller_orders(
        &self,
        principal: &Principal,
        filter: SellerOrderFilter,
    ) -> Result<Vec<SellerOrder>, ServiceError> {
        policy::authorize(principal, OrderOperation::SellerListing)?;

        let seller_id = if principal.is_admin() {
            filter.seller_id.clone().ok_or_else(|| {
                ServiceError::ValidationError("sellerId is required".to_string())
            })?
        } else {
            match filter.seller_id.as_deref() {
                Some(requested) if requested != principal.id => {
                    return Err(ServiceError::Forbidden(
                        "Sellers may only list their own orders".to_string(),
                    ))
                }
                _ => principal.id.clone(),
            }
        };

        GetSellerOrdersQuery {
            seller_id,
            status: parse_status_filter(filter.status.as_deref())?,
            search: filter.search,
            limit: self.limits.clamp(filter.limit),
            offset: filter.offset.unwrap_or(0),
        }
        .execute(&self.db_pool)
        .await
    }
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<OrderStatus>, ServiceError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()
}
