//! Order Lifecycle Engine.
//!
//! Drives the guarded status transitions of an order:
//!
//! ```text
//! Pending -> Processing -> Dispatched -> Delivering -> Delivered
//!    \___________\___> Cancelled (deletion)
//! ```
//!
//! Every operation runs in a single transaction. The status precondition is
//! part of the `UPDATE ... WHERE status IN (..)` that performs the transition,
//! so of two concurrent callers only one can move the order; the other fails
//! with `InvalidState`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::{
    auth::{
        policy::{self, OrderOperation},
        Principal, Role,
    },
    db::{with_transaction, DbPool},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{DeliveryModel, OrderStatus},
    repositories::{order_repository::ClaimStamp, OrderRepository},
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryClaimResponse {
    pub shipper_id: String,
    pub order_id: String,
    pub departure_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub shipping_fee: Option<Decimal>,
}

impl From<DeliveryModel> for DeliveryClaimResponse {
    fn from(claim: DeliveryModel) -> Self {
        Self {
            shipper_id: claim.shipper_id,
            order_id: claim.order_id,
            departure_time: claim.departure_time,
            finish_time: claim.finish_time,
            shipping_fee: claim.shipping_fee,
        }
    }
}

/// Result of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub order_id: String,
    pub previous_status: OrderStatus,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<DeliveryClaimResponse>,
}

/// Which delivery leg a claim-holder is driving.
#[derive(Debug, Clone, Copy)]
enum DeliveryLeg {
    Start,
    Confirm,
}

impl DeliveryLeg {
    fn from_status(self) -> OrderStatus {
        match self {
            DeliveryLeg::Start => OrderStatus::Dispatched,
            DeliveryLeg::Confirm => OrderStatus::Delivering,
        }
    }

    fn to_status(self) -> OrderStatus {
        match self {
            DeliveryLeg::Start => OrderStatus::Delivering,
            DeliveryLeg::Confirm => OrderStatus::Delivered,
        }
    }

    fn stamp(self) -> ClaimStamp {
        match self {
            DeliveryLeg::Start => ClaimStamp::Departure,
            DeliveryLeg::Confirm => ClaimStamp::Finish,
        }
    }

    fn operation(self) -> OrderOperation {
        match self {
            DeliveryLeg::Start => OrderOperation::StartDelivery,
            DeliveryLeg::Confirm => OrderOperation::ConfirmDelivery,
        }
    }
}

#[derive(Clone)]
pub struct OrderLifecycleService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderLifecycleService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// `Processing -> Dispatched`, binding the order to the calling shipper.
    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn claim_order(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<TransitionResponse, ServiceError> {
        policy::authorize(principal, OrderOperation::ClaimOrder)?;

        let id = order_id.to_string();
        let shipper_id = principal.id.clone();
        let result = with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                OrderRepository::transition_status(
                    txn,
                    &id,
                    &[OrderStatus::Processing],
                    OrderStatus::Dispatched,
                )
                .await?;
                OrderRepository::insert_claim(txn, &id, &shipper_id).await
            })
        })
        .await;
        metrics::record_rejection("claim_order", &result);
        let claim = result?;

        metrics::ORDER_CLAIMS.inc();
        self.event_sender
            .publish(Event::OrderClaimed {
                order_id: claim.order_id.clone(),
                shipper_id: claim.shipper_id.clone(),
            })
            .await;
        info!(order_id, shipper_id = %claim.shipper_id, "Order claimed");

        Ok(TransitionResponse {
            order_id: order_id.to_string(),
            previous_status: OrderStatus::Processing,
            status: OrderStatus::Dispatched,
            claim: Some(claim.into()),
        })
    }

    /// `Dispatched -> Delivering`; stamps the claim's departure time.
    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn start_delivery(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<TransitionResponse, ServiceError> {
        let result = self.advance_delivery(principal, order_id, DeliveryLeg::Start).await;
        metrics::record_rejection("start_delivery", &result);
        let claim = result?;

        self.event_sender
            .publish(Event::DeliveryStarted {
                order_id: claim.order_id.clone(),
                shipper_id: claim.shipper_id.clone(),
            })
            .await;
        info!(order_id, shipper_id = %claim.shipper_id, "Delivery started");

        Ok(TransitionResponse {
            order_id: order_id.to_string(),
            previous_status: OrderStatus::Dispatched,
            status: OrderStatus::Delivering,
            claim: Some(claim.into()),
        })
    }

    /// `Delivering -> Delivered`; stamps the claim's finish time.
    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn confirm_delivery(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<TransitionResponse, ServiceError> {
        let result = self
            .advance_delivery(principal, order_id, DeliveryLeg::Confirm)
            .await;
        metrics::record_rejection("confirm_delivery", &result);
        let claim = result?;

        metrics::ORDER_DELIVERIES_CONFIRMED.inc();
        self.event_sender
            .publish(Event::DeliveryConfirmed {
                order_id: claim.order_id.clone(),
                shipper_id: claim.shipper_id.clone(),
            })
            .await;
        info!(order_id, shipper_id = %claim.shipper_id, "Delivery confirmed");

        Ok(TransitionResponse {
            order_id: order_id.to_string(),
            previous_status: OrderStatus::Delivering,
            status: OrderStatus::Delivered,
            claim: Some(claim.into()),
        })
    }

    /// Moves a claimed order along one delivery leg. Shippers must hold the
    /// claim; admins act on whichever claim exists.
    async fn advance_delivery(
        &self,
        principal: &Principal,
        order_id: &str,
        leg: DeliveryLeg,
    ) -> Result<DeliveryModel, ServiceError> {
        policy::authorize(principal, leg.operation())?;

        let id = order_id.to_string();
        let principal = principal.clone();
        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let order = OrderRepository::find_in(txn, &id)
                    .await?
                    .ok_or_else(|| ServiceError::order_not_found(&id))?;

                let holder = (!principal.is_admin()).then_some(principal.id.as_str());
                let claim = match OrderRepository::find_claim(txn, &id, holder).await? {
                    Some(claim) => claim,
                    None if principal.is_admin() && order.status != leg.from_status() => {
                        return Err(ServiceError::invalid_state(&[leg.from_status()], order.status))
                    }
                    None if principal.is_admin() => {
                        return Err(ServiceError::NotFound(format!(
                            "Order {} has no delivery claim",
                            id
                        )))
                    }
                    None => {
                        return Err(ServiceError::Forbidden(format!(
                            "Order {} is not assigned to you",
                            id
                        )))
                    }
                };

                OrderRepository::transition_status(
                    txn,
                    &id,
                    &[leg.from_status()],
                    leg.to_status(),
                )
                .await?;
                debug!(order_id = %id, to = %leg.to_status(), "Delivery leg advanced");

                OrderRepository::stamp_claim(txn, claim, leg.stamp()).await
            })
        })
        .await
    }

    /// Generic status update. Admins may set any accepted status. Sellers
    /// owning a product in the order and the shipper holding its claim may
    /// only make the moves their role row permits.
    #[instrument(skip(self), fields(principal = %principal.id))]
    pub async fn update_order_status(
        &self,
        principal: &Principal,
        order_id: &str,
        status: &str,
    ) -> Result<TransitionResponse, ServiceError> {
        let target = OrderStatus::parse_update_target(status)?;
        policy::authorize(principal, OrderOperation::UpdateOrderStatus)?;

        let id = order_id.to_string();
        let actor = principal.clone();
        let result = with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let order = OrderRepository::find_in(txn, &id)
                    .await?
                    .ok_or_else(|| ServiceError::order_not_found(&id))?;

                let mut claim = None;
                match actor.role {
                    Role::Admin => {
                        OrderRepository::set_status(txn, &id, target).await?;
                        return Ok((order.status, None));
                    }
                    Role::Seller => {
                        if !OrderRepository::seller_owns_sku_in_order(txn, &id, &actor.id).await? {
                            return Err(ServiceError::Forbidden(format!(
                                "Order {} contains none of your products",
                                id
                            )));
                        }
                    }
                    Role::Shipper => {
                        claim = OrderRepository::find_claim(txn, &id, Some(&actor.id)).await?;
                        if claim.is_none() {
                            return Err(ServiceError::Forbidden(format!(
                                "Order {} is not assigned to you",
                                id
                            )));
                        }
                    }
                    Role::Buyer => {}
                }

                policy::check_status_update(actor.role, order.status, target)?;
                OrderRepository::transition_status(
                    txn,
                    &id,
                    policy::status_update_sources(actor.role, target),
                    target,
                )
                .await?;

                let claim = match claim {
                    Some(claim) if target == OrderStatus::Delivered => {
                        Some(OrderRepository::stamp_claim(txn, claim, ClaimStamp::Finish).await?)
                    }
                    other => other,
                };
                Ok((order.status, claim))
            })
        })
        .await;
        metrics::record_rejection("update_order_status", &result);
        let (previous_status, claim) = result?;

        self.event_sender
            .publish(Event::OrderStatusChanged {
                order_id: order_id.to_string(),
                old_status: previous_status,
                new_status: target,
            })
            .await;
        info!(
            order_id,
            role = %principal.role,
            from = %previous_status,
            to = %target,
            "Order status updated"
        );

        Ok(TransitionResponse {
            order_id: order_id.to_string(),
            previous_status,
            status: target,
            claim: claim.map(Into::into),
        })
    }
}
