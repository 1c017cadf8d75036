use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Enum representing the possible statuses of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Dispatched")]
    Dispatched,
    #[sea_orm(string_value = "Delivering")]
    Delivering,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Shipped")]
    Shipped,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl OrderStatus {
    /// Statuses in which an order may still be deleted by its buyer.
    pub const CANCELLABLE: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Processing];

    /// Targets accepted by the generic status update endpoint.
    pub const UPDATABLE: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn is_cancellable(self) -> bool {
        Self::CANCELLABLE.contains(&self)
    }

    /// Parses a target for the generic status update, rejecting anything
    /// outside [`OrderStatus::UPDATABLE`].
    pub fn parse_update_target(raw: &str) -> Result<Self, ServiceError> {
        let status: OrderStatus = raw.parse()?;
        if Self::UPDATABLE.contains(&status) {
            Ok(status)
        } else {
            Err(ServiceError::ValidationError(format!(
                "Invalid status: {}. Must be one of: Pending, Processing, Shipped, Delivered, Cancelled",
                raw
            )))
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "dispatched" => Ok(OrderStatus::Dispatched),
            "delivering" => Ok(OrderStatus::Delivering),
            "delivered" => Ok(OrderStatus::Delivered),
            "shipped" => Ok(OrderStatus::Shipped),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(ServiceError::ValidationError(format!(
                "Invalid status: {}",
                s
            ))),
        }
    }
}
