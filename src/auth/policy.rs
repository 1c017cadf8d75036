//! Per-operation access policy for orders.
//!
//! [`authorize`] is the role gate evaluated before any store access. The
//! ownership predicates and the status update table are evaluated by the
//! services against the current order state.

use crate::errors::ServiceError;
use crate::models::{OrderModel, OrderStatus};

use super::{rbac, Principal, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OrderOperation {
    CreateOrder,
    UpdateOrder,
    DeleteOrder,
    ClaimOrder,
    StartDelivery,
    ConfirmDelivery,
    UpdateOrderStatus,
    ReadOrders,
    SellerListing,
}

impl OrderOperation {
    pub fn permission(self) -> &'static str {
        match self {
            OrderOperation::CreateOrder => rbac::ORDERS_CREATE,
            OrderOperation::UpdateOrder => rbac::ORDERS_UPDATE,
            OrderOperation::DeleteOrder => rbac::ORDERS_DELETE,
            OrderOperation::ClaimOrder => rbac::ORDERS_CLAIM,
            OrderOperation::StartDelivery | OrderOperation::ConfirmDelivery => {
                rbac::ORDERS_DELIVER
            }
            OrderOperation::UpdateOrderStatus => rbac::ORDERS_STATUS,
            OrderOperation::ReadOrders => rbac::ORDERS_READ,
            OrderOperation::SellerListing => rbac::ORDERS_SELLER_LISTING,
        }
    }
}

/// Role gate: fails `Forbidden` when the principal's role lacks the operation's permission.
pub fn authorize(principal: &Principal, operation: OrderOperation) -> Result<(), ServiceError> {
    if rbac::role_has_permission(principal.role, operation.permission()) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "Role '{}' is not allowed to perform {}",
            principal.role, operation
        )))
    }
}

/// Buyers may only act on their own orders; admins on any.
pub fn ensure_order_owner(principal: &Principal, order: &OrderModel) -> Result<(), ServiceError> {
    if principal.is_admin() || order.is_owned_by(&principal.id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "Order {} does not belong to you",
            order.id
        )))
    }
}

/// Single-order reads are limited to the owner and admins. Callers report
/// `NotFound` otherwise so that order ids do not leak.
pub fn can_view_order(principal: &Principal, order: &OrderModel) -> bool {
    principal.is_admin() || order.is_owned_by(&principal.id)
}

/// Rows of the order listings a principal may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderScope {
    All,
    /// Orders placed by this buyer
    Buyer(String),
    /// Orders containing at least one SKU sold by this seller
    Seller(String),
    /// Orders claimed by this shipper
    Shipper(String),
}

pub fn order_scope(principal: &Principal) -> OrderScope {
    match principal.role {
        Role::Admin => OrderScope::All,
        Role::Buyer => OrderScope::Buyer(principal.id.clone()),
        Role::Seller => OrderScope::Seller(principal.id.clone()),
        Role::Shipper => OrderScope::Shipper(principal.id.clone()),
    }
}

/// Source statuses from which `role` may move an order to `target` through the
/// generic status update. Empty means the role may never set `target`.
/// Admins bypass this table.
pub fn status_update_sources(role: Role, target: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;

    match (role, target) {
        (Role::Seller, Processing) => &[Pending],
        (Role::Seller, Cancelled) => &[Pending, Processing],
        (Role::Shipper, Delivered) => &[Delivering],
        _ => &[],
    }
}

/// Validates a non-admin status change against [`status_update_sources`].
pub fn check_status_update(
    role: Role,
    current: OrderStatus,
    target: OrderStatus,
) -> Result<(), ServiceError> {
    if role == Role::Admin {
        return Ok(());
    }

    let sources = status_update_sources(role, target);
    if sources.is_empty() {
        return Err(ServiceError::Forbidden(format!(
            "Role '{}' may not set status {}",
            role, target
        )));
    }
    if !sources.contains(&current) {
        return Err(ServiceError::invalid_state(sources, current));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn order_of(buyer: &str) -> OrderModel {
        OrderModel {
            id: "ord-1".into(),
            buyer_id: buyer.into(),
            address: "12 Harbour Rd".into(),
            status: OrderStatus::Pending,
            total: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(Role::Buyer, OrderOperation::CreateOrder, true)]
    #[case(Role::Admin, OrderOperation::CreateOrder, true)]
    #[case(Role::Seller, OrderOperation::CreateOrder, false)]
    #[case(Role::Shipper, OrderOperation::CreateOrder, false)]
    #[case(Role::Buyer, OrderOperation::DeleteOrder, true)]
    #[case(Role::Shipper, OrderOperation::DeleteOrder, false)]
    #[case(Role::Shipper, OrderOperation::ClaimOrder, true)]
    #[case(Role::Admin, OrderOperation::ConfirmDelivery, true)]
    #[case(Role::Buyer, OrderOperation::ClaimOrder, false)]
    #[case(Role::Seller, OrderOperation::ConfirmDelivery, false)]
    #[case(Role::Seller, OrderOperation::UpdateOrderStatus, true)]
    #[case(Role::Shipper, OrderOperation::UpdateOrderStatus, true)]
    #[case(Role::Buyer, OrderOperation::UpdateOrderStatus, false)]
    #[case(Role::Buyer, OrderOperation::SellerListing, false)]
    #[case(Role::Seller, OrderOperation::ReadOrders, true)]
    fn operation_matrix(#[case] role: Role, #[case] op: OrderOperation, #[case] allowed: bool) {
        let principal = Principal::new("u-1", role);
        assert_eq!(authorize(&principal, op).is_ok(), allowed);
    }

    #[test]
    fn denied_operation_is_forbidden() {
        let principal = Principal::new("u-1", Role::Buyer);
        assert_matches!(
            authorize(&principal, OrderOperation::ClaimOrder),
            Err(ServiceError::Forbidden(msg)) if msg.contains("claim_order")
        );
    }

    #[test]
    fn owner_and_admin_pass_ownership_check() {
        let order = order_of("buyer-1");
        assert!(ensure_order_owner(&Principal::new("buyer-1", Role::Buyer), &order).is_ok());
        assert!(ensure_order_owner(&Principal::new("admin-1", Role::Admin), &order).is_ok());
        assert_matches!(
            ensure_order_owner(&Principal::new("buyer-2", Role::Buyer), &order),
            Err(ServiceError::Forbidden(_))
        );
    }

    #[test]
    fn listing_scope_follows_role() {
        assert_eq!(
            order_scope(&Principal::new("s-1", Role::Seller)),
            OrderScope::Seller("s-1".into())
        );
        assert_eq!(
            order_scope(&Principal::new("a-1", Role::Admin)),
            OrderScope::All
        );
    }

    #[rstest]
    #[case(Role::Seller, OrderStatus::Pending, OrderStatus::Processing)]
    #[case(Role::Seller, OrderStatus::Pending, OrderStatus::Cancelled)]
    #[case(Role::Seller, OrderStatus::Processing, OrderStatus::Cancelled)]
    #[case(Role::Shipper, OrderStatus::Delivering, OrderStatus::Delivered)]
    #[case(Role::Admin, OrderStatus::Delivered, OrderStatus::Pending)]
    fn permitted_status_updates(
        #[case] role: Role,
        #[case] current: OrderStatus,
        #[case] target: OrderStatus,
    ) {
        assert!(check_status_update(role, current, target).is_ok());
    }

    #[test]
    fn seller_cannot_cancel_dispatched_order() {
        assert_matches!(
            check_status_update(Role::Seller, OrderStatus::Dispatched, OrderStatus::Cancelled),
            Err(ServiceError::InvalidState { expected, actual })
                if expected == vec![OrderStatus::Pending, OrderStatus::Processing]
                    && actual == OrderStatus::Dispatched
        );
    }

    #[rstest]
    #[case(Role::Seller, OrderStatus::Delivered)]
    #[case(Role::Seller, OrderStatus::Shipped)]
    #[case(Role::Shipper, OrderStatus::Cancelled)]
    #[case(Role::Buyer, OrderStatus::Cancelled)]
    fn targets_outside_role_table_are_forbidden(#[case] role: Role, #[case] target: OrderStatus) {
        assert_matches!(
            check_status_update(role, OrderStatus::Pending, target),
            Err(ServiceError::Forbidden(_))
        );
    }
}
