/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Maps each marketplace role to the order permissions it holds.
 */

use lazy_static::lazy_static;
use std::collections::HashMap;

use super::Role;

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct RoleDefinition {
    pub role: Role,
    pub description: &'static str,
    pub permissions: Vec<&'static str>,
}

pub const ORDERS_READ: &str = "orders:read";
pub const ORDERS_CREATE: &str = "orders:create";
pub const ORDERS_UPDATE: &str = "orders:update";
pub const ORDERS_DELETE: &str = "orders:delete";
pub const ORDERS_CLAIM: &str = "orders:claim";
pub const ORDERS_DELIVER: &str = "orders:deliver";
pub const ORDERS_STATUS: &str = "orders:status";
pub const ORDERS_SELLER_LISTING: &str = "orders:seller-listing";

lazy_static! {
    pub static ref ROLES: HashMap<Role, RoleDefinition> = {
        let mut roles = HashMap::new();

        // Admin role - has all order permissions
        roles.insert(
            Role::Admin,
            RoleDefinition {
                role: Role::Admin,
                description: "Administrator with full access",
                permissions: vec!["orders:*"],
            },
        );

        roles.insert(
            Role::Buyer,
            RoleDefinition {
                role: Role::Buyer,
                description: "Places and manages own orders",
                permissions: vec![ORDERS_READ, ORDERS_CREATE, ORDERS_UPDATE, ORDERS_DELETE],
            },
        );

        roles.insert(
            Role::Seller,
            RoleDefinition {
                role: Role::Seller,
                description: "Fulfils orders containing own products",
                permissions: vec![ORDERS_READ, ORDERS_STATUS, ORDERS_SELLER_LISTING],
            },
        );

        roles.insert(
            Role::Shipper,
            RoleDefinition {
                role: Role::Shipper,
                description: "Claims and delivers orders",
                permissions: vec![ORDERS_READ, ORDERS_CLAIM, ORDERS_DELIVER, ORDERS_STATUS],
            },
        );

        roles
    };
}

/// Check if a specific permission matches a required permission
pub fn check_permission(user_permission: &str, required_permission: &str) -> bool {
    if user_permission == required_permission || user_permission == "*" {
        return true;
    }

    match user_permission.strip_suffix(":*") {
        Some(prefix) => required_permission
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with(':')),
        None => false,
    }
}

/// Whether `role` holds `required_permission`, directly or through a wildcard.
pub fn role_has_permission(role: Role, required_permission: &str) -> bool {
    ROLES
        .get(&role)
        .map(|definition| {
            definition
                .permissions
                .iter()
                .any(|granted| check_permission(granted, required_permission))
        })
        .unwrap_or(false)
}
