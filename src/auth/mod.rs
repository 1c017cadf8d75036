/*!
 * # Authentication and Authorization Module
 *
 * Session handling lives upstream: the gateway authenticates the caller and
 * forwards its user id in the `x-user-id` header. This module turns that id
 * into a [`Principal`] by resolving its [`Role`] through a [`RoleResolver`],
 * and hosts the role permission table ([`rbac`]) and the per-operation access
 * policy ([`policy`]).
 */

pub mod policy;
pub mod rbac;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::models::user_entity;

pub use policy::OrderOperation;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Marketplace roles.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Buyer,
    Seller,
    Shipper,
    Admin,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Resolves a user's role. Backed by the identity service's `users` table in
/// production.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn check_role(&self, user_id: &str) -> Result<Role, ServiceError>;
}

/// [`RoleResolver`] reading the `role` column of `users`.
#[derive(Clone)]
pub struct DbRoleResolver {
    db: Arc<DbPool>,
}

impl DbRoleResolver {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RoleResolver for DbRoleResolver {
    async fn check_role(&self, user_id: &str) -> Result<Role, ServiceError> {
        let user = user_entity::Entity::find_by_id(user_id.to_string())
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(user_id, "Failed to resolve role: {}", e);
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                debug!(user_id, "Unknown user");
                ServiceError::AuthError("Unknown user".to_string())
            })?;

        user.role.parse::<Role>().map_err(|_| {
            warn!(user_id, role = %user.role, "User has an unrecognised role");
            ServiceError::Forbidden(format!("Unrecognised role '{}'", user.role))
        })
    }
}

/// Extractor yielding the authenticated [`Principal`].
///
/// Rejects with `AuthError` when the user id header is missing or names an
/// unknown user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<dyn RoleResolver>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ServiceError::AuthError("Authentication required".to_string()))?
            .to_string();

        let resolver = Arc::<dyn RoleResolver>::from_ref(state);
        let role = resolver.check_role(&user_id).await?;

        Ok(AuthUser(Principal::new(user_id, role)))
    }
}
