//! Marketplace Orders
//!
//! Order lifecycle backend for a marketplace with buyers, sellers, shippers
//! and administrators: order creation with a derived total, guarded status
//! transitions, delivery claims and role-scoped read projections.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod ids;
pub mod metrics;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod queries;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{extract::FromRef, routing::get, Router};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::auth::RoleResolver;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::ids::IdGenerator;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub event_sender: Arc<EventSender>,
    pub services: handlers::AppServices,
    pub role_resolver: Arc<dyn RoleResolver>,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        event_sender: Arc<EventSender>,
        ids: Arc<dyn IdGenerator>,
        role_resolver: Arc<dyn RoleResolver>,
    ) -> Self {
        let services =
            handlers::AppServices::new(db.clone(), ids, event_sender.clone(), &config);
        Self {
            db,
            config,
            event_sender,
            services,
            role_resolver,
        }
    }
}

impl FromRef<AppState> for Arc<dyn RoleResolver> {
    fn from_ref(state: &AppState) -> Self {
        state.role_resolver.clone()
    }
}

// Common response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Builds the HTTP application: order routes under `/api/orders`, plus
/// `/health`, `/metrics` and the OpenAPI document.
pub fn app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);
    let request_id = crate::tracing::request_id_header();

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/orders", handlers::orders::order_routes())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(crate::tracing::RequestSpanMaker))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(axum::middleware::from_fn(crate::tracing::scope_request))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn metrics_handler() -> Result<String, errors::ServiceError> {
    metrics::gather().map_err(|e| {
        ::tracing::error!("Failed to render metrics: {}", e);
        e
    })
}
