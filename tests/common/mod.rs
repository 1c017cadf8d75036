#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value;
use tower::ServiceExt;

use marketplace_orders::{
    auth::{DbRoleResolver, Principal, Role, USER_ID_HEADER},
    config::AppConfig,
    db::{self, DbConfig},
    events::{self, EventSender},
    ids::SequentialIdGenerator,
    metrics,
    models::{delivery_entity, order_entity, order_item_entity, product_sku_entity, user_entity, OrderStatus},
    repositories::OrderRepository,
    services::{orders::CreateOrderRequest, orders::OrderResponse, OrderLifecycleService, OrderService},
    AppState,
};

pub const BUYER: &str = "buyer-1";
pub const OTHER_BUYER: &str = "buyer-2";
pub const SELLER: &str = "seller-1";
pub const OTHER_SELLER: &str = "seller-2";
pub const SHIPPER: &str = "shipper-1";
pub const OTHER_SHIPPER: &str = "shipper-2";
pub const ADMIN: &str = "admin-1";
/// User whose stored role is not a marketplace role
pub const STRANGER: &str = "stranger-1";

/// Sold by [`SELLER`]
pub const MUG: &str = "SKU-MUG";
/// Sold by [`OTHER_SELLER`]
pub const LAMP: &str = "SKU-LAMP";

const USERS: [(&str, &str, Option<&str>, &str); 8] = [
    (BUYER, "ada", Some("Ada Lovelace"), "buyer"),
    (OTHER_BUYER, "grace", None, "buyer"),
    (SELLER, "mugshop", Some("Mug Shop"), "seller"),
    (OTHER_SELLER, "lampco", Some("Lamp Co"), "seller"),
    (SHIPPER, "swift", Some("Swift Couriers"), "shipper"),
    (OTHER_SHIPPER, "slow", None, "shipper"),
    (ADMIN, "root", Some("Site Admin"), "admin"),
    (STRANGER, "ghost", None, "courier"),
];

/// Application seeded with one user per role and two SKUs.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh single-connection in-memory SQLite database.
    pub async fn new() -> Self {
        Self::with_db_config(&DbConfig::in_memory_sqlite()).await
    }

    /// SQLite file with a multi-connection pool, so transactions really overlap.
    /// Keep the returned directory alive for the duration of the test.
    pub async fn file_backed() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("orders.db").display()),
            max_connections: 4,
            min_connections: 1,
            ..Default::default()
        };
        (Self::with_db_config(&config).await, dir)
    }

    async fn with_db_config(config: &DbConfig) -> Self {
        metrics::init();

        let pool = db::establish_connection_with_config(config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        for (id, username, full_name, role) in USERS {
            user_entity::ActiveModel {
                id: Set(id.to_string()),
                username: Set(username.to_string()),
                email: Set(format!("{}@example.com", username)),
                full_name: Set(full_name.map(str::to_string)),
                address: Set(Some(format!("{} Street 1", username))),
                role: Set(role.to_string()),
                password_hash: Set("$argon2id$not-a-real-hash".to_string()),
            }
            .insert(&pool)
            .await
            .expect("seed user");
        }
        for (barcode, name, seller) in [(MUG, "Ceramic Mug", SELLER), (LAMP, "Desk Lamp", OTHER_SELLER)] {
            product_sku_entity::ActiveModel {
                barcode: Set(barcode.to_string()),
                name: Set(name.to_string()),
                seller_id: Set(seller.to_string()),
            }
            .insert(&pool)
            .await
            .expect("seed sku");
        }

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let state = AppState::new(
            db_arc.clone(),
            cfg,
            Arc::new(event_sender),
            Arc::new(SequentialIdGenerator::new("id")),
            Arc::new(DbRoleResolver::new(db_arc)),
        );
        let router = marketplace_orders::app(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn orders(&self) -> &OrderService {
        &self.state.services.orders
    }

    pub fn lifecycle(&self) -> &OrderLifecycleService {
        &self.state.services.lifecycle
    }

    pub fn db(&self) -> &db::DbPool {
        &self.state.db
    }

    /// Principal with the role the seeded users table assigns to `id`.
    pub fn principal(id: &str) -> Principal {
        let role = match id {
            BUYER | OTHER_BUYER => Role::Buyer,
            SELLER | OTHER_SELLER => Role::Seller,
            SHIPPER | OTHER_SHIPPER => Role::Shipper,
            ADMIN => Role::Admin,
            other => panic!("no seeded principal {}", other),
        };
        Principal::new(id, role)
    }

    pub fn order_request(barcode: &str, quantity: i32, price: Decimal) -> CreateOrderRequest {
        CreateOrderRequest {
            address: Some("221B Baker Street".to_string()),
            quantity: Some(quantity),
            price: Some(price),
            barcode: Some(barcode.to_string()),
            variation_name: Some("Blue".to_string()),
            status: None,
        }
    }

    /// Places an order for `buyer` through the service.
    pub async fn place_order(
        &self,
        buyer: &str,
        barcode: &str,
        quantity: i32,
        price: Decimal,
    ) -> OrderResponse {
        self.orders()
            .create_order(&Self::principal(buyer), Self::order_request(barcode, quantity, price))
            .await
            .expect("place order")
    }

    /// Writes a status directly, bypassing every guard.
    pub async fn force_status(&self, order_id: &str, status: OrderStatus) {
        OrderRepository::set_status(self.db(), order_id, status)
            .await
            .expect("force status");
    }

    /// Places a `MUG` order for [`BUYER`] and walks it to `status` the way
    /// the marketplace would: seller accepts, [`SHIPPER`] claims and starts.
    pub async fn order_in(&self, status: OrderStatus) -> String {
        let order = self.place_order(BUYER, MUG, 1, Decimal::new(1250, 2)).await;
        let seller = Self::principal(SELLER);
        let shipper = Self::principal(SHIPPER);

        let path: &[OrderStatus] = match status {
            OrderStatus::Pending => &[],
            OrderStatus::Processing => &[OrderStatus::Processing],
            OrderStatus::Dispatched => &[OrderStatus::Processing, OrderStatus::Dispatched],
            OrderStatus::Delivering => &[
                OrderStatus::Processing,
                OrderStatus::Dispatched,
                OrderStatus::Delivering,
            ],
            OrderStatus::Delivered => &[
                OrderStatus::Processing,
                OrderStatus::Dispatched,
                OrderStatus::Delivering,
                OrderStatus::Delivered,
            ],
            other => {
                self.force_status(&order.id, other).await;
                &[]
            }
        };

        for step in path {
            match step {
                OrderStatus::Processing => {
                    self.lifecycle()
                        .update_order_status(&seller, &order.id, "Processing")
                        .await
                        .expect("seller accepts");
                }
                OrderStatus::Dispatched => {
                    self.lifecycle()
                        .claim_order(&shipper, &order.id)
                        .await
                        .expect("shipper claims");
                }
                OrderStatus::Delivering => {
                    self.lifecycle()
                        .start_delivery(&shipper, &order.id)
                        .await
                        .expect("shipper departs");
                }
                OrderStatus::Delivered => {
                    self.lifecycle()
                        .confirm_delivery(&shipper, &order.id)
                        .await
                        .expect("shipper delivers");
                }
                _ => unreachable!(),
            }
        }
        order.id
    }

    pub async fn stored_order(&self, order_id: &str) -> Option<order_entity::Model> {
        order_entity::Entity::find_by_id(order_id.to_string())
            .one(self.db())
            .await
            .expect("load order")
    }

    pub async fn item_count(&self, order_id: &str) -> u64 {
        order_item_entity::Entity::find()
            .filter(order_item_entity::Column::OrderId.eq(order_id))
            .count(self.db())
            .await
            .expect("count items")
    }

    pub async fn claims(&self, order_id: &str) -> Vec<delivery_entity::Model> {
        delivery_entity::Entity::find()
            .filter(delivery_entity::Column::OrderId.eq(order_id))
            .all(self.db())
            .await
            .expect("load claims")
    }

    /// Adds a line item directly, for multi-item orders.
    pub async fn add_item(&self, item_id: &str, order_id: &str, barcode: &str, quantity: i32, price: Decimal) {
        order_item_entity::ActiveModel {
            id: Set(item_id.to_string()),
            order_id: Set(order_id.to_string()),
            barcode: Set(barcode.to_string()),
            variation_name: Set("Large".to_string()),
            quantity: Set(quantity),
            price: Set(price),
        }
        .insert(self.db())
        .await
        .expect("insert item");
        OrderRepository::recompute_total(self.db(), order_id)
            .await
            .expect("recompute total");
    }

    /// Send a request against the router, authenticated as `user` when given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .map(|s| s.parse().expect("decimal string"))
        .or_else(|| value.as_f64().and_then(|f| Decimal::try_from(f).ok()))
        .expect("decimal value")
}
