use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    queries::order_queries::{OrderDetailsRow, OrderSummary, SellerOrder, TopSellingProduct},
    services::{
        order_lifecycle::TransitionResponse,
        orders::{
            CreateOrderRequest, OrderDetailsFilter, OrderResponse, SellerOrderFilter,
            TopSellingFilter, UpdateOrderRequest,
        },
    },
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// One of Pending, Processing, Shipped, Delivered, Cancelled
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotalResponse {
    pub order_id: String,
    #[schema(value_type = String, example = "59.97")]
    pub total: Decimal,
}

/// Routes mounted under `/api/orders`
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/my-orders", get(list_my_orders))
        .route("/details", get(order_details))
        .route("/reports/top-selling", get(top_selling_products))
        .route("/seller", get(seller_orders))
        .route("/claim/:order_id", post(claim_order))
        .route("/start/:order_id", post(start_delivery))
        .route("/confirm/:order_id", post(confirm_delivery))
        .route(
            "/:order_id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/:order_id/total", get(get_order_total))
        .route("/:order_id/status", patch(update_order_status))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    summary = "Create order",
    description = "Create an order with a single line item for the requesting buyer",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created successfully", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Missing or invalid fields", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state.services.orders.create_order(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

#[utoipa::path(
    get,
    path = "/api/orders/my-orders",
    summary = "List own orders",
    responses(
        (status = 200, description = "Orders placed by the caller, newest first", body = ApiResponse<Vec<OrderSummary>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderSummary>>>, ServiceError> {
    let orders = state.services.orders.list_my_orders(&principal).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/orders/details",
    summary = "Order details",
    description = "Orders joined with the buyer profile, scoped by the caller's role",
    params(OrderDetailsFilter),
    responses(
        (status = 200, description = "Order details", body = ApiResponse<Vec<OrderDetailsRow>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn order_details(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(filter): Query<OrderDetailsFilter>,
) -> Result<Json<ApiResponse<Vec<OrderDetailsRow>>>, ServiceError> {
    let rows = state.services.orders.order_details(&principal, filter).await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/orders/reports/top-selling",
    summary = "Top selling products",
    params(TopSellingFilter),
    responses(
        (status = 200, description = "SKUs by quantity delivered; non-admins see only their own SKUs", body = ApiResponse<Vec<TopSellingProduct>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Another seller's report", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn top_selling_products(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(filter): Query<TopSellingFilter>,
) -> Result<Json<ApiResponse<Vec<TopSellingProduct>>>, ServiceError> {
    let products = state
        .services
        .orders
        .top_selling_products(&principal, filter)
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

#[utoipa::path(
    get,
    path = "/api/orders/seller",
    summary = "Seller orders",
    params(SellerOrderFilter),
    responses(
        (status = 200, description = "Orders containing the seller's products", body = ApiResponse<Vec<SellerOrder>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn seller_orders(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(filter): Query<SellerOrderFilter>,
) -> Result<Json<ApiResponse<Vec<SellerOrder>>>, ServiceError> {
    let orders = state.services.orders.seller_orders(&principal, filter).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/orders/{order_id}",
    summary = "Get order",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with its line items", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(&principal, &order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/orders/{order_id}/total",
    summary = "Get order total",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Stored order total", body = ApiResponse<OrderTotalResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order_total(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderTotalResponse>>, ServiceError> {
    let total = state
        .services
        .orders
        .get_order_total(&principal, &order_id)
        .await?;
    Ok(Json(ApiResponse::success(OrderTotalResponse { order_id, total })))
}

#[utoipa::path(
    put,
    path = "/api/orders/{order_id}",
    summary = "Update order",
    description = "Change the shipping address; administrators may also set the status",
    params(("order_id" = String, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<OrderSummary>),
        (status = 400, description = "Nothing to update", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the order owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already dispatched", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<ApiResponse<OrderSummary>>, ServiceError> {
    let order = state
        .services
        .orders
        .update_order(&principal, &order_id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    delete,
    path = "/api/orders/{order_id}",
    summary = "Cancel order",
    description = "Deletes a Pending or Processing order with its line items",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order cancelled"),
        (status = 403, description = "Not the order owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order in transit or delivered", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .orders
        .delete_order(&principal, &order_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/api/orders/{order_id}/status",
    summary = "Update order status",
    params(("order_id" = String, Path, description = "Order ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<TransitionResponse>),
        (status = 400, description = "Status not accepted", body = crate::errors::ErrorResponse),
        (status = 403, description = "Role may not make this change", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order in the wrong status", body = crate::errors::ErrorResponse)
    ),
    tag = "lifecycle"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<TransitionResponse>>, ServiceError> {
    let outcome = state
        .services
        .lifecycle
        .update_order_status(&principal, &order_id, &request.status)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/orders/claim/{order_id}",
    summary = "Claim order for delivery",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order dispatched to the caller", body = ApiResponse<TransitionResponse>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not Processing", body = crate::errors::ErrorResponse)
    ),
    tag = "lifecycle"
)]
pub async fn claim_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<TransitionResponse>>, ServiceError> {
    let outcome = state
        .services
        .lifecycle
        .claim_order(&principal, &order_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/orders/start/{order_id}",
    summary = "Start delivery",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order is being delivered", body = ApiResponse<TransitionResponse>),
        (status = 403, description = "Order not assigned to the caller", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not Dispatched", body = crate::errors::ErrorResponse)
    ),
    tag = "lifecycle"
)]
pub async fn start_delivery(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<TransitionResponse>>, ServiceError> {
    let outcome = state
        .services
        .lifecycle
        .start_delivery(&principal, &order_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/orders/confirm/{order_id}",
    summary = "Confirm delivery",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order delivered", body = ApiResponse<TransitionResponse>),
        (status = 403, description = "Order not assigned to the caller", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not Delivering", body = crate::errors::ErrorResponse)
    ),
    tag = "lifecycle"
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<TransitionResponse>>, ServiceError> {
    let outcome = state
        .services
        .lifecycle
        .confirm_delivery(&principal, &order_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
