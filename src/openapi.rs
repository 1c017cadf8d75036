use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace Orders API",
        version = "1.0.0",
        description = r#"
Order lifecycle service for a multi-role marketplace.

Buyers place and cancel orders, sellers advance orders containing their
products, shippers claim and deliver them and administrators may override any
status.

## Authentication

Requests are authenticated upstream. The gateway forwards the caller's user id
in the `x-user-id` header; the caller's role is resolved from it.

## Errors

```json
{
  "error": "Conflict",
  "message": "Invalid state: order must be Processing but is Pending",
  "details": {"expected": ["Processing"], "actual": "Pending"},
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    tags(
        (name = "orders", description = "Order creation, updates and listings"),
        (name = "lifecycle", description = "Claim, delivery and status transitions"),
        (name = "reports", description = "Read-only reports")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::order_details,
        crate::handlers::orders::top_selling_products,
        crate::handlers::orders::seller_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_total,
        crate::handlers::orders::update_order,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::claim_order,
        crate::handlers::orders::start_delivery,
        crate::handlers::orders::confirm_delivery,
    ),
    components(
        schemas(
            crate::models::OrderStatus,
            crate::auth::Role,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::UpdateOrderRequest,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::order_lifecycle::TransitionResponse,
            crate::services::order_lifecycle::DeliveryClaimResponse,
            crate::queries::order_queries::OrderSummary,
            crate::queries::order_queries::OrderDetailsRow,
            crate::queries::order_queries::TopSellingProduct,
            crate::queries::order_queries::SellerOrder,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::orders::OrderTotalResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
