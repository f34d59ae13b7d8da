use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created, validate_input},
    services::orders::{CreateOrderRequest, OrderListResponse, OrderResponse},
    ApiResponse, AppState,
};

/// Create an order from the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Snapshot the caller's cart into a new pending order and clear the cart",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created successfully", body = ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Empty cart or invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 503, description = "Cart could not be read", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    validate_input(&request)?;

    let order = state
        .services
        .orders
        .create_order(user.user_id, request)
        .await?;

    Ok(created(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List my orders",
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state.services.orders.list_user_orders(user.user_id).await?;
    Ok(Json(ApiResponse::success(orders.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_user_order(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Buyers may cancel only while the order is pending",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is no longer pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.cancel_order(user.user_id, id).await?;
    Ok(Json(
        ApiResponse::success(order).with_message("Order cancelled successfully"),
    ))
}
