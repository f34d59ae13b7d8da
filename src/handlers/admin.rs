use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::validate_input,
    services::{
        orders::{OrderListResponse, OrderResponse, UpdateOrderStatusRequest},
        payment_proofs::{PaymentProofResponse, ReviewPaymentProofRequest},
    },
    ApiResponse, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    summary = "List all orders",
    description = "Every order with items and payment proofs, newest first",
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state.services.orders.admin_list_orders().await?;
    Ok(Json(ApiResponse::success(orders.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    summary = "Update order status",
    params(("id" = i32, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status or transition not allowed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    validate_input(&request)?;

    let updated = state
        .services
        .order_status
        .update_status(id, &request.status)
        .await?;
    info!(admin_id = admin.user_id, order_id = id, status = %updated.status, "Admin changed order status");

    let order = state.services.orders.get_order_any_owner(updated.id).await?;
    Ok(Json(
        ApiResponse::success(order).with_message("Order status updated successfully"),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/payment-proofs/{id}/review",
    summary = "Review payment proof",
    params(("id" = i32, Path, description = "Payment proof id")),
    request_body = ReviewPaymentProofRequest,
    responses(
        (status = 200, description = "Payment proof reviewed", body = ApiResponse<PaymentProofResponse>),
        (status = 400, description = "Proof already reviewed or bad decision", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment proof not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn review_payment_proof(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<i32>,
    Json(request): Json<ReviewPaymentProofRequest>,
) -> Result<Json<ApiResponse<PaymentProofResponse>>, ServiceError> {
    validate_input(&request)?;

    let proof = state
        .services
        .payment_proofs
        .review(admin.user_id, id, &request.status, request.admin_notes)
        .await?;

    Ok(Json(
        ApiResponse::success(proof).with_message("Payment proof reviewed successfully"),
    ))
}
