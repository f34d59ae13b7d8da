use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created, validate_input},
    services::payment_proofs::{PaymentProofRequest, PaymentProofResponse},
    ApiResponse, AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-proof",
    summary = "Submit payment proof",
    params(("id" = i32, Path, description = "Order id")),
    request_body = PaymentProofRequest,
    responses(
        (status = 201, description = "Payment proof submitted", body = ApiResponse<PaymentProofResponse>),
        (status = 400, description = "Order cancelled, already paid or a proof is pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payment-proofs"
)]
pub async fn submit_payment_proof(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<i32>,
    Json(request): Json<PaymentProofRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentProofResponse>>), ServiceError> {
    validate_input(&request)?;

    let proof = state
        .services
        .payment_proofs
        .submit(user.user_id, order_id, request.into_input())
        .await?;

    Ok(created(proof))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/payment-proof",
    summary = "Get latest payment proof",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment proof retrieved", body = ApiResponse<PaymentProofResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or proof not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payment-proofs"
)]
pub async fn get_payment_proof(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<i32>,
) -> Result<Json<ApiResponse<PaymentProofResponse>>, ServiceError> {
    let proof = state
        .services
        .payment_proofs
        .get_latest(user.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(proof)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/payment-proof",
    summary = "Update pending payment proof",
    params(("id" = i32, Path, description = "Order id")),
    request_body = PaymentProofRequest,
    responses(
        (status = 200, description = "Payment proof updated", body = ApiResponse<PaymentProofResponse>),
        (status = 400, description = "Proof already reviewed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or proof not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payment-proofs"
)]
pub async fn update_payment_proof(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<i32>,
    Json(request): Json<PaymentProofRequest>,
) -> Result<Json<ApiResponse<PaymentProofResponse>>, ServiceError> {
    validate_input(&request)?;

    let proof = state
        .services
        .payment_proofs
        .update(user.user_id, order_id, request.into_input())
        .await?;

    Ok(Json(
        ApiResponse::success(proof).with_message("Payment proof updated successfully"),
    ))
}
