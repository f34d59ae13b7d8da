use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::{AuthError, AuthUser},
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub token_id: String,
}

/// Revokes the bearer token used for this request
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    summary = "Logout",
    responses(
        (status = 200, description = "Token revoked", body = ApiResponse<LogoutResponse>),
        (status = 400, description = "Token carries no id"),
        (status = 401, description = "Missing, invalid or revoked token"),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<LogoutResponse>>, AuthError> {
    state
        .auth
        .logout(&user.token_id, user.token_expiry())
        .await?;

    info!(user_id = user.user_id, "User logged out");
    Ok(Json(
        ApiResponse::success(LogoutResponse {
            token_id: user.token_id,
        })
        .with_message("Successfully logged out"),
    ))
}
