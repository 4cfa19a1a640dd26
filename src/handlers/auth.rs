use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use tracing::info;

use crate::auth::{AuthUser, LoginCredentials};
use crate::errors::ServiceError;
use crate::services::users::{ChangePasswordRequest, UpdateProfileRequest};
use crate::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<LoginCredentials>,
) -> Result<Json<serde_json::Value>, crate::auth::AuthError> {
    let (account, token) = state.auth.login(&credentials).await?;
    info!(user_id = %account.id, "login");
    Ok(Json(json!({ "user": account, "token": token })))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let account = state.services.users.get(user.user_id).await?;
    Ok(Json(json!({ "user": account })))
}

pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let account = state
        .services
        .users
        .update_profile(user.user_id, req)
        .await?;
    Ok(Json(json!({ "user": account })))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .users
        .change_password(user.user_id, req)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Tokens are stateless; logout only exists so the client has a uniform
/// endpoint to call while discarding its token.
pub async fn logout(user: AuthUser) -> StatusCode {
    info!(user_id = %user.user_id, "logout");
    StatusCode::NO_CONTENT
}
