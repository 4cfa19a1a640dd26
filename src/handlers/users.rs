use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::user;
use crate::errors::ServiceError;
use crate::services::users::{
    generate_password, CreateUserRequest, ResetPasswordRequest, UpdateUserRequest, UserListParams,
    UserStats, UserWithPassword,
};
use crate::{AppState, Paginated};

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UserListParams>,
) -> Result<Json<Paginated<user::Model>>, ServiceError> {
    let (data, total, total_pages) = state.services.users.list(params).await?;
    Ok(Json(Paginated {
        data,
        total,
        total_pages,
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<user::Model>, ServiceError> {
    Ok(Json(state.services.users.get(id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserWithPassword>), ServiceError> {
    let created = state.services.users.create(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<user::Model>, ServiceError> {
    Ok(Json(state.services.users.update(id, req).await?))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<UserWithPassword>, ServiceError> {
    Ok(Json(state.services.users.reset_password(id, req).await?))
}

/// Stateless helper for the admin UI's "suggest a password" button.
pub async fn generate_password_handler() -> Json<serde_json::Value> {
    Json(json!({ "password": generate_password() }))
}

pub async fn user_stats(State(state): State<AppState>) -> Result<Json<UserStats>, ServiceError> {
    Ok(Json(state.services.users.stats().await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.users.delete(id, actor.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
