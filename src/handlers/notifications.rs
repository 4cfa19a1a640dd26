use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::errors::ServiceError;
use crate::services::notifications::{
    AddRecipientRequest, NotificationConfig, TestSendRequest, UpdateConfigRequest,
};
use crate::AppState;

pub async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<NotificationConfig>, ServiceError> {
    Ok(Json(state.services.notifications.get_config().await?))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<UpdateConfigRequest>,
) -> Result<Json<NotificationConfig>, ServiceError> {
    Ok(Json(state.services.notifications.update_config(req).await?))
}

pub async fn add_extra_email(
    State(state): State<AppState>,
    Json(req): Json<AddRecipientRequest>,
) -> Result<(StatusCode, Json<NotificationConfig>), ServiceError> {
    let config = state.services.notifications.add_extra_email(req).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn remove_extra_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<NotificationConfig>, ServiceError> {
    Ok(Json(
        state
            .services
            .notifications
            .remove_extra_email(&email)
            .await?,
    ))
}

pub async fn sync_users(
    State(state): State<AppState>,
) -> Result<Json<NotificationConfig>, ServiceError> {
    Ok(Json(state.services.notifications.sync_users().await?))
}

pub async fn send_test(
    State(state): State<AppState>,
    Json(req): Json<TestSendRequest>,
) -> Result<StatusCode, ServiceError> {
    state.services.notifications.send_test(req).await?;
    Ok(StatusCode::NO_CONTENT)
}
