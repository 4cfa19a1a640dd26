use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::orders::{
    CreateOrderRequest, CreateOutcome, OrderListParams, SetStatusRequest, UpdateOrderRequest,
};
use crate::{AppState, Paginated};

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number, 1-based"),
        ("per_page" = Option<u64>, Query, description = "Page size (max 100)"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer"),
        ("search" = Option<String>, Query, description = "Order number substring"),
    ),
    responses((status = 200, description = "Paginated orders")),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderListParams>,
) -> Result<Json<Paginated<crate::services::orders::OrderView>>, ServiceError> {
    let (data, total, total_pages) = state.services.orders.list_orders(params).await?;
    Ok(Json(Paginated {
        data,
        total,
        total_pages,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = crate::services::orders::OrderView),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::services::orders::OrderView>, ServiceError> {
    Ok(Json(state.services.orders.get_order(id).await?))
}

/// Create an order, running the same-day duplicate resolver.
///
/// With duplicates and no `handle_duplicates` field the call fails with 409
/// and a `duplicates` array; `merge` folds quantities into today's matching
/// order, `ignore` creates a separate order.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = crate::services::orders::OrderView),
        (status = 200, description = "Lines merged into an existing order"),
        (status = 409, description = "Unresolved same-day duplicate", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation failed", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    match state.services.orders.create_order(req, user.user_id).await? {
        CreateOutcome::Created(order) => Ok((StatusCode::CREATED, Json(order)).into_response()),
        CreateOutcome::Merged { updated, created } => Ok((
            StatusCode::OK,
            Json(json!({
                "merged": true,
                "orders": updated,
                "created": created,
            })),
        )
            .into_response()),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated", body = crate::services::orders::OrderView),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<crate::services::orders::OrderView>, ServiceError> {
    Ok(Json(state.services.orders.update_order(id, req).await?))
}

/// Free-form status override for order managers.
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = crate::services::orders::OrderView),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<crate::services::orders::OrderView>, ServiceError> {
    Ok(Json(state.services.orders.set_status(id, req.status).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Delivery recorded", body = crate::services::orders::OrderView),
        (status = 422, description = "Not deliverable from the current state", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn mark_delivered(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::services::orders::OrderView>, ServiceError> {
    Ok(Json(state.services.orders.mark_delivered(id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/nullify",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order nullified", body = crate::services::orders::OrderView),
        (status = 422, description = "Too early or not nullifiable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn mark_nullified(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::services::orders::OrderView>, ServiceError> {
    Ok(Json(state.services.orders.mark_nullified(id).await?))
}
