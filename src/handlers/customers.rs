use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::entities::customer;
use crate::errors::ServiceError;
use crate::services::customers::{
    BulkOutcome, CreateCustomerRequest, CustomerListParams, UpdateCustomerRequest,
};
use crate::{AppState, Paginated};

pub async fn list_customers(
    State(state): State<AppState>,
    Query(params): Query<CustomerListParams>,
) -> Result<Json<Paginated<customer::Model>>, ServiceError> {
    let (data, total, total_pages) = state.services.customers.list(params).await?;
    Ok(Json(Paginated {
        data,
        total,
        total_pages,
    }))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<customer::Model>, ServiceError> {
    Ok(Json(state.services.customers.get(id).await?))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<customer::Model>), ServiceError> {
    let model = state.services.customers.create(req).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

pub async fn bulk_create_customers(
    State(state): State<AppState>,
    Json(rows): Json<Vec<CreateCustomerRequest>>,
) -> Result<(StatusCode, Json<BulkOutcome>), ServiceError> {
    let outcome = state.services.customers.bulk_create(rows).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCustomerRequest>,
) -> Result<Json<customer::Model>, ServiceError> {
    Ok(Json(state.services.customers.update(id, req).await?))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.customers.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
