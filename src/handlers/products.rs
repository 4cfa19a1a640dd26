use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;
use crate::services::customers::BulkOutcome;
use crate::services::products::{
    CreateProductRequest, ProductListParams, UpdateProductRequest, UpdateStockRequest,
};
use crate::{AppState, Paginated};

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<Paginated<product::Model>>, ServiceError> {
    let (data, total, total_pages) = state.services.products.list(params).await?;
    Ok(Json(Paginated {
        data,
        total,
        total_pages,
    }))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(state.services.products.get(id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<product::Model>), ServiceError> {
    let model = state.services.products.create(req).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

pub async fn bulk_create_products(
    State(state): State<AppState>,
    Json(rows): Json<Vec<CreateProductRequest>>,
) -> Result<(StatusCode, Json<BulkOutcome>), ServiceError> {
    let outcome = state.services.products.bulk_create(rows).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(state.services.products.update(id, req).await?))
}

pub async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStockRequest>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(state.services.products.update_stock(id, req).await?))
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ServiceError> {
    Ok(Json(state.services.products.categories().await?))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.products.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
