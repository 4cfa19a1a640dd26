use axum::{
    extract::{Query, State},
    Json,
};

use crate::entities::product;
use crate::errors::ServiceError;
use crate::services::dashboard::{
    DailyCount, DashboardMetrics, RecentOrder, TopCustomer, TopProduct, WindowParams,
};
use crate::AppState;

pub async fn metrics(State(state): State<AppState>) -> Result<Json<DashboardMetrics>, ServiceError> {
    Ok(Json(state.services.dashboard.metrics().await?))
}

pub async fn recent_orders(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<RecentOrder>>, ServiceError> {
    Ok(Json(state.services.dashboard.recent_orders(params).await?))
}

pub async fn low_stock(
    State(state): State<AppState>,
) -> Result<Json<Vec<product::Model>>, ServiceError> {
    Ok(Json(state.services.dashboard.low_stock().await?))
}

pub async fn daily_stats(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<DailyCount>>, ServiceError> {
    Ok(Json(state.services.dashboard.daily_stats(params).await?))
}

pub async fn top_products(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<TopProduct>>, ServiceError> {
    Ok(Json(state.services.dashboard.top_products(params).await?))
}

pub async fn top_customers(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<TopCustomer>>, ServiceError> {
    Ok(Json(state.services.dashboard.top_customers(params).await?))
}
