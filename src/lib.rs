/*!
 * pedidos-api: order management backend.
 *
 * Customers, products and orders with a status lifecycle
 * (pendiente -> compra -> facturado, nulo as cancellation) and same-day
 * duplicate consolidation at creation time. REST surface under `/api/v1`,
 * JWT authentication with role capabilities under `/auth`.
 */

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Extension, Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::json;
use utoipa::OpenApi;

use crate::auth::{consts, AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::services::AppServices;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub services: Arc<AppServices>,
    pub auth: Arc<AuthService>,
    pub config: Arc<AppConfig>,
}

/// Standard list envelope.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub total_pages: u64,
}

pub async fn api_status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "up" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "down" })),
            )
        }
    }
}

async fn openapi_json() -> impl IntoResponse {
    Json(openapi::ApiDoc::openapi())
}

/// Capability-gated API routes. Each group carries its own auth + capability
/// middleware; groups sharing a path use disjoint methods, so merging keeps
/// every method behind its own gate.
pub fn api_v1_routes() -> Router<AppState> {
    let orders_read = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .with_capability(consts::ORDERS_READ);
    let orders_create = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .with_capability(consts::ORDERS_CREATE);
    let orders_manage = Router::new()
        .route("/orders/:id", patch(handlers::orders::update_order))
        .route("/orders/:id/status", patch(handlers::orders::set_status))
        .route("/orders/:id/deliver", patch(handlers::orders::mark_delivered))
        .route("/orders/:id/nullify", patch(handlers::orders::mark_nullified))
        .with_capability(consts::ORDERS_MANAGE);

    let customers_read = Router::new()
        .route("/customers", get(handlers::customers::list_customers))
        .route("/customers/:id", get(handlers::customers::get_customer))
        .with_capability(consts::CUSTOMERS_READ);
    let customers_create = Router::new()
        .route("/customers", post(handlers::customers::create_customer))
        .route(
            "/customers/bulk",
            post(handlers::customers::bulk_create_customers),
        )
        .with_capability(consts::CUSTOMERS_CREATE);
    let customers_update = Router::new()
        .route("/customers/:id", put(handlers::customers::update_customer))
        .with_capability(consts::CUSTOMERS_UPDATE);
    let customers_delete = Router::new()
        .route(
            "/customers/:id",
            delete(handlers::customers::delete_customer),
        )
        .with_capability(consts::CUSTOMERS_DELETE);

    let products_read = Router::new()
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .route(
            "/products/meta/categories",
            get(handlers::products::list_categories),
        )
        .with_capability(consts::PRODUCTS_READ);
    let products_create = Router::new()
        .route("/products", post(handlers::products::create_product))
        .route(
            "/products/bulk",
            post(handlers::products::bulk_create_products),
        )
        .with_capability(consts::PRODUCTS_CREATE);
    let products_update = Router::new()
        .route("/products/:id", put(handlers::products::update_product))
        .with_capability(consts::PRODUCTS_UPDATE);
    let products_stock = Router::new()
        .route("/products/:id/stock", patch(handlers::products::update_stock))
        .with_capability(consts::PRODUCTS_STOCK);
    let products_delete = Router::new()
        .route("/products/:id", delete(handlers::products::delete_product))
        .with_capability(consts::PRODUCTS_DELETE);

    let users = Router::new()
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/users/stats", get(handlers::users::user_stats))
        .route(
            "/users/generate-password",
            post(handlers::users::generate_password_handler),
        )
        .route(
            "/users/:id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/users/:id/password", put(handlers::users::reset_password))
        .with_capability(consts::USERS_MANAGE);

    let dashboard = Router::new()
        .route("/dashboard/metrics", get(handlers::dashboard::metrics))
        .route(
            "/dashboard/recent-orders",
            get(handlers::dashboard::recent_orders),
        )
        .route("/dashboard/low-stock", get(handlers::dashboard::low_stock))
        .route("/dashboard/stats", get(handlers::dashboard::daily_stats))
        .route(
            "/dashboard/top-products",
            get(handlers::dashboard::top_products),
        )
        .route(
            "/dashboard/top-customers",
            get(handlers::dashboard::top_customers),
        )
        .with_capability(consts::DASHBOARD_READ);

    let notifications = Router::new()
        .route(
            "/notifications/config",
            get(handlers::notifications::get_config).put(handlers::notifications::update_config),
        )
        .route(
            "/notifications/test",
            post(handlers::notifications::send_test),
        )
        .route(
            "/notifications/sync-users",
            post(handlers::notifications::sync_users),
        )
        .route(
            "/notifications/extra-emails",
            post(handlers::notifications::add_extra_email),
        )
        .route(
            "/notifications/extra-emails/:email",
            delete(handlers::notifications::remove_extra_email),
        )
        .with_capability(consts::NOTIFICATIONS_MANAGE);

    Router::new()
        .merge(orders_read)
        .merge(orders_create)
        .merge(orders_manage)
        .merge(customers_read)
        .merge(customers_create)
        .merge(customers_update)
        .merge(customers_delete)
        .merge(products_read)
        .merge(products_create)
        .merge(products_update)
        .merge(products_stock)
        .merge(products_delete)
        .merge(users)
        .merge(dashboard)
        .merge(notifications)
}

/// Full application router, minus the outermost operational layers
/// (trace, CORS, timeout) which `main` attaches from config.
pub fn app_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(handlers::auth::login))
        .merge(
            Router::new()
                .route(
                    "/me",
                    get(handlers::auth::me).put(handlers::auth::update_me),
                )
                .route("/password", put(handlers::auth::change_password))
                .route("/logout", post(handlers::auth::logout))
                .with_auth(),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/auth", auth_routes)
        .nest("/api/v1", api_v1_routes())
        .layer(Extension(state.auth.clone()))
        .with_state(state)
}
