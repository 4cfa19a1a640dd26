use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::errors::{DuplicateMatch, ErrorResponse};
use crate::services::duplicates::DuplicateResolution;
use crate::services::lifecycle::{DeliveryStatus, OrderStatus};
use crate::services::orders::{
    CreateOrderItemRequest, CreateOrderRequest, OrderItemView, OrderView, SetStatusRequest,
    UpdateOrderRequest,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::create_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::set_status,
        crate::handlers::orders::mark_delivered,
        crate::handlers::orders::mark_nullified,
    ),
    components(schemas(
        OrderView,
        OrderItemView,
        CreateOrderRequest,
        CreateOrderItemRequest,
        UpdateOrderRequest,
        SetStatusRequest,
        OrderStatus,
        DeliveryStatus,
        DuplicateResolution,
        DuplicateMatch,
        ErrorResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Order lifecycle and duplicate consolidation")
    ),
    info(
        title = "pedidos-api",
        description = "Order management backend with a status lifecycle and same-day duplicate consolidation"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("bearer_auth"));
    }
}
