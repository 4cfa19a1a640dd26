mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use pedidos_api::errors::ServiceError;
use pedidos_api::services::lifecycle::{DeliveryStatus, OrderStatus};
use pedidos_api::services::orders::{
    CreateOrderItemRequest, CreateOrderRequest, CreateOutcome, OrderView,
};
use uuid::Uuid;

use common::TestApp;

fn request(customer_id: Uuid, product_id: Uuid, quantity: i32) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id,
        order_number: None,
        items: vec![CreateOrderItemRequest {
            product_id,
            quantity,
            unit_price: None,
            unit_of_measure: None,
            brand: None,
            format: None,
            notes: None,
        }],
        delivery_due: Utc::now() + Duration::days(3),
        notes: None,
        handle_duplicates: None,
    }
}

fn created(outcome: CreateOutcome) -> OrderView {
    match outcome {
        CreateOutcome::Created(view) => view,
        other => panic!("expected a plain creation, got {other:?}"),
    }
}

async fn seeded_order(app: &TestApp) -> OrderView {
    let customer = app.seed_customer("Comercial Sur").await;
    let product = app.seed_product("Harina 25kg", "HAR-25").await;
    let actor = app.seed_user("vendedor").await;
    created(
        app.services
            .orders
            .create_order(request(customer.id, product.id, 3), actor.id)
            .await
            .expect("create order"),
    )
}

#[tokio::test]
async fn new_orders_start_pending_with_version_one() {
    let app = TestApp::spawn().await;
    let order = seeded_order(&app).await;

    assert_eq!(order.status, OrderStatus::Pendiente);
    assert_eq!(order.version, 1);
    assert!(order.delivered_at.is_none());
    // No delivery label before invoicing.
    assert_eq!(order.delivery_status, None);
    assert_eq!(order.items.len(), 1);
    assert!(order.order_number.starts_with("PED-"));
}

#[tokio::test]
async fn status_override_is_free_form_and_bumps_version() {
    let app = TestApp::spawn().await;
    let order = seeded_order(&app).await;

    let updated = app
        .services
        .orders
        .set_status(order.id, OrderStatus::Facturado)
        .await
        .expect("status override");
    assert_eq!(updated.status, OrderStatus::Facturado);
    assert_eq!(updated.version, 2);
    // The delivery label appears with invoicing and goes away again below.
    assert_eq!(updated.delivery_status, Some(DeliveryStatus::Pendiente));

    // Backwards moves are allowed through the override.
    let back = app
        .services
        .orders
        .set_status(order.id, OrderStatus::Compra)
        .await
        .expect("backwards override");
    assert_eq!(back.status, OrderStatus::Compra);
    assert_eq!(back.version, 3);
    assert_eq!(back.delivery_status, None);
}

#[tokio::test]
async fn delivery_only_from_facturado_and_only_once() {
    let app = TestApp::spawn().await;
    let order = seeded_order(&app).await;

    // Not invoiced yet.
    assert_matches!(
        app.services.orders.mark_delivered(order.id).await,
        Err(ServiceError::InvalidTransition(_))
    );

    app.services
        .orders
        .set_status(order.id, OrderStatus::Facturado)
        .await
        .expect("invoice");
    let delivered = app
        .services
        .orders
        .mark_delivered(order.id)
        .await
        .expect("deliver");
    let delivered_at = delivered.delivered_at.expect("delivery timestamp");
    assert_eq!(delivered.delivery_status, Some(DeliveryStatus::Entregado));

    // Second attempt is rejected and the timestamp stays put.
    assert_matches!(
        app.services.orders.mark_delivered(order.id).await,
        Err(ServiceError::InvalidTransition(_))
    );
    let reloaded = app
        .services
        .orders
        .get_order(order.id)
        .await
        .expect("reload");
    assert_eq!(reloaded.delivered_at, Some(delivered_at));
}

#[tokio::test]
async fn nullification_waits_out_the_cooldown() {
    let app = TestApp::spawn().await;
    let order = seeded_order(&app).await;

    // Fresh order: way too early.
    assert_matches!(
        app.services.orders.mark_nullified(order.id).await,
        Err(ServiceError::TooEarly(_))
    );

    // Six days old: still too early.
    app.backdate_order(order.id, 6).await;
    assert_matches!(
        app.services.orders.mark_nullified(order.id).await,
        Err(ServiceError::TooEarly(_))
    );

    // Seven days old: allowed.
    app.backdate_order(order.id, 7).await;
    let nullified = app
        .services
        .orders
        .mark_nullified(order.id)
        .await
        .expect("nullify");
    assert_eq!(nullified.status, OrderStatus::Nulo);
}

#[tokio::test]
async fn nullification_rejected_for_invoiced_orders() {
    let app = TestApp::spawn().await;
    let order = seeded_order(&app).await;
    app.backdate_order(order.id, 30).await;

    app.services
        .orders
        .set_status(order.id, OrderStatus::Facturado)
        .await
        .expect("invoice");
    assert_matches!(
        app.services.orders.mark_nullified(order.id).await,
        Err(ServiceError::InvalidTransition(_))
    );

    // Also rejected once already nullified.
    app.services
        .orders
        .set_status(order.id, OrderStatus::Compra)
        .await
        .expect("back to compra");
    app.services
        .orders
        .mark_nullified(order.id)
        .await
        .expect("nullify");
    assert_matches!(
        app.services.orders.mark_nullified(order.id).await,
        Err(ServiceError::InvalidTransition(_))
    );
}

#[tokio::test]
async fn overdue_flips_off_the_moment_delivery_lands() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("Minimarket Centro").await;
    let product = app.seed_product("Azucar 1kg", "AZU-01").await;
    let actor = app.seed_user("vendedor").await;

    let mut req = request(customer.id, product.id, 2);
    req.delivery_due = Utc::now() - Duration::days(2);
    let order = created(
        app.services
            .orders
            .create_order(req, actor.id)
            .await
            .expect("create"),
    );

    // Past due but not invoiced: not overdue, no delivery label.
    assert!(!order.overdue);
    assert_eq!(order.delivery_status, None);

    app.services
        .orders
        .set_status(order.id, OrderStatus::Facturado)
        .await
        .expect("invoice");
    let invoiced = app
        .services
        .orders
        .get_order(order.id)
        .await
        .expect("reload");
    assert!(invoiced.overdue);
    assert_eq!(invoiced.delivery_status, Some(DeliveryStatus::Vencido));

    let delivered = app
        .services
        .orders
        .mark_delivered(order.id)
        .await
        .expect("deliver");
    assert!(!delivered.overdue);
    assert_eq!(delivered.delivery_status, Some(DeliveryStatus::Entregado));
}

#[tokio::test]
async fn update_edits_details_and_respects_the_version() {
    let app = TestApp::spawn().await;
    let order = seeded_order(&app).await;
    let other_customer = app.seed_customer("Distribuidora Norte").await;

    let due = Utc::now() + Duration::days(10);
    let updated = app
        .services
        .orders
        .update_order(
            order.id,
            pedidos_api::services::orders::UpdateOrderRequest {
                customer_id: Some(other_customer.id),
                order_number: None,
                delivery_due: Some(due),
                notes: Some("entrega en bodega".into()),
            },
        )
        .await
        .expect("update");

    assert_eq!(updated.customer_id, other_customer.id);
    assert_eq!(updated.customer_name, "Distribuidora Norte");
    assert_eq!(updated.notes.as_deref(), Some("entrega en bodega"));
    assert_eq!(updated.version, order.version + 1);
}
