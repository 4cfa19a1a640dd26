mod common;

use chrono::{Duration, Utc};
use pedidos_api::errors::ServiceError;
use pedidos_api::services::duplicates::DuplicateResolution;
use pedidos_api::services::lifecycle::OrderStatus;
use pedidos_api::services::orders::{
    CreateOrderItemRequest, CreateOrderRequest, CreateOutcome, OrderView,
};
use uuid::Uuid;

use common::TestApp;

fn item(product_id: Uuid, quantity: i32) -> CreateOrderItemRequest {
    CreateOrderItemRequest {
        product_id,
        quantity,
        unit_price: None,
        unit_of_measure: None,
        brand: None,
        format: None,
        notes: None,
    }
}

fn request(
    customer_id: Uuid,
    items: Vec<CreateOrderItemRequest>,
    resolution: Option<DuplicateResolution>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id,
        order_number: None,
        items,
        delivery_due: Utc::now() + Duration::days(3),
        notes: None,
        handle_duplicates: resolution,
    }
}

fn created(outcome: CreateOutcome) -> OrderView {
    match outcome {
        CreateOutcome::Created(view) => view,
        other => panic!("expected a plain creation, got {other:?}"),
    }
}

#[tokio::test]
async fn unresolved_duplicate_conflicts_and_writes_nothing() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("Almacen La Esquina").await;
    let product = app.seed_product("Aceite 1L", "ACE-01").await;
    let actor = app.seed_user("vendedor").await;

    created(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 3)], None), actor.id)
            .await
            .expect("first create"),
    );

    let err = app
        .services
        .orders
        .create_order(request(customer.id, vec![item(product.id, 2)], None), actor.id)
        .await
        .expect_err("duplicate must conflict");

    match err {
        ServiceError::DuplicateConflict(duplicates) => {
            assert_eq!(duplicates.len(), 1);
            assert_eq!(duplicates[0].product_id, product.id);
            assert_eq!(duplicates[0].existing_qty, 3);
            assert_eq!(duplicates[0].new_qty, 2);
            assert_eq!(duplicates[0].unit, "caja");
        }
        other => panic!("expected a duplicate conflict, got {other}"),
    }

    assert_eq!(app.order_count().await, 1);
}

#[tokio::test]
async fn merge_folds_quantity_into_the_existing_order() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("Almacen La Esquina").await;
    let product = app.seed_product("Aceite 1L", "ACE-01").await;
    let actor = app.seed_user("vendedor").await;

    let first = created(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 3)], None), actor.id)
            .await
            .expect("first create"),
    );

    let outcome = app
        .services
        .orders
        .create_order(
            request(
                customer.id,
                vec![item(product.id, 2)],
                Some(DuplicateResolution::Merge),
            ),
            actor.id,
        )
        .await
        .expect("merge");

    match outcome {
        CreateOutcome::Merged { updated, created } => {
            assert!(created.is_none(), "all items merged, no batch order");
            assert_eq!(updated.len(), 1);
            assert_eq!(updated[0].id, first.id);
            assert_eq!(updated[0].items[0].quantity, 5);
            assert_eq!(updated[0].version, first.version + 1);
        }
        other => panic!("expected a merge, got {other:?}"),
    }
    assert_eq!(app.order_count().await, 1);
}

#[tokio::test]
async fn merge_batches_non_conflicting_items_into_one_new_order() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("Almacen La Esquina").await;
    let oil = app.seed_product("Aceite 1L", "ACE-01").await;
    let rice = app.seed_product("Arroz 1kg", "ARR-01").await;
    let actor = app.seed_user("vendedor").await;

    let first = created(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(oil.id, 3)], None), actor.id)
            .await
            .expect("first create"),
    );

    let outcome = app
        .services
        .orders
        .create_order(
            request(
                customer.id,
                vec![item(oil.id, 2), item(rice.id, 7)],
                Some(DuplicateResolution::Merge),
            ),
            actor.id,
        )
        .await
        .expect("merge with leftovers");

    match outcome {
        CreateOutcome::Merged { updated, created } => {
            assert_eq!(updated[0].id, first.id);
            assert_eq!(updated[0].items[0].quantity, 5);
            let batch = created.expect("leftover batch order");
            assert_eq!(batch.items.len(), 1);
            assert_eq!(batch.items[0].product_id, rice.id);
            assert_eq!(batch.items[0].quantity, 7);
        }
        other => panic!("expected a merge, got {other:?}"),
    }
    assert_eq!(app.order_count().await, 2);
}

#[tokio::test]
async fn ignore_keeps_both_orders_intact() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("Almacen La Esquina").await;
    let product = app.seed_product("Aceite 1L", "ACE-01").await;
    let actor = app.seed_user("vendedor").await;

    let first = created(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 3)], None), actor.id)
            .await
            .expect("first create"),
    );
    let second = created(
        app.services
            .orders
            .create_order(
                request(
                    customer.id,
                    vec![item(product.id, 2)],
                    Some(DuplicateResolution::Ignore),
                ),
                actor.id,
            )
            .await
            .expect("ignore"),
    );

    assert_ne!(first.id, second.id);
    assert_eq!(first.items[0].quantity, 3);
    assert_eq!(second.items[0].quantity, 2);
    assert_eq!(app.order_count().await, 2);
}

#[tokio::test]
async fn other_days_customers_and_nullified_orders_do_not_conflict() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("Almacen La Esquina").await;
    let other_customer = app.seed_customer("Ferreteria El Clavo").await;
    let product = app.seed_product("Aceite 1L", "ACE-01").await;
    let actor = app.seed_user("vendedor").await;

    let first = created(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 3)], None), actor.id)
            .await
            .expect("first create"),
    );

    // Different customer, same product, same day.
    created(
        app.services
            .orders
            .create_order(
                request(other_customer.id, vec![item(product.id, 1)], None),
                actor.id,
            )
            .await
            .expect("different customer is no duplicate"),
    );

    // Same customer but yesterday's order.
    app.backdate_order(first.id, 1).await;
    created(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 4)], None), actor.id)
            .await
            .expect("yesterday's order is no duplicate"),
    );

    // Nullified same-day orders are not candidates either.
    let latest = app
        .services
        .orders
        .list_orders(Default::default())
        .await
        .expect("list")
        .0
        .into_iter()
        .find(|o| o.customer_id == customer.id && o.status == OrderStatus::Pendiente)
        .expect("today's order");
    app.backdate_order(latest.id, 7).await;
    app.services
        .orders
        .mark_nullified(latest.id)
        .await
        .expect("nullify");
    app.backdate_order(latest.id, 0).await;

    created(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 9)], None), actor.id)
            .await
            .expect("nullified order is no duplicate"),
    );
}

#[tokio::test]
async fn concurrent_same_key_creations_resolve_to_one_winner() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("Almacen La Esquina").await;
    let product = app.seed_product("Aceite 1L", "ACE-01").await;
    let actor = app.seed_user("vendedor").await;

    let (a, b) = tokio::join!(
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 3)], None), actor.id),
        app.services
            .orders
            .create_order(request(customer.id, vec![item(product.id, 2)], None), actor.id),
    );

    let results = [a, b];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::DuplicateConflict(_))))
        .count();
    assert_eq!(winners, 1, "exactly one creation proceeds");
    assert_eq!(conflicts, 1, "the other observes the duplicate");
    assert_eq!(app.order_count().await, 1);
}
