//! Order creation, listing and lifecycle operations.
//!
//! Creation runs the duplicate resolver under the per-customer lock; the
//! lifecycle operations go through the pure guards in
//! [`crate::services::lifecycle`] and bump the optimistic version inside a
//! transaction. Orders are never physically deleted.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{customer, order, order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::duplicates::{
    find_conflicts, load_candidates, Candidate, CustomerLocks, DuplicateResolution,
};
use crate::services::lifecycle::{
    delivery_status, is_overdue, mark_delivered_check, mark_nullified_check, DeliveryStatus,
    OrderStatus,
};
use crate::services::notifications::NotificationService;

pub const MAX_ORDER_ITEMS: usize = 20;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderItemRequest {
    /// The operator UI sends this field as `product`.
    #[serde(alias = "product")]
    pub product_id: Uuid,
    pub quantity: i32,
    /// Defaults to the product's list price when omitted.
    pub unit_price: Option<Decimal>,
    /// Defaults to the product's unit when omitted.
    pub unit_of_measure: Option<String>,
    pub brand: Option<String>,
    pub format: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// The operator UI sends this field as `customer`.
    #[serde(alias = "customer")]
    pub customer_id: Uuid,
    /// Generated when omitted.
    pub order_number: Option<String>,
    pub items: Vec<CreateOrderItemRequest>,
    pub delivery_due: DateTime<Utc>,
    pub notes: Option<String>,
    /// `merge` or `ignore`. Absent means "fail with 409 if duplicates exist".
    #[serde(default, alias = "handleDuplicates")]
    pub handle_duplicates: Option<DuplicateResolution>,
}

/// Privileged edit of order details. Fields left out stay untouched.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub customer_id: Option<Uuid>,
    pub order_number: Option<String>,
    pub delivery_due: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    /// Substring match on the order number.
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_of_measure: String,
    pub unit_price: Decimal,
    pub brand: Option<String>,
    pub format: Option<String>,
    pub notes: Option<String>,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub status: OrderStatus,
    pub delivery_due: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Derived, never stored. Absent until the order is invoiced.
    pub delivery_status: Option<DeliveryStatus>,
    pub overdue: bool,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub total: Decimal,
    pub items: Vec<OrderItemView>,
}

/// Result of a create call once duplicates have been resolved.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(OrderView),
    /// One or more existing orders absorbed conflicting lines. `created` is
    /// the batch order holding any non-conflicting leftovers.
    Merged {
        updated: Vec<OrderView>,
        created: Option<OrderView>,
    },
}

/// A validated, price-resolved line ready to persist.
#[derive(Debug, Clone)]
struct NewLine {
    product_id: Uuid,
    quantity: i32,
    unit_of_measure: String,
    unit_price: Decimal,
    brand: Option<String>,
    format: Option<String>,
    notes: Option<String>,
}

/// One quantity fold produced by merge planning.
#[derive(Debug, PartialEq, Eq)]
struct LineMerge {
    order_id: Uuid,
    item_id: Uuid,
    product_id: Uuid,
    new_quantity: i32,
    added: i32,
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("unknown stored status {raw:?}")))
}

fn generate_order_number(id: Uuid) -> String {
    let hex = id.simple().to_string();
    format!("PED-{}", hex[..8].to_uppercase())
}

fn validate_items(items: &[CreateOrderItemRequest]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "an order needs at least one item".into(),
        ));
    }
    if items.len() > MAX_ORDER_ITEMS {
        return Err(ServiceError::ValidationError(format!(
            "an order can carry at most {MAX_ORDER_ITEMS} items"
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "item quantity must be greater than zero".into(),
            ));
        }
        if !seen.insert(item.product_id) {
            return Err(ServiceError::ValidationError(format!(
                "product {} appears more than once",
                item.product_id
            )));
        }
    }
    Ok(())
}

/// Splits incoming lines into quantity folds against existing same-day orders
/// and leftovers for a fresh order. Candidates arrive most recent first, so
/// each line folds into its most recent match.
fn plan_merge(candidates: &[Candidate], lines: &[NewLine]) -> (Vec<LineMerge>, Vec<NewLine>) {
    let mut merges = Vec::new();
    let mut leftovers = Vec::new();

    'next_line: for line in lines {
        for candidate in candidates {
            if let Some(existing) = candidate
                .items
                .iter()
                .find(|i| i.product_id == line.product_id)
            {
                merges.push(LineMerge {
                    order_id: candidate.order.id,
                    item_id: existing.id,
                    product_id: line.product_id,
                    new_quantity: existing.quantity + line.quantity,
                    added: line.quantity,
                });
                continue 'next_line;
            }
        }
        leftovers.push(line.clone());
    }
    (merges, leftovers)
}

pub struct OrderService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
    notifications: Arc<NotificationService>,
    locks: CustomerLocks,
    business_offset: FixedOffset,
    nullification_cooldown_days: i64,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        events: EventSender,
        notifications: Arc<NotificationService>,
        business_offset: FixedOffset,
        nullification_cooldown_days: i64,
    ) -> Self {
        Self {
            db,
            events,
            notifications,
            locks: CustomerLocks::new(),
            business_offset,
            nullification_cooldown_days,
        }
    }

    #[instrument(skip(self, req), fields(customer_id = %req.customer_id))]
    pub async fn create_order(
        &self,
        req: CreateOrderRequest,
        created_by: Uuid,
    ) -> Result<CreateOutcome, ServiceError> {
        validate_items(&req.items)?;

        let customer = customer::Entity::find_by_id(req.customer_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("customer {}", req.customer_id)))?;
        if !customer.active {
            return Err(ServiceError::ValidationError(format!(
                "customer {} is inactive",
                customer.name
            )));
        }

        let lines = self.resolve_lines(&req.items).await?;

        // Everything from the duplicate check to the write happens under the
        // customer's creation lock.
        let _guard = self.locks.acquire(req.customer_id).await;

        let now = Utc::now();
        let candidates =
            load_candidates(self.db.as_ref(), req.customer_id, now, self.business_offset).await?;
        let incoming: Vec<(Uuid, i32)> = lines.iter().map(|l| (l.product_id, l.quantity)).collect();
        let conflicts = find_conflicts(&candidates, &incoming);

        if conflicts.is_empty() {
            let view = self.insert_order(&req, &customer, &lines, created_by).await?;
            return Ok(CreateOutcome::Created(view));
        }

        match req.handle_duplicates {
            None => Err(ServiceError::DuplicateConflict(conflicts)),
            Some(DuplicateResolution::Ignore) => {
                let view = self.insert_order(&req, &customer, &lines, created_by).await?;
                Ok(CreateOutcome::Created(view))
            }
            Some(DuplicateResolution::Merge) => {
                self.merge_order(&req, &customer, &candidates, &lines, created_by)
                    .await
            }
        }
    }

    /// Checks the products and fills line defaults from the catalog.
    async fn resolve_lines(
        &self,
        items: &[CreateOrderItemRequest],
    ) -> Result<Vec<NewLine>, ServiceError> {
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        items
            .iter()
            .map(|item| {
                let product = products
                    .get(&item.product_id)
                    .ok_or_else(|| ServiceError::NotFound(format!("product {}", item.product_id)))?;
                if !product.active {
                    return Err(ServiceError::ValidationError(format!(
                        "product {} is inactive",
                        product.name
                    )));
                }
                Ok(NewLine {
                    product_id: product.id,
                    quantity: item.quantity,
                    unit_of_measure: item
                        .unit_of_measure
                        .clone()
                        .unwrap_or_else(|| product.unit_of_measure.clone()),
                    unit_price: item.unit_price.unwrap_or(product.unit_price),
                    brand: item.brand.clone().or_else(|| product.brand.clone()),
                    format: item.format.clone().or_else(|| product.format.clone()),
                    notes: item.notes.clone(),
                })
            })
            .collect()
    }

    async fn insert_order(
        &self,
        req: &CreateOrderRequest,
        customer: &customer::Model,
        lines: &[NewLine],
        created_by: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let order_number = req
            .order_number
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| generate_order_number(order_id));

        let txn = self.db.begin().await?;

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(req.customer_id),
            status: Set(OrderStatus::Pendiente.to_string()),
            delivery_due: Set(req.delivery_due),
            delivered_at: Set(None),
            notes: Set(req.notes.clone()),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        Self::insert_lines(&txn, order_id, lines).await?;
        txn.commit().await?;

        info!(order_id = %order_id, order_number = %order_number, "order created");
        self.events.send(Event::OrderCreated(order_id)).await;
        self.spawn_created_notification(order_number, customer.name.clone());

        self.get_order(order_id).await
    }

    async fn insert_lines<C: ConnectionTrait>(
        txn: &C,
        order_id: Uuid,
        lines: &[NewLine],
    ) -> Result<(), ServiceError> {
        // Timestamps are set here: `insert_many` bypasses the
        // `ActiveModelBehavior` hook that fills them on single inserts.
        let now = Utc::now();
        let models: Vec<order_item::ActiveModel> = lines
            .iter()
            .map(|line| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_of_measure: Set(line.unit_of_measure.clone()),
                unit_price: Set(line.unit_price),
                brand: Set(line.brand.clone()),
                format: Set(line.format.clone()),
                notes: Set(line.notes.clone()),
                created_at: Set(now),
                updated_at: Set(None),
            })
            .collect();
        order_item::Entity::insert_many(models).exec(txn).await?;
        Ok(())
    }

    async fn merge_order(
        &self,
        req: &CreateOrderRequest,
        customer: &customer::Model,
        candidates: &[Candidate],
        lines: &[NewLine],
        created_by: Uuid,
    ) -> Result<CreateOutcome, ServiceError> {
        let (merges, leftovers) = plan_merge(candidates, lines);
        let now = Utc::now();

        let txn = self.db.begin().await?;

        // Quantity folds. Brand, format and notes of the existing line stay
        // untouched.
        for merge in &merges {
            let am = order_item::ActiveModel {
                id: Set(merge.item_id),
                quantity: Set(merge.new_quantity),
                updated_at: Set(Some(now)),
                ..Default::default()
            };
            am.update(&txn).await?;
        }

        // Bump each touched order exactly once, under its optimistic version.
        let mut touched: Vec<Uuid> = merges.iter().map(|m| m.order_id).collect();
        touched.sort();
        touched.dedup();
        for order_id in &touched {
            let current = candidates
                .iter()
                .find(|c| c.order.id == *order_id)
                .map(|c| &c.order)
                .ok_or_else(|| ServiceError::InternalError("merge target vanished".into()))?;
            let bump = order::ActiveModel {
                version: Set(current.version + 1),
                updated_at: Set(Some(now)),
                ..Default::default()
            };
            let res = order::Entity::update_many()
                .set(bump)
                .filter(order::Column::Id.eq(*order_id))
                .filter(order::Column::Version.eq(current.version))
                .exec(&txn)
                .await?;
            if res.rows_affected == 0 {
                return Err(ServiceError::ConcurrentModification(*order_id));
            }
        }

        // Non-conflicting items become one batch order.
        let mut created_id = None;
        if !leftovers.is_empty() {
            let order_id = Uuid::new_v4();
            let order_number = req
                .order_number
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| generate_order_number(order_id));
            order::ActiveModel {
                id: Set(order_id),
                order_number: Set(order_number),
                customer_id: Set(req.customer_id),
                status: Set(OrderStatus::Pendiente.to_string()),
                delivery_due: Set(req.delivery_due),
                delivered_at: Set(None),
                notes: Set(req.notes.clone()),
                created_by: Set(created_by),
                created_at: Set(now),
                updated_at: Set(None),
                version: Set(1),
            }
            .insert(&txn)
            .await?;
            Self::insert_lines(&txn, order_id, &leftovers).await?;
            created_id = Some(order_id);
        }

        txn.commit().await?;

        for order_id in &touched {
            let product_ids = merges
                .iter()
                .filter(|m| m.order_id == *order_id)
                .map(|m| m.product_id)
                .collect();
            self.events
                .send(Event::OrderLinesMerged {
                    order_id: *order_id,
                    product_ids,
                })
                .await;
        }
        if let Some(id) = created_id {
            self.events.send(Event::OrderCreated(id)).await;
        }
        info!(
            customer_id = %req.customer_id,
            merged_lines = merges.len(),
            leftover_lines = leftovers.len(),
            "duplicate orders merged"
        );

        let mut updated = Vec::with_capacity(touched.len());
        for id in touched {
            updated.push(self.get_order(id).await?);
        }
        let created = match created_id {
            Some(id) => Some(self.get_order(id).await?),
            None => None,
        };
        if let Some(view) = &created {
            self.spawn_created_notification(view.order_number.clone(), customer.name.clone());
        }

        Ok(CreateOutcome::Merged { updated, created })
    }

    fn spawn_created_notification(&self, order_number: String, customer_name: String) {
        let notifications = self.notifications.clone();
        tokio::spawn(async move {
            notifications
                .notify_order_created(order_number, customer_name)
                .await;
        });
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> Result<OrderView, ServiceError> {
        let order = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))?;
        let mut views = self.hydrate(vec![order]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("hydration dropped the order".into()))
    }

    #[instrument(skip(self, params))]
    pub async fn list_orders(
        &self,
        params: OrderListParams,
    ) -> Result<(Vec<OrderView>, u64, u64), ServiceError> {
        let page = params.page.unwrap_or(1).max(1);
        let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = params.status {
            query = query.filter(order::Column::Status.eq(status.to_string()));
        }
        if let Some(customer_id) = params.customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
            query = query.filter(order::Column::OrderNumber.contains(search.trim()));
        }
        if let Some(from) = params.from {
            query = query.filter(order::Column::CreatedAt.gte(from));
        }
        if let Some(to) = params.to {
            query = query.filter(order::Column::CreatedAt.lt(to));
        }

        let paginator = query.paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;
        let views = self.hydrate(orders).await?;
        Ok((views, total, total.div_ceil(per_page)))
    }

    #[instrument(skip(self, req))]
    pub async fn update_order(
        &self,
        id: Uuid,
        req: UpdateOrderRequest,
    ) -> Result<OrderView, ServiceError> {
        let current = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))?;

        if let Some(customer_id) = req.customer_id {
            customer::Entity::find_by_id(customer_id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("customer {customer_id}")))?;
        }
        if let Some(ref number) = req.order_number {
            if number.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "order number cannot be empty".into(),
                ));
            }
        }

        let mut am = order::ActiveModel {
            version: Set(current.version + 1),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        if let Some(customer_id) = req.customer_id {
            am.customer_id = Set(customer_id);
        }
        if let Some(number) = req.order_number {
            am.order_number = Set(number.trim().to_string());
        }
        if let Some(due) = req.delivery_due {
            am.delivery_due = Set(due);
        }
        if let Some(notes) = req.notes {
            am.notes = Set(Some(notes));
        }

        self.bump(id, current.version, am).await?;
        self.events.send(Event::OrderUpdated(id)).await;
        self.get_order(id).await
    }

    /// Free-form status override. Capability gating happens at the router.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        let current = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))?;
        let old_status = parse_status(&current.status)?;

        let am = order::ActiveModel {
            status: Set(new_status.to_string()),
            version: Set(current.version + 1),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        self.bump(id, current.version, am).await?;

        self.events
            .send(Event::OrderStatusChanged {
                order_id: id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        self.get_order(id).await
    }

    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, id: Uuid) -> Result<OrderView, ServiceError> {
        let current = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))?;
        let status = parse_status(&current.status)?;
        mark_delivered_check(status, current.delivered_at)?;

        let now = Utc::now();
        let am = order::ActiveModel {
            delivered_at: Set(Some(now)),
            version: Set(current.version + 1),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        self.bump(id, current.version, am).await?;

        self.events.send(Event::OrderDelivered(id)).await;
        self.get_order(id).await
    }

    #[instrument(skip(self))]
    pub async fn mark_nullified(&self, id: Uuid) -> Result<OrderView, ServiceError> {
        let current = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))?;
        let status = parse_status(&current.status)?;
        mark_nullified_check(
            status,
            current.created_at,
            Utc::now(),
            self.nullification_cooldown_days,
        )?;

        let am = order::ActiveModel {
            status: Set(OrderStatus::Nulo.to_string()),
            version: Set(current.version + 1),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        self.bump(id, current.version, am).await?;

        self.events.send(Event::OrderNullified(id)).await;
        self.get_order(id).await
    }

    /// Applies a mutation guarded by the optimistic version.
    async fn bump(
        &self,
        id: Uuid,
        expected_version: i32,
        am: order::ActiveModel,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let res = order::Entity::update_many()
            .set(am)
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(id));
        }
        txn.commit().await?;
        Ok(())
    }

    async fn hydrate(&self, orders: Vec<order::Model>) -> Result<Vec<OrderView>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let customer_ids: Vec<Uuid> = orders.iter().map(|o| o.customer_id).collect();

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(self.db.as_ref())
            .await?;
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let customers: HashMap<Uuid, customer::Model> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(customer_ids))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in items {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let now = Utc::now();
        orders
            .into_iter()
            .map(|o| {
                let status = parse_status(&o.status)?;
                let item_views: Vec<OrderItemView> = items_by_order
                    .remove(&o.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|i| {
                        let product_name = products
                            .get(&i.product_id)
                            .map(|p| p.name.clone())
                            .unwrap_or_default();
                        OrderItemView {
                            id: i.id,
                            product_id: i.product_id,
                            product_name,
                            line_total: Decimal::from(i.quantity) * i.unit_price,
                            quantity: i.quantity,
                            unit_of_measure: i.unit_of_measure,
                            unit_price: i.unit_price,
                            brand: i.brand,
                            format: i.format,
                            notes: i.notes,
                        }
                    })
                    .collect();
                let total = item_views.iter().map(|i| i.line_total).sum();
                let overdue =
                    is_overdue(status, o.delivered_at, o.delivery_due, now, self.business_offset);
                Ok(OrderView {
                    id: o.id,
                    order_number: o.order_number,
                    customer_id: o.customer_id,
                    customer_name: customers
                        .get(&o.customer_id)
                        .map(|c| c.name.clone())
                        .unwrap_or_default(),
                    status,
                    delivery_due: o.delivery_due,
                    delivered_at: o.delivered_at,
                    delivery_status: delivery_status(
                        status,
                        o.delivered_at,
                        o.delivery_due,
                        now,
                        self.business_offset,
                    ),
                    overdue,
                    notes: o.notes,
                    created_by: o.created_by,
                    created_at: o.created_at,
                    updated_at: o.updated_at,
                    version: o.version,
                    total,
                    items: item_views,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request_item(product_id: Uuid, quantity: i32) -> CreateOrderItemRequest {
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

    fn new_line(product_id: Uuid, quantity: i32) -> NewLine {
        NewLine {
            product_id,
            quantity,
            unit_of_measure: "caja".into(),
            unit_price: dec!(100),
            brand: None,
            format: None,
            notes: None,
        }
    }

    fn candidate(order_number: &str, lines: &[(Uuid, i32)]) -> Candidate {
        let order = order::Model {
            id: Uuid::new_v4(),
            order_number: order_number.into(),
            customer_id: Uuid::new_v4(),
            status: "pendiente".into(),
            delivery_due: Utc::now(),
            delivered_at: None,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: None,
            version: 1,
        };
        let items = lines
            .iter()
            .map(|(pid, qty)| order_item::Model {
                id: Uuid::new_v4(),
                order_id: order.id,
                product_id: *pid,
                quantity: *qty,
                unit_of_measure: "caja".into(),
                unit_price: dec!(100),
                brand: None,
                format: None,
                notes: None,
                created_at: Utc::now(),
                updated_at: None,
            })
            .collect();
        Candidate { order, items }
    }

    #[test]
    fn item_validation_rejects_empty_and_oversized() {
        assert!(validate_items(&[]).is_err());

        let too_many: Vec<_> = (0..MAX_ORDER_ITEMS + 1)
            .map(|_| request_item(Uuid::new_v4(), 1))
            .collect();
        assert!(validate_items(&too_many).is_err());

        let ok: Vec<_> = (0..MAX_ORDER_ITEMS)
            .map(|_| request_item(Uuid::new_v4(), 1))
            .collect();
        assert!(validate_items(&ok).is_ok());
    }

    #[test]
    fn item_validation_rejects_bad_quantities_and_repeats() {
        assert!(validate_items(&[request_item(Uuid::new_v4(), 0)]).is_err());
        assert!(validate_items(&[request_item(Uuid::new_v4(), -3)]).is_err());

        let pid = Uuid::new_v4();
        assert!(validate_items(&[request_item(pid, 1), request_item(pid, 2)]).is_err());
    }

    #[test]
    fn merge_plan_folds_into_most_recent_match() {
        let shared = Uuid::new_v4();
        let newer = candidate("PED-NEW", &[(shared, 3)]);
        let older = candidate("PED-OLD", &[(shared, 9)]);
        let newer_id = newer.order.id;
        let candidates = vec![newer, older];

        let (merges, leftovers) = plan_merge(&candidates, &[new_line(shared, 2)]);
        assert!(leftovers.is_empty());
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].order_id, newer_id);
        assert_eq!(merges[0].new_quantity, 5);
        assert_eq!(merges[0].added, 2);
    }

    #[test]
    fn merge_plan_batches_non_conflicting_lines() {
        let shared = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let candidates = vec![candidate("PED-1", &[(shared, 3)])];

        let (merges, leftovers) =
            plan_merge(&candidates, &[new_line(shared, 2), new_line(fresh, 7)]);
        assert_eq!(merges.len(), 1);
        assert_eq!(leftovers.len(), 1);
        assert_eq!(leftovers[0].product_id, fresh);
    }

    #[test]
    fn merge_plan_with_no_candidates_keeps_everything() {
        let (merges, leftovers) = plan_merge(&[], &[new_line(Uuid::new_v4(), 1)]);
        assert!(merges.is_empty());
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn order_numbers_are_prefixed_and_stable_per_id() {
        let id = Uuid::new_v4();
        let n1 = generate_order_number(id);
        let n2 = generate_order_number(id);
        assert_eq!(n1, n2);
        assert!(n1.starts_with("PED-"));
        assert_eq!(n1.len(), "PED-".len() + 8);
    }

    #[test]
    fn stored_status_parses_back_to_the_enum() {
        assert_eq!(parse_status("pendiente").unwrap(), OrderStatus::Pendiente);
        assert_eq!(parse_status("facturado").unwrap(), OrderStatus::Facturado);
        assert!(parse_status("desconocido").is_err());
    }
}
