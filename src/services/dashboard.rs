//! Read-only aggregates for the landing dashboard.
//!
//! Aggregation happens over narrow windows (today, last N days), so rows are
//! bucketed in memory instead of pushing backend-specific date functions into
//! SQL. Queries stay portable across Postgres and the SQLite test harness.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{customer, order, order_item, product};
use crate::errors::ServiceError;
use crate::services::duplicates::business_day_window;
use crate::services::lifecycle::{is_overdue, OrderStatus};

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WindowParams {
    /// Look-back window in days (default 30, max 365).
    pub days: Option<i64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardMetrics {
    pub orders_total: u64,
    pub orders_today: u64,
    pub orders_pendiente: u64,
    pub orders_compra: u64,
    pub orders_facturado: u64,
    pub orders_nulo: u64,
    pub orders_overdue: u64,
    pub customers_total: u64,
    pub products_total: u64,
    pub products_low_stock: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentOrder {
    pub id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub delivery_due: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub orders: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub total_quantity: i64,
    pub order_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopCustomer {
    pub customer_id: Uuid,
    pub name: String,
    pub order_count: u64,
    pub total_amount: Decimal,
}

pub struct DashboardService {
    db: Arc<DatabaseConnection>,
    business_offset: FixedOffset,
}

impl DashboardService {
    pub fn new(db: Arc<DatabaseConnection>, business_offset: FixedOffset) -> Self {
        Self {
            db,
            business_offset,
        }
    }

    fn window_start(&self, params: &WindowParams) -> DateTime<Utc> {
        let days = params
            .days
            .unwrap_or(DEFAULT_WINDOW_DAYS)
            .clamp(1, MAX_WINDOW_DAYS);
        Utc::now() - Duration::days(days)
    }

    async fn count_status(&self, status: OrderStatus) -> Result<u64, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::Status.eq(status.to_string()))
            .count(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn metrics(&self) -> Result<DashboardMetrics, ServiceError> {
        let now = Utc::now();
        let (today_start, today_end) = business_day_window(now, self.business_offset);

        let orders_total = order::Entity::find().count(self.db.as_ref()).await?;
        let orders_today = order::Entity::find()
            .filter(order::Column::CreatedAt.gte(today_start))
            .filter(order::Column::CreatedAt.lt(today_end))
            .count(self.db.as_ref())
            .await?;

        // Overdue needs the business-calendar comparison, so the candidate
        // set (undelivered facturado) is fetched and filtered in memory.
        let undelivered = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Facturado.to_string()))
            .filter(order::Column::DeliveredAt.is_null())
            .all(self.db.as_ref())
            .await?;
        let orders_overdue = undelivered
            .iter()
            .filter(|o| {
                is_overdue(
                    OrderStatus::Facturado,
                    o.delivered_at,
                    o.delivery_due,
                    now,
                    self.business_offset,
                )
            })
            .count() as u64;

        let products_low_stock = product::Entity::find()
            .filter(product::Column::Active.eq(true))
            .filter(
                sea_orm::sea_query::Expr::col(product::Column::Stock)
                    .lte(sea_orm::sea_query::Expr::col(product::Column::MinStock)),
            )
            .count(self.db.as_ref())
            .await?;

        Ok(DashboardMetrics {
            orders_total,
            orders_today,
            orders_pendiente: self.count_status(OrderStatus::Pendiente).await?,
            orders_compra: self.count_status(OrderStatus::Compra).await?,
            orders_facturado: self.count_status(OrderStatus::Facturado).await?,
            orders_nulo: self.count_status(OrderStatus::Nulo).await?,
            orders_overdue,
            customers_total: customer::Entity::find().count(self.db.as_ref()).await?,
            products_total: product::Entity::find().count(self.db.as_ref()).await?,
            products_low_stock,
        })
    }

    #[instrument(skip(self, params))]
    pub async fn recent_orders(
        &self,
        params: WindowParams,
    ) -> Result<Vec<RecentOrder>, ServiceError> {
        let limit = params.limit.unwrap_or(10).clamp(1, 50);
        let orders = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let customer_ids: Vec<Uuid> = orders.iter().map(|o| o.customer_id).collect();

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(self.db.as_ref())
            .await?;
        let mut totals: HashMap<Uuid, Decimal> = HashMap::new();
        for item in items {
            *totals.entry(item.order_id).or_insert(Decimal::ZERO) +=
                Decimal::from(item.quantity) * item.unit_price;
        }

        let customers: HashMap<Uuid, String> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(customer_ids))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        orders
            .into_iter()
            .map(|o| {
                let status = OrderStatus::from_str(&o.status).map_err(|_| {
                    ServiceError::InternalError(format!("unknown stored status {:?}", o.status))
                })?;
                Ok(RecentOrder {
                    id: o.id,
                    order_number: o.order_number,
                    customer_name: customers.get(&o.customer_id).cloned().unwrap_or_default(),
                    status,
                    total: totals.get(&o.id).copied().unwrap_or(Decimal::ZERO),
                    created_at: o.created_at,
                    delivery_due: o.delivery_due,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::Active.eq(true))
            .filter(
                sea_orm::sea_query::Expr::col(product::Column::Stock)
                    .lte(sea_orm::sea_query::Expr::col(product::Column::MinStock)),
            )
            .order_by_asc(product::Column::Stock)
            .all(self.db.as_ref())
            .await?)
    }

    /// Orders per business-calendar day over the window, zero-filled.
    #[instrument(skip(self, params))]
    pub async fn daily_stats(&self, params: WindowParams) -> Result<Vec<DailyCount>, ServiceError> {
        let start = self.window_start(&params);
        let orders = order::Entity::find()
            .filter(order::Column::CreatedAt.gte(start))
            .all(self.db.as_ref())
            .await?;

        let mut buckets: HashMap<NaiveDate, u64> = HashMap::new();
        for o in &orders {
            let day = o.created_at.with_timezone(&self.business_offset).date_naive();
            *buckets.entry(day).or_insert(0) += 1;
        }

        let first = start.with_timezone(&self.business_offset).date_naive();
        let last = Utc::now().with_timezone(&self.business_offset).date_naive();
        let mut out = Vec::new();
        let mut day = first;
        while day <= last {
            out.push(DailyCount {
                day,
                orders: buckets.get(&day).copied().unwrap_or(0),
            });
            day += Duration::days(1);
        }
        Ok(out)
    }

    #[instrument(skip(self, params))]
    pub async fn top_products(&self, params: WindowParams) -> Result<Vec<TopProduct>, ServiceError> {
        let start = self.window_start(&params);
        let limit = params.limit.unwrap_or(5).clamp(1, 20) as usize;

        let order_ids: Vec<Uuid> = order::Entity::find()
            .select_only()
            .column(order::Column::Id)
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::Status.ne(OrderStatus::Nulo.to_string()))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(self.db.as_ref())
            .await?;

        let mut by_product: HashMap<Uuid, (i64, u64)> = HashMap::new();
        for item in items {
            let entry = by_product.entry(item.product_id).or_insert((0, 0));
            entry.0 += i64::from(item.quantity);
            entry.1 += 1;
        }

        let names: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(by_product.keys().copied().collect::<Vec<_>>()))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut out: Vec<TopProduct> = by_product
            .into_iter()
            .map(|(product_id, (total_quantity, order_count))| TopProduct {
                product_id,
                name: names.get(&product_id).cloned().unwrap_or_default(),
                total_quantity,
                order_count,
            })
            .collect();
        out.sort_by(|a, b| b.total_quantity.cmp(&a.total_quantity));
        out.truncate(limit);
        Ok(out)
    }

    #[instrument(skip(self, params))]
    pub async fn top_customers(
        &self,
        params: WindowParams,
    ) -> Result<Vec<TopCustomer>, ServiceError> {
        let start = self.window_start(&params);
        let limit = params.limit.unwrap_or(5).clamp(1, 20) as usize;

        let orders = order::Entity::find()
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::Status.ne(OrderStatus::Nulo.to_string()))
            .all(self.db.as_ref())
            .await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(self.db.as_ref())
            .await?;
        let mut order_totals: HashMap<Uuid, Decimal> = HashMap::new();
        for item in items {
            *order_totals.entry(item.order_id).or_insert(Decimal::ZERO) +=
                Decimal::from(item.quantity) * item.unit_price;
        }

        let mut by_customer: HashMap<Uuid, (u64, Decimal)> = HashMap::new();
        for o in &orders {
            let entry = by_customer
                .entry(o.customer_id)
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += order_totals.get(&o.id).copied().unwrap_or(Decimal::ZERO);
        }

        let names: HashMap<Uuid, String> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(by_customer.keys().copied().collect::<Vec<_>>()))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut out: Vec<TopCustomer> = by_customer
            .into_iter()
            .map(|(customer_id, (order_count, total_amount))| TopCustomer {
                customer_id,
                name: names.get(&customer_id).cloned().unwrap_or_default(),
                order_count,
                total_amount,
            })
            .collect();
        out.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
        out.truncate(limit);
        Ok(out)
    }
}
