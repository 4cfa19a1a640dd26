//! Same-day duplicate detection for order creation.
//!
//! Two orders are duplicates when they belong to the same customer, share a
//! product, and were created on the same day of the business calendar. The
//! check runs inside a per-customer async lock held by the order service, so
//! the window between "no duplicates found" and "order written" cannot race
//! against a second request for the same customer.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use dashmap::DashMap;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{order, order_item};
use crate::errors::{DuplicateMatch, ServiceError};
use crate::services::lifecycle::OrderStatus;

/// How the caller wants a detected duplicate handled. Absent means "ask",
/// which surfaces as a 409 carrying the matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateResolution {
    /// Fold the new quantities into the most recent matching order.
    Merge,
    /// Create a separate order anyway.
    Ignore,
}

/// UTC half-open interval `[start, end)` covering one business-calendar day.
pub fn business_day_window(
    instant: DateTime<Utc>,
    offset: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_day = instant.with_timezone(&offset).date_naive();
    let start_local = local_day.and_time(NaiveTime::MIN);
    let start_utc =
        Utc.from_utc_datetime(&(start_local - Duration::seconds(offset.local_minus_utc() as i64)));
    (start_utc, start_utc + Duration::days(1))
}

/// An existing order of the same customer created today, together with its
/// lines. Candidates are returned most recent first.
#[derive(Debug)]
pub struct Candidate {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Loads today's non-nullified orders for a customer, lines included.
pub async fn load_candidates<C: ConnectionTrait>(
    db: &C,
    customer_id: Uuid,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<Candidate>, ServiceError> {
    let (start, end) = business_day_window(now, offset);

    let rows = order::Entity::find()
        .filter(order::Column::CustomerId.eq(customer_id))
        .filter(order::Column::CreatedAt.gte(start))
        .filter(order::Column::CreatedAt.lt(end))
        .filter(order::Column::Status.ne(OrderStatus::Nulo.to_string()))
        .order_by_desc(order::Column::CreatedAt)
        .find_with_related(order_item::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(order, items)| Candidate { order, items })
        .collect())
}

/// Intersects the incoming product set with today's candidates.
///
/// One [`DuplicateMatch`] is produced per (candidate order, shared product)
/// pair, preserving the most-recent-first candidate ordering, so the first
/// match always points at the order a merge would target.
pub fn find_conflicts(
    candidates: &[Candidate],
    incoming: &[(Uuid, i32)],
) -> Vec<DuplicateMatch> {
    let mut matches = Vec::new();
    for candidate in candidates {
        for item in &candidate.items {
            if let Some((_, new_qty)) = incoming.iter().find(|(pid, _)| *pid == item.product_id) {
                matches.push(DuplicateMatch {
                    order_id: candidate.order.id,
                    order_number: candidate.order.order_number.clone(),
                    product_id: item.product_id,
                    existing_qty: item.quantity,
                    new_qty: *new_qty,
                    unit: item.unit_of_measure.clone(),
                });
            }
        }
    }
    matches
}

/// Per-customer creation locks.
///
/// Entries are tiny and customers are finite, so entries are never reclaimed.
#[derive(Debug, Default)]
pub struct CustomerLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the creation lock for a customer. The guard owns the mutex
    /// and can be held across awaits for the duration of check-then-write.
    pub async fn acquire(&self, customer_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(customer_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use rust_decimal_macros::dec;

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(4 * 3600).unwrap()
    }

    fn order_row(number: &str) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            order_number: number.into(),
            customer_id: Uuid::new_v4(),
            status: "pendiente".into(),
            delivery_due: Utc::now(),
            delivered_at: None,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: None,
            version: 1,
        }
    }

    fn line(order_id: Uuid, product_id: Uuid, quantity: i32) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            quantity,
            unit_of_measure: "caja".into(),
            unit_price: dec!(10.50),
            brand: None,
            format: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn window_covers_the_local_day_not_the_utc_day() {
        // 22:00 local on March 5 (UTC-4) is 02:00 UTC on March 6.
        let instant = "2026-03-06T02:00:00Z".parse().unwrap();
        let (start, end) = business_day_window(instant, offset());

        assert_eq!(start, "2026-03-05T04:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(end, "2026-03-06T04:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert!(start <= instant && instant < end);
        assert_eq!(start.with_timezone(&offset()).day(), 5);
    }

    #[test]
    fn window_is_half_open() {
        let instant = "2026-03-05T12:00:00Z".parse().unwrap();
        let (start, end) = business_day_window(instant, offset());
        assert_eq!(end - start, Duration::days(1));
        // The end instant belongs to the next day's window.
        let (next_start, _) = business_day_window(end, offset());
        assert_eq!(next_start, end);
    }

    #[test]
    fn conflicts_only_for_shared_products() {
        let existing = order_row("PED-0001");
        let shared = Uuid::new_v4();
        let unshared = Uuid::new_v4();
        let candidates = vec![Candidate {
            items: vec![line(existing.id, shared, 5), line(existing.id, unshared, 2)],
            order: existing,
        }];

        let incoming = vec![(shared, 3), (Uuid::new_v4(), 7)];
        let conflicts = find_conflicts(&candidates, &incoming);

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].product_id, shared);
        assert_eq!(conflicts[0].existing_qty, 5);
        assert_eq!(conflicts[0].new_qty, 3);
        assert_eq!(conflicts[0].order_number, "PED-0001");
    }

    #[test]
    fn disjoint_products_produce_no_conflicts() {
        let existing = order_row("PED-0002");
        let candidates = vec![Candidate {
            items: vec![line(existing.id, Uuid::new_v4(), 5)],
            order: existing,
        }];
        assert!(find_conflicts(&candidates, &[(Uuid::new_v4(), 1)]).is_empty());
    }

    #[test]
    fn first_conflict_points_at_most_recent_candidate() {
        let newer = order_row("PED-0004");
        let older = order_row("PED-0003");
        let shared = Uuid::new_v4();
        // Candidates arrive most recent first from the query.
        let candidates = vec![
            Candidate {
                items: vec![line(newer.id, shared, 2)],
                order: newer,
            },
            Candidate {
                items: vec![line(older.id, shared, 9)],
                order: older,
            },
        ];

        let conflicts = find_conflicts(&candidates, &[(shared, 1)]);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].order_number, "PED-0004");
    }

    #[tokio::test]
    async fn customer_locks_are_independent() {
        let locks = CustomerLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let guard_a = locks.acquire(a).await;
        // A different customer's lock is acquirable while A is held.
        let guard_b = locks.acquire(b).await;
        drop(guard_a);
        drop(guard_b);

        // Reacquiring after release works.
        let _again = locks.acquire(a).await;
    }
}
