//! Order lifecycle rules.
//!
//! The status machine is deliberately loose for managers (any status can be
//! set directly through the privileged override) but the two terminal-ish
//! operations, delivery and nullification, are guarded here. All functions in
//! this module are pure so the rules can be tested without a database.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Stored order status. The string forms are the wire and storage contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OrderStatus {
    /// Registered, not yet purchased from suppliers.
    Pendiente,
    /// Supplier purchase placed.
    Compra,
    /// Invoiced; the only state a delivery can be recorded from.
    Facturado,
    /// Cancelled. Terminal.
    Nulo,
}

/// Derived, never stored. Computed from status, delivered_at and the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    Entregado,
    Vencido,
    Pendiente,
}

/// Checks that an order may be marked delivered.
///
/// Delivery is recorded exactly once and only from `facturado`.
pub fn mark_delivered_check(
    status: OrderStatus,
    delivered_at: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    if delivered_at.is_some() {
        return Err(ServiceError::InvalidTransition(
            "order already has a recorded delivery".into(),
        ));
    }
    if status != OrderStatus::Facturado {
        return Err(ServiceError::InvalidTransition(format!(
            "only facturado orders can be delivered (current: {status})"
        )));
    }
    Ok(())
}

/// Checks that an order may be nullified.
///
/// Nullification is allowed from `pendiente` and `compra` only, and only once
/// the order has aged past the cooldown. The cooldown exists so a vendor
/// cannot erase a same-day order before invoicing sees it.
pub fn mark_nullified_check(
    status: OrderStatus,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    cooldown_days: i64,
) -> Result<(), ServiceError> {
    match status {
        OrderStatus::Pendiente | OrderStatus::Compra => {}
        other => {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot nullify an order in status {other}"
            )))
        }
    }

    let age_days = (now - created_at).num_days();
    if age_days < cooldown_days {
        return Err(ServiceError::TooEarly(format!(
            "order can be nullified after {cooldown_days} days (currently {age_days})"
        )));
    }
    Ok(())
}

/// An order is overdue when it is invoiced, still undelivered, and its due
/// date (in the business calendar, not UTC) has passed.
pub fn is_overdue(
    status: OrderStatus,
    delivered_at: Option<DateTime<Utc>>,
    delivery_due: DateTime<Utc>,
    now: DateTime<Utc>,
    business_offset: FixedOffset,
) -> bool {
    if status != OrderStatus::Facturado || delivered_at.is_some() {
        return false;
    }
    let due_day = delivery_due.with_timezone(&business_offset).date_naive();
    let today = now.with_timezone(&business_offset).date_naive();
    due_day < today
}

/// The delivery label only exists from `facturado` on; before invoicing
/// there is nothing to deliver yet and the label is absent.
pub fn delivery_status(
    status: OrderStatus,
    delivered_at: Option<DateTime<Utc>>,
    delivery_due: DateTime<Utc>,
    now: DateTime<Utc>,
    business_offset: FixedOffset,
) -> Option<DeliveryStatus> {
    if delivered_at.is_some() {
        Some(DeliveryStatus::Entregado)
    } else if is_overdue(status, delivered_at, delivery_due, now, business_offset) {
        Some(DeliveryStatus::Vencido)
    } else if status == OrderStatus::Facturado {
        Some(DeliveryStatus::Pendiente)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn offset() -> FixedOffset {
        // UTC-4
        FixedOffset::west_opt(4 * 3600).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn delivery_requires_facturado() {
        assert!(mark_delivered_check(OrderStatus::Facturado, None).is_ok());
        assert_matches!(
            mark_delivered_check(OrderStatus::Pendiente, None),
            Err(ServiceError::InvalidTransition(_))
        );
        assert_matches!(
            mark_delivered_check(OrderStatus::Nulo, None),
            Err(ServiceError::InvalidTransition(_))
        );
    }

    #[test]
    fn delivery_is_recorded_once() {
        assert_matches!(
            mark_delivered_check(OrderStatus::Facturado, Some(Utc::now())),
            Err(ServiceError::InvalidTransition(_))
        );
    }

    #[test]
    fn nullification_respects_cooldown() {
        let created = Utc::now() - Duration::days(3);
        assert_matches!(
            mark_nullified_check(OrderStatus::Pendiente, created, Utc::now(), 7),
            Err(ServiceError::TooEarly(_))
        );

        let created = Utc::now() - Duration::days(7);
        assert!(mark_nullified_check(OrderStatus::Pendiente, created, Utc::now(), 7).is_ok());
        assert!(mark_nullified_check(OrderStatus::Compra, created, Utc::now(), 7).is_ok());
    }

    #[test]
    fn nullification_rejected_from_late_states() {
        let created = Utc::now() - Duration::days(30);
        assert_matches!(
            mark_nullified_check(OrderStatus::Facturado, created, Utc::now(), 7),
            Err(ServiceError::InvalidTransition(_))
        );
        assert_matches!(
            mark_nullified_check(OrderStatus::Nulo, created, Utc::now(), 7),
            Err(ServiceError::InvalidTransition(_))
        );
    }

    #[test]
    fn overdue_uses_business_calendar_not_utc() {
        // Due 2026-03-10 23:00 local (UTC-4) = 2026-03-11 03:00 UTC.
        let due = at("2026-03-11T03:00:00Z");
        // "Now" is 2026-03-11 01:00 local = 05:00 UTC. In UTC both fall on the
        // 11th, but locally the due day was the 10th, so the order is overdue.
        let now = at("2026-03-11T05:00:00Z");
        assert!(is_overdue(OrderStatus::Facturado, None, due, now, offset()));

        // Half an hour after the due instant but still the 10th locally.
        let now_same_day = at("2026-03-11T03:30:00Z");
        assert!(!is_overdue(
            OrderStatus::Facturado,
            None,
            due,
            now_same_day,
            offset()
        ));
    }

    #[test]
    fn delivered_orders_are_never_overdue() {
        let due = at("2026-01-01T12:00:00Z");
        let now = at("2026-02-01T12:00:00Z");
        assert!(!is_overdue(
            OrderStatus::Facturado,
            Some(now),
            due,
            now,
            offset()
        ));
        assert_eq!(
            delivery_status(OrderStatus::Facturado, Some(now), due, now, offset()),
            Some(DeliveryStatus::Entregado)
        );
    }

    #[test]
    fn delivery_label_is_absent_before_invoicing() {
        let due = at("2026-01-01T12:00:00Z");
        let now = at("2026-02-01T12:00:00Z");
        for status in [OrderStatus::Pendiente, OrderStatus::Compra, OrderStatus::Nulo] {
            assert_eq!(delivery_status(status, None, due, now, offset()), None);
        }

        // Invoiced and not yet due: the label appears as pendiente.
        let future_due = at("2026-03-01T12:00:00Z");
        assert_eq!(
            delivery_status(OrderStatus::Facturado, None, future_due, now, offset()),
            Some(DeliveryStatus::Pendiente)
        );
        // Invoiced and past due: vencido.
        assert_eq!(
            delivery_status(OrderStatus::Facturado, None, due, now, offset()),
            Some(DeliveryStatus::Vencido)
        );
    }

    #[test]
    fn non_facturado_orders_are_never_overdue() {
        let due = at("2026-01-01T12:00:00Z");
        let now = at("2026-02-01T12:00:00Z");
        for status in [OrderStatus::Pendiente, OrderStatus::Compra, OrderStatus::Nulo] {
            assert!(!is_overdue(status, None, due, now, offset()));
        }
    }

}
