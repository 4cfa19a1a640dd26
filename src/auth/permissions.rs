//! Role capabilities.
//!
//! Roles are reified as an enum with a static capability set each, checked
//! once at the router boundary. Handlers and services never compare raw role
//! strings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Capability constants used for route gating.
pub mod consts {
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_CREATE: &str = "orders:create";
    /// Status overrides, mark-delivered and mark-nullified.
    pub const ORDERS_MANAGE: &str = "orders:manage";

    pub const CUSTOMERS_READ: &str = "customers:read";
    pub const CUSTOMERS_CREATE: &str = "customers:create";
    pub const CUSTOMERS_UPDATE: &str = "customers:update";
    pub const CUSTOMERS_DELETE: &str = "customers:delete";

    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_CREATE: &str = "products:create";
    pub const PRODUCTS_UPDATE: &str = "products:update";
    pub const PRODUCTS_STOCK: &str = "products:stock";
    pub const PRODUCTS_DELETE: &str = "products:delete";

    pub const USERS_MANAGE: &str = "users:manage";
    pub const DASHBOARD_READ: &str = "dashboard:read";
    pub const NOTIFICATIONS_MANAGE: &str = "notifications:manage";
}

/// Operator roles, ordered by increasing privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Vendedor,
    Facturador,
    Admin,
}

const VENDEDOR_CAPS: &[&str] = &[
    consts::ORDERS_READ,
    consts::ORDERS_CREATE,
    consts::CUSTOMERS_READ,
    consts::CUSTOMERS_CREATE,
    consts::PRODUCTS_READ,
    consts::PRODUCTS_CREATE,
    consts::DASHBOARD_READ,
];

const FACTURADOR_CAPS: &[&str] = &[
    consts::ORDERS_READ,
    consts::ORDERS_CREATE,
    consts::ORDERS_MANAGE,
    consts::CUSTOMERS_READ,
    consts::CUSTOMERS_CREATE,
    consts::CUSTOMERS_UPDATE,
    consts::PRODUCTS_READ,
    consts::PRODUCTS_CREATE,
    consts::PRODUCTS_UPDATE,
    consts::PRODUCTS_STOCK,
    consts::DASHBOARD_READ,
];

impl Role {
    /// Static capability set for this role. Admin is handled as a wildcard in
    /// [`Role::has_capability`] rather than enumerated here.
    pub fn capabilities(self) -> &'static [&'static str] {
        match self {
            Role::Vendedor => VENDEDOR_CAPS,
            Role::Facturador => FACTURADOR_CAPS,
            Role::Admin => &[],
        }
    }

    pub fn has_capability(self, capability: &str) -> bool {
        matches!(self, Role::Admin) || self.capabilities().contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn roles_parse_from_stored_strings() {
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("facturador").unwrap(), Role::Facturador);
        assert_eq!(Role::from_str("VENDEDOR").unwrap(), Role::Vendedor);
        assert!(Role::from_str("gerente").is_err());
    }

    #[test]
    fn vendedor_can_create_orders_but_not_manage_them() {
        assert!(Role::Vendedor.has_capability(consts::ORDERS_CREATE));
        assert!(!Role::Vendedor.has_capability(consts::ORDERS_MANAGE));
        assert!(!Role::Vendedor.has_capability(consts::USERS_MANAGE));
    }

    #[test]
    fn facturador_manages_orders_and_stock() {
        assert!(Role::Facturador.has_capability(consts::ORDERS_MANAGE));
        assert!(Role::Facturador.has_capability(consts::PRODUCTS_STOCK));
        assert!(!Role::Facturador.has_capability(consts::USERS_MANAGE));
        assert!(!Role::Facturador.has_capability(consts::CUSTOMERS_DELETE));
    }

    #[test]
    fn admin_has_everything() {
        assert!(Role::Admin.has_capability(consts::USERS_MANAGE));
        assert!(Role::Admin.has_capability(consts::NOTIFICATIONS_MANAGE));
        assert!(Role::Admin.has_capability(consts::CUSTOMERS_DELETE));
    }
}
