use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, e.g. `"orders.advance"`.
///
/// As a *grant*, `"*"` allows everything and `"bills.*"` allows every permission
/// under the `bills.` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether this grant covers `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        let grant = self.as_str();
        if grant == "*" || grant == required.as_str() {
            return true;
        }
        match grant.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('.') => required.as_str().starts_with(prefix),
            _ => false,
        }
    }

    /// Stage-scoped permission, e.g. `orders.stage.washing`.
    pub fn for_stage(stage: &str) -> Self {
        Self::new(format!("orders.stage.{stage}"))
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const CLIENTS_READ: Permission = Permission::from_static("clients.read");
pub const CLIENTS_REGISTER: Permission = Permission::from_static("clients.register");
pub const CLIENTS_UPDATE: Permission = Permission::from_static("clients.update");
pub const CLIENTS_CHARGE: Permission = Permission::from_static("clients.charge");
pub const CLIENTS_DEACTIVATE: Permission = Permission::from_static("clients.deactivate");

pub const CATALOG_READ: Permission = Permission::from_static("catalog.read");
pub const CATALOG_MANAGE: Permission = Permission::from_static("catalog.manage");

pub const ORDERS_READ: Permission = Permission::from_static("orders.read");
pub const ORDERS_CREATE: Permission = Permission::from_static("orders.create");
pub const ORDERS_EDIT: Permission = Permission::from_static("orders.edit");
pub const ORDERS_CHECK: Permission = Permission::from_static("orders.check");
pub const ORDERS_ADVANCE: Permission = Permission::from_static("orders.advance");
pub const ORDERS_PAY: Permission = Permission::from_static("orders.pay");
pub const ORDERS_CANCEL: Permission = Permission::from_static("orders.cancel");

pub const BILLS_READ: Permission = Permission::from_static("bills.read");
pub const BILLS_ISSUE: Permission = Permission::from_static("bills.issue");
pub const BILLS_PAY: Permission = Permission::from_static("bills.pay");
pub const BILLS_VOID: Permission = Permission::from_static("bills.void");

pub const DELIVERIES_READ: Permission = Permission::from_static("deliveries.read");
pub const DELIVERIES_SCHEDULE: Permission = Permission::from_static("deliveries.schedule");
pub const DELIVERIES_UPDATE: Permission = Permission::from_static("deliveries.update");

pub const REPORTS_VIEW: Permission = Permission::from_static("reports.view");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_grant_covers_children_only() {
        let grant = Permission::new("bills.*");
        assert!(grant.grants(&BILLS_PAY));
        assert!(grant.grants(&BILLS_VOID));
        assert!(!grant.grants(&Permission::new("billsx.pay")));
        assert!(!grant.grants(&ORDERS_PAY));
    }

    #[test]
    fn wildcard_grants_everything() {
        let grant = Permission::new("*");
        assert!(grant.is_wildcard());
        assert!(grant.grants(&REPORTS_VIEW));
        assert!(grant.grants(&Permission::for_stage("packing")));
    }

    #[test]
    fn exact_grant_is_exact() {
        assert!(ORDERS_CHECK.grants(&ORDERS_CHECK));
        assert!(!ORDERS_CHECK.grants(&ORDERS_ADVANCE));
    }
}
