//! Static role policy for a laundry shop.
//!
//! Front-desk staff own intake and payments, floor staff own exactly one stage
//! of the pipeline, couriers own hand-over, and accountants own money.

use crate::permissions::{self as p, Permission};
use crate::roles::Role;

/// Grants attached to a single role. Unknown roles grant nothing.
pub fn permissions_for_role(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::new("*")],
        "manager" => vec![
            Permission::new("clients.*"),
            Permission::new("catalog.*"),
            Permission::new("orders.*"),
            Permission::new("bills.*"),
            Permission::new("deliveries.*"),
            Permission::new("reports.*"),
        ],
        "reception" => vec![
            Permission::new("clients.*"),
            p::CATALOG_READ,
            p::ORDERS_READ,
            p::ORDERS_CREATE,
            p::ORDERS_EDIT,
            p::ORDERS_CHECK,
            p::ORDERS_ADVANCE,
            p::ORDERS_PAY,
            p::ORDERS_CANCEL,
            Permission::for_stage("entry"),
            // Counter pickup.
            Permission::for_stage("delivery"),
            p::BILLS_READ,
            p::BILLS_ISSUE,
            p::BILLS_PAY,
            p::DELIVERIES_READ,
            p::DELIVERIES_SCHEDULE,
        ],
        "tagger" => floor_staff("tagging"),
        "washer" => floor_staff("washing"),
        "packer" => floor_staff("packing"),
        "courier" => vec![
            p::CLIENTS_READ,
            p::ORDERS_READ,
            p::ORDERS_CHECK,
            p::ORDERS_PAY,
            Permission::for_stage("delivery"),
            p::DELIVERIES_READ,
            p::DELIVERIES_UPDATE,
        ],
        "accountant" => vec![
            p::CLIENTS_READ,
            p::CLIENTS_CHARGE,
            p::CATALOG_READ,
            p::ORDERS_READ,
            p::ORDERS_PAY,
            Permission::new("bills.*"),
            p::REPORTS_VIEW,
        ],
        _ => Vec::new(),
    }
}

/// Union of the grants of every role, without duplicates.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for role in roles {
        for perm in permissions_for_role(role) {
            if !out.contains(&perm) {
                out.push(perm);
            }
        }
    }
    out
}

fn floor_staff(stage: &'static str) -> Vec<Permission> {
    vec![
        p::CLIENTS_READ,
        p::CATALOG_READ,
        p::ORDERS_READ,
        p::ORDERS_CHECK,
        p::ORDERS_ADVANCE,
        Permission::for_stage(stage),
    ]
}
