use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode};
use serde_json::{json, Map, Value};

use washline_auth::Role;
use washline_deliveries::DeliveryStatus;
use washline_orders::Stage;

use crate::app::routes::common::{ok_json, ApiResult};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, ShopContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let resolved = principal.principal(&shop);
    Ok(ok_json(json!({
        "shop_id": shop.shop_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": resolved
            .membership
            .permissions
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
    })))
}

/// The stage a floor role works, if any.
fn floor_stage(role: &Role) -> Option<Stage> {
    match role.as_str() {
        "tagger" => Some(Stage::Tagging),
        "washer" => Some(Stage::Washing),
        "packer" => Some(Stage::Packing),
        _ => None,
    }
}

/// Role-specific landing view; a principal with several roles gets every view.
pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let shop_id = shop.shop_id();
    let p = services.projections();
    let mut views = Map::new();

    if principal.has_role(&Role::ADMIN) || principal.has_role(&Role::MANAGER) {
        let stage_counts: Map<String, Value> = Stage::ALL
            .into_iter()
            .map(|s| (s.as_str().to_string(), json!(p.orders.list_by_stage(shop_id, s).len())))
            .collect();
        views.insert(
            "overview".to_string(),
            json!({
                "summary": p.reports.summary(shop_id),
                "stage_counts": stage_counts,
                "total_receivable": p.due_customers.total_receivable(shop_id),
            }),
        );
    }

    if principal.has_role(&Role::RECEPTION) {
        let scheduled: Vec<_> = p
            .deliveries
            .list(shop_id)
            .into_iter()
            .filter(|d| d.status == DeliveryStatus::Scheduled)
            .collect();
        views.insert(
            "reception".to_string(),
            json!({
                "intake_queue": p.orders.list_by_stage(shop_id, Stage::Entry),
                "ready_for_handover": p.orders.list_by_stage(shop_id, Stage::Delivery),
                "open_bills": p.bills.list_open(shop_id),
                "scheduled_deliveries": scheduled,
            }),
        );
    }

    for stage in principal.roles().iter().filter_map(floor_stage) {
        views.insert(
            stage.as_str().to_string(),
            json!({
                "stage": stage,
                "queue": p.orders.list_by_stage(shop_id, stage),
            }),
        );
    }

    if principal.has_role(&Role::COURIER) {
        views.insert(
            "courier".to_string(),
            json!({
                "run_sheet": p.deliveries.list_for_courier(shop_id, principal.user_id()),
                "ready_for_delivery": p.orders.list_by_stage(shop_id, Stage::Delivery),
            }),
        );
    }

    if principal.has_role(&Role::ACCOUNTANT) {
        let summary = p.reports.summary(shop_id);
        views.insert(
            "accounts".to_string(),
            json!({
                "due_customers": p.due_customers.list_due(shop_id),
                "total_receivable": p.due_customers.total_receivable(shop_id),
                "open_bills": p.bills.list_open(shop_id),
                "amount_ordered": summary.amount_ordered,
                "amount_billed": summary.amount_billed,
                "amount_collected": summary.amount_collected,
            }),
        );
    }

    Ok(ok_json(json!({
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "views": views,
    })))
}
