use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use washline_auth::{permissions as perm, Permission};
use washline_core::{AggregateId, UserId};
use washline_deliveries::{
    AssignCourier, CompleteDelivery, DeliveryCommand, DeliveryId, DeliveryStatus,
    DispatchDelivery, FailDelivery, RescheduleDelivery, ScheduleDelivery,
};
use washline_orders::{MarkDelivered, OrderCommand, OrderId, OrderStatus, Stage};

use crate::app::routes::common::{
    committed, dispatched, items, ok_json, parse_id, require, ApiResult, CmdAuth,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, ShopContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(schedule_delivery).get(list_deliveries))
        .route("/:id", get(get_delivery))
        .route("/:id/assign", post(assign_courier))
        .route("/:id/dispatch", post(dispatch_delivery))
        .route("/:id/complete", post(complete_delivery))
        .route("/:id/fail", post(fail_delivery))
        .route("/:id/reschedule", post(reschedule_delivery))
}

fn parse_user(raw: &str) -> Result<UserId, Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid courier id"))
}

pub async fn schedule_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ScheduleDeliveryRequest>,
) -> ApiResult {
    require(&shop, &principal, &perm::DELIVERIES_SCHEDULE)?;
    let shop_id = shop.shop_id();
    let order_id = OrderId::new(parse_id(&body.order_id, "order")?);
    let order = services
        .load_order(shop_id, order_id)
        .map_err(errors::dispatch_error_to_response)?;
    let Some(client_id) = order.client_id() else {
        return Err(errors::not_found("order"));
    };
    if order.status() != OrderStatus::InProgress || order.stage() != Stage::Delivery {
        return Err(errors::unprocessable(format!(
            "order is at stage '{}' and not ready for delivery",
            order.stage()
        )));
    }

    let address = match body.address {
        Some(address) => address,
        None => services
            .load_client(shop_id, client_id)
            .map_err(errors::dispatch_error_to_response)?
            .contact()
            .address
            .clone()
            .ok_or_else(|| errors::bad_request("client has no address on file"))?,
    };
    let courier = body.courier.as_deref().map(parse_user).transpose()?;

    let agg = AggregateId::new();
    let delivery_id = DeliveryId::new(agg);
    let cmd = CmdAuth::new(
        DeliveryCommand::ScheduleDelivery(ScheduleDelivery {
            shop_id,
            delivery_id,
            order_id,
            client_id,
            address,
            scheduled_for: body.scheduled_for,
            courier,
            occurred_at: Utc::now(),
        }),
        vec![perm::DELIVERIES_SCHEDULE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_delivery(shop_id, delivery_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn list_deliveries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListDeliveriesQuery>,
) -> ApiResult {
    require(&shop, &principal, &perm::DELIVERIES_READ)?;
    let deliveries = &services.projections().deliveries;
    let shop_id = shop.shop_id();

    let mut list = match &query.order_id {
        Some(raw) => deliveries.list_for_order(shop_id, OrderId::new(parse_id(raw, "order")?)),
        None if query.mine => deliveries.list_for_courier(shop_id, principal.user_id()),
        None => deliveries.list(shop_id),
    };
    if query.mine {
        list.retain(|d| d.courier == Some(principal.user_id()));
    }
    Ok(items(list))
}

pub async fn get_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&shop, &principal, &perm::DELIVERIES_READ)?;
    let delivery_id = DeliveryId::new(parse_id(&id, "delivery")?);
    services
        .projections()
        .deliveries
        .get(shop.shop_id(), &delivery_id)
        .map(ok_json)
        .ok_or_else(|| errors::not_found("delivery"))
}

pub async fn assign_courier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignCourierRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "delivery")?;
    let delivery_id = DeliveryId::new(agg);

    let cmd = CmdAuth::new(
        DeliveryCommand::AssignCourier(AssignCourier {
            shop_id: shop.shop_id(),
            delivery_id,
            courier: parse_user(&body.courier)?,
            occurred_at: Utc::now(),
        }),
        vec![perm::DELIVERIES_SCHEDULE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_delivery(shop.shop_id(), delivery_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn dispatch_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = parse_id(&id, "delivery")?;
    let delivery_id = DeliveryId::new(agg);

    let cmd = CmdAuth::new(
        DeliveryCommand::DispatchDelivery(DispatchDelivery {
            shop_id: shop.shop_id(),
            delivery_id,
            occurred_at: Utc::now(),
        }),
        vec![perm::DELIVERIES_UPDATE],
    )
    .authorize(&shop, &principal)?;

    let delivery = services
        .load_delivery(shop.shop_id(), delivery_id)
        .map_err(errors::dispatch_error_to_response)?;
    if let Some(order_id) = delivery.order_id() {
        let order = services
            .load_order(shop.shop_id(), order_id)
            .map_err(errors::dispatch_error_to_response)?;
        if order.status() == OrderStatus::Cancelled {
            return Err(errors::unprocessable("order is cancelled"));
        }
    }

    let events = dispatched(services.dispatch_delivery(shop.shop_id(), delivery_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

/// Complete the run and hand the order over.
///
/// The order is marked delivered first; if that is rejected (e.g. delivery
/// checklist incomplete) the delivery stays out for delivery. A cancelled
/// order cannot be handed over.
pub async fn complete_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CompleteDeliveryRequest>>,
) -> ApiResult {
    let shop_id = shop.shop_id();
    let agg = parse_id(&id, "delivery")?;
    let delivery_id = DeliveryId::new(agg);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let cmd = CmdAuth::new(
        DeliveryCommand::CompleteDelivery(CompleteDelivery {
            shop_id,
            delivery_id,
            received_by: body.received_by,
            occurred_at: Utc::now(),
        }),
        vec![perm::DELIVERIES_UPDATE, Permission::for_stage(Stage::Delivery.as_str())],
    )
    .authorize(&shop, &principal)?;

    let delivery = services
        .load_delivery(shop_id, delivery_id)
        .map_err(errors::dispatch_error_to_response)?;
    let Some(order_id) = delivery.order_id() else {
        return Err(errors::not_found("delivery"));
    };
    if delivery.status() != DeliveryStatus::OutForDelivery {
        return Err(errors::json_error(
            StatusCode::CONFLICT,
            "conflict",
            "delivery is not out for delivery",
        ));
    }

    let order = services
        .load_order(shop_id, order_id)
        .map_err(errors::dispatch_error_to_response)?;
    match order.status() {
        OrderStatus::InProgress => {
            dispatched(services.dispatch_order(
                shop_id,
                order_id,
                OrderCommand::MarkDelivered(MarkDelivered {
                    shop_id,
                    order_id,
                    occurred_at: Utc::now(),
                }),
            ))?;
        }
        // Handed over at the counter meanwhile.
        OrderStatus::Delivered => {}
        OrderStatus::Cancelled => return Err(errors::unprocessable("order is cancelled")),
    }

    let events = dispatched(services.dispatch_delivery(shop_id, delivery_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn fail_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::FailDeliveryRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "delivery")?;
    let delivery_id = DeliveryId::new(agg);

    let cmd = CmdAuth::new(
        DeliveryCommand::FailDelivery(FailDelivery {
            shop_id: shop.shop_id(),
            delivery_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        vec![perm::DELIVERIES_UPDATE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_delivery(shop.shop_id(), delivery_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn reschedule_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RescheduleDeliveryRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "delivery")?;
    let delivery_id = DeliveryId::new(agg);

    let cmd = CmdAuth::new(
        DeliveryCommand::RescheduleDelivery(RescheduleDelivery {
            shop_id: shop.shop_id(),
            delivery_id,
            scheduled_for: body.scheduled_for,
            occurred_at: Utc::now(),
        }),
        vec![perm::DELIVERIES_SCHEDULE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_delivery(shop.shop_id(), delivery_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}
