use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use washline_auth::{permissions as perm, Permission};
use washline_catalog::ServiceItemId;
use washline_clients::{ClientId, ClientStatus};
use washline_core::{AggregateId, ShopId};
use washline_infra::receipts::render_order_receipt;
use washline_orders::{
    AddOrderLine, AdvanceStage, CancelOrder, CheckItem, CreateOrder, LineItem, MarkDelivered,
    OrderCommand, OrderId, RecordOrderPayment, Stage, UncheckItem,
};

use crate::app::routes::common::{
    committed, dispatched, items, ok_json, parse_id, require, ApiResult, CmdAuth,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, ShopContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/lines", post(add_line))
        .route(
            "/:id/checklist/:stage/:line_no",
            post(check_item).delete(uncheck_item),
        )
        .route("/:id/advance", post(advance_stage))
        .route("/:id/payments", post(record_payment))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/deliver", post(mark_delivered))
        .route("/:id/receipt", get(receipt))
}

fn parse_stage(raw: &str) -> Result<Stage, Response> {
    raw.parse().map_err(|e: washline_core::DomainError| errors::bad_request(e.to_string()))
}

/// Price and describe intake lines from the catalog read model.
fn resolve_lines(
    services: &AppServices,
    shop_id: ShopId,
    lines: Vec<dto::OrderLineRequest>,
) -> Result<Vec<LineItem>, Response> {
    lines
        .into_iter()
        .map(|line| {
            let item_id = ServiceItemId::new(parse_id(&line.item_id, "item")?);
            let item = services
                .projections()
                .catalog
                .get(shop_id, &item_id)
                .ok_or_else(|| errors::bad_request(format!("unknown catalog item {}", line.item_id)))?;
            if item.retired {
                return Err(errors::unprocessable(format!(
                    "catalog item '{}' is retired",
                    item.name
                )));
            }
            Ok(LineItem {
                item_id,
                description: line.description.unwrap_or(item.name),
                quantity: line.quantity,
                unit_price: line.unit_price.unwrap_or(item.unit_price),
            })
        })
        .collect()
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> ApiResult {
    require(&shop, &principal, &perm::ORDERS_CREATE)?;
    let shop_id = shop.shop_id();
    let client_id = ClientId::new(parse_id(&body.client_id, "client")?);

    let client = services
        .load_client(shop_id, client_id)
        .map_err(errors::dispatch_error_to_response)?;
    if !client.is_registered() {
        return Err(errors::not_found("client"));
    }
    if client.status() == ClientStatus::Inactive {
        return Err(errors::unprocessable("client is inactive"));
    }

    let lines = resolve_lines(&services, shop_id, body.lines)?;
    let agg = AggregateId::new();
    let order_id = OrderId::new(agg);

    let cmd = CmdAuth::new(
        OrderCommand::CreateOrder(CreateOrder {
            shop_id,
            order_id,
            client_id,
            lines,
            deposit: body.deposit,
            promised_for: body.promised_for,
            notes: body.notes,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_CREATE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop_id, order_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> ApiResult {
    require(&shop, &principal, &perm::ORDERS_READ)?;
    let board = &services.projections().orders;
    let shop_id = shop.shop_id();

    let client_id = match &query.client_id {
        Some(raw) => Some(ClientId::new(parse_id(raw, "client")?)),
        None => None,
    };

    let mut orders = match (&query.stage, client_id) {
        (Some(stage), _) => board.list_by_stage(shop_id, parse_stage(stage)?),
        (None, Some(client_id)) => board.list_for_client(shop_id, client_id),
        (None, None) => board.list(shop_id),
    };
    if let Some(client_id) = client_id {
        orders.retain(|o| o.client_id == client_id);
    }
    Ok(items(orders))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&shop, &principal, &perm::ORDERS_READ)?;
    let order_id = OrderId::new(parse_id(&id, "order")?);
    services
        .projections()
        .orders
        .get(shop.shop_id(), &order_id)
        .map(ok_json)
        .ok_or_else(|| errors::not_found("order"))
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderLineRequest>,
) -> ApiResult {
    let shop_id = shop.shop_id();
    let agg = parse_id(&id, "order")?;
    let order_id = OrderId::new(agg);
    let mut lines = resolve_lines(&services, shop_id, vec![body])?;
    let Some(line) = lines.pop() else {
        return Err(errors::bad_request("missing line"));
    };

    let cmd = CmdAuth::new(
        OrderCommand::AddOrderLine(AddOrderLine {
            shop_id,
            order_id,
            line,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_EDIT],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop_id, order_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn check_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, stage, line_no)): Path<(String, String, u32)>,
    Json(body): Json<dto::CheckItemRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "order")?;
    let order_id = OrderId::new(agg);
    let stage = parse_stage(&stage)?;

    let cmd = CmdAuth::new(
        OrderCommand::CheckItem(CheckItem {
            shop_id: shop.shop_id(),
            order_id,
            stage,
            line_no,
            counted: body.counted,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_CHECK, Permission::for_stage(stage.as_str())],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop.shop_id(), order_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn uncheck_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, stage, line_no)): Path<(String, String, u32)>,
) -> ApiResult {
    let agg = parse_id(&id, "order")?;
    let order_id = OrderId::new(agg);
    let stage = parse_stage(&stage)?;

    let cmd = CmdAuth::new(
        OrderCommand::UncheckItem(UncheckItem {
            shop_id: shop.shop_id(),
            order_id,
            stage,
            line_no,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_CHECK, Permission::for_stage(stage.as_str())],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop.shop_id(), order_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn advance_stage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdvanceStageRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "order")?;
    let order_id = OrderId::new(agg);

    let cmd = CmdAuth::new(
        OrderCommand::AdvanceStage(AdvanceStage {
            shop_id: shop.shop_id(),
            order_id,
            from: body.from,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_ADVANCE, Permission::for_stage(body.from.as_str())],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop.shop_id(), order_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderPaymentRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "order")?;
    let order_id = OrderId::new(agg);

    let cmd = CmdAuth::new(
        OrderCommand::RecordOrderPayment(RecordOrderPayment {
            shop_id: shop.shop_id(),
            order_id,
            amount: body.amount,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_PAY],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop.shop_id(), order_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    let agg = parse_id(&id, "order")?;
    let order_id = OrderId::new(agg);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let cmd = CmdAuth::new(
        OrderCommand::CancelOrder(CancelOrder {
            shop_id: shop.shop_id(),
            order_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_CANCEL],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop.shop_id(), order_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

/// Counter pickup: hand the order over without a delivery run.
pub async fn mark_delivered(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = parse_id(&id, "order")?;
    let order_id = OrderId::new(agg);

    let cmd = CmdAuth::new(
        OrderCommand::MarkDelivered(MarkDelivered {
            shop_id: shop.shop_id(),
            order_id,
            occurred_at: Utc::now(),
        }),
        vec![perm::ORDERS_ADVANCE, Permission::for_stage(Stage::Delivery.as_str())],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_order(shop.shop_id(), order_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&shop, &principal, &perm::ORDERS_READ)?;
    let order_id = OrderId::new(parse_id(&id, "order")?);
    let order = services
        .projections()
        .orders
        .get(shop.shop_id(), &order_id)
        .ok_or_else(|| errors::not_found("order"))?;
    let client_name = services
        .projections()
        .clients
        .get(shop.shop_id(), &order.client_id)
        .map(|c| c.name)
        .unwrap_or_else(|| "unknown client".to_string());

    let text = render_order_receipt(services.shop_name(), &order, &client_name);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response())
}
