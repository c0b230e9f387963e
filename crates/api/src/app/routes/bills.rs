use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};

use washline_auth::permissions as perm;
use washline_billing::{BillCommand, BillId, IssueBill, RecordBillPayment, VoidBill};
use washline_clients::ClientId;
use washline_core::AggregateId;
use washline_orders::OrderId;

use crate::app::routes::common::{
    committed, dispatched, items, ok_json, parse_id, require, ApiResult, CmdAuth,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, ShopContext};

/// Payment term applied when a bill is issued without a due date.
const DEFAULT_PAYMENT_TERM_DAYS: i64 = 7;

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_bill).get(list_bills))
        .route("/:id", get(get_bill))
        .route("/:id/payments", post(record_payment))
        .route("/:id/void", post(void_bill))
}

pub async fn issue_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::IssueBillRequest>,
) -> ApiResult {
    require(&shop, &principal, &perm::BILLS_ISSUE)?;
    let shop_id = shop.shop_id();
    let client_id = ClientId::new(parse_id(&body.client_id, "client")?);
    let client = services
        .load_client(shop_id, client_id)
        .map_err(errors::dispatch_error_to_response)?;
    if !client.is_registered() {
        return Err(errors::not_found("client"));
    }

    let order_id = match &body.order_id {
        Some(raw) => {
            let order_id = OrderId::new(parse_id(raw, "order")?);
            let order = services
                .load_order(shop_id, order_id)
                .map_err(errors::dispatch_error_to_response)?;
            if order.shop_id().is_none() {
                return Err(errors::not_found("order"));
            }
            if order.client_id() != Some(client_id) {
                return Err(errors::bad_request("order belongs to another client"));
            }
            Some(order_id)
        }
        None => None,
    };

    let now = Utc::now();
    let agg = AggregateId::new();
    let bill_id = BillId::new(agg);

    let cmd = CmdAuth::new(
        BillCommand::IssueBill(IssueBill {
            shop_id,
            bill_id,
            client_id,
            order_id,
            lines: body.lines,
            due_date: body
                .due_date
                .unwrap_or(now + Duration::days(DEFAULT_PAYMENT_TERM_DAYS)),
            occurred_at: now,
        }),
        vec![perm::BILLS_ISSUE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_bill(shop_id, bill_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn list_bills(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListBillsQuery>,
) -> ApiResult {
    require(&shop, &principal, &perm::BILLS_READ)?;
    let bills = &services.projections().bills;
    let shop_id = shop.shop_id();

    let mut list = match &query.client_id {
        Some(raw) => bills.list_for_client(shop_id, ClientId::new(parse_id(raw, "client")?)),
        None if query.open => bills.list_open(shop_id),
        None => bills.list(shop_id),
    };
    if query.open {
        list.retain(|b| b.outstanding > 0);
    }
    Ok(items(list))
}

pub async fn get_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&shop, &principal, &perm::BILLS_READ)?;
    let bill_id = BillId::new(parse_id(&id, "bill")?);
    services
        .projections()
        .bills
        .get(shop.shop_id(), &bill_id)
        .map(ok_json)
        .ok_or_else(|| errors::not_found("bill"))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::BillPaymentRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "bill")?;
    let bill_id = BillId::new(agg);

    let cmd = CmdAuth::new(
        BillCommand::RecordBillPayment(RecordBillPayment {
            shop_id: shop.shop_id(),
            bill_id,
            amount: body.amount,
            method: body.method,
            reference: body.reference,
            occurred_at: Utc::now(),
        }),
        vec![perm::BILLS_PAY],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_bill(shop.shop_id(), bill_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn void_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    let agg = parse_id(&id, "bill")?;
    let bill_id = BillId::new(agg);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let cmd = CmdAuth::new(
        BillCommand::VoidBill(VoidBill {
            shop_id: shop.shop_id(),
            bill_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        vec![perm::BILLS_VOID],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_bill(shop.shop_id(), bill_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}
