use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use washline_auth::permissions as perm;
use washline_clients::{
    ClientCommand, ClientId, DeactivateClient, ReactivateClient, RecordTransaction, RegisterClient,
    UpdateClientDetails,
};
use washline_core::AggregateId;

use crate::app::routes::common::{
    committed, dispatched, items, ok_json, parse_id, require, ApiResult, CmdAuth,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, ShopContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_client).get(list_clients))
        .route("/:id", get(get_client).patch(update_client))
        .route("/:id/transactions", post(record_transaction))
        .route("/:id/ledger", get(get_ledger))
        .route("/:id/deactivate", post(deactivate_client))
        .route("/:id/reactivate", post(reactivate_client))
}

pub async fn register_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterClientRequest>,
) -> ApiResult {
    let agg = AggregateId::new();
    let client_id = ClientId::new(agg);

    let cmd = CmdAuth::new(
        ClientCommand::RegisterClient(RegisterClient {
            shop_id: shop.shop_id(),
            client_id,
            name: body.name,
            contact: body.contact,
            occurred_at: Utc::now(),
        }),
        vec![perm::CLIENTS_REGISTER],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_client(shop.shop_id(), client_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn list_clients(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&shop, &principal, &perm::CLIENTS_READ)?;
    let mut clients = services.projections().clients.list(shop.shop_id());
    clients.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(items(clients))
}

pub async fn get_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&shop, &principal, &perm::CLIENTS_READ)?;
    let client_id = ClientId::new(parse_id(&id, "client")?);
    match services.projections().clients.get(shop.shop_id(), &client_id) {
        Some(client) => Ok(ok_json(client)),
        None => Err(errors::not_found("client")),
    }
}

pub async fn get_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&shop, &principal, &perm::CLIENTS_READ)?;
    let client_id = ClientId::new(parse_id(&id, "client")?);
    let client = services
        .projections()
        .clients
        .get(shop.shop_id(), &client_id)
        .ok_or_else(|| errors::not_found("client"))?;
    Ok(ok_json(serde_json::json!({
        "client_id": client.client_id,
        "balance": client.balance,
        "entries": client.ledger,
    })))
}

pub async fn update_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateClientRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "client")?;
    let client_id = ClientId::new(agg);

    let cmd = CmdAuth::new(
        ClientCommand::UpdateClientDetails(UpdateClientDetails {
            shop_id: shop.shop_id(),
            client_id,
            name: body.name,
            contact: body.contact,
            occurred_at: Utc::now(),
        }),
        vec![perm::CLIENTS_UPDATE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_client(shop.shop_id(), client_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn record_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordTransactionRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "client")?;
    let client_id = ClientId::new(agg);

    let cmd = CmdAuth::new(
        ClientCommand::RecordTransaction(RecordTransaction {
            shop_id: shop.shop_id(),
            client_id,
            amount: body.amount,
            deposit: body.deposit,
            memo: body.memo,
            occurred_at: Utc::now(),
        }),
        vec![perm::CLIENTS_CHARGE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_client(shop.shop_id(), client_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn deactivate_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    let agg = parse_id(&id, "client")?;
    let client_id = ClientId::new(agg);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let cmd = CmdAuth::new(
        ClientCommand::DeactivateClient(DeactivateClient {
            shop_id: shop.shop_id(),
            client_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        vec![perm::CLIENTS_DEACTIVATE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_client(shop.shop_id(), client_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn reactivate_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = parse_id(&id, "client")?;
    let client_id = ClientId::new(agg);

    let cmd = CmdAuth::new(
        ClientCommand::ReactivateClient(ReactivateClient {
            shop_id: shop.shop_id(),
            client_id,
            occurred_at: Utc::now(),
        }),
        vec![perm::CLIENTS_DEACTIVATE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_client(shop.shop_id(), client_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}
