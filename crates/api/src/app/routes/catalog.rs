use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use washline_auth::permissions as perm;
use washline_catalog::{
    AddServiceItem, ChangePrice, RestoreServiceItem, RetireServiceItem, ServiceItemCommand,
    ServiceItemId, UpdateServiceItem,
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
        .route("/items", post(add_item).get(list_items))
        .route("/items/:id", get(get_item).patch(update_item))
        .route("/items/:id/price", post(change_price))
        .route("/items/:id/retire", post(retire_item))
        .route("/items/:id/restore", post(restore_item))
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::AddServiceItemRequest>,
) -> ApiResult {
    let agg = AggregateId::new();
    let item_id = ServiceItemId::new(agg);

    let cmd = CmdAuth::new(
        ServiceItemCommand::AddServiceItem(AddServiceItem {
            shop_id: shop.shop_id(),
            item_id,
            name: body.name,
            category: body.category,
            service: body.service,
            unit: body.unit,
            unit_price: body.unit_price,
            occurred_at: Utc::now(),
        }),
        vec![perm::CATALOG_MANAGE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_item(shop.shop_id(), item_id, cmd))?;
    Ok(committed(StatusCode::CREATED, agg, &events))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListItemsQuery>,
) -> ApiResult {
    require(&shop, &principal, &perm::CATALOG_READ)?;
    Ok(items(
        services
            .projections()
            .catalog
            .list(shop.shop_id(), query.include_retired),
    ))
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&shop, &principal, &perm::CATALOG_READ)?;
    let item_id = ServiceItemId::new(parse_id(&id, "item")?);
    services
        .projections()
        .catalog
        .get(shop.shop_id(), &item_id)
        .map(ok_json)
        .ok_or_else(|| errors::not_found("item"))
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateServiceItemRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "item")?;
    let item_id = ServiceItemId::new(agg);

    let cmd = CmdAuth::new(
        ServiceItemCommand::UpdateServiceItem(UpdateServiceItem {
            shop_id: shop.shop_id(),
            item_id,
            name: body.name,
            category: body.category,
            occurred_at: Utc::now(),
        }),
        vec![perm::CATALOG_MANAGE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_item(shop.shop_id(), item_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn change_price(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangePriceRequest>,
) -> ApiResult {
    let agg = parse_id(&id, "item")?;
    let item_id = ServiceItemId::new(agg);

    let cmd = CmdAuth::new(
        ServiceItemCommand::ChangePrice(ChangePrice {
            shop_id: shop.shop_id(),
            item_id,
            unit_price: body.unit_price,
            occurred_at: Utc::now(),
        }),
        vec![perm::CATALOG_MANAGE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_item(shop.shop_id(), item_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn retire_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = parse_id(&id, "item")?;
    let item_id = ServiceItemId::new(agg);

    let cmd = CmdAuth::new(
        ServiceItemCommand::RetireServiceItem(RetireServiceItem {
            shop_id: shop.shop_id(),
            item_id,
            occurred_at: Utc::now(),
        }),
        vec![perm::CATALOG_MANAGE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_item(shop.shop_id(), item_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}

pub async fn restore_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = parse_id(&id, "item")?;
    let item_id = ServiceItemId::new(agg);

    let cmd = CmdAuth::new(
        ServiceItemCommand::RestoreServiceItem(RestoreServiceItem {
            shop_id: shop.shop_id(),
            item_id,
            occurred_at: Utc::now(),
        }),
        vec![perm::CATALOG_MANAGE],
    )
    .authorize(&shop, &principal)?;

    let events = dispatched(services.dispatch_item(shop.shop_id(), item_id, cmd))?;
    Ok(committed(StatusCode::OK, agg, &events))
}
