use std::sync::Arc;

use axum::extract::{Extension, Query};

use washline_auth::permissions as perm;
use washline_infra::search::search;

use crate::app::dto;
use crate::app::routes::common::{ok_json, require, ApiResult};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, ShopContext};

/// `GET /search?q=`; result kinds the caller may not read come back empty.
pub async fn search_shop(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::SearchQuery>,
) -> ApiResult {
    require(&shop, &principal, &perm::CLIENTS_READ)?;
    let projections = services.projections();
    let mut results = search(
        shop.shop_id(),
        &query.q,
        &projections.clients,
        &projections.catalog,
        &projections.orders,
    );

    let resolved = principal.principal(&shop);
    if !resolved.can(&perm::CATALOG_READ) {
        results.items.clear();
    }
    if !resolved.can(&perm::ORDERS_READ) {
        results.orders.clear();
    }
    Ok(ok_json(results))
}
