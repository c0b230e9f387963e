use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    routing::get,
    Router,
};
use chrono::{Duration, NaiveDate, Utc};

use washline_auth::permissions as perm;

use crate::app::routes::common::{ok_json, require, ApiResult};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, ShopContext};

/// Widest range `/reports/daily` will bucket in one call.
const MAX_REPORT_DAYS: i64 = 366;

pub fn router() -> Router {
    Router::new()
        .route("/due-customers", get(due_customers))
        .route("/summary", get(summary))
        .route("/daily", get(daily))
}

pub async fn due_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&shop, &principal, &perm::REPORTS_VIEW)?;
    let due = &services.projections().due_customers;
    Ok(ok_json(serde_json::json!({
        "items": due.list_due(shop.shop_id()),
        "total_receivable": due.total_receivable(shop.shop_id()),
    })))
}

pub async fn summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&shop, &principal, &perm::REPORTS_VIEW)?;
    Ok(ok_json(services.projections().reports.summary(shop.shop_id())))
}

/// Per-day buckets; defaults to the last seven days (UTC).
pub async fn daily(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::DailyReportQuery>,
) -> ApiResult {
    require(&shop, &principal, &perm::REPORTS_VIEW)?;

    let (from, to) = report_range(query.from, query.to, Utc::now().date_naive())
        .map_err(errors::bad_request)?;

    Ok(ok_json(serde_json::json!({
        "from": from,
        "to": to,
        "days": services.projections().reports.daily(shop.shop_id(), from, to),
    })))
}

/// Resolve the requested `from..=to` window; `to` defaults to `today` and
/// `from` to six days before `to`.
fn report_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), String> {
    let to = to.unwrap_or(today);
    let from = match from {
        Some(from) => from,
        None => to
            .checked_sub_signed(Duration::days(6))
            .ok_or_else(|| "'to' is too early for the default range".to_string())?,
    };
    if from > to {
        return Err("'from' must not be after 'to'".to_string());
    }
    if (to - from).num_days() >= MAX_REPORT_DAYS {
        return Err(format!("report range is limited to {MAX_REPORT_DAYS} days"));
    }
    Ok((from, to))
}
