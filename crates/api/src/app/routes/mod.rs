use axum::{routing::get, Router};

pub mod bills;
pub mod catalog;
pub mod clients;
pub mod common;
pub mod deliveries;
pub mod orders;
pub mod reports;
pub mod search;
pub mod system;

/// Router for all authenticated (shop-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/dashboard", get(system::dashboard))
        .route("/search", get(search::search_shop))
        .nest("/clients", clients::router())
        .nest("/catalog", catalog::router())
        .nest("/orders", orders::router())
        .nest("/bills", bills::router())
        .nest("/deliveries", deliveries::router())
        .nest("/reports", reports::router())
}
