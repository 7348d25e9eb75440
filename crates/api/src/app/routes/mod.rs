use axum::{
    Router,
    routing::{get, post},
};

pub mod activities;
pub mod ledger;
pub mod orders;
pub mod products;
pub mod rpc;
pub mod system;

/// Router for all endpoints that need a principal.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/rpc/process_order", post(rpc::process_order))
        .route("/stock_movements", get(ledger::list_movements))
        .route("/activities", get(activities::list_activities))
        .nest("/products", products::router())
        .nest("/orders", orders::router())
}
