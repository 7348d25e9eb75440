use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use stockflow_auth::Permission;
use stockflow_infra::{MovementFilter, StockRepository};
use stockflow_products::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

/// Stock movement ledger, newest first.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::MovementsQuery>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::INVENTORY_READ) {
        return resp;
    }

    let product_id = match query.product_id.as_deref() {
        Some(raw) => match errors::parse_id::<ProductId>(raw, "product") {
            Ok(id) => Some(id),
            Err(resp) => return resp,
        },
        None => None,
    };
    let filter = MovementFilter {
        product_id,
        limit: query.limit,
    };

    match services.repository().list_movements(filter).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::repository_error_to_response(e),
    }
}
