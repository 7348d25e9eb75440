use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use stockflow_auth::Permission;
use stockflow_infra::StockRepository;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

const DEFAULT_LIMIT: usize = 50;

pub async fn list_activities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ActivitiesQuery>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::ACTIVITIES_READ) {
        return resp;
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    match services.repository().list_activities(Some(limit)).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::repository_error_to_response(e),
    }
}
