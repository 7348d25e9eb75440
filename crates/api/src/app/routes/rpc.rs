use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use stockflow_auth::Permission;
use stockflow_inventory::ProcessOrderRequest;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Run the stock reduction transaction.
///
/// Success and insufficient stock are both 200; the body's `success` flag
/// tells them apart. Malformed bodies (including negative prices) are 400.
pub async fn process_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<ProcessOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::ORDERS_PROCESS) {
        return resp;
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };

    match services
        .engine()
        .process_order(&body, principal.user_id())
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}
