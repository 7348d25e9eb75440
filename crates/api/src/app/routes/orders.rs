use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use stockflow_auth::Permission;
use stockflow_infra::{DispatchError, StockRepository};
use stockflow_orders::{Cancel, Confirm, Deliver, OrderCommand, OrderId, Ship};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/ship", post(ship_order))
        .route("/:id/deliver", post(deliver_order))
        .route("/:id/cancel", post(cancel_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::ORDERS_WRITE) {
        return resp;
    }

    let cmd = match body.into_command(OrderId::generate(), principal.user_id(), Utc::now()) {
        Ok(cmd) => cmd,
        Err(e) => return errors::dispatch_error_to_response(DispatchError::from(e)),
    };

    match services.orders().create(cmd).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::ORDERS_READ) {
        return resp;
    }

    match services.repository().list_orders().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::repository_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::ORDERS_READ) {
        return resp;
    }
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.repository().get_order(order_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => errors::repository_error_to_response(e),
    }
}

pub async fn confirm_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(&services, &principal, &id, |order_id| {
        OrderCommand::Confirm(Confirm {
            order_id,
            occurred_at: Utc::now(),
        })
    })
    .await
}

pub async fn ship_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(&services, &principal, &id, |order_id| {
        OrderCommand::Ship(Ship {
            order_id,
            occurred_at: Utc::now(),
        })
    })
    .await
}

pub async fn deliver_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(&services, &principal, &id, |order_id| {
        OrderCommand::Deliver(Deliver {
            order_id,
            occurred_at: Utc::now(),
        })
    })
    .await
}

/// The body (`{"reason": ...}`) is optional.
pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let body: dto::CancelOrderRequest = if body.is_empty() {
        dto::CancelOrderRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.to_string());
            }
        }
    };

    transition(&services, &principal, &id, move |order_id| {
        OrderCommand::Cancel(Cancel {
            order_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        })
    })
    .await
}

async fn transition(
    services: &AppServices,
    principal: &PrincipalContext,
    raw_id: &str,
    command: impl FnOnce(OrderId) -> OrderCommand,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(principal, &Permission::ORDERS_WRITE) {
        return resp;
    }
    let order_id: OrderId = match errors::parse_id(raw_id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .orders()
        .dispatch(order_id, command(order_id), principal.user_id())
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
