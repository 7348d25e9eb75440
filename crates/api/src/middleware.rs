use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockflow_auth::{Principal, Role};
use stockflow_core::UserId;

use crate::context::PrincipalContext;

/// Caller id, set by the upstream identity proxy.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Comma-separated role list.
pub const ROLES_HEADER: &str = "x-roles";

pub async fn principal_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = principal_from_headers(req.headers())?;
    req.extensions_mut().insert(PrincipalContext::new(principal));
    Ok(next.run(req).await)
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, StatusCode> {
    let roles = headers
        .get(ROLES_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let roles = Role::parse_list(roles);
    if roles.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user_id = match headers.get(USER_ID_HEADER) {
        None => None,
        Some(raw) => {
            let raw = raw.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
            Some(raw.trim().parse::<UserId>().map_err(|_| StatusCode::UNAUTHORIZED)?)
        }
    };

    Ok(Principal::from_roles(user_id, roles))
}

/// One log line per request with status and latency.
pub async fn request_logging(
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = std::time::Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
