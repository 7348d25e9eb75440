//! API-side authorization guard.
//!
//! Handlers call [`require`] before touching any service, keeping the
//! engine and repositories auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use stockflow_auth::{Permission, authorize};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// Check that the caller holds `permission`, or produce a 403 response.
pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), Response> {
    authorize(principal.principal(), permission)
        .map_err(|e| json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}
