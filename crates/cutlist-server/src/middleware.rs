//! Middleware and request helpers for the REST API server.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use cutlist_core::types::RequestIdentity;

use crate::error::{ApiError, ApiResult};

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const USER_HEADER: &str = "x-user-id";

/// Create CORS middleware.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request logging middleware.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Caller identity set by the upstream auth layer.
///
/// The organization is required; the user defaults to empty.
pub fn identity_from_headers(headers: &HeaderMap) -> ApiResult<RequestIdentity> {
    let organization_id = header(headers, ORGANIZATION_HEADER)
        .ok_or_else(|| ApiError::unauthorized("missing X-Organization-Id header"))?;
    let user_id = header(headers, USER_HEADER).unwrap_or_default();
    Ok(RequestIdentity::new(organization_id, user_id))
}
