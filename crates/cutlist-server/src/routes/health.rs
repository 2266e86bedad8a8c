//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Provider chain in escalation order.
    pub providers: Vec<String>,
    /// False when parsing can only use the row parser.
    pub ai_available: bool,
}

/// Health check endpoint.
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let orchestrator = state.parser.orchestrator();

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers: orchestrator
            .provider_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        ai_available: orchestrator.has_configured_provider(),
    }))
}
