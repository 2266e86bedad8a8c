//! Metrics endpoint.

use axum::{extract::State, Json};

use cutlist_core::metrics::MetricsSnapshot;

use crate::state::AppState;

/// Cache and performance counters.
/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.parser.metrics())
}
