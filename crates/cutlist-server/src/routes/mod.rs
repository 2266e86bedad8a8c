//! Route definitions for the REST API.

mod health;
mod metrics;
mod parse;
mod sessions;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Parsing
        .route("/parse", post(parse::parse))
        // Sessions
        .route("/sessions/:id", get(sessions::get_session))
        .route("/sessions/:id/progress", get(sessions::get_progress))
        .route("/sessions/:id/cancel", post(sessions::cancel_session))
        // Observability
        .route("/metrics", get(metrics::get_metrics))
        // Attach state
        .with_state(state)
}

pub use health::*;
pub use metrics::*;
pub use parse::*;
pub use sessions::*;
