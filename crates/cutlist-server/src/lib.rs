//! cutlist-server - REST API server for cutlist.
//!
//! Exposes the parse pipeline to collaborators: parse requests, progress
//! polling, cancellation and metrics. Authentication happens upstream; the
//! caller's identity arrives in `X-Organization-Id` and `X-User-Id`.
//!
//! # Example
//!
//! ```ignore
//! use cutlist_core::PipelineConfig;
//! use cutlist_server::{create_server, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = AppState::from_config(PipelineConfig::load().unwrap()).unwrap();
//!     let app = create_server(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
