//! Session progress and cancellation endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use cutlist_core::types::{FileProgress, ParseSession, SessionStatus};

use crate::error::ApiResult;
use crate::state::AppState;

/// Full session snapshot.
/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ParseSession>> {
    Ok(Json(state.parser.session(&id)?))
}

/// Per-file progress.
/// GET /sessions/:id/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<FileProgress>>> {
    Ok(Json(state.parser.progress(&id)?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub session_id: String,
    /// False when the session had already finished.
    pub accepted: bool,
    pub status: SessionStatus,
}

/// Request cooperative cancellation.
/// POST /sessions/:id/cancel
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let accepted = state.parser.request_cancellation(&id);
    // Unknown ids are reported as not found rather than "not accepted".
    let session = state.parser.session(&id)?;

    Ok(Json(CancelResponse {
        session_id: id,
        accepted,
        status: session.status,
    }))
}
