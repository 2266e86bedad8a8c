//! Job context threaded through every pipeline stage.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::tracker::ProgressTracker;
use crate::error::{CutlistError, CutlistResult};
use crate::types::FileStage;

/// Session id, progress sink and cancellation token for one running job.
///
/// Stages call [`JobContext::checkpoint`] before every expensive step. A
/// context without a tracker still honors its token but reports no progress.
#[derive(Debug, Clone)]
pub struct JobContext {
    session_id: String,
    file_index: usize,
    tracker: Option<Arc<ProgressTracker>>,
    token: CancellationToken,
}

impl JobContext {
    /// Context for a tracked session.
    pub fn new(
        session_id: impl Into<String>,
        tracker: Arc<ProgressTracker>,
        token: CancellationToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            file_index: 0,
            tracker: Some(tracker),
            token,
        }
    }

    /// Context that reports no progress.
    pub fn detached() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            file_index: 0,
            tracker: None,
            token: CancellationToken::new(),
        }
    }

    /// Same session, pointed at another file.
    pub fn for_file(&self, index: usize) -> Self {
        Self {
            file_index: index,
            ..self.clone()
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn file_index(&self) -> usize {
        self.file_index
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_tracked(&self) -> bool {
        self.tracker.is_some()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with [`CutlistError::Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> CutlistResult<()> {
        if self.is_cancelled() {
            debug!(session_id = %self.session_id, file = self.file_index, "Cancellation observed at checkpoint");
            return Err(CutlistError::Cancelled(self.session_id.clone()));
        }
        Ok(())
    }

    /// Report progress for the current file. Failures to record are logged, not raised.
    pub fn advance(&self, stage: FileStage, percent: u8, message: &str) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        if let Err(e) = tracker.advance(&self.session_id, self.file_index, stage, percent, message) {
            debug!(session_id = %self.session_id, error = %e, "Progress update dropped");
        }
    }
}
