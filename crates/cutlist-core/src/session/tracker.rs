//! Progress tracking and cooperative cancellation for parse sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::{InMemorySessionStore, SessionStore};
use crate::error::{CutlistError, CutlistResult};
use crate::types::{
    FileDescriptor, FileProgress, FileStage, ParseSession, RequestIdentity, ResultSummary,
    SessionStatus,
};

/// Facade over a [`SessionStore`] implementing the per-file state machine.
///
/// Each session also owns a [`CancellationToken`]; `request_cancellation`
/// sets the session flag and cancels the token so running stages observe it
/// at their next checkpoint.
pub struct ProgressTracker {
    store: Arc<dyn SessionStore>,
    tokens: DashMap<String, CancellationToken>,
    ttl: Duration,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("sessions", &self.store.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ProgressTracker {
    /// Create a tracker over `store`, reaping sessions idle for `ttl`.
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            store,
            tokens: DashMap::new(),
            ttl,
        }
    }

    /// Create a tracker backed by an in-memory store.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemorySessionStore::new()), ttl)
    }

    /// Start a new session with one queued entry per file.
    pub fn create_session(
        &self,
        identity: &RequestIdentity,
        files: &[FileDescriptor],
    ) -> ParseSession {
        let session = ParseSession::new(&identity.organization_id, &identity.user_id, files);
        self.tokens
            .insert(session.id.clone(), CancellationToken::new());
        self.store.set(session.clone());
        debug!(session_id = %session.id, files = files.len(), "Created parse session");
        session
    }

    /// Cancellation token of a live session.
    pub fn token(&self, id: &str) -> Option<CancellationToken> {
        self.tokens.get(id).map(|t| t.value().clone())
    }

    fn not_found(id: &str) -> CutlistError {
        CutlistError::SessionNotFound(id.to_string())
    }

    /// Mark a file as started and the session as processing.
    pub fn begin_file(&self, id: &str, index: usize) -> CutlistResult<bool> {
        let mut applied = false;
        let found = self.store.update(id, &mut |session| {
            if session.status == SessionStatus::Pending {
                session.status = SessionStatus::Processing;
            }
            if session.cancellation_requested {
                return;
            }
            if let Some(file) = session.file_mut(index) {
                applied = file.apply(FileStage::Detecting, 0, "Detecting input type");
            }
            session.touch();
        });
        if !found {
            return Err(Self::not_found(id));
        }
        Ok(applied)
    }

    /// Move a file forward. Backward moves and updates after cancellation
    /// was requested are ignored and return `false`.
    pub fn advance(
        &self,
        id: &str,
        index: usize,
        stage: FileStage,
        percent: u8,
        message: &str,
    ) -> CutlistResult<bool> {
        let mut applied = false;
        let found = self.store.update(id, &mut |session| {
            if session.cancellation_requested && stage != FileStage::Cancelled {
                return;
            }
            if let Some(file) = session.file_mut(index) {
                applied = file.apply(stage, percent, message);
            }
            if applied {
                session.touch();
            }
        });
        if !found {
            return Err(Self::not_found(id));
        }
        if !applied {
            debug!(session_id = %id, index, %stage, "Progress update ignored");
        }
        Ok(applied)
    }

    /// Mark a file complete with its result summary.
    pub fn finish_file(&self, id: &str, index: usize, summary: ResultSummary) -> CutlistResult<bool> {
        let message = format!("Parsed {} parts", summary.parts);
        let mut applied = false;
        let found = self.store.update(id, &mut |session| {
            if session.cancellation_requested {
                return;
            }
            if let Some(file) = session.file_mut(index) {
                applied = file.apply(FileStage::Complete, 100, message.clone());
                if applied {
                    file.result_summary = Some(summary.clone());
                }
            }
            session.touch();
        });
        if !found {
            return Err(Self::not_found(id));
        }
        Ok(applied)
    }

    /// Mark a file failed.
    pub fn fail_file(&self, id: &str, index: usize, message: &str) -> CutlistResult<bool> {
        self.advance(id, index, FileStage::Failed, 100, message)
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `false` for unknown sessions and sessions already finished.
    pub fn request_cancellation(&self, id: &str) -> bool {
        let mut accepted = false;
        self.store.update(id, &mut |session| {
            if session.status.is_terminal() {
                return;
            }
            session.cancellation_requested = true;
            session.status = SessionStatus::Cancelling;
            session.touch();
            accepted = true;
        });
        if accepted {
            if let Some(token) = self.tokens.get(id) {
                token.cancel();
            }
            info!(session_id = %id, "Cancellation requested");
        }
        accepted
    }

    /// Whether cancellation was requested for the session.
    pub fn is_cancellation_requested(&self, id: &str) -> bool {
        self.store
            .get(id)
            .map(|s| s.cancellation_requested)
            .unwrap_or(false)
    }

    /// Per-file progress of a session.
    pub fn progress(&self, id: &str) -> CutlistResult<Vec<FileProgress>> {
        self.store
            .get(id)
            .map(|s| s.files)
            .ok_or_else(|| Self::not_found(id))
    }

    /// Full session snapshot.
    pub fn session(&self, id: &str) -> CutlistResult<ParseSession> {
        self.store.get(id).ok_or_else(|| Self::not_found(id))
    }

    /// Mark every non-terminal file as cancelled.
    pub fn cancel_remaining(&self, id: &str) -> CutlistResult<()> {
        let found = self.store.update(id, &mut |session| {
            for file in session.files.iter_mut() {
                file.apply(FileStage::Cancelled, file.percent, "Cancelled");
            }
            session.touch();
        });
        if !found {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    /// Close a session and return its final status.
    ///
    /// A session with a pending cancellation ends `cancelled` regardless of
    /// what the stages produced; one where every file failed ends `failed`.
    pub fn complete_session(&self, id: &str) -> CutlistResult<SessionStatus> {
        let mut status = SessionStatus::Completed;
        let found = self.store.update(id, &mut |session| {
            if session.status.is_terminal() {
                status = session.status;
                return;
            }
            if session.cancellation_requested {
                for file in session.files.iter_mut() {
                    file.apply(FileStage::Cancelled, file.percent, "Cancelled");
                }
                status = SessionStatus::Cancelled;
            } else if !session.files.is_empty()
                && session.files.iter().all(|f| f.stage == FileStage::Failed)
            {
                status = SessionStatus::Failed;
            } else {
                status = SessionStatus::Completed;
            }
            session.status = status;
            session.touch();
        });
        if !found {
            return Err(Self::not_found(id));
        }
        self.tokens.remove(id);
        info!(session_id = %id, %status, "Parse session finished");
        Ok(status)
    }

    /// Mark a session failed, failing every unfinished file.
    pub fn fail_session(&self, id: &str, message: &str) -> CutlistResult<()> {
        let found = self.store.update(id, &mut |session| {
            if session.status.is_terminal() {
                return;
            }
            for file in session.files.iter_mut() {
                file.apply(FileStage::Failed, file.percent, message);
            }
            session.status = SessionStatus::Failed;
            session.touch();
        });
        if !found {
            return Err(Self::not_found(id));
        }
        self.tokens.remove(id);
        warn!(session_id = %id, message, "Parse session failed");
        Ok(())
    }

    /// Reap sessions idle for longer than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.store.sweep(Utc::now(), self.ttl);
        for id in &removed {
            if let Some((_, token)) = self.tokens.remove(id) {
                // Jobs still running for a reaped session stop at their next checkpoint.
                token.cancel();
            }
        }
        removed.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
