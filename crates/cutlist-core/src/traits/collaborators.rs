//! Interfaces to the systems around the pipeline: persistence and storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cutlist_extractors::RawInput;

use crate::error::CutlistResult;
use crate::types::{PartDraft, RequestIdentity};

/// One parsed part as persisted for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseJobRecord {
    pub session_id: String,
    pub organization_id: String,
    pub user_id: String,
    pub file_index: usize,
    pub part: PartDraft,
}

/// Audit trail entry for a parse job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub session_id: String,
    pub organization_id: String,
    pub user_id: String,
    pub action: String,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        session_id: impl Into<String>,
        identity: &RequestIdentity,
        action: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            organization_id: identity.organization_id.clone(),
            user_id: identity.user_id.clone(),
            action: action.into(),
            detail,
            at: Utc::now(),
        }
    }
}

/// Sink for parse-job records and audit entries (persistence layer).
#[async_trait]
pub trait ParseJobSink: Send + Sync {
    /// Persist one parsed part.
    async fn write_part(&self, record: &ParseJobRecord) -> CutlistResult<()>;

    /// Persist an audit entry.
    async fn write_audit(&self, entry: &AuditEntry) -> CutlistResult<()>;
}

/// Fetches file bytes from a signed URL (storage layer).
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Download the file behind `url`.
    async fn fetch(&self, url: &str) -> CutlistResult<RawInput>;
}
