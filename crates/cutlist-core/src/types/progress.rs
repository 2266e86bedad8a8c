//! Parse session and per-file progress types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a parse session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    Processing,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl SessionStatus {
    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Cancelled | SessionStatus::Completed | SessionStatus::Failed
        )
    }
}

/// Stage of a single file within a session.
///
/// Stages only move forward; `Failed` and `Cancelled` can be entered from any
/// non-terminal stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileStage {
    #[default]
    Queued,
    Uploading,
    Detecting,
    Parsing,
    Ocr,
    Validating,
    Complete,
    Failed,
    Cancelled,
}

impl FileStage {
    fn rank(&self) -> u8 {
        match self {
            FileStage::Queued => 0,
            FileStage::Uploading => 1,
            FileStage::Detecting => 2,
            FileStage::Parsing => 3,
            FileStage::Ocr => 4,
            FileStage::Validating => 5,
            FileStage::Complete | FileStage::Failed | FileStage::Cancelled => 6,
        }
    }

    /// Whether the file is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStage::Complete | FileStage::Failed | FileStage::Cancelled
        )
    }

    /// Whether moving from `self` to `next` respects the stage order.
    pub fn can_transition_to(&self, next: FileStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            FileStage::Failed | FileStage::Cancelled => true,
            _ => next.rank() >= self.rank(),
        }
    }
}

/// Short summary stored on a finished file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub parts: usize,
    pub flagged: usize,
    pub row_errors: usize,
    pub method: String,
}

/// Progress of one file in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub index: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub stage: FileStage,
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
}

impl FileProgress {
    /// Create a queued file entry.
    pub fn queued(index: usize, name: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            index,
            name: name.into(),
            size_bytes,
            stage: FileStage::Queued,
            percent: 0,
            message: "Waiting to start".to_string(),
            result_summary: None,
        }
    }

    /// Apply a stage/percent update.
    ///
    /// Returns false when the transition would move backwards or the file is
    /// already finished. Percent never decreases within a stage.
    pub fn apply(&mut self, stage: FileStage, percent: u8, message: impl Into<String>) -> bool {
        if !self.stage.can_transition_to(stage) {
            return false;
        }
        let percent = percent.min(100);
        self.percent = if stage == self.stage {
            self.percent.max(percent)
        } else {
            percent
        };
        self.stage = stage;
        self.message = message.into();
        true
    }
}

/// Input file description used when creating a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size_bytes: Option<u64>,
}

impl FileDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

/// Ephemeral, process-wide state of one parse job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseSession {
    pub id: String,
    pub status: SessionStatus,
    pub files: Vec<FileProgress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub organization_id: String,
    pub user_id: String,
    pub cancellation_requested: bool,
}

impl ParseSession {
    /// Create a pending session.
    pub fn new(
        organization_id: impl Into<String>,
        user_id: impl Into<String>,
        files: &[FileDescriptor],
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: SessionStatus::Pending,
            files: files
                .iter()
                .enumerate()
                .map(|(i, f)| FileProgress::queued(i, f.name.clone(), f.size_bytes))
                .collect(),
            created_at: now,
            updated_at: now,
            organization_id: organization_id.into(),
            user_id: user_id.into(),
            cancellation_requested: false,
        }
    }

    /// Mutable access to a file entry.
    pub fn file_mut(&mut self, index: usize) -> Option<&mut FileProgress> {
        self.files.get_mut(index)
    }

    /// Record that the session changed.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(FileStage::Queued.can_transition_to(FileStage::Detecting));
        assert!(FileStage::Parsing.can_transition_to(FileStage::Ocr));
        assert!(!FileStage::Validating.can_transition_to(FileStage::Parsing));
        assert!(FileStage::Parsing.can_transition_to(FileStage::Cancelled));
        assert!(!FileStage::Cancelled.can_transition_to(FileStage::Complete));
        assert!(!FileStage::Complete.can_transition_to(FileStage::Failed));
    }

    #[test]
    fn test_percent_monotonic_within_stage() {
        let mut file = FileProgress::queued(0, "a.csv", None);
        assert!(file.apply(FileStage::Parsing, 40, "parsing"));
        assert!(file.apply(FileStage::Parsing, 20, "still parsing"));
        assert_eq!(file.percent, 40);
        assert!(file.apply(FileStage::Validating, 90, "validating"));
        assert!(!file.apply(FileStage::Parsing, 95, "back"));
        assert_eq!(file.stage, FileStage::Validating);
    }

    #[test]
    fn test_session_files() {
        let files = vec![FileDescriptor::new("a.csv", Some(10)), FileDescriptor::new("b.pdf", None)];
        let session = ParseSession::new("org", "user", &files);
        assert_eq!(session.files.len(), 2);
        assert_eq!(session.files[1].index, 1);
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(FileStage::Ocr.to_string(), "ocr");
    }
}
