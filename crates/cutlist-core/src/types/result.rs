//! Provider results and parse outcomes.

use serde::{Deserialize, Serialize};

use super::part::{ParseMethod, PartDraft};
use crate::recovery::RecoveryStrategy;

/// Why a provider call produced no usable parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailure {
    /// Network error, timeout, rate limit or 5xx. Worth one retry.
    Transient,
    /// Reachable but the content was unusable. Escalate without retry.
    Rejected,
    /// Provider lacks credentials.
    NotConfigured,
}

/// Canonical output of one provider call.
///
/// Provider failures are carried here as `success: false` with `errors`
/// populated; they are never raised as errors from the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider: String,
    pub parts: Vec<PartDraft>,
    pub raw_response_text: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProviderFailure>,
    /// How the JSON payload was recovered from the model text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryStrategy>,
}

impl ProviderResult {
    /// Successful result.
    pub fn succeeded(
        provider: impl Into<String>,
        parts: Vec<PartDraft>,
        raw_response_text: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            parts,
            raw_response_text: raw_response_text.into(),
            success: true,
            errors: Vec::new(),
            processing_time_ms,
            failure: None,
            recovery: None,
        }
    }

    /// Failed result.
    pub fn failed(
        provider: impl Into<String>,
        failure: ProviderFailure,
        error: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            parts: Vec::new(),
            raw_response_text: String::new(),
            success: false,
            errors: vec![error.into()],
            processing_time_ms,
            failure: Some(failure),
            recovery: None,
        }
    }

    /// Attach the raw model text.
    pub fn with_raw_text(mut self, raw: impl Into<String>) -> Self {
        self.raw_response_text = raw.into();
        self
    }

    /// Record the recovery strategy.
    pub fn with_recovery(mut self, strategy: RecoveryStrategy) -> Self {
        self.recovery = Some(strategy);
        self
    }

    /// Whether a retry might help.
    pub fn is_transient(&self) -> bool {
        self.failure == Some(ProviderFailure::Transient)
    }

    /// Whether the result carries at least one part.
    pub fn is_usable(&self) -> bool {
        self.success && !self.parts.is_empty()
    }

    /// First error message, or a generic description.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            if self.parts.is_empty() {
                "no parts extracted".to_string()
            } else {
                "unknown error".to_string()
            }
        } else {
            self.errors.join("; ")
        }
    }
}

/// One provider call made while running the escalation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub retried: bool,
    /// Skipped because the provider is not configured.
    pub skipped: bool,
}

impl ProviderAttempt {
    /// Attempt derived from a provider's result.
    pub fn from_result(result: &ProviderResult, duration_ms: u64, retried: bool) -> Self {
        Self {
            provider: result.provider.clone(),
            success: result.is_usable(),
            error: (!result.is_usable()).then(|| result.error_summary()),
            duration_ms,
            retried,
            skipped: false,
        }
    }

    /// Provider passed over without a call.
    pub fn skipped(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            success: false,
            error: Some("not configured".to_string()),
            duration_ms: 0,
            retried: false,
            skipped: true,
        }
    }
}

/// Per-row failure kept alongside the successfully parsed rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based line number in the normalized input.
    pub row: usize,
    pub message: String,
}

impl RowError {
    /// Create a row error.
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

/// Statistics returned with every parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStats {
    pub total_rows: usize,
    pub parsed: usize,
    pub flagged: usize,
    pub dropped: usize,
    pub row_errors: Vec<RowError>,
    pub method: ParseMethod,
    pub provider_attempts: Vec<ProviderAttempt>,
    pub elapsed_ms: u64,
    pub cache_hit: bool,
}

/// Result of `parse` for one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub session_id: String,
    pub parts: Vec<PartDraft>,
    pub stats: ParseStats,
}

/// Outcome of one file inside a multi-file job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub index: usize,
    pub name: String,
    #[serde(default)]
    pub parts: Vec<PartDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ParseStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of `parse_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub session_id: String,
    pub files: Vec<FileOutcome>,
}

impl BatchOutcome {
    /// All parts across files, in file order.
    pub fn parts(&self) -> impl Iterator<Item = &PartDraft> {
        self.files.iter().flat_map(|f| f.parts.iter())
    }

    /// Number of files that failed.
    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }
}
