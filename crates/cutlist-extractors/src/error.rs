//! Normalization error types.

use thiserror::Error;

/// Errors that can occur while detecting or normalizing raw input.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Input kind is not supported by any normalizer.
    #[error("Unsupported input type: {0}")]
    UnsupportedType(String),

    /// Normalization process failed.
    #[error("Normalization failed: {0}")]
    NormalizationFailed(String),

    /// Input contained nothing usable.
    #[error("Empty input")]
    EmptyContent,

    /// IO error during normalization.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Spreadsheet could not be opened or read.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// PDF-specific extraction error.
    #[cfg(feature = "pdf")]
    #[error("PDF extraction error: {0}")]
    Pdf(String),

    /// Task join error from spawn_blocking.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Result type for normalization operations.
pub type ExtractResult<T> = Result<T, ExtractError>;
