//! Error types for cutlist operations.
//!
//! The variants follow the failure taxonomy of the parsing pipeline: input
//! errors are immediate, provider errors are transient (retry once) or
//! rejections (escalate), and only `Fatal` reaches the caller as a failed job.
//! Low-confidence parts are not errors; see [`crate::types::ValidationWarning`].

use cutlist_extractors::ExtractError;
use thiserror::Error;

/// Result type alias for cutlist operations.
pub type CutlistResult<T> = Result<T, CutlistError>;

/// Main error type for all cutlist operations.
#[derive(Error, Debug)]
pub enum CutlistError {
    /// Malformed or unsupported input. Never retried.
    #[error("Input error: {message}")]
    Input {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network failure, timeout or rate limit from a provider.
    #[error("Provider {provider} unavailable: {message}")]
    ProviderTransient {
        provider: String,
        message: String,
        code: ErrorCode,
    },

    /// Provider was reachable but its answer was unusable.
    #[error("Provider {provider} rejected the input: {message}")]
    ProviderRejection {
        provider: String,
        message: String,
        code: ErrorCode,
    },

    /// Every provider and the deterministic fallback were exhausted.
    #[error("Parse job failed: {message}")]
    Fatal {
        message: String,
        code: ErrorCode,
        #[source]
        cause: Option<Box<CutlistError>>,
    },

    /// The job time budget ran out before a provider produced parts.
    #[error("Job budget exhausted after {elapsed_ms}ms: {message}")]
    DegradedMode { message: String, elapsed_ms: u64 },

    /// Cancellation was requested for the session.
    #[error("Parse session {0} was cancelled")]
    Cancelled(String),

    /// Session id is unknown or already reaped.
    #[error("Session not found or expired: {0}")]
    SessionNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Input (INPUT_xxx)
    InputUnsupported,
    InputEmpty,
    InputMalformed,
    InputFetchFailed,

    // Provider transient (PRV_xxx)
    PrvTimeout,
    PrvNetwork,
    PrvRateLimited,
    PrvServerError,

    // Provider rejection (REJ_xxx)
    RejInvalidResponse,
    RejNoParts,
    RejUnauthorized,
    RejBadRequest,
    RejChainExhausted,

    // Job (JOB_xxx)
    JobFailed,
    JobBudgetExhausted,
    JobCancelled,

    // Session (SES_xxx)
    SesNotFound,

    // Configuration
    Configuration,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InputUnsupported => "INPUT_001",
            ErrorCode::InputEmpty => "INPUT_002",
            ErrorCode::InputMalformed => "INPUT_003",
            ErrorCode::InputFetchFailed => "INPUT_004",
            ErrorCode::PrvTimeout => "PRV_001",
            ErrorCode::PrvNetwork => "PRV_002",
            ErrorCode::PrvRateLimited => "PRV_003",
            ErrorCode::PrvServerError => "PRV_004",
            ErrorCode::RejInvalidResponse => "REJ_001",
            ErrorCode::RejNoParts => "REJ_002",
            ErrorCode::RejUnauthorized => "REJ_003",
            ErrorCode::RejBadRequest => "REJ_004",
            ErrorCode::RejChainExhausted => "REJ_005",
            ErrorCode::JobFailed => "JOB_001",
            ErrorCode::JobBudgetExhausted => "JOB_002",
            ErrorCode::JobCancelled => "JOB_003",
            ErrorCode::SesNotFound => "SES_001",
            ErrorCode::Configuration => "CFG_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CutlistError {
    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            code: ErrorCode::InputMalformed,
            source: None,
        }
    }

    /// Create a transient provider error.
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderTransient {
            provider: provider.into(),
            message: message.into(),
            code: ErrorCode::PrvNetwork,
        }
    }

    /// Create a provider rejection error.
    pub fn rejection(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderRejection {
            provider: provider.into(),
            message: message.into(),
            code: ErrorCode::RejInvalidResponse,
        }
    }

    /// Create a fatal job error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            code: ErrorCode::JobFailed,
            cause: None,
        }
    }

    /// Create a fatal job error wrapping the error that ended the last attempt.
    pub fn fatal_with_cause(message: impl Into<String>, cause: CutlistError) -> Self {
        Self::Fatal {
            message: message.into(),
            code: ErrorCode::JobFailed,
            cause: Some(Box::new(cause)),
        }
    }

    /// Classify an HTTP status returned by a provider.
    ///
    /// 408, 429 and 5xx are transient; everything else is a rejection.
    pub fn from_http_status(provider: impl Into<String>, status: u16, body: &str) -> Self {
        let provider = provider.into();
        let message = format!("HTTP {}: {}", status, body);
        match status {
            408 => Self::ProviderTransient {
                provider,
                message,
                code: ErrorCode::PrvTimeout,
            },
            429 => Self::ProviderTransient {
                provider,
                message,
                code: ErrorCode::PrvRateLimited,
            },
            500..=599 => Self::ProviderTransient {
                provider,
                message,
                code: ErrorCode::PrvServerError,
            },
            401 | 403 => Self::ProviderRejection {
                provider,
                message,
                code: ErrorCode::RejUnauthorized,
            },
            _ => Self::ProviderRejection {
                provider,
                message,
                code: ErrorCode::RejBadRequest,
            },
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Input { code, .. } => *code,
            Self::ProviderTransient { code, .. } => *code,
            Self::ProviderRejection { code, .. } => *code,
            Self::Fatal { code, .. } => *code,
            Self::DegradedMode { .. } => ErrorCode::JobBudgetExhausted,
            Self::Cancelled(_) => ErrorCode::JobCancelled,
            Self::SessionNotFound(_) => ErrorCode::SesNotFound,
            Self::Configuration(_) => ErrorCode::Configuration,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether a single retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderTransient { .. })
    }

    /// Whether this error fails the whole job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// The innermost input error, if the failure started as bad input.
    pub fn input_cause(&self) -> Option<&CutlistError> {
        match self {
            Self::Input { .. } => Some(self),
            Self::Fatal {
                cause: Some(cause), ..
            } => cause.input_cause(),
            _ => None,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Input {
                code: ErrorCode::InputUnsupported,
                ..
            } => Some("Upload text, CSV, Excel, a PDF or a photo of the cut list"),
            Self::Input { .. } => Some("Please check the file contents and try again"),
            Self::ProviderTransient { .. } => Some("The extraction service is busy, please retry shortly"),
            Self::ProviderRejection {
                code: ErrorCode::RejUnauthorized,
                ..
            } => Some("Please check the provider API key"),
            Self::DegradedMode { .. } => Some("Try a smaller file or disable AI parsing"),
            Self::SessionNotFound(_) => Some("The session finished or expired; start a new parse"),
            Self::Configuration(_) => Some("Please check your cutlist configuration"),
            _ => None,
        }
    }
}

impl From<ExtractError> for CutlistError {
    fn from(err: ExtractError) -> Self {
        let code = match &err {
            ExtractError::UnsupportedType(_) => ErrorCode::InputUnsupported,
            ExtractError::EmptyContent => ErrorCode::InputEmpty,
            _ => ErrorCode::InputMalformed,
        };
        Self::Input {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}
