//! cutlist-core - Core library for cutlist.
//!
//! This crate turns raw cut lists (pasted text, spreadsheets, transcripts,
//! scans) into scored [`PartDraft`]s. It provides the domain types, the
//! extraction-provider trait, the resilient provider chain, JSON recovery for
//! model output, the deterministic row parser, confidence scoring, session
//! progress with cooperative cancellation, and a single-flight result cache.
//!
//! # Example
//!
//! ```ignore
//! use cutlist_core::{ParseOptions, PartParser, PipelineConfig, RequestIdentity};
//! use cutlist_extractors::RawInput;
//!
//! let parser = PartParser::builder()
//!     .config(PipelineConfig::load()?)
//!     .providers(chain)
//!     .build()?;
//!
//! let outcome = parser
//!     .parse(RawInput::text("2 | 600 | 400 | 18 | WHITE"), &ParseOptions::default(), &identity)
//!     .await?;
//! println!("{} parts, {} need review", outcome.stats.parsed, outcome.stats.flagged);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod recovery;
pub mod scoring;
pub mod session;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use cache::{fingerprint, CacheEntry, CacheLookup, CacheStats, ResultCache};
pub use config::{
    CacheConfig, OrchestratorConfig, PipelineConfig, ProviderChainConfig, ProviderKind,
    ProviderSettings, SessionConfig,
};
pub use error::{CutlistError, CutlistResult, ErrorCode};
pub use fetch::HttpFileFetcher;
pub use gateway::{normalize_response, normalize_text, ProviderResponse};
pub use metrics::{MetricsSnapshot, PerformanceMetrics, PerformanceSnapshot};
pub use orchestrator::{OrchestratorOutcome, ResilientOrchestrator};
pub use parser::{DeterministicOutcome, DeterministicParser};
pub use pipeline::{FileSource, PartParser, PartParserBuilder, SpawnedJob};
pub use recovery::{recover, recover_json, RecoveryStrategy};
pub use scoring::{ConfidenceScorer, ScoredParts};
pub use session::{spawn_sweeper, InMemorySessionStore, JobContext, ProgressTracker, SessionStore};
pub use traits::{
    AuditEntry, ExtractionRequest, FileFetcher, ParseJobRecord, ParseJobSink, PartExtractor,
};
pub use types::{
    BatchOutcome, ConfidenceLevel, DimOrderHint, EdgeBanding, FileDescriptor, FileOutcome,
    FileProgress, FileStage, GrainPolicy, ParseMethod, ParseOptions, ParseOutcome, ParseSession,
    ParseStats, PartDraft, ProviderAttempt, ProviderFailure, ProviderResult, RequestIdentity,
    RowError, SessionStatus, Units, ValidationWarning,
};
