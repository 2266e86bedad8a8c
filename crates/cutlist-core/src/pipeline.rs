//! The parse pipeline: normalize, extract, score, track.
//!
//! [`PartParser`] is the entry point collaborators call. It owns the
//! orchestrator, the result cache, the session tracker and the metrics, and
//! wires a [`JobContext`] through every stage of every file.

use std::sync::Arc;
use std::time::Instant;

use futures::{future, stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Instrument};

use cutlist_extractors::{InputKind, NormalizationPipeline, NormalizedInput, RawInput};

use crate::cache::{fingerprint, ResultCache};
use crate::config::PipelineConfig;
use crate::error::{CutlistError, CutlistResult, ErrorCode};
use crate::fetch::HttpFileFetcher;
use crate::metrics::{MetricsSnapshot, PerformanceMetrics};
use crate::orchestrator::ResilientOrchestrator;
use crate::parser::DeterministicParser;
use crate::scoring::ConfidenceScorer;
use crate::session::{InMemorySessionStore, JobContext, ProgressTracker, SessionStore};
use crate::traits::{
    AuditEntry, ExtractionRequest, FileFetcher, ParseJobRecord, ParseJobSink, PartExtractor,
};
use crate::types::{
    BatchOutcome, FileDescriptor, FileOutcome, FileProgress, FileStage, ParseMethod,
    ParseOptions, ParseOutcome, ParseSession, ParseStats, PartDraft, RequestIdentity,
    ResultSummary, SessionStatus,
};

/// Where a file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Raw(RawInput),
    /// Signed URL, downloaded through the configured [`FileFetcher`].
    Url(String),
}

impl FileSource {
    fn descriptor(&self) -> FileDescriptor {
        match self {
            FileSource::Raw(raw) => FileDescriptor::new(
                raw.file_name.clone().unwrap_or_else(|| "input".to_string()),
                Some(raw.len() as u64),
            ),
            FileSource::Url(url) => {
                let name = url::Url::parse(url)
                    .ok()
                    .and_then(|u| crate::fetch::file_name_from_url(&u))
                    .unwrap_or_else(|| "download".to_string());
                FileDescriptor::new(name, None)
            }
        }
    }
}

/// A job running on a background task.
#[derive(Debug)]
pub struct SpawnedJob {
    pub session_id: String,
    pub handle: JoinHandle<CutlistResult<BatchOutcome>>,
}

/// Parts and stats for one successfully parsed file.
#[derive(Debug)]
struct FileRun {
    parts: Vec<PartDraft>,
    stats: ParseStats,
}

/// Errors after which the deterministic parser is tried instead.
fn falls_back(err: &CutlistError) -> bool {
    matches!(
        err,
        CutlistError::DegradedMode { .. }
            | CutlistError::ProviderRejection { .. }
            | CutlistError::ProviderTransient { .. }
    )
}

/// Ingestion pipeline turning raw input into scored part drafts.
pub struct PartParser {
    config: PipelineConfig,
    normalizer: NormalizationPipeline,
    deterministic: DeterministicParser,
    scorer: ConfidenceScorer,
    orchestrator: ResilientOrchestrator,
    cache: Arc<ResultCache>,
    tracker: Arc<ProgressTracker>,
    metrics: Arc<PerformanceMetrics>,
    sink: Option<Arc<dyn ParseJobSink>>,
    fetcher: Arc<dyn FileFetcher>,
}

impl std::fmt::Debug for PartParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartParser")
            .field("orchestrator", &self.orchestrator)
            .field("cache", &self.cache)
            .field("tracker", &self.tracker)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl PartParser {
    /// Start building a parser.
    pub fn builder() -> PartParserBuilder {
        PartParserBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Session tracker, for running the sweeper.
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        self.tracker.clone()
    }

    pub fn cache(&self) -> Arc<ResultCache> {
        self.cache.clone()
    }

    pub fn orchestrator(&self) -> &ResilientOrchestrator {
        &self.orchestrator
    }

    /// Parse one input.
    ///
    /// Only a [`CutlistError::Fatal`] (or [`CutlistError::Cancelled`]) is
    /// returned; every other failure is absorbed into escalation, fallback
    /// or per-row errors in the stats.
    #[instrument(skip_all, fields(org = %identity.organization_id, size = input.len()))]
    pub async fn parse(
        &self,
        input: RawInput,
        options: &ParseOptions,
        identity: &RequestIdentity,
    ) -> CutlistResult<ParseOutcome> {
        let batch = self
            .run_batch(vec![FileSource::Raw(input)], options, identity)
            .await?;
        let file = batch
            .files
            .into_iter()
            .next()
            .ok_or_else(|| CutlistError::Internal("batch finished without a file".to_string()))?;
        Ok(ParseOutcome {
            session_id: batch.session_id,
            parts: file.parts,
            stats: file.stats.unwrap_or_default(),
        })
    }

    /// Parse several files in one session, sequentially.
    ///
    /// A failing file is reported in its [`FileOutcome`]; the job fails only
    /// when every file fails.
    #[instrument(skip_all, fields(org = %identity.organization_id, files = inputs.len()))]
    pub async fn parse_files(
        &self,
        inputs: Vec<RawInput>,
        options: &ParseOptions,
        identity: &RequestIdentity,
    ) -> CutlistResult<BatchOutcome> {
        let sources = inputs.into_iter().map(FileSource::Raw).collect();
        self.run_batch(sources, options, identity).await
    }

    /// Download files from signed URLs and parse them in one session.
    #[instrument(skip_all, fields(org = %identity.organization_id, files = urls.len()))]
    pub async fn parse_urls(
        &self,
        urls: Vec<String>,
        options: &ParseOptions,
        identity: &RequestIdentity,
    ) -> CutlistResult<BatchOutcome> {
        let sources = urls.into_iter().map(FileSource::Url).collect();
        self.run_batch(sources, options, identity).await
    }

    /// Open a session and run the job on a background task.
    ///
    /// The session id is available immediately, so callers can poll
    /// progress or cancel while the job runs. Progress is always tracked.
    pub fn spawn(
        self: &Arc<Self>,
        sources: Vec<FileSource>,
        options: ParseOptions,
        identity: RequestIdentity,
    ) -> CutlistResult<SpawnedJob> {
        let descriptors = Self::describe(&sources)?;
        let options = ParseOptions {
            track_progress: true,
            ..options
        };
        let ctx = self.open(&identity, &descriptors, &options);
        let session_id = ctx.session_id().to_string();

        let parser = Arc::clone(self);
        let handle = tokio::spawn(
            async move {
                parser
                    .run_opened(ctx, descriptors, sources, &options, &identity)
                    .await
            }
            .in_current_span(),
        );
        Ok(SpawnedJob { session_id, handle })
    }

    /// Per-file progress of a session.
    pub fn progress(&self, session_id: &str) -> CutlistResult<Vec<FileProgress>> {
        self.tracker.progress(session_id)
    }

    /// Full session snapshot.
    pub fn session(&self, session_id: &str) -> CutlistResult<ParseSession> {
        self.tracker.session(session_id)
    }

    /// Request cooperative cancellation. Returns whether the request was accepted.
    pub fn request_cancellation(&self, session_id: &str) -> bool {
        self.tracker.request_cancellation(session_id)
    }

    /// Cache and performance counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache: self.cache.stats(),
            performance: self.metrics.snapshot(),
        }
    }

    fn open(
        &self,
        identity: &RequestIdentity,
        files: &[FileDescriptor],
        options: &ParseOptions,
    ) -> JobContext {
        if !options.track_progress {
            return JobContext::detached();
        }
        let session = self.tracker.create_session(identity, files);
        let token = self.tracker.token(&session.id).unwrap_or_default();
        JobContext::new(session.id, self.tracker.clone(), token)
    }

    fn describe(sources: &[FileSource]) -> CutlistResult<Vec<FileDescriptor>> {
        if sources.is_empty() {
            return Err(CutlistError::Input {
                message: "no input files".to_string(),
                code: ErrorCode::InputEmpty,
                source: None,
            });
        }
        Ok(sources.iter().map(FileSource::descriptor).collect())
    }

    async fn run_batch(
        &self,
        sources: Vec<FileSource>,
        options: &ParseOptions,
        identity: &RequestIdentity,
    ) -> CutlistResult<BatchOutcome> {
        let descriptors = Self::describe(&sources)?;
        let ctx = self.open(identity, &descriptors, options);
        self.run_opened(ctx, descriptors, sources, options, identity)
            .await
    }

    async fn run_opened(
        &self,
        ctx: JobContext,
        descriptors: Vec<FileDescriptor>,
        sources: Vec<FileSource>,
        options: &ParseOptions,
        identity: &RequestIdentity,
    ) -> CutlistResult<BatchOutcome> {
        let total = descriptors.len();
        self.metrics.job_started();
        info!(session_id = %ctx.session_id(), files = total, tracked = ctx.is_tracked(), "Parse job started");

        let mut files = Vec::with_capacity(total);
        let mut first_error: Option<CutlistError> = None;

        for (index, source) in sources.into_iter().enumerate() {
            let file_ctx = ctx.for_file(index);
            let name = descriptors[index].name.clone();

            match self.run_source(&file_ctx, source, options).await {
                Ok(run) => {
                    self.finish(&file_ctx, &run);
                    self.persist(&file_ctx, identity, &run.parts).await;
                    files.push(FileOutcome {
                        index,
                        name,
                        parts: run.parts,
                        stats: Some(run.stats),
                        error: None,
                    });
                }
                Err(CutlistError::Cancelled(_)) => break,
                Err(e) => {
                    warn!(session_id = %ctx.session_id(), file = index, error = %e, "File failed");
                    if let Err(track_err) = self.tracker_fail(&file_ctx, &e) {
                        debug!(error = %track_err, "Could not record file failure");
                    }
                    files.push(FileOutcome {
                        index,
                        name,
                        parts: Vec::new(),
                        stats: None,
                        error: Some(e.to_string()),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        let all_failed = !files.is_empty() && files.iter().all(|f| f.error.is_some());
        let status = self.close(&ctx, all_failed);

        match status {
            SessionStatus::Cancelled => {
                self.metrics.job_cancelled();
                info!(session_id = %ctx.session_id(), "Parse job cancelled");
                Err(CutlistError::Cancelled(ctx.session_id().to_string()))
            }
            _ if all_failed => {
                self.metrics.job_failed();
                let cause = first_error
                    .unwrap_or_else(|| CutlistError::Internal("file failed without an error".to_string()));
                let err = if total == 1 && cause.is_fatal() {
                    cause
                } else if total == 1 {
                    CutlistError::fatal_with_cause(format!("could not parse {}", descriptors[0].name), cause)
                } else {
                    CutlistError::fatal_with_cause(format!("all {} files failed", total), cause)
                };
                self.audit(&ctx, identity, "parse.failed", serde_json::json!({ "error": err.to_string() }))
                    .await;
                Err(err)
            }
            _ => {
                let parts: usize = files.iter().map(|f| f.parts.len()).sum();
                let flagged: usize = files
                    .iter()
                    .filter_map(|f| f.stats.as_ref())
                    .map(|s| s.flagged)
                    .sum();
                self.metrics.job_completed(parts, flagged);
                info!(session_id = %ctx.session_id(), parts, flagged, "Parse job completed");
                self.audit(
                    &ctx,
                    identity,
                    "parse.completed",
                    serde_json::json!({
                        "files": total,
                        "failedFiles": files.iter().filter(|f| f.error.is_some()).count(),
                        "parts": parts,
                        "flagged": flagged,
                    }),
                )
                .await;
                Ok(BatchOutcome {
                    session_id: ctx.session_id().to_string(),
                    files,
                })
            }
        }
    }

    async fn run_source(
        &self,
        ctx: &JobContext,
        source: FileSource,
        options: &ParseOptions,
    ) -> CutlistResult<FileRun> {
        let raw = match source {
            FileSource::Raw(raw) => raw,
            FileSource::Url(url) => {
                ctx.checkpoint()?;
                ctx.advance(FileStage::Uploading, 0, "Fetching file");
                let fetch = self.fetcher.fetch(&url);
                let raw = tokio::time::timeout(self.config.fetch_timeout(), fetch)
                    .await
                    .map_err(|_| CutlistError::Input {
                        message: format!(
                            "file download timed out after {}ms",
                            self.config.fetch_timeout_ms
                        ),
                        code: ErrorCode::InputFetchFailed,
                        source: None,
                    })??;
                ctx.advance(FileStage::Uploading, 100, "Fetched file");
                raw
            }
        };
        self.run_file(ctx, &raw, options).await
    }

    async fn run_file(
        &self,
        ctx: &JobContext,
        raw: &RawInput,
        options: &ParseOptions,
    ) -> CutlistResult<FileRun> {
        let started = Instant::now();
        ctx.checkpoint()?;
        if ctx.is_tracked() {
            if let Err(e) = self.tracker.begin_file(ctx.session_id(), ctx.file_index()) {
                debug!(error = %e, "Could not mark file started");
            }
        }

        let normalized = self.normalizer.normalize(raw).await?;
        ctx.advance(
            FileStage::Detecting,
            100,
            &format!("Detected {}", normalized.kind),
        );
        ctx.checkpoint()?;

        let source_ref = raw.file_name.clone().unwrap_or_else(|| "text".to_string());
        let mut stats = ParseStats::default();
        let parts = self
            .extract(ctx, raw, &normalized, options, &source_ref, &mut stats)
            .await?;

        // A result that arrives after cancellation is discarded here.
        ctx.checkpoint()?;

        if parts.is_empty() {
            let detail = stats
                .row_errors
                .first()
                .map(|e| format!(" (row {}: {})", e.row, e.message))
                .unwrap_or_default();
            return Err(CutlistError::fatal_with_cause(
                "no parts could be extracted",
                CutlistError::Input {
                    message: format!("no part rows found{}", detail),
                    code: ErrorCode::InputEmpty,
                    source: None,
                },
            ));
        }

        ctx.advance(FileStage::Validating, 20, "Scoring parts");
        let scored = self.scorer.score(parts, options.confidence_level);
        for warning in &scored.warnings {
            debug!(part_id = %warning.part_id, warning = ?warning.warning, "Part warning");
        }
        stats.parsed = scored.parts.len();
        stats.flagged = scored.flagged;
        stats.dropped += scored.dropped;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        ctx.advance(
            FileStage::Validating,
            100,
            &format!("{} parts, {} need review", stats.parsed, stats.flagged),
        );

        Ok(FileRun {
            parts: scored.parts,
            stats,
        })
    }

    /// Pick the extraction route for a normalized input.
    async fn extract(
        &self,
        ctx: &JobContext,
        raw: &RawInput,
        normalized: &NormalizedInput,
        options: &ParseOptions,
        source_ref: &str,
        stats: &mut ParseStats,
    ) -> CutlistResult<Vec<PartDraft>> {
        let ai_ready = options.use_ai && self.orchestrator.has_configured_provider();
        let kind = &normalized.kind;

        if !normalized.has_text() {
            // Images and scanned documents can only be read by a vision provider.
            if !ai_ready {
                return Err(CutlistError::Input {
                    message: format!("{} input needs AI extraction, which is unavailable", kind),
                    code: ErrorCode::InputUnsupported,
                    source: None,
                });
            }
            let bytes = normalized.binary.clone().unwrap_or_else(|| raw.bytes.clone());
            let request = match kind {
                InputKind::Image { format } => ExtractionRequest::Image {
                    bytes,
                    mime_type: raw
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| format!("image/{}", format)),
                },
                _ => ExtractionRequest::Document {
                    bytes,
                    text_layer: None,
                },
            };
            return self.extract_ai(ctx, raw, kind, request, options, stats).await;
        }

        if kind.is_tabular() || !ai_ready {
            let parts = self.extract_deterministic(ctx, normalized, options, source_ref, stats);
            if !parts.is_empty() || !ai_ready {
                return Ok(parts);
            }
            debug!(session_id = %ctx.session_id(), "No rows matched, trying AI extraction");
            let request = ExtractionRequest::Text(normalized.text());
            return match self.extract_ai(ctx, raw, kind, request, options, stats).await {
                Err(e) if falls_back(&e) => Err(CutlistError::fatal_with_cause(
                    "neither the row parser nor any provider found parts",
                    e,
                )),
                other => other,
            };
        }

        let request = match kind {
            InputKind::Pdf => ExtractionRequest::Document {
                bytes: normalized.binary.clone().unwrap_or_else(|| raw.bytes.clone()),
                text_layer: Some(normalized.text()),
            },
            _ => ExtractionRequest::Text(normalized.text()),
        };
        match self.extract_ai(ctx, raw, kind, request, options, stats).await {
            Err(e) if falls_back(&e) => {
                warn!(session_id = %ctx.session_id(), error = %e, "AI extraction failed, falling back to row parser");
                self.metrics.fallback();
                ctx.advance(FileStage::Parsing, 60, "Falling back to row parser");
                let parts = self.extract_deterministic(ctx, normalized, options, source_ref, stats);
                if parts.is_empty() {
                    return Err(CutlistError::fatal_with_cause(
                        "all providers and the row parser were exhausted",
                        e,
                    ));
                }
                Ok(parts)
            }
            other => other,
        }
    }

    fn extract_deterministic(
        &self,
        ctx: &JobContext,
        normalized: &NormalizedInput,
        options: &ParseOptions,
        source_ref: &str,
        stats: &mut ParseStats,
    ) -> Vec<PartDraft> {
        ctx.advance(FileStage::Parsing, 10, "Parsing rows");
        let outcome = self.deterministic.parse(normalized, options, source_ref);
        self.metrics.deterministic_parse();

        stats.method = ParseMethod::Deterministic;
        stats.total_rows = outcome.total_rows;
        stats.dropped = outcome.dropped;
        stats.row_errors = outcome.row_errors;
        ctx.advance(
            FileStage::Parsing,
            90,
            &format!("Parsed {} of {} rows", outcome.parts.len(), outcome.total_rows),
        );
        outcome.parts
    }

    async fn extract_ai(
        &self,
        ctx: &JobContext,
        raw: &RawInput,
        kind: &InputKind,
        request: ExtractionRequest,
        options: &ParseOptions,
        stats: &mut ParseStats,
    ) -> CutlistResult<Vec<PartDraft>> {
        ctx.checkpoint()?;
        let stage = request.stage();
        let key = fingerprint(kind, &raw.bytes, options);

        let mut attempts = Vec::new();
        let slot = &mut attempts;
        let orchestrator = &self.orchestrator;
        let lookup = self
            .cache
            .get_or_compute(&key, move || async move {
                let outcome = orchestrator.run(&request, options, ctx).await;
                *slot = outcome.attempts;
                outcome.result
            })
            .await;
        stats.provider_attempts = attempts;
        let lookup = lookup?;

        self.metrics.ai_parse();
        stats.cache_hit = lookup.hit;
        stats.method = ParseMethod::Ai(lookup.result.provider.clone());
        stats.total_rows = lookup.result.parts.len();
        if lookup.hit {
            debug!(session_id = %ctx.session_id(), fingerprint = %key, "Served from result cache");
            ctx.advance(stage, 90, "Loaded cached result");
        }

        let mut parts = lookup.result.parts.clone();
        if lookup.hit {
            // Cached drafts get fresh ids so two jobs never share a part id.
            for part in &mut parts {
                part.id = uuid::Uuid::new_v4().to_string();
            }
        }
        Ok(parts)
    }

    fn finish(&self, ctx: &JobContext, run: &FileRun) {
        if !ctx.is_tracked() {
            return;
        }
        let summary = ResultSummary {
            parts: run.parts.len(),
            flagged: run.stats.flagged,
            row_errors: run.stats.row_errors.len(),
            method: run.stats.method.to_string(),
        };
        if let Err(e) = self
            .tracker
            .finish_file(ctx.session_id(), ctx.file_index(), summary)
        {
            debug!(error = %e, "Could not record file completion");
        }
    }

    fn tracker_fail(&self, ctx: &JobContext, err: &CutlistError) -> CutlistResult<()> {
        if ctx.is_tracked() {
            self.tracker
                .fail_file(ctx.session_id(), ctx.file_index(), &err.to_string())?;
        }
        Ok(())
    }

    fn close(&self, ctx: &JobContext, all_failed: bool) -> SessionStatus {
        if ctx.is_tracked() {
            match self.tracker.complete_session(ctx.session_id()) {
                Ok(status) => return status,
                Err(e) => debug!(error = %e, "Could not close session"),
            }
        }
        if ctx.is_cancelled() {
            SessionStatus::Cancelled
        } else if all_failed {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        }
    }

    /// Write parsed parts to the sink with bounded concurrency.
    async fn persist(&self, ctx: &JobContext, identity: &RequestIdentity, parts: &[PartDraft]) {
        let Some(sink) = &self.sink else {
            return;
        };
        let timeout = self.config.sink_timeout();
        let records = parts
            .iter()
            .map(|part| ParseJobRecord {
                session_id: ctx.session_id().to_string(),
                organization_id: identity.organization_id.clone(),
                user_id: identity.user_id.clone(),
                file_index: ctx.file_index(),
                part: part.clone(),
            })
            .collect::<Vec<_>>();

        let failed = stream::iter(records)
            .map(|record| async move {
                match tokio::time::timeout(timeout, sink.write_part(&record)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(part_id = %record.part.id, error = %e, "Part write failed");
                        false
                    }
                    Err(_) => {
                        warn!(part_id = %record.part.id, "Part write timed out");
                        false
                    }
                }
            })
            .buffer_unordered(self.config.bulk_write_concurrency.max(1))
            .filter(|written| future::ready(!written))
            .count()
            .await;

        if failed > 0 {
            warn!(session_id = %ctx.session_id(), failed, total = parts.len(), "Some parts were not persisted");
        }
    }

    async fn audit(
        &self,
        ctx: &JobContext,
        identity: &RequestIdentity,
        action: &str,
        detail: serde_json::Value,
    ) {
        let Some(sink) = &self.sink else {
            return;
        };
        let entry = AuditEntry::new(ctx.session_id(), identity, action, detail);
        match tokio::time::timeout(self.config.sink_timeout(), sink.write_audit(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(action, error = %e, "Audit write failed"),
            Err(_) => warn!(action, "Audit write timed out"),
        }
    }
}

/// Builder for [`PartParser`].
#[derive(Default)]
pub struct PartParserBuilder {
    config: Option<PipelineConfig>,
    providers: Vec<Arc<dyn PartExtractor>>,
    store: Option<Arc<dyn SessionStore>>,
    sink: Option<Arc<dyn ParseJobSink>>,
    fetcher: Option<Arc<dyn FileFetcher>>,
    normalizer: Option<NormalizationPipeline>,
    scorer: Option<ConfidenceScorer>,
}

impl PartParserBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Append a provider to the escalation chain.
    pub fn provider(mut self, provider: Arc<dyn PartExtractor>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace the escalation chain, highest priority first.
    pub fn providers(mut self, providers: Vec<Arc<dyn PartExtractor>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ParseJobSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn FileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn normalizer(mut self, normalizer: NormalizationPipeline) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn build(self) -> CutlistResult<PartParser> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let metrics = Arc::new(PerformanceMetrics::new());
        let orchestrator = ResilientOrchestrator::new(self.providers, config.orchestrator.clone())
            .with_metrics(metrics.clone());
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        let tracker = Arc::new(ProgressTracker::new(store, config.session.ttl()));
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFileFetcher::new(config.fetch_timeout())?),
        };

        Ok(PartParser {
            normalizer: self
                .normalizer
                .unwrap_or_else(NormalizationPipeline::with_defaults),
            deterministic: DeterministicParser::new(),
            scorer: self.scorer.unwrap_or_default(),
            orchestrator,
            cache: Arc::new(ResultCache::from_config(&config.cache)),
            tracker,
            metrics,
            sink: self.sink,
            fetcher,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> PartParser {
        PartParser::builder().build().unwrap()
    }

    fn identity() -> RequestIdentity {
        RequestIdentity::new("org-1", "user-1")
    }

    #[tokio::test]
    async fn test_parse_pipe_row_without_providers() {
        let outcome = parser()
            .parse(
                RawInput::text("2 | 600 | 400 | 18 | WHITE"),
                &ParseOptions::default(),
                &identity(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.parts.len(), 1);
        let part = &outcome.parts[0];
        assert_eq!(part.quantity, 2);
        assert_eq!(part.material_ref, "WHITE");
        assert_eq!(outcome.stats.method, ParseMethod::Deterministic);
    }

    #[tokio::test]
    async fn test_completed_session_is_pollable() {
        let parser = parser();
        let outcome = parser
            .parse(RawInput::text("600x400x18 white"), &ParseOptions::default(), &identity())
            .await
            .unwrap();
        let session = parser.session(&outcome.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.files[0].stage, FileStage::Complete);
    }

    #[tokio::test]
    async fn test_no_parts_is_fatal_with_input_cause() {
        let err = parser()
            .parse(RawInput::text("hello there"), &ParseOptions::default(), &identity())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.input_cause().is_some());
    }

    #[tokio::test]
    async fn test_untracked_parse_leaves_no_session() {
        let parser = parser();
        let options = ParseOptions {
            track_progress: false,
            ..Default::default()
        };
        let outcome = parser
            .parse(RawInput::text("600x400x18"), &options, &identity())
            .await
            .unwrap();
        assert!(parser.progress(&outcome.session_id).is_err());
        assert!(parser.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_image_without_ai_fails() {
        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let err = parser()
            .parse(RawInput::file("photo.png", png), &ParseOptions::default(), &identity())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.input_cause().map(|e| e.code()), Some(ErrorCode::InputUnsupported));
    }
}
