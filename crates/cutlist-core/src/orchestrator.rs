//! Provider escalation chain with timeouts, one retry and a job budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use backon::{ConstantBuilder, Retryable};
use tracing::{debug, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::error::{CutlistError, CutlistResult, ErrorCode};
use crate::metrics::PerformanceMetrics;
use crate::session::JobContext;
use crate::traits::{ExtractionRequest, PartExtractor};
use crate::types::{ParseOptions, ProviderAttempt, ProviderFailure, ProviderResult};

/// Result of running the chain, with every attempt made along the way.
#[derive(Debug)]
pub struct OrchestratorOutcome {
    pub result: CutlistResult<ProviderResult>,
    pub attempts: Vec<ProviderAttempt>,
}

impl OrchestratorOutcome {
    fn finish(result: CutlistResult<ProviderResult>, attempts: Vec<ProviderAttempt>) -> Self {
        Self { result, attempts }
    }

    /// Name of the provider that produced the result.
    pub fn provider(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|r| r.provider.as_str())
    }
}

/// Calls extraction providers in priority order until one returns parts.
///
/// Calls are sequential. Unconfigured providers are skipped without a call;
/// transient failures get one retry after a fixed backoff; rejections
/// escalate immediately. The whole chain is bounded by the job budget.
pub struct ResilientOrchestrator {
    providers: Vec<Arc<dyn PartExtractor>>,
    config: OrchestratorConfig,
    metrics: Option<Arc<PerformanceMetrics>>,
}

impl std::fmt::Debug for ResilientOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientOrchestrator")
            .field("providers", &self.provider_names())
            .field("config", &self.config)
            .finish()
    }
}

impl ResilientOrchestrator {
    /// Create an orchestrator over `providers`, highest priority first.
    pub fn new(providers: Vec<Arc<dyn PartExtractor>>, config: OrchestratorConfig) -> Self {
        Self {
            providers,
            config,
            metrics: None,
        }
    }

    /// Record calls into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<PerformanceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Whether any provider in the chain has credentials.
    pub fn has_configured_provider(&self) -> bool {
        self.providers.iter().any(|p| p.is_configured())
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the chain for one request.
    #[instrument(skip(self, request, options, ctx), fields(session_id = %ctx.session_id(), kind = request.kind()))]
    pub async fn run(
        &self,
        request: &ExtractionRequest,
        options: &ParseOptions,
        ctx: &JobContext,
    ) -> OrchestratorOutcome {
        let started = Instant::now();
        let budget = self.config.job_budget();
        let deadline = started + budget;
        let backoff = self.config.retry_backoff();
        let stage = request.stage();
        let mut attempts = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for provider in &self.providers {
            let name = provider.name().to_string();

            if !provider.is_configured() {
                debug!(provider = %name, "Skipping unconfigured provider");
                attempts.push(ProviderAttempt::skipped(&name));
                if let Some(metrics) = &self.metrics {
                    metrics.record_skipped(&name);
                }
                continue;
            }

            if let Err(e) = ctx.checkpoint() {
                return OrchestratorOutcome::finish(Err(e), attempts);
            }

            if started.elapsed() >= budget {
                warn!(provider = %name, "Job budget exhausted before provider call");
                return OrchestratorOutcome::finish(Err(self.degraded(&failures, started)), attempts);
            }

            let percent = (20 + 15 * failures.len()).min(80) as u8;
            if failures.is_empty() {
                ctx.advance(stage, percent, &format!("Extracting with {}", name));
            } else {
                ctx.advance(stage, percent, &format!("Falling back to {}", name));
                if let Some(metrics) = &self.metrics {
                    metrics.escalation();
                }
            }

            let retried = AtomicBool::new(false);
            let call_started = Instant::now();
            let call = || async {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let limit = self.config.call_timeout().min(remaining);
                match tokio::time::timeout(limit, provider.extract(request, options)).await {
                    Ok(result) if result.is_usable() => Ok(result),
                    Ok(result) => Err(result),
                    Err(_) => Err(ProviderResult::failed(
                        &name,
                        ProviderFailure::Transient,
                        format!("timed out after {}ms", limit.as_millis()),
                        limit.as_millis() as u64,
                    )),
                }
            };

            let outcome = call
                .retry(
                    ConstantBuilder::default()
                        .with_delay(backoff)
                        .with_max_times(self.config.max_retries),
                )
                .when(|r: &ProviderResult| {
                    r.is_transient()
                        && !ctx.is_cancelled()
                        && deadline.saturating_duration_since(Instant::now()) > backoff
                })
                .notify(|r: &ProviderResult, delay| {
                    retried.store(true, Ordering::Relaxed);
                    warn!(
                        provider = %name,
                        error = %r.error_summary(),
                        "Transient provider failure, retrying in {:?}",
                        delay
                    );
                })
                .await;

            let duration_ms = call_started.elapsed().as_millis() as u64;
            let retried = retried.load(Ordering::Relaxed);

            if ctx.is_cancelled() {
                info!(provider = %name, "Discarding provider result after cancellation");
                return OrchestratorOutcome::finish(
                    Err(CutlistError::Cancelled(ctx.session_id().to_string())),
                    attempts,
                );
            }

            match outcome {
                Ok(result) => {
                    attempts.push(ProviderAttempt::from_result(&result, duration_ms, retried));
                    if let Some(metrics) = &self.metrics {
                        metrics.record_call(&name, true, duration_ms, retried);
                        if let Some(strategy) = result.recovery {
                            metrics.record_recovery(strategy);
                        }
                    }
                    info!(provider = %name, parts = result.parts.len(), duration_ms, "Provider extracted parts");
                    return OrchestratorOutcome::finish(Ok(result), attempts);
                }
                Err(result) => {
                    let summary = result.error_summary();
                    attempts.push(ProviderAttempt::from_result(&result, duration_ms, retried));
                    if let Some(metrics) = &self.metrics {
                        metrics.record_call(&name, false, duration_ms, retried);
                    }
                    failures.push(format!("{}: {}", name, summary));
                    if Instant::now() >= deadline {
                        warn!(provider = %name, error = %summary, duration_ms, "Job budget exhausted during provider call");
                        return OrchestratorOutcome::finish(Err(self.degraded(&failures, started)), attempts);
                    }
                    warn!(provider = %name, error = %summary, duration_ms, "Provider failed, escalating");
                }
            }
        }

        let message = if failures.is_empty() {
            "no extraction provider is configured".to_string()
        } else {
            format!("all providers failed ({})", failures.join("; "))
        };
        OrchestratorOutcome::finish(
            Err(CutlistError::ProviderRejection {
                provider: "chain".to_string(),
                message,
                code: ErrorCode::RejChainExhausted,
            }),
            attempts,
        )
    }

    fn degraded(&self, failures: &[String], started: Instant) -> CutlistError {
        if let Some(metrics) = &self.metrics {
            metrics.degraded();
        }
        CutlistError::DegradedMode {
            message: if failures.is_empty() {
                "job budget exhausted before any provider call".to_string()
            } else {
                format!("no provider succeeded ({})", failures.join("; "))
            },
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParseMethod, PartDraft};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Fake provider replaying scripted results.
    struct Scripted {
        name: &'static str,
        configured: bool,
        script: parking_lot::Mutex<Vec<ProviderResult>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Scripted {
        fn new(name: &'static str, script: Vec<ProviderResult>) -> Arc<Self> {
            Arc::new(Self {
                name,
                configured: true,
                script: parking_lot::Mutex::new(script),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn unconfigured(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                configured: false,
                script: parking_lot::Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PartExtractor for Scripted {
        async fn parse_text(&self, _text: &str, _options: &ParseOptions) -> ProviderResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut script = self.script.lock();
            if script.is_empty() {
                ProviderResult::failed(self.name, ProviderFailure::Rejected, "script empty", 0)
            } else {
                script.remove(0)
            }
        }

        async fn parse_image(&self, _: &[u8], _: &str, options: &ParseOptions) -> ProviderResult {
            self.parse_text("", options).await
        }

        async fn parse_document(
            &self,
            _: &[u8],
            _: Option<&str>,
            options: &ParseOptions,
        ) -> ProviderResult {
            self.parse_text("", options).await
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn chain(providers: &[&Arc<Scripted>]) -> Vec<Arc<dyn PartExtractor>> {
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn PartExtractor>)
            .collect()
    }

    fn ok(name: &str) -> ProviderResult {
        let part = PartDraft::new(600.0, 400.0, 18.0, "W", ParseMethod::Ai(name.into()), "r");
        ProviderResult::succeeded(name, vec![part], "[]", 5)
    }

    fn transient(name: &str) -> ProviderResult {
        ProviderResult::failed(name, ProviderFailure::Transient, "HTTP 503", 5)
    }

    fn rejected(name: &str) -> ProviderResult {
        ProviderResult::failed(name, ProviderFailure::Rejected, "no parts", 5)
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            call_timeout_ms: 1_000,
            job_budget_ms: 5_000,
            retry_backoff_ms: 10,
            max_retries: 1,
        }
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest::Text("2 pcs 600x400".into())
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_never_called() {
        let first = Scripted::unconfigured("first");
        let second = Scripted::new("second", vec![ok("second")]);
        let orchestrator = ResilientOrchestrator::new(chain(&[&first, &second]), config());

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        assert_eq!(outcome.provider(), Some("second"));
        assert_eq!(first.calls(), 0);
        assert_eq!(second.calls(), 1);
        assert!(outcome.attempts[0].skipped);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let first = Scripted::new("first", vec![transient("first"), ok("first")]);
        let orchestrator = ResilientOrchestrator::new(chain(&[&first]), config());

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        assert!(outcome.result.is_ok());
        assert_eq!(first.calls(), 2);
        assert!(outcome.attempts[0].retried);
    }

    #[tokio::test]
    async fn test_second_transient_failure_escalates() {
        let first = Scripted::new("first", vec![transient("first"), transient("first"), ok("first")]);
        let second = Scripted::new("second", vec![ok("second")]);
        let orchestrator = ResilientOrchestrator::new(chain(&[&first, &second]), config());

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        assert_eq!(outcome.provider(), Some("second"));
        assert_eq!(first.calls(), 2);
    }

    #[tokio::test]
    async fn test_rejection_escalates_without_retry() {
        let first = Scripted::new("first", vec![rejected("first"), ok("first")]);
        let second = Scripted::new("second", vec![ok("second")]);
        let orchestrator = ResilientOrchestrator::new(chain(&[&first, &second]), config());

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        assert_eq!(outcome.provider(), Some("second"));
        assert_eq!(first.calls(), 1);
        assert!(!outcome.attempts[0].success);
    }

    #[tokio::test]
    async fn test_chain_exhausted() {
        let first = Scripted::new("first", vec![rejected("first")]);
        let orchestrator = ResilientOrchestrator::new(chain(&[&first]), config());

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        match outcome.result {
            Err(CutlistError::ProviderRejection { code, message, .. }) => {
                assert_eq!(code, ErrorCode::RejChainExhausted);
                assert!(message.contains("first"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_timeout_counts_as_transient() {
        let slow = Arc::new(Scripted {
            name: "slow",
            configured: true,
            script: parking_lot::Mutex::new(vec![ok("slow"), ok("slow")]),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let fast = Scripted::new("fast", vec![ok("fast")]);
        let cfg = OrchestratorConfig {
            call_timeout_ms: 20,
            ..config()
        };
        let orchestrator = ResilientOrchestrator::new(chain(&[&slow, &fast]), cfg);

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        assert_eq!(outcome.provider(), Some("fast"));
        assert_eq!(slow.calls(), 2);
        assert!(outcome.attempts[0].error.as_deref().unwrap_or("").contains("timed out"));
    }

    fn sleepy(name: &'static str, delay: Duration) -> Arc<Scripted> {
        Arc::new(Scripted {
            name,
            configured: true,
            script: parking_lot::Mutex::new(vec![ok(name)]),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    #[tokio::test]
    async fn test_budget_spent_by_only_provider_degrades() {
        let metrics = Arc::new(PerformanceMetrics::new());
        let slow = sleepy("slow", Duration::from_millis(400));
        let cfg = OrchestratorConfig {
            job_budget_ms: 100,
            ..config()
        };
        let orchestrator =
            ResilientOrchestrator::new(chain(&[&slow]), cfg).with_metrics(metrics.clone());

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        match outcome.result {
            Err(CutlistError::DegradedMode { message, .. }) => assert!(message.contains("slow")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(slow.calls(), 1);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(metrics.snapshot().degraded, 1);
    }

    #[tokio::test]
    async fn test_budget_spent_by_last_provider_degrades() {
        let first = Scripted::new("first", vec![rejected("first")]);
        let slow = sleepy("slow", Duration::from_millis(400));
        let cfg = OrchestratorConfig {
            job_budget_ms: 100,
            ..config()
        };
        let orchestrator = ResilientOrchestrator::new(chain(&[&first, &slow]), cfg);

        let outcome = orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        assert!(matches!(outcome.result, Err(CutlistError::DegradedMode { .. })));
        assert_eq!(outcome.result.unwrap_err().code(), ErrorCode::JobBudgetExhausted);
        assert_eq!(first.calls(), 1);
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let first = Scripted::new("first", vec![ok("first")]);
        let orchestrator = ResilientOrchestrator::new(chain(&[&first]), config());
        let ctx = JobContext::detached();
        ctx.token().cancel();

        let outcome = orchestrator.run(&request(), &ParseOptions::default(), &ctx).await;
        assert!(matches!(outcome.result, Err(CutlistError::Cancelled(_))));
        assert_eq!(first.calls(), 0);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let metrics = Arc::new(PerformanceMetrics::new());
        let first = Scripted::new("first", vec![rejected("first")]);
        let second = Scripted::new("second", vec![ok("second")]);
        let orchestrator =
            ResilientOrchestrator::new(chain(&[&first, &second]), config()).with_metrics(metrics.clone());

        orchestrator
            .run(&request(), &ParseOptions::default(), &JobContext::detached())
            .await;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.escalations, 1);
        assert_eq!(snapshot.providers["first"].failures, 1);
        assert_eq!(snapshot.providers["second"].successes, 1);
    }
}
