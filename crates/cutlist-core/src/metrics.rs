//! Pipeline performance counters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::recovery::RecoveryStrategy;

#[derive(Debug, Clone, Default)]
struct ProviderCounters {
    calls: u64,
    successes: u64,
    failures: u64,
    retries: u64,
    skipped: u64,
    total_latency_ms: u64,
}

/// Per-provider figures in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub skipped: u64,
    pub average_latency_ms: f64,
}

/// Point-in-time copy of [`PerformanceMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub deterministic_parses: u64,
    pub ai_parses: u64,
    pub escalations: u64,
    pub fallbacks: u64,
    pub degraded: u64,
    pub parts_parsed: u64,
    pub parts_flagged: u64,
    pub providers: BTreeMap<String, ProviderSnapshot>,
    pub recovery: BTreeMap<String, u64>,
}

/// Cache and performance figures together, as served by the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cache: CacheStats,
    pub performance: PerformanceSnapshot,
}

/// Lock-free job counters plus a small locked map per provider.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    jobs_started: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    deterministic_parses: AtomicU64,
    ai_parses: AtomicU64,
    escalations: AtomicU64,
    fallbacks: AtomicU64,
    degraded: AtomicU64,
    parts_parsed: AtomicU64,
    parts_flagged: AtomicU64,
    providers: Mutex<HashMap<String, ProviderCounters>>,
    recovery: Mutex<HashMap<RecoveryStrategy, u64>>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished job and the parts it produced.
    pub fn job_completed(&self, parts: usize, flagged: usize) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.parts_parsed.fetch_add(parts as u64, Ordering::Relaxed);
        self.parts_flagged.fetch_add(flagged as u64, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deterministic_parse(&self) {
        self.deterministic_parses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ai_parse(&self) {
        self.ai_parses.fetch_add(1, Ordering::Relaxed);
    }

    /// A provider failed and the next one in the chain was tried.
    pub fn escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    /// AI extraction failed and the deterministic parser took over.
    pub fn fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// The job budget ran out before any provider succeeded.
    pub fn degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one provider call.
    pub fn record_call(&self, provider: &str, success: bool, latency_ms: u64, retried: bool) {
        let mut providers = self.providers.lock();
        let counters = providers.entry(provider.to_string()).or_default();
        counters.calls += 1;
        counters.total_latency_ms += latency_ms;
        if success {
            counters.successes += 1;
        } else {
            counters.failures += 1;
        }
        if retried {
            counters.retries += 1;
        }
    }

    /// Record a provider passed over for lack of configuration.
    pub fn record_skipped(&self, provider: &str) {
        self.providers
            .lock()
            .entry(provider.to_string())
            .or_default()
            .skipped += 1;
    }

    /// Record which strategy recovered a provider's JSON.
    pub fn record_recovery(&self, strategy: RecoveryStrategy) {
        *self.recovery.lock().entry(strategy).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        let providers = self
            .providers
            .lock()
            .iter()
            .map(|(name, c)| {
                let average_latency_ms = if c.calls == 0 {
                    0.0
                } else {
                    c.total_latency_ms as f64 / c.calls as f64
                };
                (
                    name.clone(),
                    ProviderSnapshot {
                        calls: c.calls,
                        successes: c.successes,
                        failures: c.failures,
                        retries: c.retries,
                        skipped: c.skipped,
                        average_latency_ms,
                    },
                )
            })
            .collect();
        let recovery = self
            .recovery
            .lock()
            .iter()
            .map(|(strategy, count)| (strategy.to_string(), *count))
            .collect();

        PerformanceSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            deterministic_parses: self.deterministic_parses.load(Ordering::Relaxed),
            ai_parses: self.ai_parses.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            parts_parsed: self.parts_parsed.load(Ordering::Relaxed),
            parts_flagged: self.parts_flagged.load(Ordering::Relaxed),
            providers,
            recovery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_latency_average() {
        let metrics = PerformanceMetrics::new();
        metrics.record_call("anthropic", false, 100, false);
        metrics.record_call("anthropic", true, 300, true);
        metrics.record_skipped("openai");

        let snapshot = metrics.snapshot();
        let anthropic = &snapshot.providers["anthropic"];
        assert_eq!(anthropic.calls, 2);
        assert_eq!(anthropic.failures, 1);
        assert_eq!(anthropic.retries, 1);
        assert!((anthropic.average_latency_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.providers["openai"].skipped, 1);
        assert_eq!(snapshot.providers["openai"].calls, 0);
    }

    #[test]
    fn test_job_counters() {
        let metrics = PerformanceMetrics::new();
        metrics.job_started();
        metrics.job_completed(5, 2);
        metrics.record_recovery(RecoveryStrategy::Direct);
        metrics.record_recovery(RecoveryStrategy::Direct);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_started, 1);
        assert_eq!(snapshot.parts_parsed, 5);
        assert_eq!(snapshot.parts_flagged, 2);
        assert_eq!(snapshot.recovery.values().sum::<u64>(), 2);
    }
}
