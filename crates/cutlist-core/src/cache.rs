//! Fingerprint-keyed result cache with single-flight computation.
//!
//! Hits hand back the same `Arc<ProviderResult>` that was stored, so repeated
//! lookups are free. Concurrent misses on one fingerprint share a single
//! computation through a per-key [`OnceCell`]; failed computations are not
//! cached and the next caller retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::debug;

use cutlist_extractors::InputKind;

use crate::config::CacheConfig;
use crate::error::CutlistResult;
use crate::types::{ParseOptions, ProviderResult};

/// Stable fingerprint of an input and the options that change its parts.
pub fn fingerprint(kind: &InputKind, bytes: &[u8], options: &ParseOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"cutlist-v1\0");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
    hasher.update(b"\0");
    hasher.update(options.default_material_id.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(
        options
            .default_thickness_mm
            .map(f64::to_bits)
            .unwrap_or(0)
            .to_le_bytes(),
    );
    hasher.update(options.units.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(options.dim_order_hint.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// A cached provider result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub result: Arc<ProviderResult>,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
    inserted: Instant,
    last_used: u64,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Underlying computations started by `get_or_compute`.
    pub computations: u64,
    /// Callers that waited on another caller's computation.
    pub coalesced: u64,
    pub entries: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

/// Result of [`ResultCache::get_or_compute`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub result: Arc<ProviderResult>,
    /// Served without running the computation.
    pub hit: bool,
}

/// LRU + TTL cache of provider results, keyed by fingerprint.
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: DashMap<String, Arc<OnceCell<Arc<ProviderResult>>>>,
    capacity: usize,
    ttl: Duration,
    enabled: bool,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    computations: AtomicU64,
    coalesced: AtomicU64,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .field("entries", &self.len())
            .finish()
    }
}

impl ResultCache {
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            in_flight: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            enabled: true,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Create a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut cache = Self::new(config.capacity, config.ttl());
        cache.enabled = config.enabled;
        cache
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a fingerprint, counting a hit or a miss.
    ///
    /// Each hit returns the stored `Arc` and increments the entry's hit count.
    pub fn get(&self, fingerprint: &str) -> Option<Arc<ProviderResult>> {
        let tick = self.next_tick();
        let mut entries = self.entries.lock();

        let expired = entries
            .get(fingerprint)
            .is_some_and(|e| e.inserted.elapsed() >= self.ttl);
        if expired {
            entries.remove(fingerprint);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }

        match entries.get_mut(fingerprint) {
            Some(entry) => {
                entry.hit_count += 1;
                entry.last_used = tick;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.result.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result. Only successful results with parts are kept.
    ///
    /// Returns whether the result was stored.
    pub fn put(&self, fingerprint: &str, result: Arc<ProviderResult>) -> bool {
        if !self.enabled || !result.is_usable() {
            return false;
        }
        let tick = self.next_tick();
        let mut entries = self.entries.lock();
        entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                fingerprint: fingerprint.to_string(),
                result,
                created_at: Utc::now(),
                hit_count: 0,
                inserted: Instant::now(),
                last_used: tick,
            },
        );
        self.inserts.fetch_add(1, Ordering::Relaxed);

        while entries.len() > self.capacity {
            let victim = entries
                .values()
                .min_by_key(|e| e.last_used)
                .map(|e| e.fingerprint.clone());
            let Some(victim) = victim else { break };
            entries.remove(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %victim, "Evicted least recently used cache entry");
        }
        true
    }

    /// Return the cached result or run `compute` exactly once per fingerprint,
    /// however many callers miss concurrently.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &str,
        compute: F,
    ) -> CutlistResult<CacheLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CutlistResult<ProviderResult>>,
    {
        if !self.enabled {
            self.computations.fetch_add(1, Ordering::Relaxed);
            return compute().await.map(|r| CacheLookup {
                result: Arc::new(r),
                hit: false,
            });
        }

        if let Some(result) = self.get(fingerprint) {
            return Ok(CacheLookup { result, hit: true });
        }

        let cell = self
            .in_flight
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut computed = false;
        let ran = &mut computed;
        let outcome = cell
            .get_or_try_init(move || async move {
                // An earlier flight may have stored the result after our miss.
                if let Some(result) = self.peek(fingerprint) {
                    return Ok(result);
                }
                *ran = true;
                self.computations.fetch_add(1, Ordering::Relaxed);
                let result = Arc::new(compute().await?);
                self.put(fingerprint, result.clone());
                Ok(result)
            })
            .await
            .map(Arc::clone);

        if computed {
            self.in_flight
                .remove_if(fingerprint, |_, c| Arc::ptr_eq(c, &cell));
        } else if outcome.is_ok() {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        outcome.map(|result| CacheLookup {
            result,
            hit: !computed,
        })
    }

    /// Look up without touching counters or recency.
    fn peek(&self, fingerprint: &str) -> Option<Arc<ProviderResult>> {
        self.entries
            .lock()
            .get(fingerprint)
            .filter(|e| e.inserted.elapsed() < self.ttl)
            .map(|e| e.result.clone())
    }

    /// Hit count of an entry.
    pub fn entry_hits(&self, fingerprint: &str) -> Option<u64> {
        self.entries.lock().get(fingerprint).map(|e| e.hit_count)
    }

    /// Snapshot of an entry.
    pub fn entry(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.entries.lock().get(fingerprint).cloned()
    }

    /// Whether a fingerprint is cached (ignores TTL).
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.lock().contains_key(fingerprint)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CutlistError;
    use crate::types::{ParseMethod, PartDraft};

    fn usable(provider: &str) -> ProviderResult {
        let part = PartDraft::new(600.0, 400.0, 18.0, "W", ParseMethod::Ai(provider.into()), "r");
        ProviderResult::succeeded(provider, vec![part], "[]", 1)
    }

    #[test]
    fn test_fingerprint_stable_and_option_sensitive() {
        let options = ParseOptions::default();
        let a = fingerprint(&InputKind::Text, b"600x400", &options);
        let b = fingerprint(&InputKind::Text, b"600x400", &options);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other = options.clone().with_default_material("OAK");
        assert_ne!(a, fingerprint(&InputKind::Text, b"600x400", &other));
        assert_ne!(a, fingerprint(&InputKind::Csv, b"600x400", &options));
    }

    #[test]
    fn test_get_returns_same_object_and_counts_hits() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        assert!(cache.put("fp", Arc::new(usable("a"))));
        let first = cache.get("fp").unwrap();
        let second = cache.get("fp").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.entry_hits("fp"), Some(2));
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.put("a", Arc::new(usable("a")));
        cache.put("b", Arc::new(usable("b")));
        cache.get("a");
        cache.put("c", Arc::new(usable("c")));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_failed_results_not_stored() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        let failed = ProviderResult::failed("a", crate::types::ProviderFailure::Rejected, "no", 1);
        assert!(!cache.put("fp", Arc::new(failed)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ResultCache::new(2, Duration::ZERO);
        cache.put("fp", Arc::new(usable("a")));
        assert!(cache.get("fp").is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_caches() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        let first = cache
            .get_or_compute("fp", || async { Ok(usable("a")) })
            .await
            .unwrap();
        assert!(!first.hit);
        let second = cache
            .get_or_compute("fp", || async { Ok(usable("b")) })
            .await
            .unwrap();
        assert!(second.hit);
        assert!(Arc::ptr_eq(&first.result, &second.result));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        let err = cache
            .get_or_compute("fp", || async { Err(CutlistError::Internal("boom".into())) })
            .await;
        assert!(err.is_err());
        let ok = cache
            .get_or_compute("fp", || async { Ok(usable("a")) })
            .await
            .unwrap();
        assert!(!ok.hit);
        assert_eq!(cache.stats().computations, 2);
    }
}
