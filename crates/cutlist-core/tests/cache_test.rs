//! Integration tests for the result cache under concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cutlist_core::gateway::normalize_text;
use cutlist_core::{fingerprint, ParseOptions, ProviderResult, ResultCache};
use cutlist_extractors::InputKind;

fn result_for(text: &str) -> ProviderResult {
    normalize_text("fake", text, &ParseOptions::default(), 1)
}

#[tokio::test]
async fn test_concurrent_misses_dispatch_one_call() {
    let cache = Arc::new(ResultCache::new(16, Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = fingerprint(&InputKind::Text, b"2 pcs 600x400", &ParseOptions::default());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(result_for(r#"[{"l":600,"w":400,"q":2}]"#))
                    })
                    .await
            })
        })
        .collect();

    let mut computed = 0;
    for task in tasks {
        let lookup = task.await.unwrap().unwrap();
        assert_eq!(lookup.result.parts.len(), 1);
        if !lookup.hit {
            computed += 1;
        }
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(computed, 1);
    assert_eq!(cache.stats().computations, 1);
}

#[tokio::test]
async fn test_distinct_keys_do_not_block_each_other() {
    let cache = Arc::new(ResultCache::new(16, Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                let key = format!("key-{}", i);
                cache
                    .get_or_compute(&key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(result_for(r#"[{"l":600,"w":400}]"#))
                    })
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(cache.len(), 4);
}

#[test]
fn test_get_is_idempotent() {
    let cache = ResultCache::new(4, Duration::from_secs(60));
    let stored = Arc::new(result_for(r#"[{"l":600,"w":400}]"#));
    assert!(cache.put("fp", stored.clone()));

    let first = cache.get("fp").unwrap();
    let second = cache.get("fp").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &stored));
    assert_eq!(cache.entry("fp").unwrap().hit_count, 2);
}

#[test]
fn test_two_entry_cache_evicts_least_recently_used() {
    let cache = ResultCache::new(2, Duration::from_secs(60));
    let value = || Arc::new(result_for(r#"[{"l":600,"w":400}]"#));
    cache.put("first", value());
    cache.put("second", value());
    // Touch "first" so "second" becomes the oldest.
    assert!(cache.get("first").is_some());
    cache.put("third", value());

    assert!(cache.contains("first"));
    assert!(!cache.contains("second"));
    assert!(cache.contains("third"));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_truncated_model_output_is_cacheable() {
    let result = result_for(r#"[{"l":600,"w":400,"q":2},{"l":300,"w""#);
    assert!(result.success);
    let first = &result.parts[0];
    assert_eq!(first.length_mm, 600.0);
    assert_eq!(first.width_mm, 400.0);
    assert_eq!(first.quantity, 2);

    let cache = ResultCache::new(2, Duration::from_secs(60));
    assert!(cache.put("truncated", Arc::new(result)));
}

#[test]
fn test_failed_computation_is_retried_by_next_caller() {
    let cache = ResultCache::new(4, Duration::from_secs(60));
    let calls = AtomicUsize::new(0);

    let first = tokio_test::block_on(cache.get_or_compute("fp", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(cutlist_core::CutlistError::transient("fake", "HTTP 503"))
    }));
    tokio_test::assert_err!(first);

    let second = tokio_test::block_on(cache.get_or_compute("fp", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(result_for(r#"[{"l":600,"w":400}]"#))
    }));
    let lookup = tokio_test::assert_ok!(second);
    assert!(!lookup.hit);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
