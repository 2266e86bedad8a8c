//! Integration tests for the parse pipeline with fake providers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeProvider, MemorySink, RecordingStore, Reply, StaticFetcher};
use cutlist_core::{
    ConfidenceLevel, CutlistError, FileSource, FileStage, ParseMethod, ParseOptions,
    PartExtractor, PartParser, PipelineConfig, RequestIdentity, SessionStatus,
};
use cutlist_extractors::RawInput;

fn identity() -> RequestIdentity {
    RequestIdentity::new("org-1", "user-1")
}

fn fast_config() -> PipelineConfig {
    PipelineConfig::builder()
        .call_timeout(Duration::from_secs(2))
        .job_budget(Duration::from_secs(5))
        .retry_backoff(Duration::from_millis(10))
        .build()
}

fn chain(providers: &[&Arc<FakeProvider>]) -> Vec<Arc<dyn PartExtractor>> {
    providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn PartExtractor>)
        .collect()
}

fn parser_with(providers: Vec<Arc<dyn PartExtractor>>) -> PartParser {
    PartParser::builder()
        .config(fast_config())
        .providers(providers)
        .build()
        .unwrap()
}

const FREE_TEXT: &str = "Please cut two side panels for the wardrobe, white melamine";

#[tokio::test]
async fn test_unconfigured_first_provider_is_skipped() {
    let first = Arc::new(FakeProvider::unconfigured("anthropic"));
    let second = Arc::new(FakeProvider::parts("openai"));
    let parser = parser_with(chain(&[&first, &second]));

    let outcome = parser
        .parse(RawInput::text(FREE_TEXT), &ParseOptions::default(), &identity())
        .await
        .unwrap();

    assert_eq!(first.calls(), 0);
    assert_eq!(second.calls(), 1);
    assert_eq!(outcome.stats.method, ParseMethod::Ai("openai".to_string()));
    assert!(outcome.stats.provider_attempts[0].skipped);
    assert_eq!(outcome.parts[0].quantity, 2);
}

#[tokio::test]
async fn test_concurrent_identical_requests_share_one_call() {
    let provider = Arc::new(FakeProvider::parts("anthropic").with_delay(Duration::from_millis(100)));
    let parser = Arc::new(parser_with(chain(&[&provider])));

    let jobs = (0..8).map(|_| {
        let parser = parser.clone();
        tokio::spawn(async move {
            parser
                .parse(RawInput::text(FREE_TEXT), &ParseOptions::default(), &identity())
                .await
        })
    });
    let results = futures::future::join_all(jobs).await;

    for result in results {
        let outcome = result.unwrap().unwrap();
        assert_eq!(outcome.parts.len(), 1);
    }
    assert_eq!(provider.calls(), 1);
    assert_eq!(parser.metrics().cache.computations, 1);
}

#[tokio::test]
async fn test_second_parse_is_a_cache_hit() {
    let provider = Arc::new(FakeProvider::parts("anthropic"));
    let parser = parser_with(chain(&[&provider]));
    let options = ParseOptions::default();

    let first = parser
        .parse(RawInput::text(FREE_TEXT), &options, &identity())
        .await
        .unwrap();
    let second = parser
        .parse(RawInput::text(FREE_TEXT), &options, &identity())
        .await
        .unwrap();

    assert!(!first.stats.cache_hit);
    assert!(second.stats.cache_hit);
    assert_eq!(provider.calls(), 1);
    assert_ne!(first.parts[0].id, second.parts[0].id);

    // Different material options change the fingerprint.
    let other = options.with_default_material("OAK");
    let third = parser
        .parse(RawInput::text(FREE_TEXT), &other, &identity())
        .await
        .unwrap();
    assert!(!third.stats.cache_hit);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_rejection_falls_back_to_row_parser() {
    let provider = Arc::new(FakeProvider::new("anthropic", Reply::Rejected));
    let parser = parser_with(chain(&[&provider]));

    let outcome = parser
        .parse(
            RawInput::text("2 | 600 | 400 | 18 | WHITE"),
            &ParseOptions::default(),
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcome.stats.method, ParseMethod::Deterministic);
    assert_eq!(outcome.parts[0].material_ref, "WHITE");
    let metrics = parser.metrics();
    assert_eq!(metrics.performance.fallbacks, 1);
    assert_eq!(metrics.cache.entries, 0);
}

#[tokio::test]
async fn test_exhausted_chain_without_rows_is_fatal() {
    let provider = Arc::new(FakeProvider::new("anthropic", Reply::Transient));
    let parser = parser_with(chain(&[&provider]));

    let err = parser
        .parse(RawInput::text(FREE_TEXT), &ParseOptions::default(), &identity())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    // One call plus one retry for the transient failure.
    assert_eq!(provider.calls(), 2);
    assert_eq!(parser.metrics().performance.jobs_failed, 1);
}

#[tokio::test]
async fn test_budget_exhaustion_degrades_to_row_parser() {
    let slow = Arc::new(FakeProvider::parts("anthropic").with_delay(Duration::from_millis(500)));
    let next = Arc::new(FakeProvider::parts("openai"));
    let config = PipelineConfig::builder()
        .call_timeout(Duration::from_secs(2))
        .job_budget(Duration::from_millis(50))
        .retry_backoff(Duration::from_millis(10))
        .build();
    let parser = PartParser::builder()
        .config(config)
        .providers(chain(&[&slow, &next]))
        .build()
        .unwrap();

    let outcome = parser
        .parse(
            RawInput::text("2 | 600 | 400 | 18 | WHITE"),
            &ParseOptions::default(),
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.stats.method, ParseMethod::Deterministic);
    assert_eq!(next.calls(), 0);
    let metrics = parser.metrics().performance;
    assert_eq!(metrics.degraded, 1);
    assert_eq!(metrics.fallbacks, 1);
}

#[tokio::test]
async fn test_tabular_input_skips_providers() {
    let provider = Arc::new(FakeProvider::parts("anthropic"));
    let parser = parser_with(chain(&[&provider]));
    let csv = "Qty,Length,Width,Thickness,Material\n2,600,400,18,WHITE\n1,800,300,18,OAK\n";

    let outcome = parser
        .parse(
            RawInput::file("cutlist.csv", csv.as_bytes().to_vec()),
            &ParseOptions::default(),
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls(), 0);
    assert_eq!(outcome.parts.len(), 2);
    assert_eq!(outcome.stats.total_rows, 2);
}

#[tokio::test]
async fn test_cancellation_while_parsing_discards_result() {
    let store = Arc::new(RecordingStore::default());
    let provider = Arc::new(FakeProvider::parts("anthropic").with_delay(Duration::from_millis(200)));
    let started = provider.started();
    let parser = Arc::new(
        PartParser::builder()
            .config(fast_config())
            .provider(provider.clone())
            .session_store(store.clone())
            .build()
            .unwrap(),
    );

    let job = {
        let parser = parser.clone();
        tokio::spawn(async move {
            parser
                .parse(RawInput::text(FREE_TEXT), &ParseOptions::default(), &identity())
                .await
        })
    };

    started.notified().await;
    let session_id = store.last_id().unwrap();
    assert_eq!(parser.progress(&session_id).unwrap()[0].stage, FileStage::Parsing);
    assert!(parser.request_cancellation(&session_id));

    let result = job.await.unwrap();
    assert!(matches!(result, Err(CutlistError::Cancelled(_))));
    // The in-flight call was not pre-empted.
    assert_eq!(provider.calls(), 1);

    let session = parser.session(&session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.files[0].stage, FileStage::Cancelled);
    assert!(!parser.request_cancellation(&session_id));
    assert_eq!(parser.metrics().performance.jobs_cancelled, 1);
}

#[tokio::test]
async fn test_spawned_job_is_pollable_before_it_finishes() {
    let provider = Arc::new(FakeProvider::parts("anthropic").with_delay(Duration::from_millis(100)));
    let started = provider.started();
    let parser = Arc::new(parser_with(chain(&[&provider])));

    let options = ParseOptions {
        track_progress: false,
        ..Default::default()
    };
    let job = parser
        .spawn(vec![FileSource::Raw(RawInput::text(FREE_TEXT))], options, identity())
        .unwrap();

    started.notified().await;
    let session = parser.session(&job.session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Processing);

    let outcome = job.handle.await.unwrap().unwrap();
    assert_eq!(outcome.session_id, job.session_id);
    assert_eq!(outcome.files[0].parts.len(), 1);
    assert_eq!(
        parser.session(&job.session_id).unwrap().status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn test_spawn_without_sources_is_an_input_error() {
    let parser = Arc::new(parser_with(Vec::new()));
    let err = parser
        .spawn(Vec::new(), ParseOptions::default(), identity())
        .unwrap_err();
    assert!(err.input_cause().is_some());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let parser = parser_with(Vec::new());
    assert!(matches!(
        parser.progress("missing"),
        Err(CutlistError::SessionNotFound(_))
    ));
    assert!(!parser.request_cancellation("missing"));
}

#[tokio::test]
async fn test_parse_files_tolerates_partial_failure() {
    let parser = parser_with(Vec::new());
    let good = RawInput::file("a.csv", b"Length,Width,Qty\n600,400,2\n".to_vec());
    let bad = RawInput::text("nothing to see here");

    let batch = parser
        .parse_files(vec![good, bad], &ParseOptions::default(), &identity())
        .await
        .unwrap();

    assert_eq!(batch.files.len(), 2);
    assert_eq!(batch.failed_files(), 1);
    assert_eq!(batch.parts().count(), 1);

    let progress = parser.progress(&batch.session_id).unwrap();
    assert_eq!(progress[0].stage, FileStage::Complete);
    assert_eq!(progress[1].stage, FileStage::Failed);
    assert_eq!(parser.session(&batch.session_id).unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_parse_files_all_failing_is_fatal() {
    let parser = parser_with(Vec::new());
    let err = parser
        .parse_files(
            vec![RawInput::text("hello"), RawInput::text("world")],
            &ParseOptions::default(),
            &identity(),
        )
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("all 2 files failed"));
}

#[tokio::test]
async fn test_parts_and_audit_are_persisted() {
    let sink = Arc::new(MemorySink::default());
    let parser = PartParser::builder()
        .config(fast_config())
        .sink(sink.clone())
        .build()
        .unwrap();
    let text = "600x400x18 white\n800x300x18 white\n2x 500x500x18 oak\n";

    let outcome = parser
        .parse(RawInput::text(text), &ParseOptions::default(), &identity())
        .await
        .unwrap();

    let records = sink.parts.lock();
    assert_eq!(records.len(), outcome.parts.len());
    assert!(records.iter().all(|r| r.session_id == outcome.session_id));
    assert!(records.iter().all(|r| r.organization_id == "org-1"));
    let audits = sink.audits.lock();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].action, "parse.completed");
}

#[tokio::test]
async fn test_parse_urls_uses_fetcher() {
    let fetcher = StaticFetcher::default().with(
        "https://files.example.com/job/list.csv?sig=1",
        RawInput::file("list.csv", b"Length,Width,Qty\n600,400,2\n".to_vec()),
    );
    let parser = PartParser::builder()
        .config(fast_config())
        .fetcher(Arc::new(fetcher))
        .build()
        .unwrap();

    let batch = parser
        .parse_urls(
            vec![
                "https://files.example.com/job/list.csv?sig=1".to_string(),
                "https://files.example.com/job/missing.csv".to_string(),
            ],
            &ParseOptions::default(),
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(batch.files[0].name, "list.csv");
    assert_eq!(batch.files[0].parts.len(), 1);
    assert!(batch.files[1].error.is_some());
}

#[tokio::test]
async fn test_lower_confidence_level_never_flags_more() {
    let parser = parser_with(Vec::new());
    let text = "600x400\n2 pcs 800 x 300 oak\n500 500 18 white\n";

    let strict = parser
        .parse(
            RawInput::text(text),
            &ParseOptions::default().with_confidence(ConfidenceLevel::Strict),
            &identity(),
        )
        .await
        .unwrap();
    let permissive = parser
        .parse(
            RawInput::text(text),
            &ParseOptions::default().with_confidence(ConfidenceLevel::Permissive),
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(strict.parts.len(), permissive.parts.len());
    assert!(permissive.stats.flagged <= strict.stats.flagged);
    // Flagged parts are kept, not dropped.
    assert!(strict.parts.iter().all(|p| !p.provenance.human_verified));
}
