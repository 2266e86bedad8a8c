//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use cutlist_core::gateway::normalize_text;
use cutlist_core::{
    AuditEntry, CutlistResult, FileFetcher, InMemorySessionStore, ParseJobRecord, ParseJobSink,
    ParseOptions, ParseSession, PartExtractor, ProviderFailure, ProviderResult, SessionStore,
};
use cutlist_extractors::RawInput;

/// How a [`FakeProvider`] answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Model text run through the gateway normalization.
    Text(String),
    Rejected,
    Transient,
}

/// Extraction provider that counts its calls.
pub struct FakeProvider {
    name: String,
    configured: bool,
    reply: Reply,
    delay: Duration,
    calls: AtomicUsize,
    started: Arc<Notify>,
}

impl FakeProvider {
    pub fn new(name: &str, reply: Reply) -> Self {
        Self {
            name: name.to_string(),
            configured: true,
            reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            started: Arc::new(Notify::new()),
        }
    }

    /// Provider answering with a fenced JSON array of parts.
    pub fn parts(name: &str) -> Self {
        Self::new(
            name,
            Reply::Text(
                "```json\n[{\"l\": 600, \"w\": 400, \"t\": 18, \"q\": 2, \"material\": \"WHITE\", \"confidence\": 0.95}]\n```"
                    .to_string(),
            ),
        )
    }

    pub fn unconfigured(name: &str) -> Self {
        Self {
            configured: false,
            ..Self::parts(name)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Notified when a call begins.
    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }

    async fn answer(&self, options: &ParseOptions) -> ProviderResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Reply::Text(text) => normalize_text(&self.name, text, options, 1),
            Reply::Rejected => {
                ProviderResult::failed(&self.name, ProviderFailure::Rejected, "model refused", 1)
            }
            Reply::Transient => {
                ProviderResult::failed(&self.name, ProviderFailure::Transient, "HTTP 503", 1)
            }
        }
    }
}

#[async_trait]
impl PartExtractor for FakeProvider {
    async fn parse_text(&self, _text: &str, options: &ParseOptions) -> ProviderResult {
        self.answer(options).await
    }

    async fn parse_image(&self, _image: &[u8], _mime: &str, options: &ParseOptions) -> ProviderResult {
        self.answer(options).await
    }

    async fn parse_document(
        &self,
        _document: &[u8],
        _text_layer: Option<&str>,
        options: &ParseOptions,
    ) -> ProviderResult {
        self.answer(options).await
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sink collecting everything written to it.
#[derive(Default)]
pub struct MemorySink {
    pub parts: Mutex<Vec<ParseJobRecord>>,
    pub audits: Mutex<Vec<AuditEntry>>,
}

#[async_trait]
impl ParseJobSink for MemorySink {
    async fn write_part(&self, record: &ParseJobRecord) -> CutlistResult<()> {
        self.parts.lock().push(record.clone());
        Ok(())
    }

    async fn write_audit(&self, entry: &AuditEntry) -> CutlistResult<()> {
        self.audits.lock().push(entry.clone());
        Ok(())
    }
}

/// Fetcher serving canned files by URL.
#[derive(Default)]
pub struct StaticFetcher {
    pub files: Mutex<Vec<(String, RawInput)>>,
}

impl StaticFetcher {
    pub fn with(self, url: &str, raw: RawInput) -> Self {
        self.files.lock().push((url.to_string(), raw));
        self
    }
}

#[async_trait]
impl FileFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> CutlistResult<RawInput> {
        self.files
            .lock()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| cutlist_core::CutlistError::input(format!("no such file: {}", url)))
    }
}

/// Session store remembering the last session created.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemorySessionStore,
    last: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn last_id(&self) -> Option<String> {
        self.last.lock().clone()
    }
}

impl SessionStore for RecordingStore {
    fn get(&self, id: &str) -> Option<ParseSession> {
        self.inner.get(id)
    }

    fn set(&self, session: ParseSession) {
        *self.last.lock() = Some(session.id.clone());
        self.inner.set(session);
    }

    fn delete(&self, id: &str) -> bool {
        self.inner.delete(id)
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut ParseSession)) -> bool {
        self.inner.update(id, f)
    }

    fn sweep(&self, now: chrono::DateTime<chrono::Utc>, ttl: Duration) -> Vec<String> {
        self.inner.sweep(now, ttl)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
