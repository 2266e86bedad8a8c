//! HTTP plumbing shared by the providers.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use cutlist_core::error::{CutlistError, CutlistResult};
use cutlist_core::types::{ProviderFailure, ProviderResult};

const USER_AGENT: &str = concat!("cutlist/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_CHARS: usize = 300;

/// Client shared by one provider. Call timeouts are applied by the orchestrator.
pub(crate) fn build_client() -> CutlistResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| CutlistError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Normalize a base URL so paths can be appended with `/`.
pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// A call that produced no response body worth normalizing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CallFailure {
    pub failure: ProviderFailure,
    pub message: String,
}

impl CallFailure {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            failure: ProviderFailure::Rejected,
            message: message.into(),
        }
    }

    pub fn into_result(self, provider: &str, started: Instant) -> ProviderResult {
        ProviderResult::failed(provider, self.failure, self.message, elapsed_ms(started))
    }
}

impl From<CutlistError> for CallFailure {
    fn from(err: CutlistError) -> Self {
        let failure = if err.is_transient() {
            ProviderFailure::Transient
        } else {
            ProviderFailure::Rejected
        };
        Self {
            failure,
            message: err.to_string(),
        }
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub(crate) fn not_configured(provider: &str, what: &str) -> ProviderResult {
    ProviderResult::failed(
        provider,
        ProviderFailure::NotConfigured,
        format!("{} is not set", what),
        0,
    )
}

/// Pull a readable message out of an error body.
///
/// Handles `{"error": {"message": ..}}` and `{"error": ".."}`; anything else
/// is returned truncated.
pub(crate) fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| match v.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message")?.as_str().map(str::to_string),
        _ => None,
    });
    match message {
        Some(m) => m,
        None => body.chars().take(MAX_ERROR_CHARS).collect(),
    }
}

/// Send a request and decode a successful JSON body.
///
/// Network errors are transient. HTTP errors are classified by status.
pub(crate) async fn send<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, CallFailure> {
    let response = request.send().await.map_err(|e| CallFailure {
        failure: ProviderFailure::Transient,
        message: format!("request failed: {}", e),
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| CallFailure {
        failure: ProviderFailure::Transient,
        message: format!("failed to read response body: {}", e),
    })?;

    if !status.is_success() {
        debug!(provider, status = status.as_u16(), "Provider returned an error status");
        return Err(CutlistError::from_http_status(provider, status.as_u16(), &error_message(&body)).into());
    }

    serde_json::from_str(&body)
        .map_err(|e| CallFailure::rejected(format!("unreadable response body: {}", e)))
}
