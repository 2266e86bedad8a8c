//! Signed-URL file fetching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;

use cutlist_extractors::RawInput;

use crate::error::{CutlistError, CutlistResult, ErrorCode};
use crate::traits::FileFetcher;

const USER_AGENT: &str = concat!("cutlist/", env!("CARGO_PKG_VERSION"));

fn fetch_error(message: impl Into<String>) -> CutlistError {
    CutlistError::Input {
        message: message.into(),
        code: ErrorCode::InputFetchFailed,
        source: None,
    }
}

/// Last path segment of a URL, used as the file name.
pub fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
}

/// [`FileFetcher`] over HTTP(S) with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFileFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFileFetcher {
    /// Default download cap (50 MiB).
    pub const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;

    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> CutlistResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CutlistError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_bytes: Self::DEFAULT_MAX_BYTES,
        })
    }

    /// Reject downloads larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    #[instrument(skip(self, url), fields(host = tracing::field::Empty))]
    async fn fetch(&self, url: &str) -> CutlistResult<RawInput> {
        let parsed = Url::parse(url).map_err(|e| fetch_error(format!("invalid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(fetch_error(format!("unsupported URL scheme '{}'", parsed.scheme())));
        }
        tracing::Span::current().record("host", parsed.host_str().unwrap_or(""));

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| fetch_error(format!("download failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("download failed with HTTP {}", status.as_u16())));
        }
        if let Some(length) = response.content_length() {
            if length as usize > self.max_bytes {
                return Err(fetch_error(format!("file is {} bytes, limit is {}", length, self.max_bytes)));
            }
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(format!("download interrupted: {}", e)))?;
        if bytes.len() > self.max_bytes {
            return Err(fetch_error(format!("file is {} bytes, limit is {}", bytes.len(), self.max_bytes)));
        }

        debug!(size = bytes.len(), mime = ?mime_type, "Fetched file");
        let name = file_name_from_url(&parsed).unwrap_or_else(|| "download".to_string());
        let mut raw = RawInput::file(name, bytes.to_vec());
        if let Some(mime) = mime_type.filter(|m| !m.is_empty()) {
            raw = raw.with_mime_type(mime);
        }
        Ok(raw)
    }
}
