//! Parse endpoint.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::info;

use cutlist_core::pipeline::FileSource;
use cutlist_core::types::ParseOptions;
use cutlist_extractors::RawInput;

use crate::error::{ApiError, ApiResult};
use crate::middleware::identity_from_headers;
use crate::state::AppState;

/// One uploaded file, base64 encoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    pub file: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Request body for parsing.
///
/// Exactly one of `text`, `file`, `files` or `urls` must be given.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub text: Option<String>,
    pub file: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub files: Vec<FilePayload>,
    /// Signed URLs to download.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub options: ParseOptions,
    /// Return the session id at once and run the job in the background.
    #[serde(default)]
    pub background: bool,
}

/// Response for a background parse.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub session_id: String,
}

fn decode_file(payload: FilePayload) -> ApiResult<RawInput> {
    let bytes = STANDARD
        .decode(payload.file.trim())
        .map_err(|e| ApiError::bad_request(format!("file is not valid base64: {}", e)))?;
    let mut raw = RawInput::file(payload.file_name.unwrap_or_else(|| "upload".to_string()), bytes);
    if let Some(mime) = payload.mime_type.filter(|m| !m.is_empty()) {
        raw = raw.with_mime_type(mime);
    }
    Ok(raw)
}

impl ParseRequest {
    fn into_sources(self) -> ApiResult<(Vec<FileSource>, ParseOptions, bool)> {
        let given = [
            self.text.is_some(),
            self.file.is_some(),
            !self.files.is_empty(),
            !self.urls.is_empty(),
        ]
        .iter()
        .filter(|g| **g)
        .count();
        if given != 1 {
            return Err(ApiError::bad_request(
                "provide exactly one of text, file, files or urls",
            ));
        }

        let sources = if let Some(text) = self.text {
            vec![FileSource::Raw(RawInput::text(text))]
        } else if let Some(file) = self.file {
            vec![FileSource::Raw(decode_file(FilePayload {
                file,
                file_name: self.file_name,
                mime_type: self.mime_type,
            })?)]
        } else if !self.files.is_empty() {
            self.files
                .into_iter()
                .map(|f| decode_file(f).map(FileSource::Raw))
                .collect::<ApiResult<Vec<_>>>()?
        } else {
            self.urls.into_iter().map(FileSource::Url).collect()
        };
        Ok((sources, self.options, self.background))
    }
}

/// Parse a cut list.
/// POST /parse
///
/// A single text or file answers with `{sessionId, parts, stats}`; several
/// files or URLs answer with `{sessionId, files}`. With `background: true`
/// the answer is `202 {sessionId}` and results are polled via the session.
pub async fn parse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ParseRequest>,
) -> ApiResult<Response> {
    let identity = identity_from_headers(&headers)?;
    let (sources, options, background) = request.into_sources()?;
    let single = sources.len() == 1 && matches!(sources[0], FileSource::Raw(_));

    if background {
        let job = state.parser.spawn(sources, options, identity)?;
        info!(session_id = %job.session_id, "Parse job accepted");
        let body = AcceptedResponse {
            session_id: job.session_id,
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    if single {
        let Some(FileSource::Raw(raw)) = sources.into_iter().next() else {
            return Err(ApiError::internal("expected a single input"));
        };
        let outcome = state.parser.parse(raw, &options, &identity).await?;
        return Ok(Json(outcome).into_response());
    }

    let batch = if sources.iter().all(|s| matches!(s, FileSource::Url(_))) {
        let urls = sources
            .into_iter()
            .filter_map(|s| match s {
                FileSource::Url(url) => Some(url),
                FileSource::Raw(_) => None,
            })
            .collect();
        state.parser.parse_urls(urls, &options, &identity).await?
    } else {
        let inputs = sources
            .into_iter()
            .filter_map(|s| match s {
                FileSource::Raw(raw) => Some(raw),
                FileSource::Url(_) => None,
            })
            .collect();
        state.parser.parse_files(inputs, &options, &identity).await?
    };
    Ok(Json(batch).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_source() {
        let both = ParseRequest {
            text: Some("2 @ 600 x 400".into()),
            urls: vec!["https://x/a.csv".into()],
            ..Default::default()
        };
        assert_eq!(both.into_sources().unwrap_err().status, StatusCode::BAD_REQUEST);
        assert!(ParseRequest::default().into_sources().is_err());
    }

    #[test]
    fn test_bad_base64_is_rejected() {
        let request = ParseRequest {
            file: Some("***".into()),
            ..Default::default()
        };
        assert!(request.into_sources().is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let request: ParseRequest = serde_json::from_value(serde_json::json!({
            "file": "Miw2MDAsNDAw",
            "fileName": "list.csv",
            "mimeType": "text/csv",
            "options": {"useAI": false, "units": "cm"},
            "background": true
        }))
        .unwrap();
        let (sources, options, background) = request.into_sources().unwrap();
        assert!(background);
        assert!(!options.use_ai);
        match &sources[0] {
            FileSource::Raw(raw) => {
                assert_eq!(raw.file_name.as_deref(), Some("list.csv"));
                assert_eq!(raw.bytes, b"2,600,400");
            }
            FileSource::Url(_) => panic!("expected raw input"),
        }
    }
}
