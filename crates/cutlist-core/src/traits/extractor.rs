//! Extraction provider trait and request types.

use async_trait::async_trait;

use crate::types::{FileStage, ParseOptions, ProviderResult};

/// What to send to an extraction provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionRequest {
    /// Plain text (pasted lists, transcripts, spreadsheet rows).
    Text(String),
    /// Photographed or scanned image.
    Image { bytes: Vec<u8>, mime_type: String },
    /// Document bytes, with the text layer when one was extracted.
    Document {
        bytes: Vec<u8>,
        text_layer: Option<String>,
    },
}

impl ExtractionRequest {
    /// Stage reported to pollers while this request is in flight.
    pub fn stage(&self) -> FileStage {
        match self {
            ExtractionRequest::Text(_) => FileStage::Parsing,
            ExtractionRequest::Image { .. } => FileStage::Ocr,
            ExtractionRequest::Document { text_layer, .. } => match text_layer {
                Some(_) => FileStage::Parsing,
                None => FileStage::Ocr,
            },
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionRequest::Text(_) => "text",
            ExtractionRequest::Image { .. } => "image",
            ExtractionRequest::Document { .. } => "document",
        }
    }

    /// Bytes that identify this request for caching.
    pub fn content_bytes(&self) -> &[u8] {
        match self {
            ExtractionRequest::Text(text) => text.as_bytes(),
            ExtractionRequest::Image { bytes, .. } | ExtractionRequest::Document { bytes, .. } => {
                bytes
            }
        }
    }
}

/// Core extraction provider trait - every AI provider implements this.
///
/// Implementations never return errors: network failures, rate limits,
/// timeouts and unusable bodies are reported as a [`ProviderResult`] with
/// `success: false`.
#[async_trait]
pub trait PartExtractor: Send + Sync {
    /// Extract parts from text.
    async fn parse_text(&self, text: &str, options: &ParseOptions) -> ProviderResult;

    /// Extract parts from an image.
    async fn parse_image(&self, image: &[u8], mime_type: &str, options: &ParseOptions)
        -> ProviderResult;

    /// Extract parts from a document such as a PDF.
    async fn parse_document(
        &self,
        document: &[u8],
        text_layer: Option<&str>,
        options: &ParseOptions,
    ) -> ProviderResult;

    /// Whether credentials are present. Unconfigured providers are skipped.
    fn is_configured(&self) -> bool;

    /// Provider name used in provenance, logs and metrics.
    fn name(&self) -> &str;

    /// Dispatch a request to the matching method.
    async fn extract(&self, request: &ExtractionRequest, options: &ParseOptions) -> ProviderResult {
        match request {
            ExtractionRequest::Text(text) => self.parse_text(text, options).await,
            ExtractionRequest::Image { bytes, mime_type } => {
                self.parse_image(bytes, mime_type, options).await
            }
            ExtractionRequest::Document { bytes, text_layer } => {
                self.parse_document(bytes, text_layer.as_deref(), options)
                    .await
            }
        }
    }
}
