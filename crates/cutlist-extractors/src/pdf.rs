//! PDF normalization: text layer when present, binary otherwise.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ExtractResult;
use crate::text::split_lines;
use crate::types::{InputKind, NormalizedInput, RawInput};
use crate::Normalizer;

/// PDF normalizer.
///
/// Extracts the text layer with pdf-extract (inside spawn_blocking). PDFs whose
/// text layer is shorter than `min_text_length` are treated as scans and keep
/// their bytes for vision providers.
#[derive(Debug, Clone)]
pub struct PdfNormalizer {
    min_text_length: usize,
}

impl PdfNormalizer {
    /// Create new PDF normalizer with default settings.
    pub fn new() -> Self {
        Self {
            min_text_length: 20,
        }
    }

    /// Create PDF normalizer with custom minimum text threshold.
    pub fn with_min_text_length(min_text_length: usize) -> Self {
        Self { min_text_length }
    }

    #[cfg(feature = "pdf")]
    async fn text_layer(&self, bytes: Vec<u8>) -> ExtractResult<String> {
        use crate::error::ExtractError;

        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        })
        .await?
    }

    #[cfg(not(feature = "pdf"))]
    async fn text_layer(&self, _bytes: Vec<u8>) -> ExtractResult<String> {
        Ok(String::new())
    }
}

impl Default for PdfNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Normalizer for PdfNormalizer {
    async fn normalize(&self, raw: &RawInput, kind: &InputKind) -> ExtractResult<NormalizedInput> {
        let text = match self.text_layer(raw.bytes.clone()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "PDF text layer extraction failed, treating as scanned");
                String::new()
            }
        };

        let text_len = text.trim().len();
        if text_len < self.min_text_length {
            debug!(text_len, "PDF has no usable text layer");
            return Ok(NormalizedInput::from_binary(kind.clone(), raw.bytes.clone())
                .with_metadata("text_layer_chars", text_len));
        }

        let mut normalized = NormalizedInput::from_lines(kind.clone(), split_lines(&text))
            .with_metadata("text_layer_chars", text_len);
        normalized.binary = Some(raw.bytes.clone());
        Ok(normalized)
    }

    fn handles(&self, kind: &InputKind) -> bool {
        matches!(kind, InputKind::Pdf)
    }

    fn name(&self) -> &str {
        "pdf"
    }
}
