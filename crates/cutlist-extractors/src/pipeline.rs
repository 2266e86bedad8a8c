//! Normalization pipeline routing raw input to the matching normalizer.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::detect::detect_kind;
use crate::error::{ExtractError, ExtractResult};
use crate::types::{InputKind, NormalizedInput, RawInput};
use crate::Normalizer;

/// Pipeline that detects the input kind and normalizes it.
pub struct NormalizationPipeline {
    normalizers: Vec<Arc<dyn Normalizer>>,
}

impl NormalizationPipeline {
    /// Create new empty pipeline.
    pub fn new() -> Self {
        Self {
            normalizers: Vec::new(),
        }
    }

    /// Create pipeline with all available normalizers.
    pub fn with_defaults() -> Self {
        Self {
            normalizers: crate::NormalizerFactory::all(),
        }
    }

    /// Add a normalizer to the pipeline.
    pub fn add_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizers.push(normalizer);
        self
    }

    /// Detect the kind of `raw` and normalize it.
    #[instrument(skip(self, raw), fields(size = raw.len(), file = ?raw.file_name))]
    pub async fn normalize(&self, raw: &RawInput) -> ExtractResult<NormalizedInput> {
        let kind = detect_kind(raw)?;
        debug!(kind = %kind, "Detected input kind");
        self.normalize_as(raw, &kind).await
    }

    /// Normalize `raw` as an already known kind.
    pub async fn normalize_as(
        &self,
        raw: &RawInput,
        kind: &InputKind,
    ) -> ExtractResult<NormalizedInput> {
        let normalizer = self
            .normalizers
            .iter()
            .find(|n| n.handles(kind))
            .ok_or_else(|| ExtractError::UnsupportedType(kind.to_string()))?;

        let mut normalized = normalizer.normalize(raw, kind).await?;
        if !normalized.has_text() && normalized.binary.is_none() {
            return Err(ExtractError::EmptyContent);
        }

        normalized = normalized.with_metadata("original_size", raw.len());
        if let Some(name) = &raw.file_name {
            normalized = normalized.with_metadata("file_name", name.clone());
        }
        debug!(
            normalizer = normalizer.name(),
            lines = normalized.lines.len(),
            needs_ocr = normalized.needs_ocr,
            "Normalized input"
        );
        Ok(normalized)
    }

    /// Check if pipeline can handle a given kind.
    pub fn supports(&self, kind: &InputKind) -> bool {
        self.normalizers.iter().any(|n| n.handles(kind))
    }

    /// Get the number of registered normalizers.
    pub fn len(&self) -> usize {
        self.normalizers.len()
    }

    /// Check if the pipeline has no registered normalizers.
    pub fn is_empty(&self) -> bool {
        self.normalizers.is_empty()
    }
}

impl Default for NormalizationPipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_with_defaults() {
        let pipeline = NormalizationPipeline::with_defaults();
        assert_eq!(pipeline.len(), 5);
        assert!(pipeline.supports(&InputKind::Csv));
        assert!(pipeline.supports(&InputKind::Pdf));
        assert!(pipeline.supports(&InputKind::Image {
            format: "png".to_string()
        }));
    }

    #[test]
    fn test_pipeline_empty() {
        let pipeline = NormalizationPipeline::new();
        assert!(pipeline.is_empty());
        assert!(!pipeline.supports(&InputKind::Text));
    }

    #[tokio::test]
    async fn test_unsupported_kind_error() {
        let pipeline = NormalizationPipeline::new();
        let result = pipeline.normalize(&RawInput::text("600x400")).await;
        assert!(matches!(result, Err(ExtractError::UnsupportedType(_))));
    }

    #[tokio::test]
    async fn test_csv_roundtrip_metadata() {
        let pipeline = NormalizationPipeline::with_defaults();
        let raw = RawInput::file("parts.csv", b"qty,length,width\n2,600,400\n".to_vec());
        let result = pipeline.normalize(&raw).await.unwrap();
        assert_eq!(result.kind, InputKind::Csv);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.metadata["file_name"], "parts.csv");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let pipeline = NormalizationPipeline::with_defaults();
        let result = pipeline.normalize(&RawInput::text("")).await;
        assert!(matches!(result, Err(ExtractError::EmptyContent)));
    }
}
