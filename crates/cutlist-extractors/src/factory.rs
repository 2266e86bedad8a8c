//! Factory for creating normalizers.

use std::sync::Arc;

use crate::image::ImageNormalizer;
use crate::pdf::PdfNormalizer;
use crate::spreadsheet::SpreadsheetNormalizer;
use crate::text::TextNormalizer;
use crate::transcript::TranscriptNormalizer;
use crate::Normalizer;

/// Factory for creating input normalizers.
pub struct NormalizerFactory;

impl NormalizerFactory {
    /// Create a text/CSV normalizer.
    pub fn text() -> Arc<dyn Normalizer> {
        Arc::new(TextNormalizer::new())
    }

    /// Create a spreadsheet normalizer.
    pub fn spreadsheet() -> Arc<dyn Normalizer> {
        Arc::new(SpreadsheetNormalizer::new())
    }

    /// Create a voice transcript normalizer.
    pub fn transcript() -> Arc<dyn Normalizer> {
        Arc::new(TranscriptNormalizer::new())
    }

    /// Create a PDF normalizer.
    pub fn pdf() -> Arc<dyn Normalizer> {
        Arc::new(PdfNormalizer::new())
    }

    /// Create a PDF normalizer with custom minimum text threshold.
    pub fn pdf_with_threshold(min_text_length: usize) -> Arc<dyn Normalizer> {
        Arc::new(PdfNormalizer::with_min_text_length(min_text_length))
    }

    /// Create an image normalizer.
    pub fn image() -> Arc<dyn Normalizer> {
        Arc::new(ImageNormalizer::new())
    }

    /// Get all available normalizers.
    pub fn all() -> Vec<Arc<dyn Normalizer>> {
        vec![
            Self::text(),
            Self::spreadsheet(),
            Self::transcript(),
            Self::pdf(),
            Self::image(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_names() {
        let names: Vec<String> = NormalizerFactory::all()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["text", "spreadsheet", "transcript", "pdf", "image"]);
    }
}
