//! Image normalization.

use async_trait::async_trait;

use crate::detect::detect_image_format;
use crate::error::{ExtractError, ExtractResult};
use crate::types::{InputKind, NormalizedInput, RawInput};
use crate::Normalizer;

/// Normalizer for photographed or scanned cut lists.
///
/// Images carry no text of their own; the bytes are kept for vision providers.
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer;

impl ImageNormalizer {
    /// Create a new image normalizer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Normalizer for ImageNormalizer {
    async fn normalize(&self, raw: &RawInput, kind: &InputKind) -> ExtractResult<NormalizedInput> {
        if raw.is_empty() {
            return Err(ExtractError::EmptyContent);
        }
        // Trust the magic number over the declared format when both exist.
        let kind = match detect_image_format(&raw.bytes) {
            Some(format) => InputKind::Image {
                format: format.to_string(),
            },
            None => kind.clone(),
        };
        Ok(NormalizedInput::from_binary(kind, raw.bytes.clone())
            .with_metadata("original_size", raw.len()))
    }

    fn handles(&self, kind: &InputKind) -> bool {
        matches!(kind, InputKind::Image { .. })
    }

    fn name(&self) -> &str {
        "image"
    }
}
