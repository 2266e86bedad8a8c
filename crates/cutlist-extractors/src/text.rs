//! Plain text and delimited text normalization.

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ExtractError, ExtractResult};
use crate::types::{InputKind, NormalizedInput, RawInput};
use crate::Normalizer;

/// Decode bytes as text, stripping a UTF-8 BOM.
///
/// Invalid sequences are replaced rather than rejected so that one bad byte in
/// an exported sheet does not cost the whole file.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            warn!(valid_up_to = e.valid_up_to(), "Input is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Split text into trimmed, non-empty lines with normalized line endings.
pub fn split_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.trim().is_empty())
        .collect()
}

/// Normalizer for free text and CSV/TSV input.
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    /// Create a new text normalizer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Normalizer for TextNormalizer {
    async fn normalize(&self, raw: &RawInput, kind: &InputKind) -> ExtractResult<NormalizedInput> {
        let text = decode_text(&raw.bytes);
        let lines = split_lines(&text);
        if lines.is_empty() {
            return Err(ExtractError::EmptyContent);
        }
        Ok(NormalizedInput::from_lines(kind.clone(), lines))
    }

    fn handles(&self, kind: &InputKind) -> bool {
        matches!(kind, InputKind::Text | InputKind::Csv)
    }

    fn name(&self) -> &str {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_bom() {
        let bytes = [0xEF, 0xBB, 0xBF, b'a', b'b'];
        assert_eq!(decode_text(&bytes), "ab");
    }

    #[test]
    fn test_split_lines_mixed_endings() {
        let lines = split_lines("a\r\nb\rc\n\n  \nd  ");
        assert_eq!(lines, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_text_normalizer_empty() {
        let normalizer = TextNormalizer::new();
        let result = normalizer
            .normalize(&RawInput::text("   \n\n"), &InputKind::Text)
            .await;
        assert!(matches!(result, Err(ExtractError::EmptyContent)));
    }

    #[tokio::test]
    async fn test_text_normalizer_csv() {
        let normalizer = TextNormalizer::new();
        let result = normalizer
            .normalize(&RawInput::text("qty,length\n2,600\n"), &InputKind::Csv)
            .await
            .unwrap();
        assert_eq!(result.kind, InputKind::Csv);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.tokens.len(), 2);
    }
}
