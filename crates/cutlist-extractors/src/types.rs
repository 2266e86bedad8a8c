//! Core types for input normalization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of raw input handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputKind {
    /// Free-form text (pasted lists, emails, notes).
    Text,
    /// Delimited text with one record per line.
    Csv,
    /// Spreadsheet workbook (xlsx, xls, ods).
    Excel,
    /// Speech-to-text output.
    VoiceTranscript,
    /// Photographed or scanned image.
    Image {
        /// Image format (e.g., "png", "jpeg").
        format: String,
    },
    /// PDF document, with or without a text layer.
    Pdf,
}

impl InputKind {
    /// Stable lowercase name used in logs, metadata and fingerprints.
    pub fn as_str(&self) -> &str {
        match self {
            InputKind::Text => "text",
            InputKind::Csv => "csv",
            InputKind::Excel => "excel",
            InputKind::VoiceTranscript => "voice_transcript",
            InputKind::Image { .. } => "image",
            InputKind::Pdf => "pdf",
        }
    }

    /// Whether the normalized form of this kind is line-oriented text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            InputKind::Text | InputKind::Csv | InputKind::Excel | InputKind::VoiceTranscript
        )
    }

    /// Whether this kind is expected to carry a header row and columns.
    pub fn is_tabular(&self) -> bool {
        matches!(self, InputKind::Csv | InputKind::Excel)
    }
}

impl Default for InputKind {
    fn default() -> Self {
        InputKind::Text
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Image { format } => write!(f, "image/{}", format),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Raw input as received from a caller or a storage fetch.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    /// Input bytes.
    pub bytes: Vec<u8>,
    /// Original file name, if the input came from a file.
    pub file_name: Option<String>,
    /// MIME type reported by the uploader.
    pub mime_type: Option<String>,
    /// Caller-supplied kind, overriding detection.
    pub hint: Option<InputKind>,
}

impl RawInput {
    /// Create raw input from pasted text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            bytes: text.into().into_bytes(),
            ..Default::default()
        }
    }

    /// Create raw input from file bytes.
    pub fn file(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    /// Set the reported MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Force a specific input kind.
    pub fn with_hint(mut self, kind: InputKind) -> Self {
        self.hint = Some(kind);
        self
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Size of the input in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the input has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A lexical token from one normalized line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Token {
    /// Standalone numeric value.
    Number(f64),
    /// Grouped dimensions such as `600x400x18`.
    Dimension(Vec<f64>),
    /// Any other word, kept verbatim.
    Word(String),
    /// Field delimiter encountered in the line.
    Delimiter(char),
}

impl Token {
    /// Numeric value, if this token is a plain number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Token::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Word text, if this token is a word.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w.as_str()),
            _ => None,
        }
    }
}

/// Uniform representation of any input after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedInput {
    /// Detected input kind.
    pub kind: InputKind,

    /// Non-empty text lines, in input order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<String>,

    /// Token stream, one entry per line in `lines`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Vec<Token>>,

    /// Binary payload for inputs that need vision or OCR.
    #[serde(skip)]
    pub binary: Option<Vec<u8>>,

    /// True when the input has no usable text layer.
    #[serde(default)]
    pub needs_ocr: bool,

    /// Additional metadata (format-specific).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NormalizedInput {
    /// Build normalized text input, tokenizing every line.
    pub fn from_lines(kind: InputKind, lines: Vec<String>) -> Self {
        let tokens = lines.iter().map(|l| crate::tokenizer::tokenize_line(l)).collect();
        Self {
            kind,
            lines,
            tokens,
            binary: None,
            needs_ocr: false,
            metadata: HashMap::new(),
        }
    }

    /// Build normalized binary input (images, scanned PDFs).
    pub fn from_binary(kind: InputKind, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            lines: Vec::new(),
            tokens: Vec::new(),
            binary: Some(bytes),
            needs_ocr: true,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Joined text of all lines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Whether there is any text to parse deterministically.
    pub fn has_text(&self) -> bool {
        !self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_kind_display() {
        assert_eq!(InputKind::Csv.to_string(), "csv");
        assert_eq!(
            InputKind::Image {
                format: "png".to_string()
            }
            .to_string(),
            "image/png"
        );
    }

    #[test]
    fn test_raw_input_extension() {
        let raw = RawInput::file("Cut List.XLSX", vec![]);
        assert_eq!(raw.extension().as_deref(), Some("xlsx"));
        assert_eq!(RawInput::text("abc").extension(), None);
    }

    #[test]
    fn test_from_lines_tokenizes() {
        let input = NormalizedInput::from_lines(InputKind::Text, vec!["600x400 white".into()]);
        assert_eq!(input.tokens.len(), 1);
        assert_eq!(input.tokens[0][0], Token::Dimension(vec![600.0, 400.0]));
        assert!(input.has_text());
    }
}
