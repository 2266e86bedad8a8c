//! Input kind detection from hints, magic numbers, MIME types and content.

use crate::error::{ExtractError, ExtractResult};
use crate::tokenizer::DELIMITERS;
use crate::transcript;
use crate::types::{InputKind, RawInput};

/// Detect image format from magic numbers.
pub fn detect_image_format(content: &[u8]) -> Option<&'static str> {
    if content.len() < 8 {
        return None;
    }

    if content.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("png")
    } else if content.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if content.starts_with(b"GIF87a") || content.starts_with(b"GIF89a") {
        Some("gif")
    } else if content.starts_with(b"RIFF") && content.len() > 12 && &content[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

fn detect_from_magic(raw: &RawInput) -> ExtractResult<Option<InputKind>> {
    let bytes = &raw.bytes;
    if bytes.starts_with(b"%PDF") {
        return Ok(Some(InputKind::Pdf));
    }
    if let Some(format) = detect_image_format(bytes) {
        return Ok(Some(InputKind::Image {
            format: format.to_string(),
        }));
    }
    // ZIP container: xlsx/ods workbooks, but also docx and friends.
    if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        return match raw.extension().as_deref() {
            Some("docx" | "pptx" | "zip") => Err(ExtractError::UnsupportedType(format!(
                "{} archive",
                raw.extension().unwrap_or_default()
            ))),
            _ => Ok(Some(InputKind::Excel)),
        };
    }
    // OLE compound document: legacy .xls.
    if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return Ok(Some(InputKind::Excel));
    }
    Ok(None)
}

fn detect_from_mime(mime: &str) -> Option<InputKind> {
    let mime = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/pdf" => Some(InputKind::Pdf),
        "text/csv" | "text/tab-separated-values" => Some(InputKind::Csv),
        "application/vnd.ms-excel"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.oasis.opendocument.spreadsheet" => Some(InputKind::Excel),
        "text/vtt" | "application/x-subrip" | "text/x-transcript" => {
            Some(InputKind::VoiceTranscript)
        }
        m if m.starts_with("image/") => Some(InputKind::Image {
            format: m.trim_start_matches("image/").to_string(),
        }),
        _ => None,
    }
}

fn detect_from_extension(ext: &str) -> Option<InputKind> {
    match ext {
        "csv" | "tsv" => Some(InputKind::Csv),
        "xlsx" | "xlsm" | "xls" | "ods" => Some(InputKind::Excel),
        "pdf" => Some(InputKind::Pdf),
        "vtt" | "srt" => Some(InputKind::VoiceTranscript),
        "png" | "gif" | "webp" => Some(InputKind::Image {
            format: ext.to_string(),
        }),
        "jpg" | "jpeg" => Some(InputKind::Image {
            format: "jpeg".to_string(),
        }),
        _ => None,
    }
}

/// Classify text content that carried no stronger signal.
pub fn sniff_text(text: &str) -> InputKind {
    if transcript::has_cue_timing(text) {
        return InputKind::VoiceTranscript;
    }

    let digit_count = text.chars().filter(|c| c.is_ascii_digit()).count();
    let number_words = transcript::count_number_words(text);
    if number_words >= 3 && number_words > digit_count {
        return InputKind::VoiceTranscript;
    }

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() >= 2 {
        for delimiter in DELIMITERS {
            let expected = lines[0].matches(delimiter).count();
            if expected == 0 {
                continue;
            }
            let consistent = lines
                .iter()
                .filter(|l| l.matches(delimiter).count() == expected)
                .count();
            if consistent * 10 >= lines.len() * 8 {
                return InputKind::Csv;
            }
        }
    }

    InputKind::Text
}

/// Detect the kind of a raw input.
///
/// Order: caller hint, magic numbers, MIME type, file extension, text sniffing.
pub fn detect_kind(raw: &RawInput) -> ExtractResult<InputKind> {
    if let Some(hint) = &raw.hint {
        return Ok(hint.clone());
    }
    if raw.is_empty() {
        return Err(ExtractError::EmptyContent);
    }
    if let Some(kind) = detect_from_magic(raw)? {
        return Ok(kind);
    }
    if let Some(kind) = raw.mime_type.as_deref().and_then(detect_from_mime) {
        return Ok(kind);
    }
    if let Some(kind) = raw.extension().as_deref().and_then(detect_from_extension) {
        // Binary formats need their magic numbers; a ".pdf" that is really text is text.
        if kind.is_textual() {
            return Ok(kind);
        }
    }

    let text = std::str::from_utf8(&raw.bytes).map_err(|_| {
        ExtractError::UnsupportedType(
            raw.mime_type
                .clone()
                .unwrap_or_else(|| "unknown binary content".to_string()),
        )
    })?;
    Ok(sniff_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_pdf_magic() {
        let raw = RawInput::file("scan.bin", b"%PDF-1.7\n...".to_vec());
        assert_eq!(detect_kind(&raw).unwrap(), InputKind::Pdf);
    }

    #[test]
    fn test_detect_png_magic() {
        let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let raw = RawInput::file("photo", png);
        assert_eq!(
            detect_kind(&raw).unwrap(),
            InputKind::Image {
                format: "png".to_string()
            }
        );
    }

    #[test]
    fn test_detect_docx_rejected() {
        let raw = RawInput::file("notes.docx", vec![0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0]);
        assert!(matches!(
            detect_kind(&raw),
            Err(ExtractError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_detect_hint_wins() {
        let raw = RawInput::text("a,b\n1,2").with_hint(InputKind::Text);
        assert_eq!(detect_kind(&raw).unwrap(), InputKind::Text);
    }

    #[test]
    fn test_sniff_csv() {
        let text = "qty;length;width\n2;600;400\n1;300;200";
        assert_eq!(sniff_text(text), InputKind::Csv);
    }

    #[test]
    fn test_sniff_free_text() {
        assert_eq!(sniff_text("2 pcs 600x400 white melamine"), InputKind::Text);
    }

    #[test]
    fn test_sniff_transcript() {
        let text = "two pieces six hundred by four hundred in white";
        assert_eq!(sniff_text(text), InputKind::VoiceTranscript);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            detect_kind(&RawInput::default()),
            Err(ExtractError::EmptyContent)
        ));
    }

    #[test]
    fn test_binary_without_signal_is_unsupported() {
        let raw = RawInput::file("blob", vec![0xFF, 0xFE, 0x00, 0x80, 0x81, 0x82, 0x83, 0x84, 0x85]);
        assert!(matches!(
            detect_kind(&raw),
            Err(ExtractError::UnsupportedType(_))
        ));
    }
}
