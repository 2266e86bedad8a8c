//! Prompt text sent to extraction providers.

use cutlist_core::types::{DimOrderHint, ParseOptions, Units};

/// System instruction shared by every provider.
pub const SYSTEM_PROMPT: &str = "You extract cut lists for panel manufacturing. \
Return only a JSON array. Each element describes one part with the keys \
l (length), w (width), t (thickness), q (quantity), material, label, \
edge (edge banding code such as \"2L1W\"), grain (true when grain runs along the length), \
notes and confidence (0 to 1, how sure you are of the row). \
All dimensions are numbers in millimetres. Omit keys you cannot determine. \
Do not add commentary.";

const PDF_MAGIC: &[u8] = b"%PDF";

/// Whether the bytes start with a PDF header.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Hints derived from the caller's options.
pub fn option_hints(options: &ParseOptions) -> Vec<String> {
    let mut hints = Vec::new();
    match options.units {
        Units::Mm => {}
        Units::Cm => hints.push("Dimensions in the source are in centimetres; convert them to millimetres.".to_string()),
        Units::Inch => hints.push("Dimensions in the source are in inches; convert them to millimetres.".to_string()),
    }
    match options.dim_order_hint {
        DimOrderHint::LxW => hints.push("Dimension pairs are written length first.".to_string()),
        DimOrderHint::WxL => hints.push("Dimension pairs are written width first.".to_string()),
        DimOrderHint::Infer => {}
    }
    if let Some(material) = options.default_material_id.as_deref().filter(|m| !m.trim().is_empty()) {
        hints.push(format!("Parts without a material use \"{}\".", material));
    }
    if let Some(thickness) = options.default_thickness_mm.filter(|t| *t > 0.0) {
        hints.push(format!("Parts without a thickness are {} mm thick.", thickness));
    }
    hints
}

/// User message for a request. `source` is the text to extract from, when
/// the content is not attached as an image or document.
pub fn user_prompt(options: &ParseOptions, source: Option<&str>) -> String {
    let mut prompt = String::from("Extract every part from the cut list");
    prompt.push_str(match source {
        Some(_) => " below.",
        None => " in the attachment.",
    });
    for hint in option_hints(options) {
        prompt.push('\n');
        prompt.push_str(&hint);
    }
    if let Some(text) = source {
        prompt.push_str("\n\n");
        prompt.push_str(text);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_add_no_hints() {
        assert!(option_hints(&ParseOptions::default()).is_empty());
    }

    #[test]
    fn test_prompt_carries_hints_and_source() {
        let options = ParseOptions {
            units: Units::Inch,
            default_material_id: Some("WHITE-MEL".to_string()),
            ..Default::default()
        };
        let prompt = user_prompt(&options, Some("2 @ 24 x 16"));
        assert!(prompt.contains("inches"));
        assert!(prompt.contains("WHITE-MEL"));
        assert!(prompt.ends_with("2 @ 24 x 16"));

        let attached = user_prompt(&ParseOptions::default(), None);
        assert!(attached.ends_with("in the attachment."));
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"\x89PNG"));
    }
}
