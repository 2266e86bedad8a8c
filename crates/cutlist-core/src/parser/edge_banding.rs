//! Edge banding shortcode expansion.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::EdgeBanding;

static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:([0-2])L)?(?:([0-2])W)?$").expect("valid regex"));

static SIDES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[LW][12])+$").expect("valid regex"));

/// Expand a compact banding code into per-edge flags.
///
/// Recognizes `ALL`/`4E`, count codes (`2L2W`, `1L`, `2W`), side codes
/// (`L1`, `W2`, `L1L2W1`) and explicit `NONE`/`0`. Separators such as `+`,
/// `/` and spaces are ignored. Unknown codes return `None`.
pub fn parse_edge_code(code: &str) -> Option<EdgeBanding> {
    let normalized: String = code
        .trim()
        .to_ascii_uppercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '+' | ',' | '/' | '-' | '_' | '&'))
        .collect();

    match normalized.as_str() {
        "" => return None,
        "ALL" | "4E" | "4S" | "FULL" => return Some(EdgeBanding::all()),
        "NONE" | "0" | "NO" | "N" | "0E" => return Some(EdgeBanding::none()),
        _ => {}
    }

    if let Some(caps) = COUNT_RE.captures(&normalized) {
        let long = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let short = caps.get(2).and_then(|m| m.as_str().parse().ok());
        if long.is_none() && short.is_none() {
            return None;
        }
        return Some(EdgeBanding::from_counts(
            long.unwrap_or(0),
            short.unwrap_or(0),
        ));
    }

    if SIDES_RE.is_match(&normalized) {
        let mut banding = EdgeBanding::none();
        let bytes = normalized.as_bytes();
        for pair in bytes.chunks(2) {
            match pair {
                b"L1" => banding.l1 = true,
                b"L2" => banding.l2 = true,
                b"W1" => banding.w1 = true,
                b"W2" => banding.w2 = true,
                _ => return None,
            }
        }
        return Some(banding);
    }

    None
}

/// Stricter variant for free-text words: only codes that name edges.
///
/// Plain words like `no` or `n` are ordinary text outside an edge column.
pub fn parse_inline_edge_code(word: &str) -> Option<EdgeBanding> {
    let upper = word.trim().to_ascii_uppercase();
    let names_edges = upper == "ALL"
        || upper == "4E"
        || (upper.chars().any(|c| c.is_ascii_digit()) && upper.chars().any(|c| c == 'L' || c == 'W'));
    if !names_edges {
        return None;
    }
    parse_edge_code(&upper).filter(|b| !b.is_empty())
}
