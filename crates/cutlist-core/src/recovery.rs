//! JSON recovery for free-form and truncated model output.
//!
//! Strategies run in order and the first success wins:
//! 1. strip reasoning blocks and code fences,
//! 2. parse directly,
//! 3. parse the largest bracket-delimited substring that holds objects,
//! 4. repair truncation by balancing brackets, retrying from later openers,
//! 5. scan for individually well-formed part-shaped objects.
//!
//! Everything here is pure and deterministic. Values next to a truncation
//! point are recovered where possible but not guaranteed to be correct.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?(?:</think>|$)").expect("valid regex"));

static FENCE_LANG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_+-]*").expect("valid regex"));

static TRAILING_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[A-Za-z]+|-?\d+\.?\d*[eE]?[+-]?)$").expect("valid regex"));

/// Openers tried by truncation repair before giving up.
const MAX_REPAIR_STARTS: usize = 32;

/// Keys that mark an object as a part record.
const LENGTH_KEYS: [&str; 3] = ["l", "length", "len"];
const WIDTH_KEYS: [&str; 2] = ["w", "width"];

/// Which strategy produced the recovered value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Whole (cleaned) text was valid JSON.
    Direct,
    /// Largest bracket-delimited substring parsed.
    Substring,
    /// Truncated JSON closed and parsed.
    Repaired,
    /// Individual part-shaped objects collected.
    ObjectScan,
}

/// Remove `<think>` blocks and a surrounding code fence.
pub fn strip_wrappers(text: &str) -> String {
    let without_think = THINK_RE.replace_all(text, "");
    strip_code_fence(without_think.trim()).trim().to_string()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    let lang_len = FENCE_LANG_RE.find(after).map(|m| m.end()).unwrap_or(0);
    let body = &after[lang_len..];
    // The closing fence is optional: truncated output often loses it.
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

/// Recover a JSON value from model text.
pub fn recover_json(text: &str) -> Option<Value> {
    recover_json_with_strategy(text).map(|(value, _)| value)
}

/// Recover a JSON value and report which strategy succeeded.
pub fn recover_json_with_strategy(text: &str) -> Option<(Value, RecoveryStrategy)> {
    let cleaned = strip_wrappers(text);
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Some((value, RecoveryStrategy::Direct));
    }
    if let Some(value) = parse_largest_span(&cleaned) {
        return Some((value, RecoveryStrategy::Substring));
    }
    if let Some(value) = repair_from_any_opener(&cleaned) {
        return Some((value, RecoveryStrategy::Repaired));
    }
    if let Some(value) = scan_part_objects(&cleaned) {
        return Some((value, RecoveryStrategy::ObjectScan));
    }
    None
}

/// Recover and deserialize into `T`.
pub fn recover<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_value(recover_json(text)?).ok()
}

fn is_opener(c: char) -> bool {
    c == '[' || c == '{'
}

fn is_closer(c: char) -> bool {
    c == ']' || c == '}'
}

/// Top-level balanced `[...]`/`{...}` spans, string-aware.
fn balanced_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '[' | '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ']' | '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }
    spans
}

fn parse_largest_span(text: &str) -> Option<Value> {
    let mut candidates: Vec<&str> = balanced_spans(text)
        .into_iter()
        .map(|(s, e)| &text[s..e])
        .collect();

    // Outermost opener to last closer, for prose wrapped around nested JSON.
    if let (Some(first), Some(last)) = (text.find(is_opener), text.rfind(is_closer)) {
        if first < last {
            candidates.push(&text[first..=last]);
        }
    }

    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));
    candidates
        .into_iter()
        .filter_map(|c| serde_json::from_str::<Value>(c).ok())
        .find(holds_records)
}

/// Objects, or arrays that are empty or contain objects. Prose brackets such
/// as `[1]` or `[a]` do not qualify.
fn holds_records(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.is_empty() || items.iter().any(Value::is_object),
        _ => false,
    }
}

/// Run [`repair_truncated`] from each opener in turn until one yields records.
fn repair_from_any_opener(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| is_opener(*c))
        .take(MAX_REPAIR_STARTS)
        .filter_map(|(i, _)| repair_truncated(&text[i..]))
        .find(holds_records)
}

/// Close truncated JSON and parse it.
///
/// Walks the text tracking string and escape state, closes an open string,
/// gives a dangling key a `null` value, drops a trailing comma and appends the
/// missing closers. If that still fails, cuts back to the last complete nested
/// value and closes from there.
pub fn repair_truncated(text: &str) -> Option<Value> {
    let start = text.find(is_opener)?;
    let body = &text[start..];

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut safe_cut: Option<(usize, Vec<char>)> = None;

    for (i, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                    if stack.is_empty() {
                        // Complete value; anything after it is noise.
                        return serde_json::from_str(&body[..=i]).ok();
                    }
                    safe_cut = Some((i + 1, stack.clone()));
                } else {
                    return None;
                }
            }
            _ => {}
        }
    }

    let mut repaired = body.to_string();
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    }
    close_dangling(&mut repaired, &stack);
    for closer in stack.iter().rev() {
        repaired.push(*closer);
    }

    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        return Some(value);
    }

    let (cut, stack) = safe_cut?;
    let mut fallback = body[..cut].to_string();
    for closer in stack.iter().rev() {
        fallback.push(*closer);
    }
    serde_json::from_str(&fallback).ok()
}

/// Fix the tail of a truncated document so closers can be appended.
fn close_dangling(repaired: &mut String, stack: &[char]) {
    let trimmed_len = repaired.trim_end().len();
    repaired.truncate(trimmed_len);

    // Partial literal or number: `tru`, `nul`, `12.`, `1e`.
    if !repaired.ends_with('"') {
        if let Some(m) = TRAILING_LITERAL_RE.find(repaired) {
            let token = m.as_str();
            let complete = matches!(token, "true" | "false" | "null")
                || (token.parse::<f64>().is_ok() && !token.ends_with('.'));
            if !complete {
                let keep = m.start();
                repaired.truncate(keep);
                let trimmed_len = repaired.trim_end().len();
                repaired.truncate(trimmed_len);
            }
        }
    }

    if repaired.ends_with(',') {
        repaired.pop();
        return;
    }
    if repaired.ends_with(':') {
        repaired.push_str("null");
        return;
    }
    if stack.last() == Some(&'}') && repaired.ends_with('"') && ends_with_key(repaired) {
        repaired.push_str(":null");
    }
}

/// Whether the string literal at the end of `text` sits in key position.
fn ends_with_key(text: &str) -> bool {
    let inner = &text[..text.len() - 1];
    let mut search_end = inner.len();
    while let Some(pos) = inner[..search_end].rfind('"') {
        let backslashes = inner[..pos].chars().rev().take_while(|c| *c == '\\').count();
        if backslashes % 2 == 0 {
            return matches!(
                inner[..pos].trim_end().chars().last(),
                Some('{') | Some(',')
            );
        }
        search_end = pos;
    }
    false
}

/// Collect well-formed objects that look like part records, at any depth.
pub fn scan_part_objects(text: &str) -> Option<Value> {
    let mut parts = Vec::new();
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match object_end(&text[start..]) {
            Some(len) => match serde_json::from_str::<Value>(&text[start..start + len]) {
                Ok(value) if is_part_shaped(&value) => {
                    parts.push(value);
                    pos = start + len;
                }
                _ => pos = start + 1,
            },
            None => pos = start + 1,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(Value::Array(parts))
    }
}

/// Byte length of the brace-balanced object at the start of `text`.
fn object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// An object with a length-like and width-like key, or a `row` key.
pub fn is_part_shaped(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has = |keys: &[&str]| {
        obj.keys()
            .any(|k| keys.iter().any(|candidate| k.eq_ignore_ascii_case(candidate)))
    };
    (has(&LENGTH_KEYS) && has(&WIDTH_KEYS)) || obj.contains_key("row")
}

/// Recovered payload wrapper used by callers that expect `{"parts": [...]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartsEnvelope {
    #[serde(default, alias = "items", alias = "rows")]
    pub parts: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        let (value, strategy) = recover_json_with_strategy(r#"[{"l":600,"w":400}]"#).unwrap();
        assert_eq!(strategy, RecoveryStrategy::Direct);
        assert_eq!(value[0]["l"], 600);
    }

    #[test]
    fn test_fenced_with_and_without_closing_fence() {
        let closed = "```json\n[{\"l\":600,\"w\":400}]\n```";
        let open = "```json\n[{\"l\":600,\"w\":400}]";
        assert_eq!(recover_json(closed), recover_json(open));
        assert!(recover_json(closed).is_some());
    }

    #[test]
    fn test_think_block_removed() {
        let text = "<think>the user wants [parts]</think>\n{\"parts\": []}";
        assert_eq!(recover_json(text), Some(json!({"parts": []})));
    }

    #[test]
    fn test_prose_around_json() {
        let text = "Here are the parts:\n[{\"length\": 720, \"width\": 560}]\nLet me know!";
        let (value, strategy) = recover_json_with_strategy(text).unwrap();
        assert_eq!(strategy, RecoveryStrategy::Substring);
        assert_eq!(value[0]["length"], 720);
    }

    #[test]
    fn test_truncated_dangling_key() {
        let text = r#"[{"l":600,"w":400,"q":2},{"l":300,"w""#;
        let (value, strategy) = recover_json_with_strategy(text).unwrap();
        assert_eq!(strategy, RecoveryStrategy::Repaired);
        let first = &value.as_array().unwrap()[0];
        assert_eq!(first["l"], 600);
        assert_eq!(first["w"], 400);
        assert_eq!(first["q"], 2);
    }

    #[test]
    fn test_truncated_inside_string() {
        let text = r#"{"parts":[{"l":600,"w":400,"label":"Side pa"#;
        let value = recover_json(text).unwrap();
        assert_eq!(value["parts"][0]["l"], 600);
    }

    #[test]
    fn test_truncated_after_colon_and_partial_literal() {
        assert!(recover_json(r#"[{"l":600,"w":"#).is_some());
        let value = recover_json(r#"[{"l":600,"w":400,"grain":tru"#).unwrap();
        assert_eq!(value[0]["w"], 400);
        let value = recover_json(r#"[{"l":600,"w":40"#).unwrap();
        assert_eq!(value[0]["l"], 600);
    }

    #[test]
    fn test_trailing_comma() {
        let value = recover_json(r#"[{"l":600,"w":400},"#).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_object_scan() {
        let text = r#"Row one {"length": 600, "width": 400} and {"note": "x"} then {"row": 3}"#;
        let value = scan_part_objects(text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_object_scan_sees_nested_objects() {
        let text = r#"first {"l":600,"w":400,"edge":{"L1":true,"note":"}"}} then {"parts":[{"l":300,"w":200}"#;
        let value = scan_part_objects(text).unwrap();
        let parts = value.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["edge"]["L1"], true);
        assert_eq!(parts[1]["l"], 300);
    }

    #[test]
    fn test_prose_brackets_before_truncated_array() {
        let text = "Parts (see note [a]):\n[{\"l\":600,\"w\":400,\"edge\":{\"L1\":true}},{\"l\":300,\"w\"";
        let (value, strategy) = recover_json_with_strategy(text).unwrap();
        assert_eq!(strategy, RecoveryStrategy::Repaired);
        assert_eq!(value[0]["l"], 600);
        assert_eq!(value[0]["edge"]["L1"], true);
    }

    #[test]
    fn test_footnote_bracket_does_not_shadow_parts() {
        let text = "Parts from sheet [1]:\n[{\"l\":600,\"w\":400,\"q\":2},{\"l\":300,\"w\"";
        let (value, strategy) = recover_json_with_strategy(text).unwrap();
        assert_eq!(strategy, RecoveryStrategy::Repaired);
        assert_eq!(value[0]["q"], 2);

        // A bare scalar array is still accepted when it is the whole response.
        assert_eq!(recover_json("[1]"), Some(json!([1])));
    }

    #[test]
    fn test_nothing_recoverable() {
        assert!(recover_json("I could not find any parts in this image.").is_none());
        assert!(recover_json("").is_none());
    }

    #[test]
    fn test_fence_and_truncation_combinations() {
        let payload = r#"[{"length":600,"width":400,"qty":2},{"length":300,"width":200"#;
        let wrappers = [
            format!("```json\n{}", payload),
            format!("```\n{}\n```", payload),
            format!("Sure!\n```json\n{}", payload),
            format!("<think>ok</think>{}", payload),
            payload.to_string(),
        ];
        for wrapped in wrappers {
            let value = recover_json(&wrapped);
            assert!(value.is_some(), "failed on {:?}", wrapped);
        }
    }

    #[test]
    fn test_recover_typed() {
        let envelope: PartsEnvelope = recover("```json\n{\"items\": [{\"l\": 1}]}\n```").unwrap();
        assert_eq!(envelope.parts.len(), 1);
    }
}
