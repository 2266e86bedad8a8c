//! Voice transcript cleanup and spoken-number conversion.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ExtractError, ExtractResult};
use crate::text::decode_text;
use crate::types::{InputKind, NormalizedInput, RawInput};
use crate::Normalizer;

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d{1,2}:\d{2}(?::\d{2})?(?:[.,]\d{1,3})?\s*-->\s*\d{1,2}:\d{2}")
        .expect("valid regex")
});

static CUE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\s*$").expect("valid regex"));

static SENTENCE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("valid regex"));

static SPEAKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:(?i:speaker)\s*\d+|[A-Z][a-z]{1,20})\s*:\s+").expect("valid regex"));

/// Whether the text carries subtitle-style cue timing.
pub fn has_cue_timing(text: &str) -> bool {
    text.trim_start().starts_with("WEBVTT") || text.lines().any(|l| TIMESTAMP_RE.is_match(l))
}

/// Count spelled-out number words in the text.
pub fn count_number_words(text: &str) -> usize {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .filter(|w| number_word(&w.to_ascii_lowercase()).is_some())
        .count()
}

/// Turn a raw transcript into clean lines with digits instead of spoken numbers.
pub fn clean_transcript(text: &str) -> Vec<String> {
    let timed = has_cue_timing(text);
    let mut lines = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("WEBVTT") || TIMESTAMP_RE.is_match(trimmed) {
            continue;
        }
        if timed && CUE_NUMBER_RE.is_match(trimmed) {
            continue;
        }
        let without_speaker = SPEAKER_RE.replace(trimmed, "");
        // Spoken lists are often one run-on sentence; split on sentence ends and "next".
        for piece in split_utterances(&without_speaker) {
            let converted = convert_spoken_numbers(piece);
            if !converted.trim().is_empty() {
                lines.push(converted.trim().to_string());
            }
        }
    }

    lines
}

fn split_utterances(line: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    for sentence in SENTENCE_END_RE.split(line) {
        let lower = sentence.to_ascii_lowercase();
        let mut start = 0;
        for (idx, _) in lower.match_indices(" next ") {
            pieces.push(&sentence[start..idx]);
            start = idx + " next ".len();
        }
        pieces.push(&sentence[start..]);
    }
    pieces.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

fn number_word(word: &str) -> Option<u64> {
    let value = match word {
        "zero" | "oh" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

#[derive(Default)]
struct SpokenNumber {
    total: u64,
    current: u64,
    decimals: String,
    in_decimals: bool,
    active: bool,
}

impl SpokenNumber {
    fn render(&self) -> String {
        let whole = self.total + self.current;
        if self.decimals.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, self.decimals)
        }
    }
}

/// Convert spelled numbers to digits: "six hundred by four hundred" becomes "600 x 400".
pub fn convert_spoken_numbers(line: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut number = SpokenNumber::default();

    let flush = |number: &mut SpokenNumber, out: &mut Vec<String>| {
        if number.active {
            out.push(number.render());
        }
        *number = SpokenNumber::default();
    };

    let words: Vec<&str> = line.split_whitespace().collect();
    for (i, raw) in words.iter().enumerate() {
        let lower = raw
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_ascii_lowercase();

        if number.in_decimals {
            if let Some(digit) = number_word(&lower).filter(|d| *d < 10) {
                number.decimals.push_str(&digit.to_string());
                continue;
            }
        }

        if let Some(value) = number_word(&lower) {
            number.active = true;
            number.current += value;
            continue;
        }

        match lower.as_str() {
            "hundred" if number.active => {
                number.current = number.current.max(1) * 100;
                continue;
            }
            "thousand" if number.active => {
                number.total += number.current.max(1) * 1000;
                number.current = 0;
                continue;
            }
            "and" if number.active => {
                let next_is_number = words
                    .get(i + 1)
                    .map(|w| number_word(&w.to_ascii_lowercase()).is_some())
                    .unwrap_or(false);
                if next_is_number {
                    continue;
                }
            }
            "point" if number.active && !number.in_decimals => {
                number.in_decimals = true;
                continue;
            }
            _ => {}
        }

        flush(&mut number, &mut out);
        match lower.as_str() {
            "by" | "times" => out.push("x".to_string()),
            "millimeters" | "millimetres" | "millimeter" | "millimetre" => out.push("mm".to_string()),
            _ => out.push(raw.to_string()),
        }
    }
    flush(&mut number, &mut out);

    out.join(" ")
}

/// Normalizer for speech-to-text output (plain, VTT or SRT).
#[derive(Debug, Clone, Default)]
pub struct TranscriptNormalizer;

impl TranscriptNormalizer {
    /// Create a new transcript normalizer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Normalizer for TranscriptNormalizer {
    async fn normalize(&self, raw: &RawInput, kind: &InputKind) -> ExtractResult<NormalizedInput> {
        let lines = clean_transcript(&decode_text(&raw.bytes));
        if lines.is_empty() {
            return Err(ExtractError::EmptyContent);
        }
        Ok(NormalizedInput::from_lines(kind.clone(), lines))
    }

    fn handles(&self, kind: &InputKind) -> bool {
        matches!(kind, InputKind::VoiceTranscript)
    }

    fn name(&self) -> &str {
        "transcript"
    }
}
