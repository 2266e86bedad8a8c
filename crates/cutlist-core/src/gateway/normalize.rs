//! Normalization of provider output into canonical part drafts.

use serde_json::{Map, Value};
use tracing::debug;

use super::response::ProviderResponse;
use crate::parser::{orient, parse_edge_code, DeterministicParser};
use crate::recovery::{recover_json_with_strategy, PartsEnvelope};
use crate::types::{
    EdgeBanding, FieldConfidence, GrainPolicy, ParseMethod, ParseOptions, PartDraft,
    ProviderFailure, ProviderResult, ValidationWarning,
};

/// Confidence assumed when the model reports none.
pub const DEFAULT_AI_CONFIDENCE: f64 = 0.8;

const LENGTH_KEYS: &[&str] = &["l", "length", "len", "length_mm", "lengthMm"];
const WIDTH_KEYS: &[&str] = &["w", "width", "width_mm", "widthMm"];
const THICKNESS_KEYS: &[&str] = &["t", "thickness", "thk", "thickness_mm", "thicknessMm"];
const QUANTITY_KEYS: &[&str] = &["q", "qty", "quantity", "count"];
const MATERIAL_KEYS: &[&str] = &["material", "mat", "materialRef", "material_ref"];
const LABEL_KEYS: &[&str] = &["label", "name", "part"];
const EDGE_KEYS: &[&str] = &["edge", "edging", "edgeBanding", "edge_banding"];
const GRAIN_KEYS: &[&str] = &["grain", "grainPolicy", "grain_policy"];
const NOTES_KEYS: &[&str] = &["notes", "note", "comment"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "conf"];
const GRAIN_VALUES: &[&str] = &["along_length", "length", "along", "vertical", "yes", "true", "gl", "l"];

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    obj.iter()
        .find(|(k, v)| !v.is_null() && keys.iter().any(|c| k.eq_ignore_ascii_case(c)))
        .map(|(_, v)| v)
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => crate::parser::parse_number(s),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn edge_banding(value: Option<&Value>) -> Option<EdgeBanding> {
    match value? {
        Value::String(code) => parse_edge_code(code),
        Value::Bool(true) => Some(EdgeBanding::all()),
        Value::Bool(false) => Some(EdgeBanding::none()),
        Value::Object(flags) => {
            let flag = |name: &str| {
                flags
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .and_then(|(_, v)| v.as_bool())
                    .unwrap_or(false)
            };
            Some(EdgeBanding {
                l1: flag("l1"),
                l2: flag("l2"),
                w1: flag("w1"),
                w2: flag("w2"),
            })
        }
        _ => None,
    }
}

fn grain(value: Option<&Value>) -> GrainPolicy {
    let along = match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => GRAIN_VALUES.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    };
    if along {
        GrainPolicy::AlongLength
    } else {
        GrainPolicy::None
    }
}

/// Map one part-shaped object to a draft.
///
/// Values are expected in millimetres. `Ok(None)` means the object had no
/// usable part and is skipped silently.
fn part_from_object(
    provider: &str,
    obj: &Map<String, Value>,
    options: &ParseOptions,
    index: usize,
) -> Result<Option<PartDraft>, String> {
    let source_ref = format!("{}#part{}", provider, index + 1);

    let (length, width) = match (number(field(obj, LENGTH_KEYS)), number(field(obj, WIDTH_KEYS))) {
        (Some(l), Some(w)) => (l, w),
        _ => {
            // Some models echo the source row instead of splitting it.
            if let Some(Value::String(row)) = obj.get("row") {
                return Ok(row_fallback(provider, row, options, source_ref));
            }
            return Err(format!("part {}: missing length or width", index + 1));
        }
    };
    if (length <= 0.0) != (width <= 0.0) {
        return Err(format!(
            "part {}: dimensions must be positive, got {} x {}",
            index + 1,
            length,
            width
        ));
    }

    let confidence = number(field(obj, CONFIDENCE_KEYS))
        .map(|c| if c > 1.0 { c / 100.0 } else { c })
        .unwrap_or(DEFAULT_AI_CONFIDENCE);
    let mut field_confidence = FieldConfidence::uniform(confidence);
    let mut warnings = Vec::new();

    let quantity = match number(field(obj, QUANTITY_KEYS)) {
        Some(q) if q >= 1.0 && q.fract() == 0.0 && q <= u32::MAX as f64 => q as u32,
        Some(q) => return Err(format!("part {}: invalid quantity {}", index + 1, q)),
        None => 1,
    };

    let thickness = match number(field(obj, THICKNESS_KEYS)).filter(|t| *t > 0.0) {
        Some(t) => t,
        None => {
            field_confidence.thickness = field_confidence.thickness.min(0.5);
            warnings.push(ValidationWarning::MissingField {
                field: "thickness".to_string(),
            });
            options.thickness_or_default()
        }
    };

    let material = match text(field(obj, MATERIAL_KEYS)) {
        Some(m) => m,
        None => {
            field_confidence.material = field_confidence.material.min(0.4);
            warnings.push(ValidationWarning::MissingField {
                field: "material".to_string(),
            });
            options.material_or_default().to_string()
        }
    };

    let grain = grain(field(obj, GRAIN_KEYS));
    let (l, w, _) = orient(length, width, options.dim_order_hint, grain);

    let mut part = PartDraft::new(
        l,
        w,
        thickness,
        material,
        ParseMethod::Ai(provider.to_string()),
        source_ref,
    )
    .with_quantity(quantity)
    .with_grain(grain)
    .with_field_confidence(field_confidence);
    part.label = text(field(obj, LABEL_KEYS));
    part.notes = text(field(obj, NOTES_KEYS));
    part.edge_banding = edge_banding(field(obj, EDGE_KEYS));
    part.warnings = warnings;

    Ok(Some(part))
}

fn row_fallback(
    provider: &str,
    row: &str,
    options: &ParseOptions,
    source_ref: String,
) -> Option<PartDraft> {
    let outcome = DeterministicParser::new().parse_text(row, options);
    outcome.parts.into_iter().next().map(|mut part| {
        part.provenance.method = ParseMethod::Ai(provider.to_string());
        part.provenance.source_ref = source_ref;
        part
    })
}

/// Flatten the recovered JSON into candidate part objects.
fn part_objects(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(obj) => {
            let is_envelope = ["parts", "items", "rows"]
                .iter()
                .any(|k| obj.get(*k).is_some_and(Value::is_array));
            if is_envelope {
                serde_json::from_value::<PartsEnvelope>(Value::Object(obj))
                    .map(|e| e.parts)
                    .unwrap_or_default()
            } else {
                vec![Value::Object(obj)]
            }
        }
        _ => Vec::new(),
    }
}

/// Turn model text into a [`ProviderResult`].
///
/// Runs the recovery engine and maps every part-shaped object. Objects that
/// cannot be mapped are reported in `errors`; the result fails as
/// [`ProviderFailure::Rejected`] only when no part survives.
pub fn normalize_text(
    provider: &str,
    text: &str,
    options: &ParseOptions,
    elapsed_ms: u64,
) -> ProviderResult {
    if text.trim().is_empty() {
        return ProviderResult::failed(provider, ProviderFailure::Rejected, "empty response", elapsed_ms);
    }

    let Some((value, strategy)) = recover_json_with_strategy(text) else {
        return ProviderResult::failed(
            provider,
            ProviderFailure::Rejected,
            "no JSON found in response",
            elapsed_ms,
        )
        .with_raw_text(text);
    };

    let mut parts = Vec::new();
    let mut errors = Vec::new();
    for (index, item) in part_objects(value).into_iter().enumerate() {
        let Value::Object(obj) = item else {
            errors.push(format!("part {}: not an object", index + 1));
            continue;
        };
        match part_from_object(provider, &obj, options, index) {
            Ok(Some(part)) => parts.push(part),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    debug!(
        provider,
        strategy = %strategy,
        parts = parts.len(),
        errors = errors.len(),
        "Normalized provider response"
    );

    let mut result = if parts.is_empty() {
        let mut failed = ProviderResult::failed(
            provider,
            ProviderFailure::Rejected,
            "response contained no usable parts",
            elapsed_ms,
        );
        failed.errors.extend(errors);
        failed.with_raw_text(text)
    } else {
        let mut ok = ProviderResult::succeeded(provider, parts, text, elapsed_ms);
        ok.errors = errors;
        ok
    };
    result.recovery = Some(strategy);
    result
}

/// Normalize a provider family's response at the gateway boundary.
pub fn normalize_response(
    provider: &str,
    response: &ProviderResponse,
    options: &ParseOptions,
    elapsed_ms: u64,
) -> ProviderResult {
    if let Some(refusal) = response.refusal() {
        return ProviderResult::failed(
            provider,
            ProviderFailure::Rejected,
            format!("provider refused: {}", refusal),
            elapsed_ms,
        );
    }
    if response.truncated() {
        debug!(provider, "Response hit the output limit, attempting recovery");
    }
    normalize_text(provider, &response.text(), options, elapsed_ms)
}
