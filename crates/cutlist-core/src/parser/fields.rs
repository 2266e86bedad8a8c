//! Per-row field values and their conversion into a part.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{
    DimOrderHint, EdgeBanding, FieldConfidence, GrainPolicy, MachiningOp, OperationKind,
    ParseMethod, ParseOptions, PartDraft, Units, ValidationWarning,
};

/// Confidence given to a defaulted quantity of 1.
const DEFAULT_QUANTITY_CONFIDENCE: f64 = 0.7;
/// Confidence given to a defaulted thickness.
const DEFAULT_THICKNESS_CONFIDENCE: f64 = 0.5;
/// Confidence given to a defaulted material.
const DEFAULT_MATERIAL_CONFIDENCE: f64 = 0.4;

static MEASURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^([-+]?\d+(?:\.\d+)?)\s*(mm|cm|in|inch|inches|")?\.?$"#).expect("valid regex")
});

static THOUSANDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})+(?:\.\d+)?").expect("valid regex"));

/// A value with the confidence it was read with.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sourced<T> {
    pub value: T,
    pub confidence: f64,
}

impl<T> Sourced<T> {
    pub fn new(value: T, confidence: f64) -> Self {
        Self { value, confidence }
    }
}

/// Parse a single measurement cell such as `600`, `18,5`, `60cm` or `24"`.
///
/// A comma is a decimal separator when `decimal_comma` is set, otherwise a
/// thousands separator.
pub(crate) fn parse_measure(cell: &str, decimal_comma: bool) -> Option<(f64, Option<Units>)> {
    let trimmed = cell.trim();
    let cleaned = if decimal_comma {
        trimmed.replace(',', ".")
    } else if THOUSANDS_RE.is_match(trimmed) {
        trimmed.replace(',', "")
    } else {
        trimmed.to_string()
    };
    let cleaned = cleaned.replace(' ', "");

    let caps = MEASURE_RE.captures(&cleaned)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = caps.get(2).and_then(|m| unit_from_word(m.as_str()));
    Some((value, unit))
}

/// Unit named by a word, if any.
pub(crate) fn unit_from_word(word: &str) -> Option<Units> {
    match word.to_ascii_lowercase().as_str() {
        "mm" => Some(Units::Mm),
        "cm" => Some(Units::Cm),
        "in" | "inch" | "inches" | "\"" => Some(Units::Inch),
        _ => None,
    }
}

/// Order two plan dimensions as (length, width).
///
/// Returns whether the values were swapped.
pub fn orient(first: f64, second: f64, hint: DimOrderHint, grain: GrainPolicy) -> (f64, f64, bool) {
    match hint {
        DimOrderHint::LxW => (first, second, false),
        DimOrderHint::WxL => (second, first, true),
        DimOrderHint::Infer => {
            if grain == GrainPolicy::None && second > first {
                (second, first, true)
            } else {
                (first, second, false)
            }
        }
    }
}

/// Field values collected from one row, before defaults are applied.
#[derive(Debug, Clone, Default)]
pub(crate) struct RowFields {
    pub quantity: Option<Sourced<f64>>,
    /// Millimetres.
    pub length: Option<Sourced<f64>>,
    /// Millimetres.
    pub width: Option<Sourced<f64>>,
    /// Millimetres.
    pub thickness: Option<Sourced<f64>>,
    pub material: Option<Sourced<String>>,
    pub label: Option<String>,
    pub notes: Option<String>,
    pub grain: bool,
    pub edge_banding: Option<EdgeBanding>,
    pub grooving: Option<String>,
    pub drilling: Option<String>,
}

impl RowFields {
    /// Apply defaults and orientation and build the draft.
    ///
    /// `Ok(None)` means the row is structurally invalid and is dropped.
    pub fn into_part(
        self,
        options: &ParseOptions,
        source_ref: String,
    ) -> Result<Option<PartDraft>, String> {
        let (Some(length), Some(width)) = (self.length, self.width) else {
            return Err("no length and width found".to_string());
        };
        if length.value <= 0.0 && width.value <= 0.0 {
            return Ok(None);
        }
        if length.value <= 0.0 || width.value <= 0.0 {
            return Err(format!(
                "dimensions must be positive, got {} x {}",
                length.value, width.value
            ));
        }

        let mut warnings = Vec::new();

        let (quantity, quantity_confidence) = match self.quantity {
            Some(q) => {
                if q.value < 1.0 || q.value.fract() != 0.0 || q.value > u32::MAX as f64 {
                    return Err(format!("invalid quantity {}", q.value));
                }
                (q.value as u32, q.confidence)
            }
            None => (1, DEFAULT_QUANTITY_CONFIDENCE),
        };

        let thickness = match self.thickness {
            Some(t) if t.value > 0.0 => t,
            Some(t) => return Err(format!("thickness must be positive, got {}", t.value)),
            None => {
                warnings.push(ValidationWarning::MissingField {
                    field: "thickness".to_string(),
                });
                Sourced::new(options.thickness_or_default(), DEFAULT_THICKNESS_CONFIDENCE)
            }
        };

        let material = match self.material {
            Some(m) => m,
            None => {
                warnings.push(ValidationWarning::MissingField {
                    field: "material".to_string(),
                });
                Sourced::new(
                    options.material_or_default().to_string(),
                    DEFAULT_MATERIAL_CONFIDENCE,
                )
            }
        };

        let grain = if self.grain {
            GrainPolicy::AlongLength
        } else {
            GrainPolicy::None
        };
        let (l, w, swapped) = orient(length.value, width.value, options.dim_order_hint, grain);
        let (length_confidence, width_confidence) = if swapped {
            (width.confidence, length.confidence)
        } else {
            (length.confidence, width.confidence)
        };

        let mut part = PartDraft::new(
            l,
            w,
            thickness.value,
            material.value,
            ParseMethod::Deterministic,
            source_ref,
        )
        .with_quantity(quantity)
        .with_grain(grain)
        .with_field_confidence(FieldConfidence {
            length: length_confidence,
            width: width_confidence,
            thickness: thickness.confidence,
            quantity: quantity_confidence,
            material: material.confidence,
        });

        part.label = self.label;
        part.notes = self.notes;
        part.edge_banding = self.edge_banding;
        part.grooving = self
            .grooving
            .map(|d| MachiningOp::new(OperationKind::Groove, d));
        part.drilling = self
            .drilling
            .map(|d| MachiningOp::new(OperationKind::Drilling, d));
        part.warnings = warnings;

        Ok(Some(part))
    }
}
