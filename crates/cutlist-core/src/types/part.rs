//! Part draft types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Grain direction constraint for a part.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GrainPolicy {
    /// No grain constraint.
    #[default]
    None,
    /// Grain must run along the part length.
    AlongLength,
}

/// Per-edge banding flags. `l1`/`l2` are the long edges, `w1`/`w2` the short ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct EdgeBanding {
    pub l1: bool,
    pub l2: bool,
    pub w1: bool,
    pub w2: bool,
}

impl EdgeBanding {
    /// Band all four edges.
    pub fn all() -> Self {
        Self {
            l1: true,
            l2: true,
            w1: true,
            w2: true,
        }
    }

    /// Explicitly no banding.
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from long-edge and short-edge counts (each 0..=2).
    pub fn from_counts(long: u8, short: u8) -> Self {
        Self {
            l1: long >= 1,
            l2: long >= 2,
            w1: short >= 1,
            w2: short >= 2,
        }
    }

    /// Number of banded edges.
    pub fn count(&self) -> usize {
        [self.l1, self.l2, self.w1, self.w2]
            .iter()
            .filter(|b| **b)
            .count()
    }

    /// True when no edge is banded.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Kind of machining operation attached to a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Groove,
    Drilling,
    Cnc,
}

/// Minimal machining operation descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachiningOp {
    pub kind: OperationKind,
    /// Source text the operation was recognized from.
    pub description: String,
}

impl MachiningOp {
    /// Create a new operation.
    pub fn new(kind: OperationKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

/// How a part was produced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "provider")]
pub enum ParseMethod {
    /// Regex/heuristic parser, no network.
    #[default]
    Deterministic,
    /// Extraction provider, by name.
    Ai(String),
}

impl std::fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseMethod::Deterministic => f.write_str("deterministic"),
            ParseMethod::Ai(provider) => write!(f, "ai:{}", provider),
        }
    }
}

/// Where a part came from and how much to trust it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub method: ParseMethod,
    /// File name, row reference or provider request the part came from.
    pub source_ref: String,
    /// Overall confidence in [0, 1].
    pub confidence: f64,
    /// Set only by a human reviewer; the pipeline never sets it.
    pub human_verified: bool,
}

/// Confidence of each scored field, in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldConfidence {
    pub length: f64,
    pub width: f64,
    pub thickness: f64,
    pub quantity: f64,
    pub material: f64,
}

impl FieldConfidence {
    /// Same confidence for every field.
    pub fn uniform(value: f64) -> Self {
        let value = value.clamp(0.0, 1.0);
        Self {
            length: value,
            width: value,
            thickness: value,
            quantity: value,
            material: value,
        }
    }
}

impl Default for FieldConfidence {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

/// Non-blocking issue attached to a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ValidationWarning {
    /// Confidence below the requested level; the part needs review.
    LowConfidence { confidence: f64, threshold: f64 },
    /// Field was missing and a default was applied.
    MissingField { field: String },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::LowConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "confidence {:.2} is below the review threshold {:.2}",
                confidence, threshold
            ),
            ValidationWarning::MissingField { field } => {
                write!(f, "{} was missing, default applied", field)
            }
        }
    }
}

/// Candidate manufacturing part awaiting acceptance or review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDraft {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub quantity: u32,
    pub length_mm: f64,
    pub width_mm: f64,
    pub thickness_mm: f64,
    pub material_ref: String,
    pub grain_policy: GrainPolicy,
    pub allow_rotation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_banding: Option<EdgeBanding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grooving: Option<MachiningOp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drilling: Option<MachiningOp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cnc_ops: Vec<MachiningOp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationWarning>,
    #[serde(default, skip_serializing)]
    pub field_confidence: FieldConfidence,
}

impl PartDraft {
    /// Create a new part with a fresh id and default flags.
    pub fn new(
        length_mm: f64,
        width_mm: f64,
        thickness_mm: f64,
        material_ref: impl Into<String>,
        method: ParseMethod,
        source_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: None,
            quantity: 1,
            length_mm,
            width_mm,
            thickness_mm,
            material_ref: material_ref.into(),
            grain_policy: GrainPolicy::None,
            allow_rotation: true,
            edge_banding: None,
            grooving: None,
            drilling: None,
            cnc_ops: Vec::new(),
            notes: None,
            provenance: Provenance {
                method,
                source_ref: source_ref.into(),
                confidence: 1.0,
                human_verified: false,
            },
            warnings: Vec::new(),
            field_confidence: FieldConfidence::default(),
        }
    }

    /// Set the quantity.
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Constrain grain along the length; such parts may not be rotated.
    pub fn with_grain(mut self, grain: GrainPolicy) -> Self {
        self.grain_policy = grain;
        if grain == GrainPolicy::AlongLength {
            self.allow_rotation = false;
        }
        self
    }

    /// Set per-field confidence.
    pub fn with_field_confidence(mut self, confidence: FieldConfidence) -> Self {
        self.field_confidence = confidence;
        self
    }

    /// Both dimensions non-positive: the row carried no part at all.
    pub fn is_structurally_invalid(&self) -> bool {
        self.length_mm <= 0.0 && self.width_mm <= 0.0
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.length_mm > 0.0 && self.length_mm.is_finite()) {
            return Err(format!("length must be positive, got {}", self.length_mm));
        }
        if !(self.width_mm > 0.0 && self.width_mm.is_finite()) {
            return Err(format!("width must be positive, got {}", self.width_mm));
        }
        if !(self.thickness_mm > 0.0 && self.thickness_mm.is_finite()) {
            return Err(format!(
                "thickness must be positive, got {}",
                self.thickness_mm
            ));
        }
        if self.quantity < 1 {
            return Err("quantity must be at least 1".to_string());
        }
        Ok(())
    }

    /// Whether the scorer flagged this part for human review.
    pub fn needs_review(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::LowConfidence { .. }))
    }
}
