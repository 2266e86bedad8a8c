//! Confidence scoring and review flagging.

use serde::Serialize;
use tracing::debug;

use crate::types::{ConfidenceLevel, FieldConfidence, PartDraft, ValidationWarning};

/// Weights for combining field confidences. Dimensions dominate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeights {
    pub length: f64,
    pub width: f64,
    pub thickness: f64,
    pub quantity: f64,
    pub material: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            length: 0.3,
            width: 0.3,
            thickness: 0.15,
            quantity: 0.15,
            material: 0.1,
        }
    }
}

impl FieldWeights {
    fn total(&self) -> f64 {
        self.length + self.width + self.thickness + self.quantity + self.material
    }
}

/// A warning raised while scoring, keyed by part id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartWarning {
    pub part_id: String,
    pub warning: ValidationWarning,
}

/// Parts after scoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoredParts {
    /// Every structurally valid part, flagged or not.
    pub parts: Vec<PartDraft>,
    /// Parts below the threshold.
    pub flagged: usize,
    /// Structurally invalid parts removed.
    pub dropped: usize,
    pub warnings: Vec<PartWarning>,
}

/// Combines per-field confidences into an overall part confidence.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: FieldWeights,
}

impl ConfidenceScorer {
    /// Create a scorer with the default weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scorer with custom weights.
    pub fn with_weights(weights: FieldWeights) -> Self {
        Self { weights }
    }

    /// Weighted mean of the field confidences, in [0, 1].
    pub fn overall(&self, fields: &FieldConfidence) -> f64 {
        let w = &self.weights;
        let total = w.total();
        if total <= 0.0 {
            return 0.0;
        }
        let sum = w.length * fields.length.clamp(0.0, 1.0)
            + w.width * fields.width.clamp(0.0, 1.0)
            + w.thickness * fields.thickness.clamp(0.0, 1.0)
            + w.quantity * fields.quantity.clamp(0.0, 1.0)
            + w.material * fields.material.clamp(0.0, 1.0);
        (sum / total).clamp(0.0, 1.0)
    }

    /// Score parts against `level`.
    ///
    /// Low-confidence parts are kept with `human_verified = false` and a
    /// [`ValidationWarning::LowConfidence`]. Only structurally invalid parts
    /// (both dimensions non-positive) are dropped.
    pub fn score(&self, parts: Vec<PartDraft>, level: ConfidenceLevel) -> ScoredParts {
        let threshold = level.threshold();
        let mut scored = ScoredParts::default();

        for mut part in parts {
            if part.is_structurally_invalid() {
                scored.dropped += 1;
                continue;
            }

            let confidence = self.overall(&part.field_confidence);
            part.provenance.confidence = confidence;
            part.provenance.human_verified = false;
            part.warnings
                .retain(|w| !matches!(w, ValidationWarning::LowConfidence { .. }));

            if confidence < threshold {
                part.warnings.push(ValidationWarning::LowConfidence {
                    confidence,
                    threshold,
                });
                scored.flagged += 1;
            }

            scored.warnings.extend(part.warnings.iter().map(|w| PartWarning {
                part_id: part.id.clone(),
                warning: w.clone(),
            }));
            scored.parts.push(part);
        }

        debug!(
            parts = scored.parts.len(),
            flagged = scored.flagged,
            dropped = scored.dropped,
            threshold,
            "Scored parts"
        );
        scored
    }
}
