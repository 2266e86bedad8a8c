//! Caller-supplied parse options.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Material reference used when neither the input nor the caller names one.
pub const FALLBACK_MATERIAL: &str = "unspecified";

/// Thickness used when neither the input nor the caller gives one.
pub const FALLBACK_THICKNESS_MM: f64 = 18.0;

/// How to order the two plan dimensions of a part.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum DimOrderHint {
    /// First value is the length.
    #[serde(rename = "LxW")]
    #[strum(serialize = "LxW")]
    LxW,
    /// First value is the width.
    #[serde(rename = "WxL")]
    #[strum(serialize = "WxL")]
    WxL,
    /// Larger value is the length unless grain runs along the length.
    #[default]
    #[serde(rename = "infer")]
    #[strum(serialize = "infer")]
    Infer,
}

/// Units the input dimensions are written in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Units {
    #[default]
    Mm,
    Cm,
    Inch,
}

impl Units {
    /// Multiplier converting a value in these units to millimetres.
    pub fn to_mm_factor(&self) -> f64 {
        match self {
            Units::Mm => 1.0,
            Units::Cm => 10.0,
            Units::Inch => 25.4,
        }
    }

    /// Convert a value in these units to millimetres.
    pub fn to_mm(&self, value: f64) -> f64 {
        value * self.to_mm_factor()
    }
}

/// Review strictness selected by the caller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConfidenceLevel {
    Strict,
    #[default]
    Balanced,
    Permissive,
}

impl ConfidenceLevel {
    /// Minimum confidence a part needs to skip review.
    pub fn threshold(&self) -> f64 {
        match self {
            ConfidenceLevel::Strict => 0.9,
            ConfidenceLevel::Balanced => 0.75,
            ConfidenceLevel::Permissive => 0.5,
        }
    }
}

/// Options recognized by `parse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParseOptions {
    pub default_material_id: Option<String>,
    pub default_thickness_mm: Option<f64>,
    pub dim_order_hint: DimOrderHint,
    pub units: Units,
    #[serde(rename = "useAI", alias = "useAi")]
    pub use_ai: bool,
    pub confidence_level: ConfidenceLevel,
    pub track_progress: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            default_material_id: None,
            default_thickness_mm: None,
            dim_order_hint: DimOrderHint::Infer,
            units: Units::Mm,
            use_ai: true,
            confidence_level: ConfidenceLevel::Balanced,
            track_progress: true,
        }
    }
}

impl ParseOptions {
    /// Material applied to parts that name none.
    pub fn material_or_default(&self) -> &str {
        self.default_material_id
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(FALLBACK_MATERIAL)
    }

    /// Thickness in mm applied to parts that give none.
    pub fn thickness_or_default(&self) -> f64 {
        self.default_thickness_mm
            .filter(|t| *t > 0.0)
            .unwrap_or(FALLBACK_THICKNESS_MM)
    }

    /// Disable AI extraction.
    pub fn deterministic_only(mut self) -> Self {
        self.use_ai = false;
        self
    }

    /// Set the confidence level.
    pub fn with_confidence(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = level;
        self
    }

    /// Set the input units.
    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// Set the default material.
    pub fn with_default_material(mut self, material: impl Into<String>) -> Self {
        self.default_material_id = Some(material.into());
        self
    }

    /// Set the dimension order hint.
    pub fn with_dim_order(mut self, hint: DimOrderHint) -> Self {
        self.dim_order_hint = hint;
        self
    }
}
