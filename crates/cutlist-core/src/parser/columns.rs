//! Header-to-field column matching and mapping confidence.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use strum::Display;

/// A part field a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Length,
    Width,
    Thickness,
    Quantity,
    Material,
    Label,
    Grain,
    EdgeBanding,
    Groove,
    Notes,
}

impl Field {
    /// Contribution of this field to the mapping confidence.
    pub fn weight(&self) -> f64 {
        match self {
            Field::Length | Field::Width => 3.0,
            Field::Thickness | Field::Quantity => 2.0,
            Field::Material => 1.5,
            Field::Label => 1.0,
            Field::Grain | Field::EdgeBanding => 0.5,
            Field::Groove | Field::Notes => 0.25,
        }
    }

    /// Sum of all field weights.
    pub fn max_weight() -> f64 {
        COLUMN_TABLE.iter().map(|(f, _)| f.weight()).sum()
    }
}

fn pattern(re: &str) -> Regex {
    Regex::new(&format!("(?i){}", re)).expect("valid regex")
}

/// Field patterns in priority order. Earlier entries win when a header
/// matches several.
static COLUMN_TABLE: Lazy<Vec<(Field, Regex)>> = Lazy::new(|| {
    vec![
        (
            Field::Quantity,
            pattern(r"^(?:qty|qnty|quantity|q|pcs|pieces|count|amount|nos?\.?|#)$|quantit|\bqty\b|\bpcs\b"),
        ),
        (
            Field::EdgeBanding,
            pattern(r"edg(?:e|ing)|banding|^eb$|\babs\b|\btape\b"),
        ),
        (
            Field::Length,
            pattern(r"^(?:l|len|lg|long|h|height)(?:\s*\(.*\))?$|length|\blen\b|\blong\b|\bheight\b"),
        ),
        (
            Field::Width,
            pattern(r"^(?:w|wd|wid|b|breadth|depth)(?:\s*\(.*\))?$|width|\bwide\b|\bdepth\b"),
        ),
        (
            Field::Thickness,
            pattern(r"^(?:t|th|thk)(?:\s*\(.*\))?$|thick|\bthk\b|\bgauge\b"),
        ),
        (
            Field::Material,
            pattern(r"material|^mat\.?$|board|colou?r|decor|sheet|substrate|finish"),
        ),
        (Field::Grain, pattern(r"grain|direction|^gr$")),
        (Field::Groove, pattern(r"groove|\bgrv\b|rebate|dado")),
        (
            Field::Label,
            pattern(r"label|name|part|desc|item|\bref\b|reference|^id$|cabinet|component"),
        ),
        (Field::Notes, pattern(r"note|comment|remark|info|instruction")),
    ]
});

static NUMERIC_CELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^[-+]?\d+(?:[.,]\d+)?\s*(?:mm|cm|m|in|inch|"|pcs|x)?$"#).expect("valid regex")
});

/// Whether a cell looks like a number (optionally with a unit).
pub fn looks_numeric(cell: &str) -> bool {
    NUMERIC_CELL_RE.is_match(cell.trim())
}

/// Field a single header cell would be matched to, ignoring claims.
pub fn classify_header(header: &str) -> Option<Field> {
    let header = header.trim();
    if header.is_empty() {
        return None;
    }
    COLUMN_TABLE
        .iter()
        .find(|(_, re)| re.is_match(header))
        .map(|(field, _)| *field)
}

/// Whether a row reads as a header: mostly non-numeric with at least one known column.
pub fn looks_like_header(cells: &[String]) -> bool {
    let non_empty: Vec<&String> = cells.iter().filter(|c| !c.trim().is_empty()).collect();
    if non_empty.is_empty() {
        return false;
    }
    let non_numeric = non_empty.iter().filter(|c| !looks_numeric(c)).count();
    non_numeric * 2 > non_empty.len() && non_empty.iter().any(|c| classify_header(c).is_some())
}

/// Result of matching a header row to fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMapping {
    columns: BTreeMap<Field, usize>,
    /// Mapping confidence in [0, 1].
    pub confidence: f64,
    /// Number of cells in the header row.
    pub header_len: usize,
}

impl ColumnMapping {
    /// Match headers left to right. Each header is claimed by at most one
    /// field and each field claims at most one header.
    pub fn from_headers(headers: &[String]) -> Self {
        let mut columns = BTreeMap::new();
        for (index, header) in headers.iter().enumerate() {
            let header = header.trim();
            if header.is_empty() {
                continue;
            }
            let claimed = COLUMN_TABLE
                .iter()
                .find(|(field, re)| !columns.contains_key(field) && re.is_match(header));
            if let Some((field, _)) = claimed {
                columns.insert(*field, index);
            }
        }
        Self {
            columns,
            confidence: 0.0,
            header_len: headers.len(),
        }
    }

    /// Match headers and score the mapping against the data rows.
    pub fn detect(headers: &[String], rows: &[Vec<String>]) -> Self {
        let mut mapping = Self::from_headers(headers);
        mapping.confidence = mapping.score(headers, rows);
        mapping
    }

    fn score(&self, headers: &[String], rows: &[Vec<String>]) -> f64 {
        let matched: f64 = self.columns.keys().map(|f| f.weight()).sum();
        let mut confidence = matched / Field::max_weight();

        if self.has(Field::Length) && self.has(Field::Width) && self.has(Field::Quantity) {
            confidence += 0.1;
        }
        if !rows.is_empty() {
            let consistent = rows.iter().filter(|r| r.len() == self.header_len).count();
            if consistent * 10 >= rows.len() * 8 {
                confidence += 0.05;
            }
        }
        if !headers.iter().any(|h| looks_numeric(h)) {
            confidence += 0.05;
        }

        confidence.min(1.0)
    }

    /// Column index holding `field`.
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Whether `field` was matched.
    pub fn has(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// Non-empty trimmed cell for `field` in `cells`.
    pub fn cell<'a>(&self, field: Field, cells: &'a [String]) -> Option<&'a str> {
        self.get(field)
            .and_then(|i| cells.get(i))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }

    /// Whether the mapping can place parts at all.
    pub fn has_dimensions(&self) -> bool {
        self.has(Field::Length) && self.has(Field::Width)
    }

    /// Matched fields in priority order.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.columns.keys().copied()
    }
}
