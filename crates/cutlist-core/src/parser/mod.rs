//! Deterministic parser: regex and heuristic extraction without a network.
//!
//! Delimited input with a recognizable header is read column by column using
//! [`ColumnMapping`]. Headerless rows and free-text lines go through
//! positional inference, which also understands dimension groups
//! (`600x400x18`), quantity markers (`2pcs`, `x2`, `qty 2`), material words
//! and edge banding shortcodes.

mod columns;
mod delimiter;
mod edge_banding;
mod fields;
mod line;

pub use columns::{classify_header, looks_like_header, looks_numeric, ColumnMapping, Field};
pub use delimiter::{detect_delimiter, is_consistent, split_row};
pub use edge_banding::{parse_edge_code, parse_inline_edge_code};
pub use fields::orient;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use cutlist_extractors::tokenizer::tokenize_line;
use cutlist_extractors::{split_lines, InputKind, NormalizedInput};

use crate::types::{ParseOptions, PartDraft, RowError};
use fields::{parse_measure, RowFields, Sourced};
use line::{infer_fields, split_cells};

static DECIMAL_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d),(\d)").expect("valid regex"));

static DRILL_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:hinges?|drill(?:ed|ing)?|holes?)\b").expect("valid regex"));

const NEGATIVE_CELLS: &[&str] = &["", "no", "n", "none", "0", "-", "false", "n/a"];
const GRAIN_CELLS: &[&str] = &[
    "y", "yes", "true", "1", "x", "l", "length", "along", "along length", "vertical", "v", "gl",
    "grain",
];

/// Rows, errors and counts produced by one deterministic pass.
#[derive(Debug, Clone, Default)]
pub struct DeterministicOutcome {
    pub parts: Vec<PartDraft>,
    pub row_errors: Vec<RowError>,
    /// Structurally invalid rows (both dimensions non-positive).
    pub dropped: usize,
    /// Data rows considered, excluding headers and totals.
    pub total_rows: usize,
    /// Header mapping, when the input had one.
    pub mapping: Option<ColumnMapping>,
    pub delimiter: Option<char>,
}

impl DeterministicOutcome {
    fn record(&mut self, row: usize, result: Result<Option<PartDraft>, String>) {
        match result {
            Ok(Some(part)) => self.parts.push(part),
            Ok(None) => self.dropped += 1,
            Err(message) => self.row_errors.push(RowError::new(row, message)),
        }
    }
}

/// Regex/heuristic part extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicParser;

impl DeterministicParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse plain text as if it were pasted free text.
    pub fn parse_text(&self, text: &str, options: &ParseOptions) -> DeterministicOutcome {
        let input = NormalizedInput::from_lines(InputKind::Text, split_lines(text));
        self.parse(&input, options, "text")
    }

    /// Parse normalized input. Never fails as a whole; failing rows become
    /// [`RowError`]s.
    #[instrument(skip(self, input, options), fields(kind = %input.kind, lines = input.lines.len()))]
    pub fn parse(
        &self,
        input: &NormalizedInput,
        options: &ParseOptions,
        source_ref: &str,
    ) -> DeterministicOutcome {
        let mut outcome = DeterministicOutcome::default();
        let Some(first) = input.lines.first() else {
            return outcome;
        };

        let delimiter = detect_delimiter(first)
            .filter(|d| input.kind.is_tabular() || is_consistent(&input.lines, *d, 2));
        outcome.delimiter = delimiter;

        match delimiter {
            Some(d) => self.parse_table(input, d, options, source_ref, &mut outcome),
            None => self.parse_lines(input, options, source_ref, &mut outcome),
        }

        debug!(
            parts = outcome.parts.len(),
            row_errors = outcome.row_errors.len(),
            dropped = outcome.dropped,
            mapped = outcome.mapping.is_some(),
            "Deterministic parse finished"
        );
        outcome
    }

    fn parse_table(
        &self,
        input: &NormalizedInput,
        delimiter: char,
        options: &ParseOptions,
        source_ref: &str,
        outcome: &mut DeterministicOutcome,
    ) {
        let rows: Vec<Vec<String>> = input
            .lines
            .iter()
            .map(|l| split_row(l, delimiter))
            .collect();
        let decimal_comma = delimiter != ',';

        let has_header = looks_like_header(&rows[0]);
        let mapping = if has_header {
            Some(ColumnMapping::detect(&rows[0], &rows[1..])).filter(|m| m.has_dimensions())
        } else {
            None
        };
        if let Some(m) = &mapping {
            debug!(confidence = m.confidence, "Header mapped");
        }

        let start = usize::from(has_header);
        for (index, cells) in rows.iter().enumerate().skip(start) {
            let row = index + 1;
            if is_total_row(cells) || (has_header && is_repeated_header(cells)) {
                continue;
            }
            outcome.total_rows += 1;

            let line = &input.lines[index];
            let fields = match &mapping {
                Some(m) => mapped_fields(cells, m, options, decimal_comma, line),
                None => {
                    let cell_tokens: Vec<_> = cells
                        .iter()
                        .map(|c| {
                            let c = if decimal_comma {
                                DECIMAL_COMMA_RE.replace_all(c, "$1.$2").into_owned()
                            } else {
                                c.clone()
                            };
                            tokenize_line(&c)
                        })
                        .collect();
                    infer_fields(&cell_tokens, line, options)
                }
            };

            let source = format!("{}#row{}", source_ref, row);
            outcome.record(row, fields.and_then(|f| f.into_part(options, source)));
        }
        outcome.mapping = mapping;
    }

    fn parse_lines(
        &self,
        input: &NormalizedInput,
        options: &ParseOptions,
        source_ref: &str,
        outcome: &mut DeterministicOutcome,
    ) {
        for (index, line) in input.lines.iter().enumerate() {
            let row = index + 1;
            // Headings and prose without any digit are not rows.
            if !line.chars().any(|c| c.is_ascii_digit()) || is_total_line(line) {
                continue;
            }
            outcome.total_rows += 1;

            let tokens = match input.tokens.get(index) {
                Some(tokens) => tokens.clone(),
                None => tokenize_line(line),
            };
            let cells = split_cells(&tokens);
            let source = format!("{}#line{}", source_ref, row);
            let result = infer_fields(&cells, line, options).and_then(|f| f.into_part(options, source));
            outcome.record(row, result);
        }
    }
}

/// Parse a loose numeric value such as `600`, `"18mm"` or `60 cm`, in mm.
pub fn parse_number(value: &str) -> Option<f64> {
    parse_measure(value, false).map(|(v, unit)| unit.map_or(v, |u| u.to_mm(v)))
}

fn is_total_line(line: &str) -> bool {
    let lower = line.trim_start().to_lowercase();
    lower.starts_with("total") || lower.starts_with("subtotal") || lower.starts_with("sum")
}

fn is_total_row(cells: &[String]) -> bool {
    cells
        .iter()
        .find(|c| !c.trim().is_empty())
        .is_some_and(|c| is_total_line(c))
}

fn is_repeated_header(cells: &[String]) -> bool {
    looks_like_header(cells) && !cells.iter().any(|c| looks_numeric(c))
}

fn is_negative(cell: &str) -> bool {
    NEGATIVE_CELLS.contains(&cell.trim().to_lowercase().as_str())
}

fn measure(
    mapping: &ColumnMapping,
    field: Field,
    cells: &[String],
    options: &ParseOptions,
    decimal_comma: bool,
    confidence: f64,
) -> Result<Option<Sourced<f64>>, String> {
    let Some(cell) = mapping.cell(field, cells) else {
        return Ok(None);
    };
    match parse_measure(cell, decimal_comma) {
        Some((value, unit)) => Ok(Some(Sourced::new(
            unit.unwrap_or(options.units).to_mm(value),
            confidence,
        ))),
        None => Err(format!("invalid {} '{}'", field, cell)),
    }
}

/// Read a row through a header mapping.
fn mapped_fields(
    cells: &[String],
    mapping: &ColumnMapping,
    options: &ParseOptions,
    decimal_comma: bool,
    line: &str,
) -> Result<RowFields, String> {
    let confidence = 0.6 + 0.4 * mapping.confidence;

    let length = measure(mapping, Field::Length, cells, options, decimal_comma, confidence)?;
    let width = measure(mapping, Field::Width, cells, options, decimal_comma, confidence)?;
    // A bad thickness cell falls back to the default thickness.
    let thickness = measure(mapping, Field::Thickness, cells, options, decimal_comma, confidence)
        .unwrap_or(None);

    let quantity = match mapping.cell(Field::Quantity, cells) {
        Some(cell) => match parse_measure(cell, decimal_comma) {
            Some((q, _)) => Some(Sourced::new(q, confidence)),
            None => return Err(format!("invalid quantity '{}'", cell)),
        },
        None => None,
    };

    let label = mapping.cell(Field::Label, cells).map(str::to_string);
    let notes = mapping.cell(Field::Notes, cells).map(str::to_string);
    let drilling = [label.as_deref(), notes.as_deref()]
        .into_iter()
        .flatten()
        .find(|text| DRILL_HINT_RE.is_match(text))
        .map(|_| line.trim().to_string());

    Ok(RowFields {
        quantity,
        length,
        width,
        thickness,
        material: mapping
            .cell(Field::Material, cells)
            .map(|m| Sourced::new(m.to_string(), confidence)),
        label,
        notes,
        grain: mapping
            .cell(Field::Grain, cells)
            .is_some_and(|g| GRAIN_CELLS.contains(&g.to_lowercase().as_str())),
        edge_banding: mapping
            .cell(Field::EdgeBanding, cells)
            .and_then(parse_edge_code),
        grooving: mapping
            .cell(Field::Groove, cells)
            .filter(|g| !is_negative(g))
            .map(str::to_string),
        drilling,
    })
}
