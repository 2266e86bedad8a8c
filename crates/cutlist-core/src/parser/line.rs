//! Positional inference for headerless rows and free-text lines.

use once_cell::sync::Lazy;
use regex::Regex;

use cutlist_extractors::Token;

use super::edge_banding::parse_inline_edge_code;
use super::fields::{unit_from_word, RowFields, Sourced};
use crate::types::{ParseOptions, Units};

static MATERIAL_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:mdf|hdf|ply(?:wood)?|melamine|mfc|chipboard|particle ?board|osb|oak|walnut|maple|birch|beech|ash|cherry|pine|veneer(?:ed)?|laminate|acrylic|white|black|grey|gray|wenge|sonoma|anthracite|[a-z]+board)\b",
    )
    .expect("valid regex")
});

static X_QUANTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[x×](\d+)$").expect("valid regex"));

const QUANTITY_SUFFIXES: &[&str] = &[
    "x", "pcs", "pc", "pce", "pces", "pieces", "piece", "off", "nos", "stk", "units", "ea",
];
const QUANTITY_PREFIXES: &[&str] = &["qty", "quantity", "q", "count"];
const THICKNESS_WORDS: &[&str] = &["thk", "thick", "thickness", "t"];
const GRAIN_WORDS: &[&str] = &["grain", "gl", "along", "vertical"];
const GROOVE_WORDS: &[&str] = &["grv", "groove", "grooved", "grooving", "rebate", "dado"];
const DRILL_WORDS: &[&str] = &["hinge", "hinges", "drill", "drilled", "drilling", "holes"];
const FILLER_WORDS: &[&str] = &["of", "at", "by", "and", "the", "with", "a", "an", "@", "-", "=", "&"];

/// Confidence for values read by position alone.
const POSITIONAL_CONFIDENCE: f64 = 0.85;
/// Confidence for the three-number rule, which has to guess.
const AMBIGUOUS_CONFIDENCE: f64 = 0.75;
/// Confidence for values introduced by an explicit marker.
const MARKED_CONFIDENCE: f64 = 0.95;
/// Confidence for values from an `AxB` dimension group.
const DIMENSION_GROUP_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Quantity,
    Thickness,
}

/// Everything recognized in one row's tokens.
#[derive(Debug, Default)]
struct Scan {
    before: Vec<f64>,
    after: Vec<f64>,
    dims: Option<Vec<f64>>,
    dim_unit: Option<Units>,
    quantity: Option<f64>,
    thickness: Option<(f64, Option<Units>)>,
    runs: Vec<String>,
    grain: bool,
    edge_banding: Option<crate::types::EdgeBanding>,
    grooving: bool,
    drilling: bool,
}

impl Scan {
    fn push_number(&mut self, n: f64) {
        if self.dims.is_some() {
            self.after.push(n);
        } else {
            self.before.push(n);
        }
    }

    fn last_number(&self) -> Option<f64> {
        if self.dims.is_some() {
            self.after.last().copied()
        } else {
            self.before.last().copied()
        }
    }

    fn pop_number(&mut self) -> Option<f64> {
        if self.dims.is_some() {
            self.after.pop()
        } else {
            self.before.pop()
        }
    }
}

fn is_count(n: f64) -> bool {
    n >= 1.0 && n.fract() == 0.0 && n <= 1000.0
}

/// Walk the cells of a row and collect numbers, markers and text runs.
fn scan(cells: &[Vec<Token>]) -> Scan {
    let mut scan = Scan::default();
    let mut run: Vec<String> = Vec::new();
    let mut pending: Option<Pending> = None;

    let close_run = |run: &mut Vec<String>, runs: &mut Vec<String>| {
        if !run.is_empty() {
            runs.push(run.join(" "));
            run.clear();
        }
    };

    for cell in cells {
        close_run(&mut run, &mut scan.runs);
        // Whether the previous token in this cell was a number we kept.
        let mut last_pushed = false;
        let mut last_was_dims = false;

        for token in cell {
            match token {
                Token::Number(n) => {
                    close_run(&mut run, &mut scan.runs);
                    match pending.take() {
                        Some(Pending::Quantity) => scan.quantity = Some(*n),
                        Some(Pending::Thickness) => scan.thickness = Some((*n, None)),
                        None => {
                            scan.push_number(*n);
                            last_pushed = true;
                            last_was_dims = false;
                            continue;
                        }
                    }
                    last_pushed = false;
                    last_was_dims = false;
                }
                Token::Dimension(values) => {
                    close_run(&mut run, &mut scan.runs);
                    pending = None;
                    if scan.dims.is_none() {
                        scan.dims = Some(values.clone());
                        last_was_dims = true;
                    } else {
                        last_was_dims = false;
                    }
                    last_pushed = false;
                }
                Token::Delimiter(_) => {
                    close_run(&mut run, &mut scan.runs);
                    pending = None;
                    last_pushed = false;
                    last_was_dims = false;
                }
                Token::Word(word) => {
                    let lower = word.to_lowercase();
                    let lower = lower.trim_end_matches(|c| matches!(c, '.' | ':' | ','));
                    let after_number = last_pushed;
                    let after_dims = last_was_dims;
                    last_pushed = false;
                    last_was_dims = false;

                    // The tokenizer splits `2L1W` into `2` and `L1W`.
                    if after_number {
                        let glued = scan
                            .last_number()
                            .and_then(|n| parse_inline_edge_code(&format!("{}{}", n, word)));
                        if let Some(banding) = glued {
                            close_run(&mut run, &mut scan.runs);
                            scan.pop_number();
                            scan.edge_banding = Some(banding);
                            continue;
                        }
                    }
                    if let Some(caps) = X_QUANTITY_RE.captures(lower) {
                        close_run(&mut run, &mut scan.runs);
                        scan.quantity = caps[1].parse().ok();
                        continue;
                    }
                    if after_number && scan.quantity.is_none() && QUANTITY_SUFFIXES.contains(&lower)
                    {
                        close_run(&mut run, &mut scan.runs);
                        scan.quantity = scan.pop_number();
                        continue;
                    }
                    if QUANTITY_PREFIXES.contains(&lower) {
                        close_run(&mut run, &mut scan.runs);
                        pending = Some(Pending::Quantity);
                        continue;
                    }
                    if THICKNESS_WORDS.contains(&lower) {
                        close_run(&mut run, &mut scan.runs);
                        if after_number {
                            scan.thickness = scan.pop_number().map(|t| (t, None));
                        } else {
                            pending = Some(Pending::Thickness);
                        }
                        continue;
                    }
                    if let Some(unit) = unit_from_word(lower) {
                        if after_dims {
                            scan.dim_unit = Some(unit);
                            continue;
                        }
                        if after_number {
                            // `18mm` after a dimension group is the thickness.
                            if scan.dims.is_some() && scan.thickness.is_none() {
                                scan.thickness = scan.pop_number().map(|t| (t, Some(unit)));
                            }
                            continue;
                        }
                    }
                    pending = None;

                    if GRAIN_WORDS.contains(&lower) {
                        close_run(&mut run, &mut scan.runs);
                        scan.grain = true;
                        continue;
                    }
                    if GROOVE_WORDS.contains(&lower) {
                        close_run(&mut run, &mut scan.runs);
                        scan.grooving = true;
                        continue;
                    }
                    if DRILL_WORDS.contains(&lower) {
                        close_run(&mut run, &mut scan.runs);
                        scan.drilling = true;
                        continue;
                    }
                    if let Some(banding) = parse_inline_edge_code(word) {
                        close_run(&mut run, &mut scan.runs);
                        scan.edge_banding = Some(banding);
                        continue;
                    }
                    if run.is_empty() && FILLER_WORDS.contains(&lower) {
                        continue;
                    }
                    run.push(word.clone());
                }
            }
        }
    }
    close_run(&mut run, &mut scan.runs);
    scan
}

/// Infer part fields from a row without a usable header.
///
/// `source_text` is the original row, used as the description of any
/// recognized groove or drilling operation.
pub(crate) fn infer_fields(
    cells: &[Vec<Token>],
    source_text: &str,
    options: &ParseOptions,
) -> Result<RowFields, String> {
    let mut scan = scan(cells);
    let mut fields = RowFields {
        grain: scan.grain,
        edge_banding: scan.edge_banding,
        grooving: scan.grooving.then(|| source_text.trim().to_string()),
        drilling: scan.drilling.then(|| source_text.trim().to_string()),
        ..Default::default()
    };

    let units = options.units;
    if let Some(q) = scan.quantity {
        fields.quantity = Some(Sourced::new(q, MARKED_CONFIDENCE));
    }
    if let Some((t, unit)) = scan.thickness {
        fields.thickness = Some(Sourced::new(
            unit.unwrap_or(units).to_mm(t),
            MARKED_CONFIDENCE,
        ));
    }

    match scan.dims.take() {
        Some(dims) => {
            let dim_units = scan.dim_unit.unwrap_or(units);
            let (l, w, t, q) = match dims.as_slice() {
                [l, w] => (*l, *w, None, None),
                [l, w, t] if *t <= 100.0 => (*l, *w, Some(*t), None),
                [q, l, w] if is_count(*q) => (*l, *w, None, Some(*q)),
                [l, w, _] => (*l, *w, None, None),
                [q, l, w, t, ..] if is_count(*q) => (*l, *w, Some(*t), Some(*q)),
                [l, w, t, ..] => (*l, *w, Some(*t), None),
                _ => return Err("incomplete dimension group".to_string()),
            };
            fields.length = Some(Sourced::new(dim_units.to_mm(l), DIMENSION_GROUP_CONFIDENCE));
            fields.width = Some(Sourced::new(dim_units.to_mm(w), DIMENSION_GROUP_CONFIDENCE));
            if let (Some(t), None) = (t, &fields.thickness) {
                fields.thickness = Some(Sourced::new(
                    dim_units.to_mm(t),
                    DIMENSION_GROUP_CONFIDENCE,
                ));
            }
            if let (Some(q), None) = (q, &fields.quantity) {
                fields.quantity = Some(Sourced::new(q, POSITIONAL_CONFIDENCE));
            }

            if fields.quantity.is_none() {
                if let Some(q) = scan.before.iter().copied().find(|n| is_count(*n)) {
                    fields.quantity = Some(Sourced::new(q, POSITIONAL_CONFIDENCE));
                }
            }
            for n in scan.after.iter().copied() {
                if fields.thickness.is_none() && (3.0..=100.0).contains(&n) {
                    fields.thickness = Some(Sourced::new(units.to_mm(n), AMBIGUOUS_CONFIDENCE));
                } else if fields.quantity.is_none() && is_count(n) {
                    fields.quantity = Some(Sourced::new(n, AMBIGUOUS_CONFIDENCE));
                }
            }
        }
        None => {
            let numbers = &scan.before;
            let explicit_quantity = fields.quantity.is_some();
            let positional = |v: f64| Sourced::new(units.to_mm(v), POSITIONAL_CONFIDENCE);
            match (explicit_quantity, numbers.as_slice()) {
                (_, []) | (_, [_]) => return Err("no dimensions found".to_string()),
                (_, [l, w]) => {
                    fields.length = Some(positional(*l));
                    fields.width = Some(positional(*w));
                }
                (true, [l, w, t, ..]) => {
                    fields.length = Some(positional(*l));
                    fields.width = Some(positional(*w));
                    if fields.thickness.is_none() {
                        fields.thickness = Some(positional(*t));
                    }
                }
                (false, [a, b, c]) => {
                    let guess = |v: f64| Sourced::new(units.to_mm(v), AMBIGUOUS_CONFIDENCE);
                    if *c <= 50.0 && *a > 50.0 {
                        fields.length = Some(guess(*a));
                        fields.width = Some(guess(*b));
                        if fields.thickness.is_none() {
                            fields.thickness = Some(guess(*c));
                        }
                    } else {
                        fields.quantity = Some(Sourced::new(*a, AMBIGUOUS_CONFIDENCE));
                        fields.length = Some(guess(*b));
                        fields.width = Some(guess(*c));
                    }
                }
                (false, [q, l, w, t, ..]) => {
                    fields.quantity = Some(Sourced::new(*q, POSITIONAL_CONFIDENCE));
                    fields.length = Some(positional(*l));
                    fields.width = Some(positional(*w));
                    if fields.thickness.is_none() {
                        fields.thickness = Some(positional(*t));
                    }
                }
            }
        }
    }

    let mut runs = std::mem::take(&mut scan.runs);
    let material_index = runs.iter().position(|r| MATERIAL_HINT_RE.is_match(r));
    let material = match material_index {
        Some(i) => Some(Sourced::new(runs.remove(i), 0.9)),
        None if !runs.is_empty() => Some(Sourced::new(runs.remove(0), 0.8)),
        None => None,
    };
    fields.material = material;
    if !runs.is_empty() {
        fields.label = Some(runs.join(" "));
    }

    Ok(fields)
}

/// Split a token stream into cells at delimiter tokens.
pub(crate) fn split_cells(tokens: &[Token]) -> Vec<Vec<Token>> {
    tokens
        .split(|t| matches!(t, Token::Delimiter(_)))
        .map(|cell| cell.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutlist_extractors::tokenizer::tokenize_line;

    fn infer(line: &str) -> RowFields {
        let cells = split_cells(&tokenize_line(line));
        infer_fields(&cells, line, &ParseOptions::default()).unwrap()
    }

    fn value(field: &Option<Sourced<f64>>) -> Option<f64> {
        field.as_ref().map(|s| s.value)
    }

    #[test]
    fn test_four_numbers_positional() {
        let fields = infer("2 | 600 | 400 | 18 | WHITE");
        assert_eq!(value(&fields.quantity), Some(2.0));
        assert_eq!(value(&fields.length), Some(600.0));
        assert_eq!(value(&fields.width), Some(400.0));
        assert_eq!(value(&fields.thickness), Some(18.0));
        assert_eq!(fields.material.unwrap().value, "WHITE");
    }

    #[test]
    fn test_three_numbers() {
        let fields = infer("600 400 18");
        assert_eq!(value(&fields.length), Some(600.0));
        assert_eq!(value(&fields.thickness), Some(18.0));
        assert!(fields.quantity.is_none());

        let fields = infer("4 600 400");
        assert_eq!(value(&fields.quantity), Some(4.0));
        assert_eq!(value(&fields.length), Some(600.0));
        assert_eq!(value(&fields.width), Some(400.0));
    }

    #[test]
    fn test_quantity_markers() {
        assert_eq!(value(&infer("600x400 x2").quantity), Some(2.0));
        assert_eq!(value(&infer("2x 600x400").quantity), Some(2.0));
        assert_eq!(value(&infer("2pcs 600x400").quantity), Some(2.0));
        assert_eq!(value(&infer("qty 3 600x400").quantity), Some(3.0));
        assert_eq!(value(&infer("2 x 600x400").quantity), Some(2.0));
    }

    #[test]
    fn test_free_text_line() {
        let fields = infer("Side panel 720x560x18 white melamine 2pcs 2L1W grain");
        assert_eq!(value(&fields.length), Some(720.0));
        assert_eq!(value(&fields.width), Some(560.0));
        assert_eq!(value(&fields.thickness), Some(18.0));
        assert_eq!(value(&fields.quantity), Some(2.0));
        assert_eq!(fields.material.unwrap().value, "white melamine");
        assert_eq!(fields.label.as_deref(), Some("Side panel"));
        assert!(fields.grain);
        assert_eq!(fields.edge_banding.unwrap().count(), 3);
    }

    #[test]
    fn test_thickness_with_unit() {
        let fields = infer("600x400 18mm oak");
        assert_eq!(value(&fields.thickness), Some(18.0));
        assert_eq!(fields.material.unwrap().value, "oak");
    }

    #[test]
    fn test_dimension_units() {
        let cells = split_cells(&tokenize_line("60x40cm"));
        let fields = infer_fields(&cells, "60x40cm", &ParseOptions::default()).unwrap();
        assert_eq!(value(&fields.length), Some(600.0));
        assert_eq!(value(&fields.width), Some(400.0));
    }

    #[test]
    fn test_operations() {
        let fields = infer("Door 700x400 hinge drilling");
        assert!(fields.drilling.is_some());
        let fields = infer("Back 700x400 grv");
        assert_eq!(fields.grooving.as_deref(), Some("Back 700x400 grv"));
    }

    #[test]
    fn test_no_dimensions() {
        let cells = split_cells(&tokenize_line("white melamine 3"));
        assert!(infer_fields(&cells, "", &ParseOptions::default()).is_err());
    }
}
