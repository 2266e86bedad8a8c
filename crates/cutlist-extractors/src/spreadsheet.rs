//! Spreadsheet normalization using calamine.

use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::{debug, warn};

use crate::error::{ExtractError, ExtractResult};
use crate::types::{InputKind, NormalizedInput, RawInput};
use crate::Normalizer;

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.replace('\t', " ").trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

/// Read the first non-empty worksheet as tab-separated lines.
///
/// Returns the sheet name with its lines.
pub fn read_first_sheet(bytes: &[u8]) -> ExtractResult<(String, Vec<String>)> {
    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    for sheet_name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(e) => {
                warn!(sheet = %sheet_name, error = %e, "Skipping unreadable worksheet");
                continue;
            }
        };

        let lines: Vec<String> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .map(|cells| cells.join("\t"))
            .collect();

        if !lines.is_empty() {
            debug!(sheet = %sheet_name, rows = lines.len(), "Read worksheet");
            return Ok((sheet_name, lines));
        }
    }

    Err(ExtractError::EmptyContent)
}

/// Normalizer for Excel and OpenDocument workbooks.
///
/// Only the first non-empty sheet is used; rows become tab-separated lines so
/// downstream delimiter detection treats them like any other table.
#[derive(Debug, Clone, Default)]
pub struct SpreadsheetNormalizer;

impl SpreadsheetNormalizer {
    /// Create a new spreadsheet normalizer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Normalizer for SpreadsheetNormalizer {
    async fn normalize(&self, raw: &RawInput, kind: &InputKind) -> ExtractResult<NormalizedInput> {
        let bytes = raw.bytes.clone();
        let (sheet, lines) = tokio::task::spawn_blocking(move || read_first_sheet(&bytes)).await??;
        Ok(NormalizedInput::from_lines(kind.clone(), lines).with_metadata("sheet", sheet))
    }

    fn handles(&self, kind: &InputKind) -> bool {
        matches!(kind, InputKind::Excel)
    }

    fn name(&self) -> &str {
        "spreadsheet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_string_integral_float() {
        assert_eq!(cell_to_string(&Data::Float(600.0)), "600");
        assert_eq!(cell_to_string(&Data::Float(18.5)), "18.5");
        assert_eq!(cell_to_string(&Data::String(" a\tb ".to_string())), "a b");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn test_garbage_workbook_errors() {
        let result = read_first_sheet(b"definitely not a workbook");
        assert!(matches!(result, Err(ExtractError::Spreadsheet(_))));
    }
}
