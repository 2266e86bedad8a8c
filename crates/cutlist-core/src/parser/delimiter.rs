//! Delimiter detection and row splitting.

use cutlist_extractors::tokenizer::DELIMITERS;

/// Pick the delimiter with the highest count in `line`.
///
/// Ties resolve in the order tab, `|`, `;`, `,`. Returns `None` when the line
/// contains none of them.
pub fn detect_delimiter(line: &str) -> Option<char> {
    let mut best: Option<(char, usize)> = None;
    for delimiter in DELIMITERS {
        let count = line.matches(delimiter).count();
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((delimiter, count));
        }
    }
    best.map(|(d, _)| d)
}

/// Whether most lines split into the same number of cells as the first.
///
/// Requires at least `min_delimiters` occurrences in the first line so that a
/// stray comma in free text does not turn it into a table.
pub fn is_consistent(lines: &[String], delimiter: char, min_delimiters: usize) -> bool {
    let Some(first) = lines.first() else {
        return false;
    };
    let expected = first.matches(delimiter).count();
    if expected < min_delimiters {
        return false;
    }
    let matching = lines
        .iter()
        .filter(|l| l.matches(delimiter).count() == expected)
        .count();
    matching * 10 >= lines.len() * 8
}

/// Split one delimited line into trimmed cells, honoring quotes.
pub fn split_row(line: &str, delimiter: char) -> Vec<String> {
    if !delimiter.is_ascii() {
        return line.split(delimiter).map(|c| c.trim().to_string()).collect();
    }
    let tightened = tighten(line, delimiter);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(tightened.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(|c| c.to_string()).collect(),
        // Unbalanced quotes and the like: fall back to a plain split.
        _ => line.split(delimiter).map(|c| c.trim().to_string()).collect(),
    }
}

/// Drop whitespace around delimiters outside quotes so that a quoted cell
/// after `, ` is still recognized as quoted.
fn tighten(line: &str, delimiter: char) -> String {
    let pad = |c: char| c.is_whitespace() && c != delimiter;
    let mut out = String::with_capacity(line.len());
    let mut in_quotes = false;
    let mut skip_pad = true;
    for ch in line.chars() {
        if !in_quotes && ch == delimiter {
            out.truncate(out.trim_end_matches(pad).len());
            out.push(ch);
            skip_pad = true;
            continue;
        }
        if skip_pad && !in_quotes && pad(ch) {
            continue;
        }
        skip_pad = false;
        if ch == '"' {
            in_quotes = !in_quotes;
        }
        out.push(ch);
    }
    out.truncate(out.trim_end_matches(pad).len());
    out
}
