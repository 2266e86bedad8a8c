//! Line tokenizer producing the uniform token stream.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Token;

/// Characters treated as field delimiters inside a line.
pub const DELIMITERS: [char; 4] = ['\t', '|', ';', ','];

static DIM_CHAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?(?:(?:[x×*]|\s+[x×*]\s+|\s+by\s+)\d+(?:\.\d+)?)+")
        .expect("valid regex")
});

static DIM_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:[x×*]|\bby\b)\s*").expect("valid regex"));

static DIMENSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?(?:x\d+(?:\.\d+)?)+)([a-z]*)$").expect("valid regex")
});

static LEADING_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(.*)$").expect("valid regex"));

/// Collapse `600 x 400`, `600 × 400` and `600 by 400` into `600x400`.
///
/// A separator must either touch both numbers or be surrounded by spaces, so a
/// trailing quantity marker such as `400 x2` is left alone.
pub fn join_dimensions(line: &str) -> String {
    DIM_CHAIN_RE
        .replace_all(line, |caps: &regex::Captures<'_>| {
            DIM_SEPARATOR_RE.replace_all(&caps[0], "x").into_owned()
        })
        .into_owned()
}

/// Tokenize a single normalized line.
pub fn tokenize_line(line: &str) -> Vec<Token> {
    let joined = join_dimensions(line);
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in joined.chars() {
        if DELIMITERS.contains(&ch) {
            flush_word(&mut current, &mut tokens);
            tokens.push(Token::Delimiter(ch));
        } else if ch.is_whitespace() {
            flush_word(&mut current, &mut tokens);
        } else {
            current.push(ch);
        }
    }
    flush_word(&mut current, &mut tokens);

    tokens
}

fn flush_word(current: &mut String, tokens: &mut Vec<Token>) {
    if current.is_empty() {
        return;
    }
    let word = std::mem::take(current);
    let word = word.trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | ':' | '"' | '\''));
    if word.is_empty() {
        return;
    }

    if let Some(caps) = DIMENSION_RE.captures(word) {
        let values: Vec<f64> = caps[1]
            .split(|c| c == 'x' || c == 'X')
            .filter_map(|v| v.parse().ok())
            .collect();
        tokens.push(Token::Dimension(values));
        if !caps[2].is_empty() {
            tokens.push(Token::Word(caps[2].to_string()));
        }
        return;
    }

    if let Some(caps) = LEADING_NUMBER_RE.captures(word) {
        if let Ok(n) = caps[1].parse::<f64>() {
            tokens.push(Token::Number(n));
            let rest = caps[2].trim_start_matches('.');
            if !rest.is_empty() {
                tokens.push(Token::Word(rest.to_string()));
            }
            return;
        }
    }

    tokens.push(Token::Word(word.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_group() {
        let tokens = tokenize_line("600 x 400 x 18 white");
        assert_eq!(tokens[0], Token::Dimension(vec![600.0, 400.0, 18.0]));
        assert_eq!(tokens[1], Token::Word("white".to_string()));
    }

    #[test]
    fn test_dimension_with_unit_suffix() {
        let tokens = tokenize_line("600x400mm");
        assert_eq!(
            tokens,
            vec![
                Token::Dimension(vec![600.0, 400.0]),
                Token::Word("mm".to_string())
            ]
        );
    }

    #[test]
    fn test_number_with_suffix() {
        let tokens = tokenize_line("2pcs 18mm");
        assert_eq!(
            tokens,
            vec![
                Token::Number(2.0),
                Token::Word("pcs".to_string()),
                Token::Number(18.0),
                Token::Word("mm".to_string())
            ]
        );
    }

    #[test]
    fn test_delimiters_are_tokens() {
        let tokens = tokenize_line("2 | 600 | 400");
        assert_eq!(
            tokens,
            vec![
                Token::Number(2.0),
                Token::Delimiter('|'),
                Token::Number(600.0),
                Token::Delimiter('|'),
                Token::Number(400.0)
            ]
        );
    }

    #[test]
    fn test_by_joins_dimensions() {
        assert_eq!(join_dimensions("600 by 400"), "600x400");
    }

    #[test]
    fn test_edge_code_word_kept() {
        let tokens = tokenize_line("L1W2 x2");
        assert_eq!(tokens[0], Token::Word("L1W2".to_string()));
        assert_eq!(tokens[1], Token::Word("x2".to_string()));
    }
}
