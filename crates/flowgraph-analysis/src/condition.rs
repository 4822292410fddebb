//! Compound condition parsing.
//!
//! Rule conditions are free text that may join several atomic checks with a
//! logical operator ("hasError AND isRetryable"). Operators are detected in
//! a fixed priority order; the first pattern that splits the text into at
//! least two non-empty parts wins. Everything here is plain `str` scanning,
//! no regular expressions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Operators recognized inside compound conditions, in detection priority
/// order: word operators first, then the symbolic forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    /// Word-bounded `AND` (any case).
    And,
    /// Word-bounded `OR` (any case).
    Or,
    /// `+`
    Plus,
    /// `&`
    Ampersand,
    /// `|`
    Pipe,
}

impl ConditionOperator {
    /// Detection priority order.
    pub const PRIORITY: [ConditionOperator; 5] = [
        ConditionOperator::And,
        ConditionOperator::Or,
        ConditionOperator::Plus,
        ConditionOperator::Ampersand,
        ConditionOperator::Pipe,
    ];

    /// The operator token as written.
    pub fn token(&self) -> &'static str {
        match self {
            ConditionOperator::And => "AND",
            ConditionOperator::Or => "OR",
            ConditionOperator::Plus => "+",
            ConditionOperator::Ampersand => "&",
            ConditionOperator::Pipe => "|",
        }
    }

    /// Canonical joiner used when rendering: single spaces around the token.
    pub fn joiner(&self) -> &'static str {
        match self {
            ConditionOperator::And => " AND ",
            ConditionOperator::Or => " OR ",
            ConditionOperator::Plus => " + ",
            ConditionOperator::Ampersand => " & ",
            ConditionOperator::Pipe => " | ",
        }
    }

    /// Split `text` on this operator. Returns `None` when the operator does
    /// not occur at all; otherwise the raw (untrimmed) segments.
    fn split(&self, text: &str) -> Option<Vec<String>> {
        match self {
            ConditionOperator::And => split_word(text, "AND"),
            ConditionOperator::Or => split_word(text, "OR"),
            ConditionOperator::Plus => split_symbol(text, '+'),
            ConditionOperator::Ampersand => split_symbol(text, '&'),
            ConditionOperator::Pipe => split_symbol(text, '|'),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Result of decomposing a condition description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCondition {
    /// Whether an operator joined two or more parts.
    pub is_compound: bool,
    /// Trimmed, non-empty atomic parts in textual order.
    pub parts: Vec<String>,
    /// The detected operator, `None` for atomic or blank conditions.
    pub operator: Option<ConditionOperator>,
}

impl ParsedCondition {
    /// Result for blank input: no parts, no operator.
    pub fn empty() -> Self {
        Self {
            is_compound: false,
            parts: Vec::new(),
            operator: None,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split on a case-insensitive, word-bounded occurrence of `word`.
/// `None` when no bounded occurrence exists.
fn split_word(text: &str, word: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut segment_start = 0;
    let mut found = false;

    for (i, _) in text.char_indices() {
        if i < segment_start {
            continue;
        }
        let Some(candidate) = text.get(i..i + word.len()) else {
            continue;
        };
        if !candidate.eq_ignore_ascii_case(word) {
            continue;
        }
        let bounded_left = text[..i].chars().next_back().is_none_or(|c| !is_word_char(c));
        let bounded_right = text[i + word.len()..]
            .chars()
            .next()
            .is_none_or(|c| !is_word_char(c));
        if bounded_left && bounded_right {
            segments.push(text[segment_start..i].to_string());
            segment_start = i + word.len();
            found = true;
        }
    }

    if !found {
        return None;
    }
    segments.push(text[segment_start..].to_string());
    Some(segments)
}

/// Split on a symbolic operator character. `None` when absent.
fn split_symbol(text: &str, symbol: char) -> Option<Vec<String>> {
    if !text.contains(symbol) {
        return None;
    }
    Some(text.split(symbol).map(str::to_string).collect())
}


/// Decompose a condition description into atomic parts.
///
/// Blank input yields the empty result. A split that produces fewer than two
/// non-empty parts is not compound; detection falls through to the next
/// operator pattern and finally to a single-part result.
pub fn parse(description: &str) -> ParsedCondition {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return ParsedCondition::empty();
    }

    for op in ConditionOperator::PRIORITY {
        if let Some(raw) = op.split(trimmed) {
            let parts: Vec<String> = raw
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() >= 2 {
                return ParsedCondition {
                    is_compound: true,
                    parts,
                    operator: Some(op),
                };
            }
        }
    }

    ParsedCondition {
        is_compound: false,
        parts: vec![trimmed.to_string()],
        operator: None,
    }
}

/// Standardize spacing: the text is trimmed and runs of whitespace around
/// the detected operator collapse to the canonical single-space joiner.
/// Display-only, and parsing-invariant: the result parses to the same parts
/// and operator as the input. Text inside an atomic part is left alone.
pub fn normalize(description: &str) -> String {
    let parsed = parse(description);
    match parsed.operator {
        Some(op) => parsed.parts.join(op.joiner()),
        None => description.trim().to_string(),
    }
}

/// Check a condition description for caller mistakes.
///
/// Unlike [`parse`], which falls through lenient patterns until something
/// works, validation judges the first operator pattern present in the text.
pub fn validate(description: &str) -> AnalysisResult<()> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::EmptyDescription);
    }

    for op in ConditionOperator::PRIORITY {
        let Some(raw) = op.split(trimmed) else {
            continue;
        };
        let parts: Vec<&str> = raw.iter().map(|p| p.trim()).collect();
        let non_empty = parts.iter().filter(|p| !p.is_empty()).count();

        if non_empty < 2 {
            return Err(AnalysisError::DegenerateCompound {
                operator: op.token().to_string(),
            });
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(AnalysisError::EmptyOperand {
                operator: op.token().to_string(),
            });
        }
        return Ok(());
    }

    Ok(())
}

/// Render a condition through a key→text dictionary.
///
/// With `expand_compound` set, each atomic part is looked up (falling back
/// to the raw part when absent) and the parts are rejoined with the
/// canonical operator spacing. Otherwise the input is returned unchanged.
pub fn describe(
    description: &str,
    dictionary: &HashMap<String, String>,
    expand_compound: bool,
) -> String {
    if !expand_compound {
        return description.to_string();
    }

    let parsed = parse(description);
    if parsed.parts.is_empty() {
        return description.to_string();
    }

    let rendered: Vec<String> = parsed
        .parts
        .iter()
        .map(|part| dictionary.get(part).cloned().unwrap_or_else(|| part.clone()))
        .collect();

    match parsed.operator {
        Some(op) => rendered.join(op.joiner()),
        None => rendered.into_iter().next().unwrap_or_default(),
    }
}
