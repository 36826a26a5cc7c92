use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

const TOTAL_KEYWORDS: &[&str] = &["total", "subtotal", "net income", "net loss", "balance"];
const REVENUE_KEYWORDS: &[&str] = &["revenue", "sales"];
const COGS_KEYWORDS: &[&str] = &["cogs", "cost of goods", "cost of revenue"];
const GROSS_PROFIT_KEYWORDS: &[&str] = &["gross profit"];

static NEGATIVE_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\((.+)\)$").unwrap());
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([-+]?\d+(?:\.\d+)?)%$").unwrap());
static STRIP_NON_NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.+-]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub message: String,
    pub row: Option<usize>,
    pub column: Option<usize>,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(message: String, row: Option<usize>, column: Option<usize>) -> Self {
        Self {
            message,
            row,
            column,
            severity: Severity::Error,
        }
    }

    fn warning(message: String) -> Self {
        Self {
            message,
            row: None,
            column: None,
            severity: Severity::Warning,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableValidationResult {
    pub confidence: f64,
    pub issues: Vec<ValidationIssue>,
}

impl TableValidationResult {
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn requires_review(&self) -> bool {
        !self.is_valid() || self.confidence < 0.65
    }
}

fn normalize(text: Option<&str>) -> String {
    let text = text.unwrap_or("").trim().to_lowercase();
    WHITESPACE_RE.replace_all(&text, " ").to_string()
}

/// Parses cell text into a number, handling thousands separators,
/// parenthesized negatives, and trailing `%` (spec §4.12).
pub fn parse_numeric(cell: Option<&str>) -> Option<f64> {
    let cell = cell?;
    let text = cell.trim();
    if text.is_empty() {
        return None;
    }
    let mut text = text.replace(',', "");
    let mut sign = 1.0;
    if let Some(caps) = NEGATIVE_PAREN_RE.captures(&text) {
        text = caps.get(1)?.as_str().to_string();
        sign = -1.0;
    }

    if let Some(caps) = PERCENT_RE.captures(&text) {
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        return Some(sign * value / 100.0);
    }

    let cleaned = STRIP_NON_NUMERIC_RE.replace_all(&text, "").to_string();
    if cleaned.matches('-').count() > 1 || cleaned.is_empty() || cleaned == "+" || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok().map(|v| sign * v)
}

/// Mirrors Python's `math.isclose`: `|a-b| <= max(rel_tol * max(|a|,|b|), abs_tol)`.
fn is_close(value: f64, expected: f64, rel_tol: f64, abs_tol: f64) -> bool {
    (value - expected).abs() <= (rel_tol * value.abs().max(expected.abs())).max(abs_tol)
}

fn first_matching_index(label_to_index: &HashMap<String, usize>, keywords: &[&str]) -> Option<usize> {
    for keyword in keywords {
        for (label, index) in label_to_index {
            if label.contains(keyword) {
                return Some(*index);
            }
        }
    }
    None
}

/// Row-total and gross-profit reasonableness checks (spec §4.12).
pub fn validate_table(headers: &[String], rows: &[Vec<Option<String>>]) -> TableValidationResult {
    let numeric_rows: Vec<Vec<Option<f64>>> = rows
        .iter()
        .map(|row| row.iter().map(|c| parse_numeric(c.as_deref())).collect())
        .collect();

    let mut issues = Vec::new();
    let mut checks_performed = 0u32;
    let mut checks_passed = 0u32;

    let mut running_totals: Vec<f64> = Vec::new();
    for (row_index, (raw_row, numeric_row)) in rows.iter().zip(numeric_rows.iter()).enumerate() {
        let label = normalize(raw_row.first().and_then(|c| c.as_deref()));
        if numeric_row.len() > running_totals.len() {
            running_totals.resize(numeric_row.len(), 0.0);
        }

        if TOTAL_KEYWORDS.iter().any(|k| label.contains(k)) {
            for column_index in 1..numeric_row.len() {
                let Some(value) = numeric_row[column_index] else { continue };
                let expected = running_totals[column_index];
                checks_performed += 1;
                if is_close(value, expected, 0.02, 1.0) {
                    checks_passed += 1;
                } else {
                    let column_label = headers
                        .get(column_index)
                        .cloned()
                        .unwrap_or_else(|| column_index.to_string());
                    issues.push(ValidationIssue::error(
                        format!("Total in column {column_label} is {value} but expected {expected:.2}"),
                        Some(row_index),
                        Some(column_index),
                    ));
                }
            }
            running_totals.iter_mut().for_each(|v| *v = 0.0);
            continue;
        }

        if label.is_empty() {
            running_totals.iter_mut().for_each(|v| *v = 0.0);
            continue;
        }

        if GROSS_PROFIT_KEYWORDS.iter().any(|k| label.contains(k)) {
            continue;
        }

        for column_index in 1..numeric_row.len() {
            if let Some(value) = numeric_row[column_index] {
                running_totals[column_index] += value;
            }
        }
    }

    let mut label_to_index: HashMap<String, usize> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        if row.is_empty() {
            continue;
        }
        label_to_index.insert(normalize(row.first().and_then(|c| c.as_deref())), idx);
    }

    let revenue_idx = first_matching_index(&label_to_index, REVENUE_KEYWORDS);
    let cogs_idx = first_matching_index(&label_to_index, COGS_KEYWORDS);
    let gross_idx = first_matching_index(&label_to_index, GROSS_PROFIT_KEYWORDS);

    if let (Some(revenue_idx), Some(cogs_idx), Some(gross_idx)) = (revenue_idx, cogs_idx, gross_idx) {
        let rev_row = &numeric_rows[revenue_idx];
        let cogs_row = &numeric_rows[cogs_idx];
        let gross_row = &numeric_rows[gross_idx];
        let width = rev_row.len().min(cogs_row.len()).min(gross_row.len());
        for column_index in 1..width {
            let (Some(rev), Some(cogs), Some(gross)) =
                (rev_row[column_index], cogs_row[column_index], gross_row[column_index])
            else {
                continue;
            };
            checks_performed += 1;
            let expected = if cogs < 0.0 { rev + cogs } else { rev - cogs };
            if is_close(gross, expected, 0.03, 1.5) {
                checks_passed += 1;
            } else {
                issues.push(ValidationIssue::error(
                    format!("Gross profit {gross:.2} does not match revenue minus COGS {expected:.2}"),
                    Some(gross_idx),
                    Some(column_index),
                ));
            }
        }
    }

    let numeric_cells = numeric_rows
        .iter()
        .flat_map(|row| row.iter().skip(1))
        .filter(|v| v.is_some())
        .count();

    let confidence = if numeric_cells == 0 {
        issues.push(ValidationIssue::warning("Table lacks numeric data to validate".into()));
        0.2
    } else if checks_performed == 0 {
        0.55
    } else {
        let mut confidence = (checks_passed as f64 / checks_performed as f64).clamp(0.1, 0.99);
        if checks_performed >= 3 {
            confidence = (confidence + 0.1).min(0.99);
        }
        confidence
    };

    TableValidationResult {
        confidence: (confidence * 1000.0).round() / 1000.0,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parentheses_and_percent() {
        assert_eq!(parse_numeric(Some("(1,234.50)")), Some(-1234.50));
        assert_eq!(parse_numeric(Some("12.5%")), Some(0.125));
        assert_eq!(parse_numeric(Some("")), None);
    }

    #[test]
    fn row_total_matches_running_sum() {
        let headers = vec!["Line".to_string(), "Q1".to_string()];
        let rows = vec![
            vec![Some("Revenue".to_string()), Some("100".to_string())],
            vec![Some("COGS".to_string()), Some("(40)".to_string())],
            vec![Some("Total".to_string()), Some("60".to_string())],
        ];
        let result = validate_table(&headers, &rows);
        assert!(result.is_valid());
        assert!(!result.requires_review());
    }

    #[test]
    fn mismatched_total_is_flagged_as_error() {
        let headers = vec!["Line".to_string(), "Q1".to_string()];
        let rows = vec![
            vec![Some("Revenue".to_string()), Some("100".to_string())],
            vec![Some("Total".to_string()), Some("999".to_string())],
        ];
        let result = validate_table(&headers, &rows);
        assert!(!result.is_valid());
        assert!(result.requires_review());
    }

    #[test]
    fn table_without_numeric_cells_gets_low_confidence() {
        let headers = vec!["Line".to_string()];
        let rows = vec![vec![Some("Notes".to_string())]];
        let result = validate_table(&headers, &rows);
        assert_eq!(result.confidence, 0.2);
        assert!(result.requires_review());
    }
}
