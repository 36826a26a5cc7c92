use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

const KEYWORD_MARKERS: &[&str] = &[
    "revenue",
    "sales",
    "ebitda",
    "cogs",
    "cost of goods",
    "gross profit",
    "operating income",
    "operating loss",
    "net income",
    "net loss",
    "assets",
    "liabilities",
    "equity",
    "cash",
];

const TOTAL_ROW_MARKERS: &[&str] = &["total", "net income", "net loss", "subtotal", "balance"];

const CURRENCY_SIGNS: &[char] = &['$', '€', '£', '¥'];

static PERIOD_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"q[1-4]",
        r"quarter",
        r"fy\s*20\d{2}",
        r"ytd",
        r"year\s*ended",
        r"\d{4}\s*-\s*\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static period pattern"))
    .collect()
});

#[derive(Debug, Clone, Default)]
pub struct TableCandidate {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct FinancialDetectionResult {
    pub score: f64,
    /// Sorted by feature name (spec §4.12: "feature vector order is
    /// deterministic by sorted feature name").
    pub features: BTreeMap<&'static str, f64>,
    pub keyword_hits: Vec<&'static str>,
    pub is_financial: bool,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy)]
pub struct FinancialTableDetector {
    threshold: f64,
    low_confidence_threshold: f64,
}

impl Default for FinancialTableDetector {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            low_confidence_threshold: 0.3,
        }
    }
}

impl FinancialTableDetector {
    pub fn new(threshold: f64, low_confidence_threshold: f64) -> Self {
        Self {
            threshold,
            low_confidence_threshold,
        }
    }

    pub fn score(&self, candidate: &TableCandidate) -> FinancialDetectionResult {
        let headers: Vec<String> = candidate.headers.iter().map(|h| normalize_cell(Some(h))).collect();
        let rows: Vec<Vec<String>> = candidate
            .rows
            .iter()
            .map(|row| row.iter().map(|c| normalize_cell(c.as_deref())).collect())
            .collect();

        let numeric_density_header = numeric_density(&headers);
        let numeric_density_body = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|r| numeric_density(r)).sum::<f64>() / rows.len() as f64
        };
        let density_gradient = (numeric_density_body - numeric_density_header).max(0.0);

        let mut features = BTreeMap::new();
        features.insert("column_stability", column_count_stability(&headers, &rows));
        features.insert("density_gradient", density_gradient);
        features.insert("indentation", indentation_score(&candidate.rows));
        features.insert("periodized", periodized_column_score(&headers));
        features.insert("totals", total_row_score(&rows));
        features.insert("currency", currency_score(&candidate.rows));

        let keyword_hits = collect_keyword_hits(candidate);
        let score = self.combine_features(&features, keyword_hits.len());

        let confidence = if score >= self.threshold {
            Confidence::High
        } else if score >= self.low_confidence_threshold {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        FinancialDetectionResult {
            score,
            features,
            keyword_hits,
            is_financial: score >= self.low_confidence_threshold,
            confidence,
        }
    }

    fn combine_features(&self, features: &BTreeMap<&'static str, f64>, keyword_hit_count: usize) -> f64 {
        let weighted = features.get("column_stability").copied().unwrap_or(0.0) * 0.15
            + features.get("density_gradient").copied().unwrap_or(0.0) * 0.20
            + features.get("indentation").copied().unwrap_or(0.0) * 0.10
            + features.get("periodized").copied().unwrap_or(0.0) * 0.20
            + features.get("totals").copied().unwrap_or(0.0) * 0.15
            + features.get("currency").copied().unwrap_or(0.0) * 0.10;
        let keyword_bonus = (keyword_hit_count as f64 / 5.0).min(1.0);
        (weighted + 0.10 * keyword_bonus).clamp(0.0, 1.0)
    }
}

fn normalize_cell(cell: Option<&str>) -> String {
    cell.unwrap_or("").trim().to_lowercase()
}

fn numeric_density(row: &[String]) -> f64 {
    if row.is_empty() {
        return 0.0;
    }
    let numeric_cells = row.iter().filter(|c| c.chars().any(|ch| ch.is_ascii_digit())).count();
    numeric_cells as f64 / row.len() as f64
}

fn column_count_stability(headers: &[String], rows: &[Vec<String>]) -> f64 {
    let header_cols = {
        let nonblank = headers.iter().filter(|h| !h.is_empty()).count();
        if nonblank > 0 {
            nonblank
        } else {
            headers.len()
        }
    };
    if rows.is_empty() || header_cols == 0 {
        return 0.0;
    }
    let body_lengths: Vec<f64> = rows
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| {
            let nonblank = r.iter().filter(|c| !c.is_empty()).count();
            if nonblank > 0 {
                nonblank as f64
            } else {
                r.len() as f64
            }
        })
        .collect();
    if body_lengths.is_empty() {
        return 0.0;
    }
    let avg_body = body_lengths.iter().sum::<f64>() / body_lengths.len() as f64;
    let variance = if body_lengths.len() > 1 {
        let mean = avg_body;
        body_lengths.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / body_lengths.len() as f64
    } else {
        0.0
    };
    let header_cols = header_cols as f64;
    let mut stability = 1.0 - ((avg_body - header_cols).abs() / header_cols.max(1.0)).min(1.0);
    stability *= 1.0 - (variance / header_cols.max(1.0).powi(2)).min(1.0);
    stability.clamp(0.0, 1.0)
}

fn indentation_score(rows: &[Vec<Option<String>>]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let mut levels = std::collections::HashSet::new();
    let mut any = false;
    for row in rows {
        let Some(first) = row.first() else { continue };
        let first = first.clone().unwrap_or_default();
        let indent = (first.len() - first.trim_start().len()) as i64;
        let bullets = first.matches('·').count() as i64 + first.matches('-').count() as i64;
        levels.insert((indent + bullets).min(4));
        any = true;
    }
    if !any {
        return 0.0;
    }
    (levels.len() as f64 / 4.0).min(1.0)
}

fn periodized_column_score(headers: &[String]) -> f64 {
    if headers.is_empty() {
        return 0.0;
    }
    let matches = headers
        .iter()
        .filter(|h| PERIOD_MARKERS.iter().any(|re| re.is_match(h)))
        .count();
    (matches as f64 / headers.len().max(1) as f64).min(1.0)
}

fn total_row_score(rows: &[Vec<String>]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let last_rows = &rows[rows.len().saturating_sub(3)..];
    let hits = last_rows
        .iter()
        .filter(|row| {
            row.iter()
                .any(|cell| !cell.is_empty() && TOTAL_ROW_MARKERS.iter().any(|m| cell.contains(m)))
        })
        .count();
    (hits as f64 / last_rows.len().max(1) as f64).min(1.0)
}

fn currency_score(rows: &[Vec<Option<String>>]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let total_cells = rows.iter().map(|r| r.len()).sum::<usize>().max(1);
    let mut currency_cells = 0usize;
    let mut negative_paren = 0usize;
    for row in rows {
        for cell in row {
            let text = cell.clone().unwrap_or_default();
            if text.chars().any(|c| CURRENCY_SIGNS.contains(&c)) {
                currency_cells += 1;
            }
            if text.contains('(') && text.contains(')') && text.chars().any(|c| c.is_ascii_digit()) {
                negative_paren += 1;
            }
        }
    }
    let density = currency_cells as f64 / total_cells as f64;
    let negative_bonus = (negative_paren as f64 / rows.len().max(1) as f64).min(0.5);
    (density + negative_bonus).clamp(0.0, 1.0)
}

fn collect_keyword_hits(candidate: &TableCandidate) -> Vec<&'static str> {
    let mut hits = Vec::new();
    let mut cells: Vec<Option<String>> = candidate.headers.iter().cloned().map(Some).collect();
    for row in &candidate.rows {
        cells.extend(row.iter().cloned());
    }
    for cell in &cells {
        let normalized = normalize_cell(cell.as_deref());
        if let Some(keyword) = KEYWORD_MARKERS.iter().find(|k| normalized.contains(*k)) {
            hits.push(*keyword);
        }
        let raw = cell.clone().unwrap_or_default();
        if raw.chars().any(|c| CURRENCY_SIGNS.contains(&c)) {
            hits.push("currency");
        }
        if raw.contains('(') && raw.contains(')') {
            hits.push("parentheses");
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> TableCandidate {
        TableCandidate {
            headers: vec!["Line Item".into(), "Q1 2024".into(), "Q2 2024".into()],
            rows: vec![
                vec![Some("Revenue".into()), Some("$100".into()), Some("$120".into())],
                vec![Some("COGS".into()), Some("($40)".into()), Some("($45)".into())],
                vec![Some("Total".into()), Some("$60".into()), Some("$75".into())],
            ],
        }
    }

    #[test]
    fn financial_looking_table_scores_high() {
        let detector = FinancialTableDetector::default();
        let result = detector.score(&candidate());
        assert!(result.score > 0.3, "score was {}", result.score);
        assert!(result.is_financial);
    }

    #[test]
    fn empty_table_scores_zero() {
        let detector = FinancialTableDetector::default();
        let result = detector.score(&TableCandidate::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn features_are_sorted_by_name() {
        let detector = FinancialTableDetector::default();
        let result = detector.score(&candidate());
        let keys: Vec<&&str> = result.features.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
