use std::path::Path;

use ledger_core::{Error, Result};
use ledger_financial::{validate_table, FinancialTableDetector, TableCandidate, TableValidationResult};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

static COLUMN_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("static column-split pattern"));

/// A detected table, scored and validated, ready to become an `Artifact`.
pub struct ExtractedTable {
    pub page_number: i32,
    pub candidate: TableCandidate,
    pub score: f64,
    pub is_financial: bool,
    pub validation: TableValidationResult,
}

/// Single-engine table extraction: `pdftotext -layout` preserves column
/// whitespace well enough to split rows on runs of 2+ spaces, which is the
/// same heuristic poppler's own `-layout` mode is designed to support.
/// Consensus across multiple extraction engines is out of scope here (an
/// open question the distilled spec left unresolved); this single-engine
/// path is what "if enabled" falls back to when it is not.
pub async fn extract_tables(pdf_path: &Path, detector: &FinancialTableDetector) -> Result<Vec<ExtractedTable>> {
    let pdftotext = which::which("pdftotext")
        .map_err(|_| Error::Fatal("pdftotext (poppler-utils) not found on PATH".into()))?;

    let output = Command::new(pdftotext)
        .arg("-layout")
        .arg(pdf_path)
        .arg("-")
        .output()
        .await
        .map_err(|e| Error::Transient(format!("pdftotext failed to start: {e}")))?;
    if !output.status.success() {
        return Err(Error::Transient(format!("pdftotext exited with {}", output.status)));
    }
    let text = String::from_utf8_lossy(&output.stdout);

    let mut tables = Vec::new();
    for (page_index, page_text) in text.split('\x0c').enumerate() {
        let Some(candidate) = candidate_from_page(page_text) else { continue };
        if candidate.rows.len() < 2 {
            continue;
        }
        let result = detector.score(&candidate);
        let validation = validate_table(&candidate.headers, &candidate.rows);
        tables.push(ExtractedTable {
            page_number: (page_index + 1) as i32,
            score: result.score,
            is_financial: result.is_financial,
            validation,
            candidate,
        });
    }
    Ok(tables)
}

fn candidate_from_page(page_text: &str) -> Option<TableCandidate> {
    let lines: Vec<&str> = page_text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return None;
    }
    let split = |line: &str| -> Vec<Option<String>> {
        COLUMN_SPLIT_RE
            .split(line.trim())
            .map(|cell| {
                let cell = cell.trim();
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect()
    };

    let headers: Vec<String> = split(lines[0]).into_iter().map(|c| c.unwrap_or_default()).collect();
    if headers.len() < 2 {
        return None;
    }
    let rows: Vec<Vec<Option<String>>> = lines[1..].iter().map(|l| split(l)).collect();
    Some(TableCandidate { headers, rows })
}
