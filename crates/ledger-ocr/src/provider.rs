use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ledger_core::model::OcrCell;
use ledger_core::Error;

/// Distinguishes a provider's throttle signal (with an optional
/// provider-supplied `Retry-After`) from every other failure, so the
/// runtime can apply its own backoff instead of the generic `is_retriable`
/// path (spec §4.8).
#[derive(Debug)]
pub enum ProviderError {
    RateLimited { retry_after: Option<Duration> },
    Other(Error),
}

impl From<Error> for ProviderError {
    fn from(e: Error) -> Self {
        ProviderError::Other(e)
    }
}

impl ProviderError {
    pub fn into_error(self) -> Error {
        match self {
            ProviderError::RateLimited { .. } => Error::Throttled("ocr provider throttled".into()),
            ProviderError::Other(e) => e,
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Unified extraction interface over Azure layout, AWS Textract, and local
/// Tesseract (spec §4.8).
#[async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract_cells(
        &self,
        document_path: &Path,
        max_pages: Option<i32>,
        timeout_ms: Option<u64>,
    ) -> ProviderResult<Vec<OcrCell>>;
}

/// Best-effort numeric coercion for a cell's text, matching the original's
/// handling of thousands separators, trailing `%`, and accounting
/// parentheses for negatives.
pub fn parse_numeric_hint(text: &str) -> (bool, Option<f64>) {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return (false, None);
    }
    let mut cleaned = cleaned.replace(',', "");
    if let Some(stripped) = cleaned.strip_suffix('%') {
        if let Ok(value) = stripped.parse::<f64>() {
            return (true, Some(value / 100.0));
        }
        return (false, None);
    }
    if cleaned.starts_with('(') && cleaned.ends_with(')') {
        cleaned = format!("-{}", &cleaned[1..cleaned.len() - 1]);
    }
    match cleaned.parse::<f64>() {
        Ok(value) => (true, Some(value)),
        Err(_) => (false, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_percentages_and_parens() {
        assert_eq!(parse_numeric_hint("12.5%"), (true, Some(0.125)));
        assert_eq!(parse_numeric_hint("(1,234.5)"), (true, Some(-1234.5)));
        assert_eq!(parse_numeric_hint("n/a"), (false, None));
    }
}
