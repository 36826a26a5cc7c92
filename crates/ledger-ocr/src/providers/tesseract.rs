use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ledger_core::model::OcrCell;
use ledger_core::Error;
use tokio::process::Command;

use crate::provider::{parse_numeric_hint, OcrProvider, ProviderError, ProviderResult};

/// Local Tesseract OCR, grounded on the original's `pytesseract` wrapper —
/// which itself shells to the system `tesseract` binary. Page rasterization
/// is delegated to `pdftoppm` (poppler-utils) rather than a Rust PDF
/// renderer, matching the "detect the external tool with `which`, error
/// clearly if absent" texture already used for `qpdf` in the CAS layer.
pub struct TesseractLocalProvider {
    lang: String,
    tesseract_bin: PathBuf,
    pdftoppm_bin: PathBuf,
}

impl TesseractLocalProvider {
    pub fn new(lang: impl Into<String>) -> ledger_core::Result<Self> {
        let tesseract_bin = which::which("tesseract")
            .map_err(|_| Error::InvalidInput("tesseract binary not found on PATH".into()))?;
        let pdftoppm_bin = which::which("pdftoppm")
            .map_err(|_| Error::InvalidInput("pdftoppm binary not found on PATH".into()))?;
        Ok(Self {
            lang: lang.into(),
            tesseract_bin,
            pdftoppm_bin,
        })
    }
}

#[async_trait]
impl OcrProvider for TesseractLocalProvider {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn extract_cells(
        &self,
        document_path: &Path,
        max_pages: Option<i32>,
        _timeout_ms: Option<u64>,
    ) -> ProviderResult<Vec<OcrCell>> {
        let workdir = std::env::temp_dir().join(format!("ledger_ocr_{}", uuid_like()));
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| ProviderError::Other(Error::Fatal(format!("create ocr workdir failed: {e}"))))?;
        let prefix = workdir.join("page");

        let mut cmd = Command::new(&self.pdftoppm_bin);
        cmd.arg("-png").arg("-r").arg("200");
        if let Some(limit) = max_pages {
            cmd.arg("-f").arg("1").arg("-l").arg(limit.to_string());
        }
        cmd.arg(document_path).arg(&prefix);
        let output = cmd
            .output()
            .await
            .map_err(|e| ProviderError::Other(Error::Fatal(format!("spawn pdftoppm failed: {e}"))))?;
        if !output.status.success() {
            let _ = tokio::fs::remove_dir_all(&workdir).await;
            return Err(ProviderError::Other(Error::Transient(format!(
                "pdftoppm rasterization failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ))));
        }

        let mut pages: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(&workdir)
            .await
            .map_err(|e| ProviderError::Other(Error::Fatal(format!("read ocr workdir failed: {e}"))))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("png") {
                pages.push(entry.path());
            }
        }
        pages.sort();

        let mut cells = Vec::new();
        for (page_index, page_path) in pages.iter().enumerate() {
            let page_number = (page_index + 1) as i32;
            let output = Command::new(&self.tesseract_bin)
                .arg(page_path)
                .arg("stdout")
                .arg("-l")
                .arg(&self.lang)
                .output()
                .await
                .map_err(|e| ProviderError::Other(Error::Fatal(format!("spawn tesseract failed: {e}"))))?;
            if !output.status.success() {
                continue;
            }
            let text = String::from_utf8_lossy(&output.stdout);
            for (row_index, row_text) in text.lines().filter(|l| !l.trim().is_empty()).enumerate() {
                let mut columns: Vec<&str> = row_text.split('\t').map(str::trim).filter(|c| !c.is_empty()).collect();
                if columns.is_empty() {
                    columns.push(row_text);
                }
                for (column_index, column_text) in columns.iter().enumerate() {
                    let (is_numeric, numeric_value) = parse_numeric_hint(column_text);
                    cells.push(OcrCell {
                        page: page_number,
                        row: row_index as i32,
                        column: column_index as i32,
                        text: column_text.to_string(),
                        is_numeric,
                        numeric_value,
                    });
                }
            }
        }

        let _ = tokio::fs::remove_dir_all(&workdir).await;
        Ok(cells)
    }
}

fn uuid_like() -> String {
    format!("{}_{:?}", std::process::id(), std::time::Instant::now())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}
