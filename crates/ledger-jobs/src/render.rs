use std::path::{Path, PathBuf};

use ledger_core::{Error, Result};
use tokio::process::Command;

/// Rasterizes a PDF to one PNG per page under `scratch_dir`, the way
/// `ledger-ocr`'s Tesseract provider rasterizes pages for local OCR — same
/// external tool (`pdftoppm`, poppler-utils), same "detect with `which` or
/// fail clearly" texture (spec §4.11 step 5: "Render previews to a bounded
/// scratch directory").
pub async fn render_previews(pdf_path: &Path, scratch_dir: &Path, dpi: u32, max_pages: Option<i32>) -> Result<Vec<PathBuf>> {
    let pdftoppm = which::which("pdftoppm")
        .map_err(|_| Error::Fatal("pdftoppm (poppler-utils) not found on PATH".into()))?;

    tokio::fs::create_dir_all(scratch_dir)
        .await
        .map_err(|e| Error::Transient(format!("failed to create scratch dir: {e}")))?;

    let prefix = scratch_dir.join("page");
    let mut cmd = Command::new(pdftoppm);
    cmd.arg("-png").arg("-r").arg(dpi.to_string());
    if let Some(max_pages) = max_pages {
        cmd.arg("-l").arg(max_pages.to_string());
    }
    cmd.arg(pdf_path).arg(&prefix);

    let status = cmd
        .status()
        .await
        .map_err(|e| Error::Transient(format!("pdftoppm failed to start: {e}")))?;
    if !status.success() {
        return Err(Error::Transient(format!("pdftoppm exited with {status}")));
    }

    let mut entries = tokio::fs::read_dir(scratch_dir)
        .await
        .map_err(|e| Error::Transient(format!("failed to read scratch dir: {e}")))?;
    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::Transient(format!("failed to iterate scratch dir: {e}")))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            pages.push(path);
        }
    }
    pages.sort();

    if pages.is_empty() {
        return Err(Error::Fatal("pdftoppm produced no preview pages".into()));
    }
    Ok(pages)
}
