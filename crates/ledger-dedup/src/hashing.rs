use std::process::Command;

use ledger_core::Result;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct CasHashes {
    pub sha256_raw: String,
    pub sha256_canonical: Option<String>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Normalizes a PDF via `qpdf --deterministic-id` when available (detected
/// with `which`, the teacher's own dependency), so re-uploads that only
/// differ in producer metadata canonicalize to the same bytes. Returns
/// `None` when no normalizer is on PATH or normalization fails — the caller
/// treats that as "no canonical hash", not an error.
pub fn normalize_pdf(pdf_bytes: &[u8]) -> Option<Vec<u8>> {
    let qpdf = which::which("qpdf").ok()?;

    let dir = tempfile_dir()?;
    let source = dir.join("source.pdf");
    let dest = dir.join("normalized.pdf");
    std::fs::write(&source, pdf_bytes).ok()?;

    let status = Command::new(&qpdf)
        .arg("--deterministic-id")
        .arg(&source)
        .arg(&dest)
        .output();

    match status {
        Ok(out) if out.status.success() => std::fs::read(&dest).ok(),
        Ok(out) => {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&out.stderr),
                "qpdf normalization failed"
            );
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to spawn qpdf");
            None
        }
    }
}

fn tempfile_dir() -> Option<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("ledger_cas_{}", std::process::id()));
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

pub fn compute_pdf_hashes(pdf_bytes: &[u8], normalize: bool) -> Result<CasHashes> {
    let sha256_raw = sha256_hex(pdf_bytes);
    let sha256_canonical = if normalize {
        normalize_pdf(pdf_bytes).map(|bytes| sha256_hex(&bytes))
    } else {
        None
    };
    Ok(CasHashes {
        sha256_raw,
        sha256_canonical,
    })
}
