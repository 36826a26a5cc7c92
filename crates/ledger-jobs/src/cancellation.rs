use ledger_core::{Error, Result};

use crate::repository::DocumentRepository;

/// Checkpoint used before and after each major pipeline step (spec §4.11,
/// §5): re-reads `cancellation_requested` and raises `Error::JobCancelled`
/// (NOT retriable) if set. In-flight provider calls are never interrupted —
/// this only fires at call boundaries.
pub async fn checkpoint(repo: &dyn DocumentRepository, document_id: &str) -> Result<()> {
    let document = repo.load(document_id).await?;
    if document.cancellation_requested {
        return Err(Error::JobCancelled);
    }
    Ok(())
}
