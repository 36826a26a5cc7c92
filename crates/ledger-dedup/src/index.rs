use ledger_core::Result;
use ledger_kv::keys::{cas_phash_doc, cas_phash_page};
use ledger_kv::KvClient;

use crate::phash::phash_distance;

/// Persists the `(page_index, hash_hex) -> set(document_id)` index alongside
/// the per-document hash vector, for later lookup by `find_duplicate`.
pub async fn store(kv: &KvClient, document_id: &str, hashes: &[String]) -> Result<()> {
    if hashes.is_empty() {
        return Ok(());
    }
    let doc_key = cas_phash_doc(document_id);
    for (idx, hash_hex) in hashes.iter().enumerate() {
        kv.hset(&doc_key, &idx.to_string(), hash_hex).await?;
        kv.sadd(&cas_phash_page(idx, hash_hex), document_id).await?;
    }
    Ok(())
}

async fn candidate_ids(kv: &KvClient, hashes: &[String]) -> Result<std::collections::HashSet<String>> {
    let mut candidates = std::collections::HashSet::new();
    for (idx, hash_hex) in hashes.iter().enumerate() {
        let members = kv.smembers(&cas_phash_page(idx, hash_hex)).await?;
        candidates.extend(members);
    }
    Ok(candidates)
}

async fn load_candidate_hashes(kv: &KvClient, document_id: &str) -> Result<Vec<String>> {
    let stored = kv.hgetall(&cas_phash_doc(document_id)).await?;
    if stored.is_empty() {
        return Ok(Vec::new());
    }
    let max_index = stored
        .keys()
        .filter_map(|k| k.parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    let mut ordered = vec![String::new(); max_index + 1];
    for (k, v) in stored {
        if let Ok(idx) = k.parse::<usize>() {
            ordered[idx] = v;
        }
    }
    Ok(ordered)
}

fn within_threshold(target: &[String], candidate: &[String], max_hamming: u32) -> bool {
    if candidate.is_empty() {
        return false;
    }
    let compare_count = target.len().min(candidate.len());
    if compare_count == 0 {
        return false;
    }
    for idx in 0..compare_count {
        match phash_distance(&target[idx], &candidate[idx]) {
            Ok(distance) if distance <= max_hamming => continue,
            _ => return false,
        }
    }
    true
}

/// `find_duplicate(hashes, max_hamming_distance)` (spec §4.5): the first
/// candidate document whose stored phash vector matches within the Hamming
/// threshold at every compared page position wins. The `(page_index,
/// hash_hex)` bucketization is a coarse pre-filter per the spec's design
/// note; exact matching is still re-verified per candidate.
pub async fn find_duplicate(
    kv: &KvClient,
    hashes: &[String],
    max_hamming_distance: u32,
    exclude_document_id: Option<&str>,
) -> Result<Option<String>> {
    if hashes.is_empty() {
        return Ok(None);
    }
    let mut candidates: Vec<String> = candidate_ids(kv, hashes).await?.into_iter().collect();
    if let Some(exclude) = exclude_document_id {
        candidates.retain(|c| c != exclude);
    }
    for candidate in candidates {
        let candidate_hashes = load_candidate_hashes(kv, &candidate).await?;
        if within_threshold(hashes, &candidate_hashes, max_hamming_distance) {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}
