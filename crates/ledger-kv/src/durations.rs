use ledger_core::Result;

use crate::client::KvClient;
use crate::keys::{DURATIONS_KEY, DURATIONS_MAX_LEN};

/// Appends a job duration (seconds) to the bounded `jobs:durations` list,
/// newest first, trimmed to `DURATIONS_MAX_LEN` (spec §6, §4.9).
pub async fn record(kv: &KvClient, duration_seconds: f64) -> Result<()> {
    kv.lpush(DURATIONS_KEY, &duration_seconds.to_string()).await?;
    kv.ltrim(DURATIONS_KEY, 0, DURATIONS_MAX_LEN - 1).await
}

async fn samples(kv: &KvClient) -> Result<Vec<f64>> {
    let raw = kv.lrange(DURATIONS_KEY, 0, DURATIONS_MAX_LEN - 1).await?;
    Ok(raw.iter().filter_map(|s| s.parse::<f64>().ok()).collect())
}

/// p95 estimate: the ceil(0.95 * n)-th smallest sample, capped at
/// `sse_edge_budget`. An empty buffer yields the cap (spec §4.10, §8).
pub async fn p95_ms(kv: &KvClient, sse_edge_budget_ms: u64) -> Result<u64> {
    let mut values = samples(kv).await?;
    if values.is_empty() {
        return Ok(sse_edge_budget_ms);
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    let rank = ((0.95 * n as f64).ceil() as usize).clamp(1, n);
    let seconds = values[rank - 1];
    let ms = (seconds * 1000.0).round() as u64;
    Ok(ms.min(sse_edge_budget_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_rank_matches_spec_formula() {
        let values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let n = values.len();
        let rank = (0.95 * n as f64).ceil() as usize;
        assert_eq!(rank, 19);
        assert_eq!(values[rank - 1], 19.0);
    }
}
