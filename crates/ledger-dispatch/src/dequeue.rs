use std::time::Duration;

use ledger_core::model::JobEnvelope;
use ledger_core::{Error, Result};
use ledger_kv::KvClient;

use crate::metrics;
use crate::queues::Queues;

/// Pulls envelopes in priority order `high > default > low`, with a bounded
/// starvation guard: after `starvation_k` consecutive pulls serviced from the
/// high queue, the next pull checks `default`/`low` first (spec §4.9).
pub struct PriorityPuller {
    queues: Queues,
    starvation_k: u32,
    high_streak: u32,
}

impl PriorityPuller {
    pub fn new(queues: Queues, starvation_k: u32) -> Self {
        Self {
            queues,
            starvation_k: starvation_k.max(1),
            high_streak: 0,
        }
    }

    fn pull_order(&self) -> [&str; 3] {
        if self.high_streak >= self.starvation_k {
            [&self.queues.default, &self.queues.low, &self.queues.high]
        } else {
            [&self.queues.high, &self.queues.default, &self.queues.low]
        }
    }

    /// Blocks up to `timeout` waiting for an envelope on any queue. Returns
    /// `None` on timeout (the caller should loop and re-check emergency
    /// stop / shutdown signals).
    pub async fn pull(&mut self, kv: &KvClient, timeout: Duration) -> Result<Option<JobEnvelope>> {
        let order = self.pull_order();
        let forced_floor = self.high_streak >= self.starvation_k;
        let Some((queue_name, payload)) = kv.blpop(&order, timeout).await? else {
            return Ok(None);
        };

        if queue_name == self.queues.high {
            self.high_streak += 1;
        } else {
            self.high_streak = 0;
        }
        if forced_floor {
            self.high_streak = 0;
        }

        let envelope: JobEnvelope = serde_json::from_str(&payload)
            .map_err(|e| Error::Fatal(format!("corrupt job envelope on queue {queue_name}: {e}")))?;
        Ok(Some(envelope))
    }

    /// Refreshes the `queue_depth` gauge for all four queues (spec §4.9).
    pub async fn report_depths(&self, kv: &KvClient) -> Result<()> {
        metrics::set_queue_depth("high", kv.llen(&self.queues.high).await? as u64);
        metrics::set_queue_depth("default", kv.llen(&self.queues.default).await? as u64);
        metrics::set_queue_depth("low", kv.llen(&self.queues.low).await? as u64);
        metrics::set_queue_depth("dead", kv.llen(&self.queues.dead).await? as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queues() -> Queues {
        Queues {
            high: "high".into(),
            default: "default".into(),
            low: "low".into(),
            dead: "dead".into(),
        }
    }

    #[test]
    fn pull_order_flips_after_starvation_threshold() {
        let mut puller = PriorityPuller::new(queues(), 3);
        assert_eq!(puller.pull_order(), ["high", "default", "low"]);
        puller.high_streak = 3;
        assert_eq!(puller.pull_order(), ["default", "low", "high"]);
    }
}
