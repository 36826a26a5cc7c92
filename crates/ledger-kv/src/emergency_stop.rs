use ledger_core::Result;

use crate::client::KvClient;

/// `EMERGENCY_STOP`-equivalent sentinel key (spec §6, §9). The key name is
/// configurable (`EMERGENCY_STOP_KEY`) but the semantics are fixed: presence
/// halts enqueue and is re-checked at every worker loop head.
pub async fn is_halted(kv: &KvClient, key: &str) -> Result<bool> {
    kv.exists(key).await
}

pub async fn halt(kv: &KvClient, key: &str) -> Result<()> {
    kv.set(key, "1").await
}

pub async fn resume(kv: &KvClient, key: &str) -> Result<()> {
    kv.del(key).await
}
