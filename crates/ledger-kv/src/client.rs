use std::time::Duration;

use ledger_core::{Error, Result};
use redis::aio::{ConnectionManager, PubSub};
use redis::AsyncCommands;

/// Thin pooled wrapper around `redis::aio::ConnectionManager`. The manager
/// already reconnects transparently on dropped sockets; `connect_with_backoff`
/// covers only the initial dial, mirroring the teacher worker's own
/// `connect_with_backoff` (which retries `get_connection` against a cold
/// Redis at container startup).
#[derive(Clone)]
pub struct KvClient {
    client: redis::Client,
    manager: ConnectionManager,
}

impl KvClient {
    pub async fn connect(redis_url: &str, max_retries: u32) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Fatal(format!("invalid redis url: {e}")))?;
        let manager = connect_with_backoff(&client, max_retries).await?;
        Ok(Self { client, manager })
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// A dedicated connection for SUBSCRIBE, which can't share the
    /// multiplexed connection manager.
    pub async fn pubsub(&self) -> Result<PubSub> {
        self.client
            .get_async_pubsub()
            .await
            .map_err(|e| Error::Transient(format!("pubsub connect failed: {e}")))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.manager.clone();
        con.get(key)
            .await
            .map_err(|e| Error::Transient(format!("GET {key} failed: {e}")))
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut con = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        con.set_ex::<_, _, ()>(key, value, secs)
            .await
            .map_err(|e| Error::Transient(format!("SETEX {key} failed: {e}")))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| Error::Transient(format!("SET {key} failed: {e}")))
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.del::<_, ()>(key)
            .await
            .map_err(|e| Error::Transient(format!("DEL {key} failed: {e}")))
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut con = self.manager.clone();
        con.exists(key)
            .await
            .map_err(|e| Error::Transient(format!("EXISTS {key} failed: {e}")))
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| Error::Transient(format!("PUBLISH {channel} failed: {e}")))
    }

    pub async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.lpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| Error::Transient(format!("LPUSH {key} failed: {e}")))
    }

    pub async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        let mut con = self.manager.clone();
        con.ltrim::<_, ()>(key, start, stop)
            .await
            .map_err(|e| Error::Transient(format!("LTRIM {key} failed: {e}")))
    }

    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut con = self.manager.clone();
        con.lrange(key, start, stop)
            .await
            .map_err(|e| Error::Transient(format!("LRANGE {key} failed: {e}")))
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.rpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| Error::Transient(format!("RPUSH {key} failed: {e}")))
    }

    /// Pop from the head of a list queue, blocking up to `timeout`. Used by
    /// the dispatcher's worker loop pulls against `{high,default,low,dead}`.
    pub async fn blpop(&self, keys: &[&str], timeout: Duration) -> Result<Option<(String, String)>> {
        let mut con = self.manager.clone();
        let secs = timeout.as_secs_f64();
        let result: Option<(String, String)> = con
            .blpop(keys, secs)
            .await
            .map_err(|e| Error::Transient(format!("BLPOP failed: {e}")))?;
        Ok(result)
    }

    pub async fn llen(&self, key: &str) -> Result<usize> {
        let mut con = self.manager.clone();
        con.llen(key)
            .await
            .map_err(|e| Error::Transient(format!("LLEN {key} failed: {e}")))
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| Error::Transient(format!("SADD {key} failed: {e}")))
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut con = self.manager.clone();
        con.smembers(key)
            .await
            .map_err(|e| Error::Transient(format!("SMEMBERS {key} failed: {e}")))
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| Error::Transient(format!("HSET {key} failed: {e}")))
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut con = self.manager.clone();
        con.hget(key, field)
            .await
            .map_err(|e| Error::Transient(format!("HGET {key} failed: {e}")))
    }

    pub async fn hgetall(&self, key: &str) -> Result<std::collections::HashMap<String, String>> {
        let mut con = self.manager.clone();
        con.hgetall(key)
            .await
            .map_err(|e| Error::Transient(format!("HGETALL {key} failed: {e}")))
    }

    pub async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> Result<String> {
        let mut con = self.manager.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (k, v) in fields {
            cmd.arg(*k).arg(*v);
        }
        cmd.query_async(&mut con)
            .await
            .map_err(|e| Error::Transient(format!("XADD {stream} failed: {e}")))
    }
}

async fn connect_with_backoff(client: &redis::Client, max_retries: u32) -> Result<ConnectionManager> {
    let mut delay = Duration::from_millis(200);
    let mut last_err = None;
    for attempt in 0..max_retries.max(1) {
        match client.get_connection_manager().await {
            Ok(manager) => return Ok(manager),
            Err(e) => {
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "redis connect retry");
                last_err = Some(e);
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(5));
            }
        }
    }
    Err(Error::Transient(format!(
        "redis connection failed after {max_retries} attempts: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
