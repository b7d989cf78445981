//! Heartbeat store backends.
//!
//! The heartbeat store is a TTL key-value store: one key per node, holding the
//! UNIX timestamp of its last renewal, written with an expiry. Nodes list every
//! key under a shared prefix to find out who is around.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::{Duration, Instant};

use crate::error::Result;

#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Write `timestamp` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, timestamp: f64, ttl: Duration) -> Result<()>;

    /// All unexpired `(key, timestamp)` pairs whose key starts with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, f64)>>;
}

pub struct RedisHeartbeatStore {
    conn: MultiplexedConnection,
}

impl RedisHeartbeatStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        tracing::info!("Connected to heartbeat store at {}", redis_url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl HeartbeatStore for RedisHeartbeatStore {
    async fn put(&self, key: &str, timestamp: f64, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();

        // SET <key> <timestamp> EX <ttl>
        conn.set_ex::<_, _, ()>(key, timestamp.to_string(), ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();

        // KEYS <prefix>*
        let keys: Vec<String> = conn.keys(format!("{}*", prefix)).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        // MGET; a key may expire between the two calls and come back nil
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut records = Vec::with_capacity(keys.len());
        for (key, value) in keys.into_iter().zip(values) {
            let Some(raw) = value else { continue };
            match raw.parse::<f64>() {
                Ok(timestamp) => records.push((key, timestamp)),
                Err(e) => tracing::warn!("Ignoring heartbeat {} with bad value {:?}: {}", key, raw, e),
            }
        }
        Ok(records)
    }
}

/// In-process heartbeat store.
///
/// Used for single-node runs without Redis and for in-process cluster tests,
/// where several nodes share one instance.
#[derive(Default)]
pub struct MemoryHeartbeatStore {
    entries: DashMap<String, (f64, Instant)>,
}

impl MemoryHeartbeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[async_trait]
impl HeartbeatStore for MemoryHeartbeatStore {
    async fn put(&self, key: &str, timestamp: f64, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (timestamp, Instant::now() + ttl));
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, f64)>> {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires)| *expires > now);

        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().0))
            .collect())
    }
}
