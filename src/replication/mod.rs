//! Replication Module
//!
//! Calls a node makes to its peers: pushing a value into a peer's local store,
//! pulling a value out of it, and asking peers to refresh after a join.
//!
//! All calls are best-effort. Nothing here retries; the backing store is the
//! source of truth and in-memory copies only serve fast reads.

pub mod http;
pub mod protocol;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;

#[async_trait]
pub trait ReplicationClient: Send + Sync {
    /// Write into `node`'s local store. Failures are reported, never retried.
    async fn push(
        &self,
        node: &str,
        key: &str,
        value: &Value,
        expiration: DateTime<Utc>,
    ) -> Result<()>;

    /// Read from `node`'s local store. An unreachable peer and a peer that
    /// does not hold the key both come back as `None`.
    async fn pull(&self, node: &str, key: &str) -> Option<Value>;

    /// Ask every node in `nodes` except `local` to re-run its refresh.
    async fn broadcast_refresh(&self, nodes: &[String], local: &str);
}

pub use self::http::HttpReplicationClient;
