use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::store::HeartbeatStore;
use super::types::{Heartbeat, unix_seconds};
use crate::error::{Error, Result};

/// Heartbeat records outlive the liveness window by this factor, so a single
/// missed renewal drops a node from the computed live set but not from storage.
pub const HEARTBEAT_TTL_MULTIPLIER: u32 = 5;

/// Publishes this node's heartbeat and answers "who is currently live".
///
/// Every `live_nodes` call compares the number of live nodes with the number
/// seen by the previous call. A difference raises the membership-changed flag,
/// which stays up until `clear_membership_changed` is called after a refresh.
/// Only the count is compared, so a join and a leave landing between two
/// observations go unnoticed.
pub struct MembershipTracker {
    local_addr: String,
    store: Arc<dyn HeartbeatStore>,
    key_prefix: String,
    heartbeat_timeout: Duration,
    observed_count: AtomicUsize,
    membership_changed: AtomicBool,
}

impl MembershipTracker {
    pub fn new(
        local_addr: impl Into<String>,
        store: Arc<dyn HeartbeatStore>,
        key_prefix: impl Into<String>,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            local_addr: local_addr.into(),
            store,
            key_prefix: key_prefix.into(),
            heartbeat_timeout,
            observed_count: AtomicUsize::new(1),
            membership_changed: AtomicBool::new(false),
        }
    }

    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    fn heartbeat_key(&self, node: &str) -> String {
        format!("{}{}", self.key_prefix, node)
    }

    pub async fn publish_heartbeat(&self, now: DateTime<Utc>) -> Result<()> {
        let key = self.heartbeat_key(&self.local_addr);
        let ttl = self.heartbeat_timeout * HEARTBEAT_TTL_MULTIPLIER;

        self.store.put(&key, unix_seconds(now), ttl).await?;

        tracing::debug!("Published heartbeat {} (ttl {:?})", key, ttl);
        Ok(())
    }

    /// Addresses of every node whose heartbeat is younger than the timeout,
    /// sorted for stable iteration.
    pub async fn live_nodes(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let records = self
            .store
            .scan(&self.key_prefix)
            .await
            .map_err(|e| Error::MembershipQuery(e.to_string()))?;

        let mut live: Vec<String> = records
            .into_iter()
            .filter_map(|(key, timestamp)| {
                let node = key.strip_prefix(&self.key_prefix)?.to_string();
                let heartbeat = Heartbeat { node, timestamp };
                heartbeat
                    .is_live(now, self.heartbeat_timeout)
                    .then_some(heartbeat.node)
            })
            .collect();
        live.sort();
        live.dedup();

        let previous = self.observed_count.swap(live.len(), Ordering::SeqCst);
        if previous != live.len() {
            tracing::info!("Live node count changed: {} -> {}", previous, live.len());
            self.membership_changed.store(true, Ordering::SeqCst);
        }

        Ok(live)
    }

    pub fn membership_changed(&self) -> bool {
        self.membership_changed.load(Ordering::SeqCst)
    }

    pub fn mark_membership_changed(&self) {
        self.membership_changed.store(true, Ordering::SeqCst);
    }

    pub fn clear_membership_changed(&self) {
        self.membership_changed.store(false, Ordering::SeqCst);
    }
}
