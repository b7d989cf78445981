use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::types::NodeState;
use crate::error::{Error, Result};
use crate::membership::service::MembershipTracker;
use crate::replication::ReplicationClient;
use crate::storage::memory::{CacheEntry, LocalCacheStore};
use crate::storage::partitioner::{Placement, place_key};
use crate::storage::persistence::PersistenceGateway;

/// Coordinates one node's share of the cache.
///
/// Owns the local store and drives the get/set/refresh protocol on top of
/// membership, placement, peer replication and the backing store. Built once
/// per process with [`CacheRingManager::start`] and shared by every request
/// handler.
pub struct CacheRingManager {
    local_addr: String,
    membership: MembershipTracker,
    local_store: LocalCacheStore,
    persistence: PersistenceGateway,
    replication: Arc<dyn ReplicationClient>,
    state: RwLock<NodeState>,
    refresh_lock: Mutex<()>,
}

impl CacheRingManager {
    /// Register this node and take over its share of the persisted keys.
    ///
    /// Publishes the first heartbeat, refreshes the local store, then asks
    /// every other live node to refresh so they account for the newcomer.
    ///
    /// # Errors
    ///
    /// Fails only if the first heartbeat cannot be published: a node that
    /// cannot register must not serve. A failed initial refresh is retried on
    /// the next heartbeat renewal.
    pub async fn start(
        membership: MembershipTracker,
        persistence: PersistenceGateway,
        replication: Arc<dyn ReplicationClient>,
    ) -> Result<Arc<Self>> {
        let manager = Arc::new(Self {
            local_addr: membership.local_addr().to_string(),
            membership,
            local_store: LocalCacheStore::new(),
            persistence,
            replication,
            state: RwLock::new(NodeState::Starting),
            refresh_lock: Mutex::new(()),
        });

        if let Err(e) = manager.membership.publish_heartbeat(Utc::now()).await {
            tracing::error!("Failed to publish initial heartbeat: {}", e);
            return Err(e);
        }

        if let Err(e) = manager.refresh_cache().await {
            tracing::warn!("Initial refresh failed, retrying on next heartbeat: {}", e);
            manager.membership.mark_membership_changed();
        }

        let nodes = manager.live_nodes().await;
        manager
            .replication
            .broadcast_refresh(&nodes, &manager.local_addr)
            .await;

        manager.set_state(NodeState::SteadyState).await;
        tracing::info!(
            "Node {} started with {} live node(s), {} local entries",
            manager.local_addr,
            nodes.len(),
            manager.local_store.len().await
        );

        Ok(manager)
    }

    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn local_store(&self) -> &LocalCacheStore {
        &self.local_store
    }

    pub fn membership(&self) -> &MembershipTracker {
        &self.membership
    }

    pub async fn state(&self) -> NodeState {
        *self.state.read().await
    }

    async fn set_state(&self, next: NodeState) {
        let mut state = self.state.write().await;
        if *state != next {
            tracing::debug!("Node state {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Current live set for request routing.
    ///
    /// If the heartbeat store cannot be queried, or reports nobody, routing
    /// proceeds as if this node were the only one alive.
    pub async fn live_nodes(&self) -> Vec<String> {
        match self.membership.live_nodes(Utc::now()).await {
            Ok(nodes) if !nodes.is_empty() => nodes,
            Ok(_) => {
                tracing::warn!("No live heartbeats found, assuming only self is live");
                vec![self.local_addr.clone()]
            }
            Err(e) => {
                tracing::warn!("{}, assuming only self is live", e);
                vec![self.local_addr.clone()]
            }
        }
    }

    pub fn placement(&self, key: &str, nodes: &[String]) -> Placement {
        place_key(key, nodes).unwrap_or_else(|_| Placement {
            primary: self.local_addr.clone(),
            secondary: None,
        })
    }

    /// Read a key, falling back to the peers that own it.
    ///
    /// With `local_only` set only the local store is consulted; that path
    /// serves peer pulls and never touches the network.
    pub async fn get(&self, key: &str, local_only: bool) -> Option<Value> {
        let local = self.local_store.get(key, Utc::now()).await;
        if local_only || local.is_some() {
            return local;
        }

        let nodes = self.live_nodes().await;
        let placement = self.placement(key, &nodes);
        for target in placement.targets().filter(|t| *t != self.local_addr) {
            if let Some(value) = self.replication.pull(target, key).await {
                tracing::debug!("GET {}: pulled from {}", key, target);
                return Some(value);
            }
        }

        tracing::debug!("GET {}: miss", key);
        None
    }

    /// Write a key to its placement targets and through to the backing store.
    ///
    /// With `local_only` set the value lands in the local store and nowhere
    /// else; that is the receiving end of a peer push and must not replicate
    /// again. Failed pushes are logged and dropped, the write still counts
    /// once it is persisted.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        expiration: DateTime<Utc>,
        local_only: bool,
    ) -> Result<()> {
        if local_only {
            self.local_store.set(key, value, expiration).await;
            return Ok(());
        }

        let nodes = self.live_nodes().await;
        let placement = self.placement(key, &nodes);
        for target in placement.targets() {
            if target == self.local_addr {
                self.local_store
                    .set(key, value.clone(), expiration)
                    .await;
            } else if let Err(e) = self
                .replication
                .push(target, key, &value, expiration)
                .await
            {
                tracing::warn!("SET {}: replication to {} failed: {}", key, target, e);
            }
        }

        self.persistence.put(key, &value, expiration).await
    }

    /// Rebuild the local store from the backing store.
    ///
    /// Stages every unexpired persisted key placed on this node into a new
    /// map and swaps it in whole. Keys whose objects cannot be decoded are
    /// skipped. If membership or the key listing fails nothing is swapped,
    /// the old contents stay visible and the change flag is raised again.
    /// Returns the number of entries adopted.
    pub async fn refresh_cache(&self) -> Result<usize> {
        let _refreshing = self.refresh_lock.lock().await;

        let previous = self.state().await;
        self.set_state(NodeState::Refreshing).await;
        let staged = self.stage_local_share().await;
        let resume = match previous {
            NodeState::Starting => NodeState::Starting,
            _ => NodeState::SteadyState,
        };

        let staged = match staged {
            Ok(staged) => staged,
            Err(e) => {
                self.membership.mark_membership_changed();
                self.set_state(resume).await;
                return Err(e);
            }
        };

        let count = staged.len();
        self.local_store.replace_all(staged).await;
        self.set_state(resume).await;

        tracing::info!("Refreshed local cache: {} entries", count);
        Ok(count)
    }

    async fn stage_local_share(&self) -> Result<HashMap<String, CacheEntry>> {
        let now = Utc::now();
        let mut nodes = self.membership.live_nodes(now).await?;
        // The staged share reflects this observation; later changes re-raise the flag
        self.membership.clear_membership_changed();
        if nodes.is_empty() {
            nodes.push(self.local_addr.clone());
        }

        let mut staged = HashMap::new();
        let mut keys = self.persistence.list_all_keys();
        while let Some(key) = keys.next().await {
            let key = key?;
            if !self.placement(&key, &nodes).includes(&self.local_addr) {
                continue;
            }
            match self.persistence.get(&key, now).await {
                Ok(Some(entry)) => {
                    staged.insert(key, entry);
                }
                Ok(None) => {}
                // One unreadable object is a miss, not a failed refresh
                Err(e @ (Error::Json(_) | Error::Persistence(_))) => {
                    tracing::warn!("Skipping unreadable persisted key {}: {}", key, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(staged)
    }

    /// Heartbeat renewal, driven by the liveness probe.
    ///
    /// Publishes the heartbeat, re-reads membership and then either refreshes
    /// (membership count changed) or prunes expired entries.
    ///
    /// # Errors
    ///
    /// Returns an error only when the heartbeat cannot be published.
    pub async fn renew_heartbeat(&self) -> Result<()> {
        let now = Utc::now();
        self.membership.publish_heartbeat(now).await?;

        self.live_nodes().await;
        if self.membership.membership_changed() {
            if let Err(e) = self.refresh_cache().await {
                tracing::warn!("Membership changed but refresh failed: {}", e);
            }
        } else {
            let pruned = self.local_store.prune(now).await;
            if pruned > 0 {
                tracing::debug!("Pruned {} expired entries", pruned);
            }
        }
        Ok(())
    }
}
