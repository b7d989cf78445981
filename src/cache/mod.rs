//! Cache Coordination Module
//!
//! `CacheRingManager` ties membership, placement, the local store, peer
//! replication and the backing store into the node's get/set/refresh protocol.
//! `handlers` exposes it over HTTP.
//!
//! ## Protocol
//! - **get**: local store first, then a pull from each other placement target.
//! - **set**: write to each placement target (local or push), then always persist.
//! - **refresh**: rebuild the local share from the backing store and swap it in whole.
//! - **heartbeat renewal**: publish, re-read membership, refresh on a count change
//!   or prune expired entries otherwise.

pub mod handlers;
pub mod manager;
pub mod types;
