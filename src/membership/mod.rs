//! Membership Module
//!
//! Tracks cluster membership through expiring heartbeats kept in an external
//! TTL key-value store (Redis in production).
//!
//! ## Core Mechanisms
//! - **Heartbeats**: each node periodically writes `<prefix><address> = <unix timestamp>`
//!   with an expiry of five heartbeat timeouts.
//! - **Live set**: recomputed on demand from every heartbeat younger than the timeout.
//!   Never cached beyond a single operation.
//! - **Change detection**: a change in the live-node count flags the node for a refresh.

pub mod service;
pub mod store;
pub mod types;
