//! Distributed In-Memory Cache Library
//!
//! This library crate defines the core modules of a cache node. It serves as
//! the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`membership`**: Heartbeat-based discovery. Each node publishes a TTL'd
//!   heartbeat and derives the live set from the heartbeats it can see.
//! - **`storage`**: Consistent-hash placement, the local TTL store and the
//!   persistence gateway over the backing object store.
//! - **`replication`**: Peer-to-peer HTTP calls (push, pull, refresh notices)
//!   and the wire types they share with the public API.
//! - **`cache`**: The `CacheRingManager` that drives get/set/refresh, plus the
//!   HTTP handlers in front of it.
//! - **`config`** / **`error`**: Environment configuration and the crate error type.

pub mod cache;
pub mod config;
pub mod error;
pub mod membership;
pub mod replication;
pub mod storage;

pub use error::{Error, Result};
