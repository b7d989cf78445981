//! Storage Module
//!
//! Key placement plus the two places a cached value can live.
//!
//! ## Core Concepts
//! - **Placement**: `partitioner` maps a key onto a consistent-hash ring of live nodes,
//!   yielding a primary and (with two or more nodes) a secondary.
//! - **Local share**: `memory::LocalCacheStore` holds this node's TTL-bound entries.
//! - **Durability**: `persistence::PersistenceGateway` writes every value through to a
//!   `backing::ObjectStore`, the source of truth used to rebuild local shares.

pub mod backing;
pub mod memory;
pub mod partitioner;
pub mod persistence;
