//! Node HTTP Protocol
//!
//! Endpoint paths and request/response bodies shared by the public API, the
//! peer-to-peer replication calls and the refresh notification.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- API Endpoints ---

/// Liveness probe; renews this node's heartbeat.
pub const ENDPOINT_HEALTH: &str = "/health";
/// Public read/write of a key.
pub const ENDPOINT_KEYS: &str = "/keys";
/// Peer-to-peer read/write of a key, local store only.
pub const ENDPOINT_INTERNAL_KEYS: &str = "/internal/keys";
/// Asks the receiving node to rebuild its local share.
pub const ENDPOINT_INTERNAL_REFRESH: &str = "/internal/refresh";
/// Debug listing of the current live node set.
pub const ENDPOINT_INTERNAL_NODES: &str = "/internal/nodes";

// --- Data Transfer Objects ---

/// Body of both public and internal key writes.
///
/// `expiration_date` is ISO-8601; RFC 3339 with an offset, or a naive
/// timestamp taken as UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutKeyRequest {
    pub data: Value,
    pub expiration_date: String,
}

impl PutKeyRequest {
    pub fn new(data: Value, expiration: DateTime<Utc>) -> Self {
        Self {
            data,
            expiration_date: expiration.to_rfc3339(),
        }
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        parse_expiration(&self.expiration_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            status: "unavailable".to_string(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: "error".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
