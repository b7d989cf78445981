use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A heartbeat record as read back from the heartbeat store.
///
/// `timestamp` is the UNIX time (seconds, fractional) of the node's last
/// renewal. A node is live while that timestamp is younger than the
/// configured heartbeat timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node: String,
    pub timestamp: f64,
}

impl Heartbeat {
    pub fn new(node: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            node: node.into(),
            timestamp: unix_seconds(at),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.timestamp > unix_seconds(now) - timeout.as_secs_f64()
    }
}

pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}
