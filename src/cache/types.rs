use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a cache node.
///
/// `Starting` covers the initial heartbeat, refresh and broadcast. After that
/// the node alternates between `SteadyState` and `Refreshing` for as long as
/// the process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Starting,
    SteadyState,
    Refreshing,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::SteadyState => "steady_state",
            Self::Refreshing => "refreshing",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
