use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logging::log_connectivity;

/// Reachability of the service as seen by the health probe only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl Connectivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connectivity::Connecting => "connecting",
            Connectivity::Connected => "connected",
            Connectivity::Disconnected => "disconnected",
        }
    }
}

/// Tri-state connectivity. Leaves `Connecting` on the first probe result and
/// never returns to it. Data-feed failures are never fed in here.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMonitor {
    state: Connectivity,
    last_check: Option<DateTime<Utc>>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one probe result. Returns the transition, if any.
    pub fn record(&mut self, ok: bool, at: DateTime<Utc>) -> Option<(Connectivity, Connectivity)> {
        self.last_check = Some(at);
        let next = if ok {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        };
        if next == self.state {
            return None;
        }
        let prev = self.state;
        self.state = next;
        log_connectivity(prev.as_str(), next.as_str());
        Some((prev, next))
    }

    pub fn state(&self) -> Connectivity {
        self.state
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }
}
