//! Link state and health reporting models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of the adapter link, owned by the connection supervisor
///
/// ```text
///                 connect ok            verify ok
/// Disconnected ──► Connecting ──► LinkUp ──────────► VehicleReady
///      ▲               │             │                  │    ▲
///      │  connect err  │             │ verify err       │    │ verify ok
///      └───────────────┘             ▼                  ▼    │
///      └─────────────────────────  Degraded ◄───── poll err  │
///          retry limit reached       └───────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    /// Adapter reachable, vehicle communication not yet confirmed
    LinkUp,
    /// ECU answered a verification query; polling allowed
    VehicleReady,
    /// Session open but the vehicle stopped answering (e.g. ignition off)
    Degraded,
}

impl LinkState {
    /// Only state in which trouble-code queries may be issued
    pub fn can_poll(&self) -> bool {
        matches!(self, LinkState::VehicleReady)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::LinkUp => "link_up",
            LinkState::VehicleReady => "vehicle_ready",
            LinkState::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the monitor for external health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub link_state: LinkState,
    /// Last successful trouble-code poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Number of codes in the current active set
    pub active_codes: usize,
    /// Full reconnect cycles since start
    pub reconnects: u64,
    /// Current consecutive connect failures
    pub backoff_attempt: u32,
    pub events_enqueued: u64,
    pub events_delivered: u64,
    /// Events lost to overflow, exhausted retries or permanent rejection
    pub events_dropped: u64,
    pub queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_vehicle_ready_can_poll() {
        assert!(LinkState::VehicleReady.can_poll());
        for state in [
            LinkState::Disconnected,
            LinkState::Connecting,
            LinkState::LinkUp,
            LinkState::Degraded,
        ] {
            assert!(!state.can_poll(), "{state} must not poll");
        }
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&LinkState::VehicleReady).unwrap(),
            "\"vehicle_ready\""
        );
        assert_eq!(LinkState::LinkUp.to_string(), "link_up");
    }
}
