use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ConnectionId(Uuid::parse_str(s)?))
    }
}

/// A Service Termination Point reference as it appears in reserve criteria:
/// a port plus the single VLAN requested on that port. The full topology
/// record for a port (vlan ranges, aliases, bandwidth) lives in `nsi-topology`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtpEndpoint {
    pub port_id: String,
    pub vlan: u16,
}

impl PtpEndpoint {
    pub fn new(port_id: impl Into<String>, vlan: u16) -> Self {
        Self { port_id: port_id.into(), vlan }
    }
}

impl std::fmt::Display for PtpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.port_id, self.vlan)
    }
}

// ── Schedule ───────────────────────────────────────────────────────────────

/// `start_time = None` means "as soon as committed"; `end_time = None` means
/// "forever".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Schedule {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Schedule {
    /// `start_time <= end_time` when both are set.
    pub fn is_ordered(&self) -> bool {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) => s <= e,
            _ => true,
        }
    }

    /// Whether `start_time` has already elapsed as of `now`.
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time.map_or(true, |s| s <= now)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time.map_or(false, |e| e <= now)
    }
}

// ── Criteria ───────────────────────────────────────────────────────────────

/// The negotiable parameters of a reservation, carried end-to-end through
/// RSM and referenced (read-only) by PSM/LSM/DPSM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub description: Option<String>,
    pub schedule: Schedule,
    pub bandwidth_mbps: u32,
    pub src_stp: PtpEndpoint,
    pub dst_stp: PtpEndpoint,
    /// Monotonic reservation version, bumped on every committed modify.
    pub version: u32,
}

impl Criteria {
    /// VLAN translation across ports is rejected: src and dst VLANs must match.
    pub fn vlans_match(&self) -> bool {
        self.src_stp.vlan == self.dst_stp.vlan
    }
}

// ── Connection ───────────────────────────────────────────────────────────────

/// The immutable-per-version identity and criteria of a connection. Runtime
/// state (the four state machines, `circuit_id`, `last_modified`) is carried
/// alongside this in `nsi_store::ConnectionRecord`, not here — a desired-state
/// vs. desired-plus-observed split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub global_reservation_id: Option<String>,
    pub requester_nsa: String,
    pub provider_nsa: String,
    pub criteria: Criteria,
}

// ── Notification kinds ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReserveTimeout,
    ErrorEvent,
    MessageDeliveryTimeout,
    DataPlaneStateChange,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationKind::ReserveTimeout => "reserve_timeout",
            NotificationKind::ErrorEvent => "error_event",
            NotificationKind::MessageDeliveryTimeout => "message_delivery_timeout",
            NotificationKind::DataPlaneStateChange => "data_plane_state_change",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn schedule_ordered_when_unset() {
        assert!(Schedule::default().is_ordered());
    }

    #[test]
    fn schedule_detects_inversion() {
        let now = Utc::now();
        let s = Schedule { start_time: Some(now), end_time: Some(now - Duration::seconds(1)) };
        assert!(!s.is_ordered());
    }

    #[test]
    fn vlan_mismatch_detected() {
        let c = Criteria {
            description: None,
            schedule: Schedule::default(),
            bandwidth_mbps: 1000,
            src_stp: PtpEndpoint::new("Eth1", 1799),
            dst_stp: PtpEndpoint::new("Eth2", 1800),
            version: 0,
        };
        assert!(!c.vlans_match());
    }
}
