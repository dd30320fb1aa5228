use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid transition: {machine} cannot apply {event} while in {state}")]
    InvalidTransition {
        machine: &'static str,
        state: String,
        event: String,
    },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("vlan mismatch: src vlan {src} != dst vlan {dst}")]
    VlanMismatch { src: u16, dst: u16 },

    #[error("stp unknown: {0}")]
    StpUnknown(String),

    #[error("capacity unavailable on {stp_id}: requested {requested_mbps} Mbps")]
    CapacityUnavailable { stp_id: String, requested_mbps: u32 },

    #[error("invalid connection id: {0}")]
    InvalidConnectionId(String),
}
