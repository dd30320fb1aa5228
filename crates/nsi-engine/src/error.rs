use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("domain error: {0}")]
    Domain(#[from] nsi_domain::DomainError),

    #[error("topology error: {0}")]
    Topology(#[from] nsi_topology::TopologyError),

    #[error("store error: {0}")]
    Store(#[from] nsi_store::StoreError),

    #[error("nrm error: {0}")]
    Nrm(#[from] nsi_nrm::NrmError),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("vlan mismatch: src vlan {src} != dst vlan {dst}")]
    VlanMismatch { src: u16, dst: u16 },

    #[error("stp unknown: {0}")]
    StpUnknown(String),

    #[error("capacity unavailable on {stp_id}: requested {requested_mbps} Mbps")]
    CapacityUnavailable { stp_id: String, requested_mbps: u32 },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
