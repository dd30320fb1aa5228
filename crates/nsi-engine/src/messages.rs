use nsi_domain::{ConnectionId, Criteria};
use serde::{Deserialize, Serialize};

/// Inbound `Reserve` message (spec'd wire fields narrowed to what the core
/// needs; header fields not used by the core — protocol_version, reply_to,
/// session_security_attributes — are not modelled here).
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    pub correlation_id: String,
    pub global_reservation_id: Option<String>,
    pub requester_nsa: String,
    pub provider_nsa: String,
    pub description: Option<String>,
    pub criteria: Criteria,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionCorrelated {
    pub connection_id: ConnectionId,
    pub correlation_id: String,
}

/// Synchronous acknowledgement returned by every message processor. The
/// heavy work (NRM call, outbound confirmation) happens later in a job.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub connection_id: ConnectionId,
}

/// Job payload for `Reserve`/`ReserveCommit`/`ReserveAbort`/`Provision`/
/// `Release`/`Terminate` — carries only what the handler can't re-derive
/// from the stored connection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub correlation_id: String,
}

impl JobPayload {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }
}
