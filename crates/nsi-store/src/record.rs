use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nsi_domain::{
    Connection, ConnectionId, DataPlaneState, LifecycleState, NotificationKind,
    ProvisioningState, ReservationState,
};

/// The persisted runtime state of a connection: identity/criteria from
/// `nsi_domain::Connection` plus the four state-machine values, the assigned
/// circuit id, and the last-modified timestamp used by query filtering.
///
/// `provisioning_state` is `None` until the reservation has been held at
/// least once — PSM has no meaningful state before that point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection: Connection,
    /// `correlation_id` of the `Reserve` message that created this
    /// connection, kept so a retried delivery of the same message can be
    /// recognized and answered with the existing connection instead of
    /// creating a duplicate.
    pub reserve_correlation_id: String,
    pub reservation_state: ReservationState,
    pub provisioning_state: Option<ProvisioningState>,
    pub lifecycle_state: LifecycleState,
    pub data_plane_state: DataPlaneState,
    pub circuit_id: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn new(connection: Connection, reserve_correlation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            connection,
            reserve_correlation_id: reserve_correlation_id.into(),
            reservation_state: ReservationState::default(),
            provisioning_state: None,
            lifecycle_state: LifecycleState::default(),
            data_plane_state: DataPlaneState::default(),
            circuit_id: None,
            last_modified: now,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection.connection_id
    }
}

/// An append-only notification entry, numbered per-connection starting at 1
/// (0 means "none sent yet", matching the query engine's `if ... else 0`
/// default for `notification_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: u64,
    pub connection_id: ConnectionId,
    pub timestamp: DateTime<Utc>,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

/// An append-only result entry (query confirmed / query recursive responses
/// sent to the requester), numbered per-connection starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub result_id: u64,
    pub connection_id: ConnectionId,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub outcome: serde_json::Value,
}

// ── Job records ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Reserve,
    ReserveCommit,
    ReserveAbort,
    Provision,
    Release,
    Terminate,
    Activate,
    Deactivate,
    ReserveTimeout,
    AutoStart,
    AutoEnd,
    RequesterCallback,
    TopologyRefresh,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

/// When a job becomes eligible to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobTrigger {
    Now,
    RunAt { at: DateTime<Utc> },
}

impl JobTrigger {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self {
            JobTrigger::Now => true,
            JobTrigger::RunAt { at } => *at <= now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub job_kind: JobKind,
    pub connection_id: Option<ConnectionId>,
    pub trigger: JobTrigger,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl JobRecord {
    pub fn new(job_kind: JobKind, connection_id: Option<ConnectionId>, trigger: JobTrigger, payload: serde_json::Value) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            job_kind,
            connection_id,
            trigger,
            payload,
            state: JobState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}
