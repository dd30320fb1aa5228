use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nsi_domain::{ConnectionId, DataPlaneState, LifecycleState, NotificationKind, ProvisioningState, ReservationState};
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{ConnectionRecord, JobRecord, Notification, ResultRecord};

/// Durable storage for connection records and their append-only
/// notification/result logs.
///
/// Every state write is a compare-and-swap: callers pass the state they
/// expect to find, and the store returns [`StoreError::Conflict`] if the
/// persisted value has since moved — this is what lets the engine serialize
/// transitions per-connection without taking a store-wide lock.
#[async_trait]
pub trait ConnectionStore: Send + Sync + 'static {
    async fn create(&self, record: &ConnectionRecord) -> Result<(), StoreError>;
    async fn load(&self, id: &ConnectionId) -> Result<Option<ConnectionRecord>, StoreError>;
    async fn list(&self) -> Result<Vec<ConnectionRecord>, StoreError>;

    /// Look up the connection created by a prior `Reserve` with this
    /// `correlation_id`, so a retried delivery of the same message can be
    /// answered from the existing record instead of creating a duplicate.
    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<ConnectionRecord>, StoreError>;

    async fn cas_reservation_state(
        &self,
        id: &ConnectionId,
        expected: ReservationState,
        new: ReservationState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn cas_provisioning_state(
        &self,
        id: &ConnectionId,
        expected: Option<ProvisioningState>,
        new: ProvisioningState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn cas_lifecycle_state(
        &self,
        id: &ConnectionId,
        expected: LifecycleState,
        new: LifecycleState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn cas_data_plane_state(
        &self,
        id: &ConnectionId,
        expected: DataPlaneState,
        new: DataPlaneState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_circuit_id(&self, id: &ConnectionId, circuit_id: String, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn append_notification(
        &self,
        id: &ConnectionId,
        kind: NotificationKind,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn append_result(
        &self,
        id: &ConnectionId,
        correlation_id: String,
        outcome: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn list_notifications(&self, id: &ConnectionId, since: Option<u64>) -> Result<Vec<Notification>, StoreError>;
    async fn list_results(&self, id: &ConnectionId, since: Option<u64>) -> Result<Vec<ResultRecord>, StoreError>;
}

/// Durable storage for the job engine's work queue.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn enqueue(&self, job: JobRecord) -> Result<(), StoreError>;

    /// Claim up to `limit` pending jobs whose trigger has fired, marking
    /// them `Running` as part of the same store-side step so two workers
    /// never claim the same job.
    async fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<JobRecord>, StoreError>;

    async fn mark_done(&self, job_id: Uuid) -> Result<(), StoreError>;
    async fn mark_failed(&self, job_id: Uuid, error: String) -> Result<(), StoreError>;

    /// Return a failed or running job to `Pending` with a new trigger and
    /// `attempts` incremented, for backoff-and-retry.
    async fn reschedule(&self, job_id: Uuid, run_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Cancel all pending jobs for a connection except the listed kinds —
    /// used e.g. when a hold timer fires and any queued auto-start job for
    /// the same connection is no longer relevant.
    async fn cancel_for_connection(&self, connection_id: &ConnectionId, except: &[crate::record::JobKind]) -> Result<(), StoreError>;

    /// All jobs left `Pending` or `Running` at startup, for crash recovery.
    async fn recover_pending(&self) -> Result<Vec<JobRecord>, StoreError>;
}
