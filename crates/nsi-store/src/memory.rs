use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nsi_domain::{ConnectionId, DataPlaneState, LifecycleState, NotificationKind, ProvisioningState, ReservationState};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{ConnectionRecord, JobKind, JobRecord, JobState, Notification, ResultRecord};
use crate::store::{ConnectionStore, JobStore};

#[derive(Debug, Default)]
struct Inner {
    connections: HashMap<ConnectionId, ConnectionRecord>,
    notifications: HashMap<ConnectionId, Vec<Notification>>,
    results: HashMap<ConnectionId, Vec<ResultRecord>>,
    jobs: HashMap<Uuid, JobRecord>,
}

/// In-memory implementation of [`ConnectionStore`] and [`JobStore`].
///
/// All data is lost on process exit. Suitable for tests and for a provider
/// instance that doesn't need to survive a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn create(&self, record: &ConnectionRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let id = record.connection_id().clone();
        if guard.connections.contains_key(&id) {
            return Err(StoreError::Duplicate(id.to_string()));
        }
        guard.connections.insert(id, record.clone());
        Ok(())
    }

    async fn load(&self, id: &ConnectionId) -> Result<Option<ConnectionRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.connections.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ConnectionRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.connections.values().cloned().collect())
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<ConnectionRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.connections.values().find(|r| r.reserve_correlation_id == correlation_id).cloned())
    }

    async fn cas_reservation_state(
        &self,
        id: &ConnectionId,
        expected: ReservationState,
        new: ReservationState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.reservation_state != expected {
            return Err(StoreError::Conflict {
                connection_id: id.to_string(),
                machine: "RSM",
                expected: expected.to_string(),
                actual: record.reservation_state.to_string(),
            });
        }
        record.reservation_state = new;
        record.last_modified = now;
        Ok(())
    }

    async fn cas_provisioning_state(
        &self,
        id: &ConnectionId,
        expected: Option<ProvisioningState>,
        new: ProvisioningState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.provisioning_state != expected {
            return Err(StoreError::Conflict {
                connection_id: id.to_string(),
                machine: "PSM",
                expected: expected.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
                actual: record.provisioning_state.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
            });
        }
        record.provisioning_state = Some(new);
        record.last_modified = now;
        Ok(())
    }

    async fn cas_lifecycle_state(
        &self,
        id: &ConnectionId,
        expected: LifecycleState,
        new: LifecycleState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.lifecycle_state != expected {
            return Err(StoreError::Conflict {
                connection_id: id.to_string(),
                machine: "LSM",
                expected: expected.to_string(),
                actual: record.lifecycle_state.to_string(),
            });
        }
        record.lifecycle_state = new;
        record.last_modified = now;
        Ok(())
    }

    async fn cas_data_plane_state(
        &self,
        id: &ConnectionId,
        expected: DataPlaneState,
        new: DataPlaneState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.data_plane_state != expected {
            return Err(StoreError::Conflict {
                connection_id: id.to_string(),
                machine: "DPSM",
                expected: expected.to_string(),
                actual: record.data_plane_state.to_string(),
            });
        }
        record.data_plane_state = new;
        record.last_modified = now;
        Ok(())
    }

    async fn set_circuit_id(&self, id: &ConnectionId, circuit_id: String, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .connections
            .get_mut(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        record.circuit_id = Some(circuit_id);
        record.last_modified = now;
        Ok(())
    }

    async fn append_notification(
        &self,
        id: &ConnectionId,
        kind: NotificationKind,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.connections.contains_key(id) {
            return Err(StoreError::ConnectionNotFound(id.to_string()));
        }
        let list = guard.notifications.entry(id.clone()).or_default();
        let notification_id = list.len() as u64 + 1;
        list.push(Notification { notification_id, connection_id: id.clone(), timestamp: now, kind, payload });
        Ok(notification_id)
    }

    async fn append_result(
        &self,
        id: &ConnectionId,
        correlation_id: String,
        outcome: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.connections.contains_key(id) {
            return Err(StoreError::ConnectionNotFound(id.to_string()));
        }
        let list = guard.results.entry(id.clone()).or_default();
        let result_id = list.len() as u64 + 1;
        list.push(ResultRecord { result_id, connection_id: id.clone(), timestamp: now, correlation_id, outcome });
        Ok(result_id)
    }

    async fn list_notifications(&self, id: &ConnectionId, since: Option<u64>) -> Result<Vec<Notification>, StoreError> {
        let guard = self.inner.read().await;
        let list = guard.notifications.get(id).cloned().unwrap_or_default();
        Ok(match since {
            Some(s) => list.into_iter().filter(|n| n.notification_id > s).collect(),
            None => list,
        })
    }

    async fn list_results(&self, id: &ConnectionId, since: Option<u64>) -> Result<Vec<ResultRecord>, StoreError> {
        let guard = self.inner.read().await;
        let list = guard.results.get(id).cloned().unwrap_or_default();
        Ok(match since {
            Some(s) => list.into_iter().filter(|r| r.result_id > s).collect(),
            None => list,
        })
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn enqueue(&self, job: JobRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.jobs.insert(job.job_id, job);
        Ok(())
    }

    async fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        let mut guard = self.inner.write().await;
        let ready_ids: Vec<Uuid> = guard
            .jobs
            .values()
            .filter(|j| j.state == JobState::Pending && j.trigger.is_ready(now))
            .take(limit)
            .map(|j| j.job_id)
            .collect();
        let mut claimed = Vec::with_capacity(ready_ids.len());
        for id in ready_ids {
            if let Some(job) = guard.jobs.get_mut(&id) {
                job.state = JobState::Running;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_done(&self, job_id: Uuid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let job = guard.jobs.get_mut(&job_id).ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.state = JobState::Done;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: String) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let job = guard.jobs.get_mut(&job_id).ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.state = JobState::Failed;
        job.last_error = Some(error);
        Ok(())
    }

    async fn reschedule(&self, job_id: Uuid, run_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let job = guard.jobs.get_mut(&job_id).ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.state = JobState::Pending;
        job.attempts += 1;
        job.trigger = crate::record::JobTrigger::RunAt { at: run_at };
        Ok(())
    }

    async fn cancel_for_connection(&self, connection_id: &ConnectionId, except: &[JobKind]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        for job in guard.jobs.values_mut() {
            if job.connection_id.as_ref() == Some(connection_id)
                && job.state == JobState::Pending
                && !except.contains(&job.job_kind)
            {
                job.state = JobState::Done;
            }
        }
        Ok(())
    }

    async fn recover_pending(&self) -> Result<Vec<JobRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .jobs
            .values()
            .filter(|j| matches!(j.state, JobState::Pending | JobState::Running))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsi_domain::{Connection, Criteria, PtpEndpoint, Schedule};

    fn dummy_connection() -> Connection {
        Connection {
            connection_id: ConnectionId::new(),
            global_reservation_id: None,
            requester_nsa: "urn:ogf:network:requester.example:2023:nsa".to_string(),
            provider_nsa: "urn:ogf:network:provider.example:2023:nsa".to_string(),
            criteria: Criteria {
                description: None,
                schedule: Schedule::default(),
                bandwidth_mbps: 1000,
                src_stp: PtpEndpoint::new("Eth1", 1780),
                dst_stp: PtpEndpoint::new("Eth2", 1780),
                version: 0,
            },
        }
    }

    #[tokio::test]
    async fn create_and_load() {
        let store = InMemoryStore::new();
        let record = ConnectionRecord::new(dummy_connection(), "corr-1", Utc::now());
        let id = record.connection_id().clone();
        store.create(&record).await.unwrap();
        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.reservation_state, ReservationState::Start);
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = InMemoryStore::new();
        let record = ConnectionRecord::new(dummy_connection(), "corr-1", Utc::now());
        store.create(&record).await.unwrap();
        assert!(matches!(store.create(&record).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn find_by_correlation_id_finds_existing_connection() {
        let store = InMemoryStore::new();
        let record = ConnectionRecord::new(dummy_connection(), "corr-42", Utc::now());
        let id = record.connection_id().clone();
        store.create(&record).await.unwrap();

        let found = store.find_by_correlation_id("corr-42").await.unwrap().unwrap();
        assert_eq!(found.connection_id(), &id);
        assert!(store.find_by_correlation_id("corr-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cas_reservation_state_detects_conflict() {
        let store = InMemoryStore::new();
        let record = ConnectionRecord::new(dummy_connection(), "corr-1", Utc::now());
        let id = record.connection_id().clone();
        store.create(&record).await.unwrap();

        store
            .cas_reservation_state(&id, ReservationState::Start, ReservationState::Checking, Utc::now())
            .await
            .unwrap();

        let err = store
            .cas_reservation_state(&id, ReservationState::Start, ReservationState::Checking, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { machine: "RSM", .. }));
    }

    #[tokio::test]
    async fn notifications_are_numbered_from_one() {
        let store = InMemoryStore::new();
        let record = ConnectionRecord::new(dummy_connection(), "corr-1", Utc::now());
        let id = record.connection_id().clone();
        store.create(&record).await.unwrap();

        let n1 = store
            .append_notification(&id, NotificationKind::ReserveTimeout, serde_json::json!({}), Utc::now())
            .await
            .unwrap();
        let n2 = store
            .append_notification(&id, NotificationKind::ErrorEvent, serde_json::json!({}), Utc::now())
            .await
            .unwrap();
        assert_eq!((n1, n2), (1, 2));
    }

    #[tokio::test]
    async fn claim_ready_only_takes_due_jobs() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let due = JobRecord::new(JobKind::ReserveTimeout, None, crate::record::JobTrigger::Now, serde_json::json!({}));
        let future = JobRecord::new(
            JobKind::AutoEnd,
            None,
            crate::record::JobTrigger::RunAt { at: now + chrono::Duration::hours(1) },
            serde_json::json!({}),
        );
        store.enqueue(due.clone()).await.unwrap();
        store.enqueue(future).await.unwrap();

        let claimed = store.claim_ready(now, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].job_id, due.job_id);
    }
}
