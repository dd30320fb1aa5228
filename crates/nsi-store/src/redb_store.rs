use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nsi_domain::{ConnectionId, DataPlaneState, LifecycleState, NotificationKind, ProvisioningState, ReservationState};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{ConnectionRecord, JobKind, JobRecord, JobState, Notification, ResultRecord};
use crate::store::{ConnectionStore, JobStore};

const CONNECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("connections");
const NOTIFICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("notifications");
const RESULTS: TableDefinition<&str, &[u8]> = TableDefinition::new("results");
const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

fn internal<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Persistent connection/job store backed by a redb database file.
///
/// Notifications and results are stored as a single JSON blob per
/// connection, appended to in place, rather than a separate table per
/// child collection.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;
        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(CONNECTIONS).map_err(internal)?;
            wtxn.open_table(NOTIFICATIONS).map_err(internal)?;
            wtxn.open_table(RESULTS).map_err(internal)?;
            wtxn.open_table(JOBS).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn read_connection(&self, id: &ConnectionId) -> Result<Option<ConnectionRecord>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(CONNECTIONS).map_err(internal)?;
        match table.get(id.to_string().as_str()).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn write_connection(&self, record: &ConnectionRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        let key = record.connection_id().to_string();
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(CONNECTIONS).map_err(internal)?;
            table.insert(key.as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn read_notifications(&self, id: &ConnectionId) -> Result<Vec<Notification>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(NOTIFICATIONS).map_err(internal)?;
        match table.get(id.to_string().as_str()).map_err(internal)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(Vec::new()),
        }
    }

    fn write_notifications(&self, id: &ConnectionId, list: &[Notification]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(list)?;
        let key = id.to_string();
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(NOTIFICATIONS).map_err(internal)?;
            table.insert(key.as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn read_results(&self, id: &ConnectionId) -> Result<Vec<ResultRecord>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(RESULTS).map_err(internal)?;
        match table.get(id.to_string().as_str()).map_err(internal)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(Vec::new()),
        }
    }

    fn write_results(&self, id: &ConnectionId, list: &[ResultRecord]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(list)?;
        let key = id.to_string();
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(RESULTS).map_err(internal)?;
            table.insert(key.as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn read_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(JOBS).map_err(internal)?;
        match table.get(job_id.to_string().as_str()).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn write_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(job)?;
        let key = job.job_id.to_string();
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(JOBS).map_err(internal)?;
            table.insert(key.as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn all_jobs(&self) -> Result<Vec<JobRecord>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(JOBS).map_err(internal)?;
        let mut jobs = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            jobs.push(serde_json::from_slice(v.value())?);
        }
        Ok(jobs)
    }
}

fn cas_err(connection_id: &ConnectionId, machine: &'static str, expected: String, actual: String) -> StoreError {
    StoreError::Conflict { connection_id: connection_id.to_string(), machine, expected, actual }
}

#[async_trait]
impl ConnectionStore for RedbStore {
    async fn create(&self, record: &ConnectionRecord) -> Result<(), StoreError> {
        if self.read_connection(record.connection_id())?.is_some() {
            return Err(StoreError::Duplicate(record.connection_id().to_string()));
        }
        self.write_connection(record)
    }

    async fn load(&self, id: &ConnectionId) -> Result<Option<ConnectionRecord>, StoreError> {
        self.read_connection(id)
    }

    async fn list(&self) -> Result<Vec<ConnectionRecord>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(CONNECTIONS).map_err(internal)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<ConnectionRecord>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(CONNECTIONS).map_err(internal)?;
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            let record: ConnectionRecord = serde_json::from_slice(v.value())?;
            if record.reserve_correlation_id == correlation_id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn cas_reservation_state(
        &self,
        id: &ConnectionId,
        expected: ReservationState,
        new: ReservationState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self.read_connection(id)?.ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.reservation_state != expected {
            return Err(cas_err(id, "RSM", expected.to_string(), record.reservation_state.to_string()));
        }
        record.reservation_state = new;
        record.last_modified = now;
        self.write_connection(&record)
    }

    async fn cas_provisioning_state(
        &self,
        id: &ConnectionId,
        expected: Option<ProvisioningState>,
        new: ProvisioningState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self.read_connection(id)?.ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.provisioning_state != expected {
            return Err(cas_err(
                id,
                "PSM",
                expected.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
                record.provisioning_state.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
            ));
        }
        record.provisioning_state = Some(new);
        record.last_modified = now;
        self.write_connection(&record)
    }

    async fn cas_lifecycle_state(
        &self,
        id: &ConnectionId,
        expected: LifecycleState,
        new: LifecycleState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self.read_connection(id)?.ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.lifecycle_state != expected {
            return Err(cas_err(id, "LSM", expected.to_string(), record.lifecycle_state.to_string()));
        }
        record.lifecycle_state = new;
        record.last_modified = now;
        self.write_connection(&record)
    }

    async fn cas_data_plane_state(
        &self,
        id: &ConnectionId,
        expected: DataPlaneState,
        new: DataPlaneState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self.read_connection(id)?.ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        if record.data_plane_state != expected {
            return Err(cas_err(id, "DPSM", expected.to_string(), record.data_plane_state.to_string()));
        }
        record.data_plane_state = new;
        record.last_modified = now;
        self.write_connection(&record)
    }

    async fn set_circuit_id(&self, id: &ConnectionId, circuit_id: String, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut record = self.read_connection(id)?.ok_or_else(|| StoreError::ConnectionNotFound(id.to_string()))?;
        record.circuit_id = Some(circuit_id);
        record.last_modified = now;
        self.write_connection(&record)
    }

    async fn append_notification(
        &self,
        id: &ConnectionId,
        kind: NotificationKind,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if self.read_connection(id)?.is_none() {
            return Err(StoreError::ConnectionNotFound(id.to_string()));
        }
        let mut list = self.read_notifications(id)?;
        let notification_id = list.len() as u64 + 1;
        list.push(Notification { notification_id, connection_id: id.clone(), timestamp: now, kind, payload });
        self.write_notifications(id, &list)?;
        Ok(notification_id)
    }

    async fn append_result(
        &self,
        id: &ConnectionId,
        correlation_id: String,
        outcome: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if self.read_connection(id)?.is_none() {
            return Err(StoreError::ConnectionNotFound(id.to_string()));
        }
        let mut list = self.read_results(id)?;
        let result_id = list.len() as u64 + 1;
        list.push(ResultRecord { result_id, connection_id: id.clone(), timestamp: now, correlation_id, outcome });
        self.write_results(id, &list)?;
        Ok(result_id)
    }

    async fn list_notifications(&self, id: &ConnectionId, since: Option<u64>) -> Result<Vec<Notification>, StoreError> {
        let list = self.read_notifications(id)?;
        Ok(match since {
            Some(s) => list.into_iter().filter(|n| n.notification_id > s).collect(),
            None => list,
        })
    }

    async fn list_results(&self, id: &ConnectionId, since: Option<u64>) -> Result<Vec<ResultRecord>, StoreError> {
        let list = self.read_results(id)?;
        Ok(match since {
            Some(s) => list.into_iter().filter(|r| r.result_id > s).collect(),
            None => list,
        })
    }
}

#[async_trait]
impl JobStore for RedbStore {
    async fn enqueue(&self, job: JobRecord) -> Result<(), StoreError> {
        self.write_job(&job)
    }

    async fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        let mut claimed = Vec::new();
        for mut job in self.all_jobs()? {
            if claimed.len() >= limit {
                break;
            }
            if job.state == JobState::Pending && job.trigger.is_ready(now) {
                job.state = JobState::Running;
                self.write_job(&job)?;
                claimed.push(job);
            }
        }
        Ok(claimed)
    }

    async fn mark_done(&self, job_id: Uuid) -> Result<(), StoreError> {
        let mut job = self.read_job(job_id)?.ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.state = JobState::Done;
        self.write_job(&job)
    }

    async fn mark_failed(&self, job_id: Uuid, error: String) -> Result<(), StoreError> {
        let mut job = self.read_job(job_id)?.ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.state = JobState::Failed;
        job.last_error = Some(error);
        self.write_job(&job)
    }

    async fn reschedule(&self, job_id: Uuid, run_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut job = self.read_job(job_id)?.ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.state = JobState::Pending;
        job.attempts += 1;
        job.trigger = crate::record::JobTrigger::RunAt { at: run_at };
        self.write_job(&job)
    }

    async fn cancel_for_connection(&self, connection_id: &ConnectionId, except: &[JobKind]) -> Result<(), StoreError> {
        for mut job in self.all_jobs()? {
            if job.connection_id.as_ref() == Some(connection_id) && job.state == JobState::Pending && !except.contains(&job.job_kind) {
                job.state = JobState::Done;
                self.write_job(&job)?;
            }
        }
        Ok(())
    }

    async fn recover_pending(&self) -> Result<Vec<JobRecord>, StoreError> {
        Ok(self
            .all_jobs()?
            .into_iter()
            .filter(|j| matches!(j.state, JobState::Pending | JobState::Running))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsi_domain::{Connection, Criteria, PtpEndpoint, Schedule};
    use tempfile::TempDir;

    fn dummy_record() -> ConnectionRecord {
        ConnectionRecord::new(
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
            },
            "corr-1",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        let record = dummy_record();
        let id = record.connection_id().clone();

        {
            let store = RedbStore::open(&path).unwrap();
            store.create(&record).await.unwrap();
        }
        {
            let store = RedbStore::open(&path).unwrap();
            let loaded = store.load(&id).await.unwrap();
            assert!(loaded.is_some());
        }
    }

    #[tokio::test]
    async fn find_by_correlation_id_finds_existing_connection() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("store.redb")).unwrap();
        let record = dummy_record();
        let id = record.connection_id().clone();
        store.create(&record).await.unwrap();

        let found = store.find_by_correlation_id("corr-1").await.unwrap().unwrap();
        assert_eq!(found.connection_id(), &id);
        assert!(store.find_by_correlation_id("corr-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cas_conflict_detected() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("store.redb")).unwrap();
        let record = dummy_record();
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
    async fn job_claim_marks_running() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("store.redb")).unwrap();
        let job = JobRecord::new(JobKind::ReserveTimeout, None, crate::record::JobTrigger::Now, serde_json::json!({}));
        let job_id = job.job_id;
        store.enqueue(job).await.unwrap();

        let claimed = store.claim_ready(Utc::now(), 10).await.unwrap();
        assert_eq!(claimed.len(), 1);

        store.mark_done(job_id).await.unwrap();
        assert!(store.recover_pending().await.unwrap().is_empty());
    }
}
