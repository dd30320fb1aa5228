//! Message processors — the synchronous half of each NSI verb. Each function
//! validates the request against the current state and the topology,
//! performs the CAS that advances the relevant state machine, persists a job
//! to do the actual backend work, and returns immediately with an
//! acknowledgement. The job (see [`crate::handlers`]) does the NRM call and
//! the requester callback.

use chrono::Utc;

use nsi_domain::{
    rsm_transition, Connection, ConnectionId, LifecycleEvent, LifecycleState, ProvisioningEvent,
    ProvisioningState, ReservationEvent, ReservationState,
};
use nsi_store::{ConnectionRecord, JobKind, JobRecord, JobTrigger};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::messages::{Ack, ConnectionCorrelated, JobPayload, ReserveRequest};

async fn enqueue_work(ctx: &EngineContext, kind: JobKind, connection_id: &ConnectionId, correlation_id: &str) -> Result<(), EngineError> {
    let job = JobRecord::new(
        kind,
        Some(connection_id.clone()),
        JobTrigger::Now,
        serde_json::to_value(JobPayload::new(correlation_id.to_string())).unwrap_or_default(),
    );
    ctx.jobs.enqueue(job).await?;
    Ok(())
}

/// `Reserve` — validates the requested criteria against the current topology
/// snapshot before admitting a new connection.
///
/// A redelivery of a message the provider has already seen (same
/// `correlation_id`) is answered with the connection that delivery created
/// the first time, rather than admitting a duplicate reservation.
pub async fn reserve(ctx: &EngineContext, request: ReserveRequest) -> Result<Ack, EngineError> {
    if let Some(existing) = ctx.store.find_by_correlation_id(&request.correlation_id).await? {
        return Ok(Ack { connection_id: existing.connection_id().clone() });
    }

    if !request.criteria.schedule.is_ordered() {
        return Err(EngineError::InvalidSchedule("start_time must be <= end_time".into()));
    }
    if !request.criteria.vlans_match() {
        return Err(EngineError::VlanMismatch {
            src: request.criteria.src_stp.vlan,
            dst: request.criteria.dst_stp.vlan,
        });
    }

    let topology = ctx.topology.snapshot().await;
    for stp in [&request.criteria.src_stp, &request.criteria.dst_stp] {
        let entry = topology
            .lookup(&stp.port_id)
            .ok_or_else(|| EngineError::StpUnknown(stp.port_id.clone()))?;
        if !entry.vlan_in_range(stp.vlan) {
            return Err(EngineError::StpUnknown(format!("{} has no vlan {}", stp.port_id, stp.vlan)));
        }
        if !entry.bandwidth_available(request.criteria.bandwidth_mbps) {
            return Err(EngineError::CapacityUnavailable {
                stp_id: entry.stp_id.clone(),
                requested_mbps: request.criteria.bandwidth_mbps,
            });
        }
    }

    let connection_id = ConnectionId::new();
    let now = Utc::now();
    let mut criteria = request.criteria;
    if criteria.description.is_none() {
        criteria.description = request.description;
    }
    let connection = Connection {
        connection_id: connection_id.clone(),
        global_reservation_id: request.global_reservation_id,
        requester_nsa: request.requester_nsa,
        provider_nsa: request.provider_nsa,
        criteria,
    };
    let mut record = ConnectionRecord::new(connection, request.correlation_id.clone(), now);
    record.reservation_state = rsm_transition(ReservationState::Start, ReservationEvent::ReserveRequest)?;
    ctx.store.create(&record).await?;

    enqueue_work(ctx, JobKind::Reserve, &connection_id, &request.correlation_id).await?;
    Ok(Ack { connection_id })
}

/// `ReserveCommit` — permitted from RSM `Held` or `Timeout`.
pub async fn reserve_commit(ctx: &EngineContext, request: ConnectionCorrelated) -> Result<Ack, EngineError> {
    let record = load_or_not_found(ctx, &request.connection_id).await?;
    if !matches!(record.reservation_state, ReservationState::Held | ReservationState::Timeout) {
        return Err(EngineError::PreconditionFailed(format!(
            "reserve_commit requires Held or Timeout, found {:?}",
            record.reservation_state
        )));
    }
    let now = Utc::now();
    if let Some(start_time) = record.connection.criteria.schedule.start_time {
        let grace = chrono::Duration::from_std(ctx.config.grace).unwrap_or(chrono::Duration::zero());
        if start_time < now - grace {
            return Err(EngineError::PreconditionFailed(format!(
                "start_time {start_time} is more than {:?} in the past",
                ctx.config.grace
            )));
        }
    }
    let new_state = rsm_transition(record.reservation_state, ReservationEvent::ReserveCommitRequest)?;
    ctx.store.cas_reservation_state(&request.connection_id, record.reservation_state, new_state, now).await?;
    enqueue_work(ctx, JobKind::ReserveCommit, &request.connection_id, &request.correlation_id).await?;
    Ok(Ack { connection_id: request.connection_id })
}

/// `ReserveAbort` — permitted from RSM `Held` or `Failed`.
pub async fn reserve_abort(ctx: &EngineContext, request: ConnectionCorrelated) -> Result<Ack, EngineError> {
    let record = load_or_not_found(ctx, &request.connection_id).await?;
    if !matches!(record.reservation_state, ReservationState::Held | ReservationState::Failed) {
        return Err(EngineError::PreconditionFailed(format!(
            "reserve_abort requires Held or Failed, found {:?}",
            record.reservation_state
        )));
    }
    let now = Utc::now();
    let new_state = rsm_transition(record.reservation_state, ReservationEvent::ReserveAbortRequest)?;
    ctx.store.cas_reservation_state(&request.connection_id, record.reservation_state, new_state, now).await?;
    ctx.jobs.cancel_for_connection(&request.connection_id, &[JobKind::ReserveAbort]).await?;
    enqueue_work(ctx, JobKind::ReserveAbort, &request.connection_id, &request.correlation_id).await?;
    Ok(Ack { connection_id: request.connection_id })
}

/// `Provision` — requires PSM `Released`, LSM `Created`, and the schedule's
/// end time (if any) has not already passed.
pub async fn provision(ctx: &EngineContext, request: ConnectionCorrelated) -> Result<Ack, EngineError> {
    let record = load_or_not_found(ctx, &request.connection_id).await?;
    if record.provisioning_state != Some(ProvisioningState::Released) {
        return Err(EngineError::PreconditionFailed(format!(
            "provision requires Released, found {:?}",
            record.provisioning_state
        )));
    }
    if record.lifecycle_state != LifecycleState::Created {
        return Err(EngineError::PreconditionFailed(format!(
            "provision requires lifecycle Created, found {:?}",
            record.lifecycle_state
        )));
    }
    let now = Utc::now();
    if record.connection.criteria.schedule.has_ended(now) {
        return Err(EngineError::PreconditionFailed("end_time has already passed".into()));
    }
    let new_state = nsi_domain::psm_transition(ProvisioningState::Released, ProvisioningEvent::ProvisionRequest)?;
    ctx.store.cas_provisioning_state(&request.connection_id, Some(ProvisioningState::Released), new_state, now).await?;
    enqueue_work(ctx, JobKind::Provision, &request.connection_id, &request.correlation_id).await?;
    Ok(Ack { connection_id: request.connection_id })
}

/// `Release` — requires PSM `Provisioned`.
pub async fn release(ctx: &EngineContext, request: ConnectionCorrelated) -> Result<Ack, EngineError> {
    let record = load_or_not_found(ctx, &request.connection_id).await?;
    if record.provisioning_state != Some(ProvisioningState::Provisioned) {
        return Err(EngineError::PreconditionFailed(format!(
            "release requires Provisioned, found {:?}",
            record.provisioning_state
        )));
    }
    let now = Utc::now();
    let new_state = nsi_domain::psm_transition(ProvisioningState::Provisioned, ProvisioningEvent::ReleaseRequest)?;
    ctx.store.cas_provisioning_state(&request.connection_id, Some(ProvisioningState::Provisioned), new_state, now).await?;
    enqueue_work(ctx, JobKind::Release, &request.connection_id, &request.correlation_id).await?;
    Ok(Ack { connection_id: request.connection_id })
}

/// `Terminate` — permitted from any LSM state except `Terminated`; cancels
/// every other pending job for the connection (auto-start/auto-end timers in
/// particular) since termination overrides the schedule.
pub async fn terminate(ctx: &EngineContext, request: ConnectionCorrelated) -> Result<Ack, EngineError> {
    let record = load_or_not_found(ctx, &request.connection_id).await?;
    if record.lifecycle_state == LifecycleState::Terminated {
        return Err(EngineError::PreconditionFailed("connection already terminated".into()));
    }
    let now = Utc::now();
    let new_state = nsi_domain::lsm_transition(record.lifecycle_state, LifecycleEvent::TerminateRequest)?;
    ctx.store.cas_lifecycle_state(&request.connection_id, record.lifecycle_state, new_state, now).await?;
    ctx.jobs.cancel_for_connection(&request.connection_id, &[JobKind::Terminate]).await?;
    enqueue_work(ctx, JobKind::Terminate, &request.connection_id, &request.correlation_id).await?;
    Ok(Ack { connection_id: request.connection_id })
}

async fn load_or_not_found(ctx: &EngineContext, id: &ConnectionId) -> Result<ConnectionRecord, EngineError> {
    ctx.store
        .load(id)
        .await?
        .ok_or_else(|| EngineError::ConnectionNotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nsi_config::{ApiConfig, NrmBackendSelection, ProviderConfig, RequesterConfig, StoreBackend};
    use nsi_domain::{Criteria, PtpEndpoint, Schedule};
    use nsi_store::InMemoryStore;
    use nsi_nrm::YamlStubBackend;
    use nsi_topology::TopologyCache;

    use crate::requester::NoopRequesterClient;

    fn sample_request() -> ReserveRequest {
        ReserveRequest {
            correlation_id: "corr-1".into(),
            global_reservation_id: None,
            requester_nsa: "urn:ogf:network:example.org:requester".into(),
            provider_nsa: "urn:ogf:network:example.org:provider".into(),
            description: None,
            criteria: Criteria {
                description: None,
                schedule: Schedule::default(),
                bandwidth_mbps: 100,
                src_stp: PtpEndpoint::new("PortA", 100),
                dst_stp: PtpEndpoint::new("PortB", 100),
                version: 0,
            },
        }
    }

    async fn test_context(topology_yaml: &str) -> EngineContext {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.yaml");
        std::fs::write(&path, topology_yaml).unwrap();
        let topology = TopologyCache::load(&path).unwrap();
        std::mem::forget(dir);

        let store = Arc::new(InMemoryStore::new());
        EngineContext::new(
            store.clone(),
            store,
            Arc::new(YamlStubBackend::default()),
            topology,
            Arc::new(NoopRequesterClient::default()),
            ProviderConfig {
                requester_nsa: "urn:ogf:network:example.org:requester".into(),
                provider_nsa: "urn:ogf:network:example.org:provider".into(),
                topology_path: path.to_string_lossy().into_owned(),
                topology_refresh: std::time::Duration::from_secs(300),
                hold_timeout: std::time::Duration::from_secs(120),
                backend_call_timeout: std::time::Duration::from_secs(30),
                grace: std::time::Duration::from_secs(30),
                worker_pool_size: 4,
                store: StoreBackend::Memory,
                nrm_backend: NrmBackendSelection::YamlStub,
                requester: RequesterConfig::default(),
                api: ApiConfig::default(),
            },
        )
    }

    const TOPOLOGY_YAML: &str = r#"
stps:
  - stp_id: PortA
    port_id: PortA
    vlan_ranges: "100-200"
    bandwidth: 1000
  - stp_id: PortB
    port_id: PortB
    vlan_ranges: "100-200"
    bandwidth: 1000
"#;

    #[tokio::test]
    async fn reserve_rejects_vlan_mismatch() {
        let ctx = test_context(TOPOLOGY_YAML).await;
        let mut request = sample_request();
        request.criteria.dst_stp.vlan = 101;
        let err = reserve(&ctx, request).await.unwrap_err();
        assert!(matches!(err, EngineError::VlanMismatch { .. }));
    }

    #[tokio::test]
    async fn reserve_rejects_unknown_stp() {
        let ctx = test_context(TOPOLOGY_YAML).await;
        let mut request = sample_request();
        request.criteria.src_stp.port_id = "Nope".into();
        let err = reserve(&ctx, request).await.unwrap_err();
        assert!(matches!(err, EngineError::StpUnknown(_)));
    }

    #[tokio::test]
    async fn reserve_admits_valid_request() {
        let ctx = test_context(TOPOLOGY_YAML).await;
        let ack = reserve(&ctx, sample_request()).await.unwrap();
        let record = ctx.store.load(&ack.connection_id).await.unwrap().unwrap();
        assert_eq!(record.reservation_state, ReservationState::Checking);
    }

    #[tokio::test]
    async fn reserve_carries_description_into_criteria() {
        let ctx = test_context(TOPOLOGY_YAML).await;
        let mut request = sample_request();
        request.description = Some("circuit for the weekend demo".into());
        let ack = reserve(&ctx, request).await.unwrap();
        let record = ctx.store.load(&ack.connection_id).await.unwrap().unwrap();
        assert_eq!(record.connection.criteria.description.as_deref(), Some("circuit for the weekend demo"));
    }

    #[tokio::test]
    async fn reserve_is_idempotent_on_correlation_id() {
        let ctx = test_context(TOPOLOGY_YAML).await;
        let first = reserve(&ctx, sample_request()).await.unwrap();
        let second = reserve(&ctx, sample_request()).await.unwrap();
        assert_eq!(first.connection_id, second.connection_id);
        assert_eq!(ctx.store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reserve_commit_rejects_start_time_beyond_grace() {
        let ctx = test_context(TOPOLOGY_YAML).await;
        let mut request = sample_request();
        request.criteria.schedule.start_time = Some(Utc::now() - chrono::Duration::minutes(5));
        let ack = reserve(&ctx, request).await.unwrap();
        ctx.store.cas_reservation_state(&ack.connection_id, ReservationState::Checking, ReservationState::Held, Utc::now()).await.unwrap();

        let err = reserve_commit(&ctx, ConnectionCorrelated { connection_id: ack.connection_id, correlation_id: "corr-2".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));
    }
}
