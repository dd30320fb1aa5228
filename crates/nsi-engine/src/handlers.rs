//! One handler per [`JobKind`] — the "heavy work" half of a message
//! processor's *validate → CAS → persist → enqueue → ack* split. Every
//! handler re-loads the connection record and re-checks its precondition via
//! CAS before touching the backend, so a stale or duplicate dispatch is a
//! silent no-op rather than a corrupted transition.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use nsi_domain::{
    dpsm_transition, lsm_transition, psm_transition, rsm_transition, DataPlaneEvent,
    DataPlaneState, LifecycleEvent, LifecycleState, NotificationKind, ProvisioningEvent,
    ProvisioningState, ReservationEvent, ReservationState,
};
use nsi_nrm::NrmCallParams;
use nsi_store::{ConnectionRecord, JobKind, JobRecord, JobTrigger};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::messages::JobPayload;
use crate::requester::{send_with_retry, RequesterMessage};

fn nrm_params(record: &ConnectionRecord) -> NrmCallParams {
    NrmCallParams {
        connection_id: record.connection.connection_id.clone(),
        bandwidth_mbps: record.connection.criteria.bandwidth_mbps,
        src_port_id: record.connection.criteria.src_stp.port_id.clone(),
        src_vlan: record.connection.criteria.src_stp.vlan,
        dst_port_id: record.connection.criteria.dst_stp.port_id.clone(),
        dst_vlan: record.connection.criteria.dst_stp.vlan,
        circuit_id: record.circuit_id.clone(),
    }
}

async fn load(ctx: &EngineContext, job: &JobRecord) -> Result<Option<ConnectionRecord>, EngineError> {
    let id = job
        .connection_id
        .clone()
        .ok_or_else(|| EngineError::Internal(format!("job {} has no connection_id", job.job_id)))?;
    Ok(ctx.store.load(&id).await?)
}

fn payload(job: &JobRecord) -> Result<JobPayload, EngineError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| EngineError::Internal(format!("job {} payload decode: {e}", job.job_id)))
}

/// Takes the per-connection lock for the duration of `fut` only. Every
/// handler calls this around the state-transition step (the CAS and its
/// accompanying store writes), never around the preceding NRM backend call
/// or a requester callback delivery — those run unlocked so a slow or
/// unreachable counterpart can't stall this connection's other jobs.
async fn with_connection_lock<Fut, T>(ctx: &EngineContext, connection_id: &nsi_domain::ConnectionId, fut: Fut) -> T
where
    Fut: std::future::Future<Output = T>,
{
    let _guard = ctx.connection_lock(connection_id).await.lock_owned().await;
    fut.await
}

async fn enqueue_callback(ctx: &EngineContext, connection_id: &nsi_domain::ConnectionId, message: RequesterMessage) -> Result<(), EngineError> {
    let payload = serde_json::to_value(&message)
        .map_err(|e| EngineError::Internal(format!("encode requester message: {e}")))?;
    let job = JobRecord::new(JobKind::RequesterCallback, Some(connection_id.clone()), JobTrigger::Now, payload);
    ctx.jobs.enqueue(job).await?;
    Ok(())
}

// ── Reserve family ────────────────────────────────────────────────────────────

pub async fn handle_reserve(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "reserve job: connection vanished, dropping");
        return Ok(());
    };
    if record.reservation_state != ReservationState::Checking {
        debug!(connection_id = %record.connection_id(), state = ?record.reservation_state, "reserve job: stale, skipping");
        return Ok(());
    }
    let payload = self::payload(job)?;
    let now = Utc::now();
    let connection_id = record.connection_id().clone();

    match ctx.nrm.reserve(&nrm_params(&record)).await {
        Ok(_) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = rsm_transition(record.reservation_state, ReservationEvent::ReserveConfirmed)?;
                ctx.store.cas_reservation_state(&connection_id, record.reservation_state, new_state, now).await?;
                ctx.store
                    .append_result(&connection_id, payload.correlation_id.clone(), json!({"result": "reserve_confirmed"}), now)
                    .await?;

                let hold_timeout = ctx.config.hold_timeout;
                let timer = JobRecord::new(
                    JobKind::ReserveTimeout,
                    Some(connection_id.clone()),
                    JobTrigger::RunAt { at: now + chrono::Duration::from_std(hold_timeout).unwrap_or_default() },
                    serde_json::to_value(JobPayload::new(payload.correlation_id.clone())).unwrap_or_default(),
                );
                ctx.jobs.enqueue(timer).await?;
                Ok::<(), EngineError>(())
            })
            .await?;

            enqueue_callback(ctx, &connection_id, RequesterMessage::ReserveConfirmed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
            }).await?;
        }
        Err(e) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = rsm_transition(record.reservation_state, ReservationEvent::ReserveFailed)?;
                ctx.store.cas_reservation_state(&connection_id, record.reservation_state, new_state, now).await?;
                ctx.store
                    .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                    .await?;
                Ok::<(), EngineError>(())
            })
            .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::ReserveFailed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
                error: e.to_string(),
            }).await?;
        }
    }
    Ok(())
}

pub async fn handle_reserve_commit(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "reserve_commit job: connection vanished, dropping");
        return Ok(());
    };
    if record.reservation_state != ReservationState::Committing {
        debug!(connection_id = %record.connection_id(), "reserve_commit job: stale, skipping");
        return Ok(());
    }
    let payload = self::payload(job)?;
    let now = Utc::now();
    let connection_id = record.connection_id().clone();

    match ctx.nrm.reserve_commit(&nrm_params(&record)).await {
        Ok(_) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = rsm_transition(record.reservation_state, ReservationEvent::ReserveCommitConfirmed)?;
                ctx.store.cas_reservation_state(&connection_id, record.reservation_state, new_state, now).await?;

                if record.provisioning_state.is_none() {
                    ctx.store.cas_provisioning_state(&connection_id, None, ProvisioningState::Released, now).await?;
                }

                let schedule = &record.connection.criteria.schedule;
                let start_trigger = match schedule.start_time {
                    Some(start) => JobTrigger::RunAt { at: start },
                    None => JobTrigger::Now,
                };
                ctx.jobs
                    .enqueue(JobRecord::new(JobKind::AutoStart, Some(connection_id.clone()), start_trigger, json!({})))
                    .await?;
                if let Some(end) = schedule.end_time {
                    ctx.jobs
                        .enqueue(JobRecord::new(JobKind::AutoEnd, Some(connection_id.clone()), JobTrigger::RunAt { at: end }, json!({})))
                        .await?;
                }
                Ok::<(), EngineError>(())
            })
            .await?;

            enqueue_callback(ctx, &connection_id, RequesterMessage::ReserveCommitConfirmed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
            }).await?;
        }
        Err(e) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = rsm_transition(record.reservation_state, ReservationEvent::ReserveCommitFailed)?;
                ctx.store.cas_reservation_state(&connection_id, record.reservation_state, new_state, now).await?;
                ctx.store
                    .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                    .await?;
                Ok::<(), EngineError>(())
            })
            .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::ReserveCommitFailed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
                error: e.to_string(),
            }).await?;
        }
    }
    Ok(())
}

pub async fn handle_reserve_abort(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "reserve_abort job: connection vanished, dropping");
        return Ok(());
    };
    if record.reservation_state != ReservationState::Aborting {
        debug!(connection_id = %record.connection_id(), "reserve_abort job: stale, skipping");
        return Ok(());
    }
    let payload = self::payload(job)?;
    let now = Utc::now();
    let connection_id = record.connection_id().clone();

    let outcome = ctx.nrm.reserve_abort(&nrm_params(&record)).await;
    match outcome {
        Ok(_) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = rsm_transition(record.reservation_state, ReservationEvent::ReserveAbortConfirmed)?;
                ctx.store.cas_reservation_state(&connection_id, record.reservation_state, new_state, now).await?;
                Ok::<(), EngineError>(())
            })
            .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::ReserveAbortConfirmed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
            }).await?;
            Ok(())
        }
        Err(e) => {
            ctx.store
                .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                .await?;
            Err(e.into())
        }
    }
}

// ── Provisioning family ───────────────────────────────────────────────────────

pub async fn handle_provision(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "provision job: connection vanished, dropping");
        return Ok(());
    };
    if record.provisioning_state != Some(ProvisioningState::Provisioning) {
        debug!(connection_id = %record.connection_id(), "provision job: stale, skipping");
        return Ok(());
    }
    let payload = self::payload(job)?;
    let now = Utc::now();
    let connection_id = record.connection_id().clone();

    match ctx.nrm.provision(&nrm_params(&record)).await {
        Ok(_) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = psm_transition(ProvisioningState::Provisioning, ProvisioningEvent::ProvisionConfirmed)?;
                ctx.store.cas_provisioning_state(&connection_id, Some(ProvisioningState::Provisioning), new_state, now).await?;

                if record.connection.criteria.schedule.has_started(now) {
                    ctx.jobs
                        .enqueue(JobRecord::new(JobKind::Activate, Some(connection_id.clone()), JobTrigger::Now, json!({})))
                        .await?;
                }
                Ok::<(), EngineError>(())
            })
            .await?;

            enqueue_callback(ctx, &connection_id, RequesterMessage::ProvisionConfirmed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
            }).await?;
        }
        Err(e) => {
            ctx.store
                .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::ProvisionFailed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
                error: e.to_string(),
            }).await?;
            return Err(e.into());
        }
    }
    Ok(())
}

pub async fn handle_release(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(mut record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "release job: connection vanished, dropping");
        return Ok(());
    };
    if record.provisioning_state != Some(ProvisioningState::Releasing) {
        debug!(connection_id = %record.connection_id(), "release job: stale, skipping");
        return Ok(());
    }
    let payload = self::payload(job)?;
    let connection_id = record.connection_id().clone();

    if record.data_plane_state == DataPlaneState::Activated {
        do_deactivate(ctx, &record).await?;
        record = ctx.store.load(&connection_id).await?.ok_or_else(|| {
            EngineError::ConnectionNotFound(connection_id.to_string())
        })?;
    }

    let now = Utc::now();
    match ctx.nrm.release(&nrm_params(&record)).await {
        Ok(_) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = psm_transition(ProvisioningState::Releasing, ProvisioningEvent::ReleaseConfirmed)?;
                ctx.store.cas_provisioning_state(&connection_id, Some(ProvisioningState::Releasing), new_state, now).await?;
                Ok::<(), EngineError>(())
            })
            .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::ReleaseConfirmed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
            }).await?;
        }
        Err(e) => {
            ctx.store
                .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::ReleaseFailed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
                error: e.to_string(),
            }).await?;
            return Err(e.into());
        }
    }
    Ok(())
}

pub async fn handle_terminate(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(mut record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "terminate job: connection vanished, dropping");
        return Ok(());
    };
    if record.lifecycle_state != LifecycleState::Terminating {
        debug!(connection_id = %record.connection_id(), "terminate job: stale, skipping");
        return Ok(());
    }
    let payload = self::payload(job)?;
    let connection_id = record.connection_id().clone();

    if record.data_plane_state == DataPlaneState::Activated {
        do_deactivate(ctx, &record).await?;
        record = ctx.store.load(&connection_id).await?.ok_or_else(|| {
            EngineError::ConnectionNotFound(connection_id.to_string())
        })?;
    }

    let now = Utc::now();
    match ctx.nrm.terminate(&nrm_params(&record)).await {
        Ok(_) => {
            with_connection_lock(ctx, &connection_id, async {
                let new_state = lsm_transition(LifecycleState::Terminating, LifecycleEvent::TerminateConfirmed)?;
                ctx.store.cas_lifecycle_state(&connection_id, LifecycleState::Terminating, new_state, now).await?;
                Ok::<(), EngineError>(())
            })
            .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::TerminateConfirmed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
            }).await?;
        }
        Err(e) => {
            ctx.store
                .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                .await?;
            enqueue_callback(ctx, &connection_id, RequesterMessage::TerminateFailed {
                connection_id: connection_id.clone(),
                correlation_id: payload.correlation_id,
                error: e.to_string(),
            }).await?;
            return Err(e.into());
        }
    }
    Ok(())
}

// ── Data-plane activation ─────────────────────────────────────────────────────

/// Shared by the standalone `Activate` job and by `AutoStart`.
pub async fn handle_activate(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "activate job: connection vanished, dropping");
        return Ok(());
    };
    do_activate(ctx, &record).await
}

async fn do_activate(ctx: &EngineContext, record: &ConnectionRecord) -> Result<(), EngineError> {
    let connection_id = record.connection_id().clone();
    if record.data_plane_state != DataPlaneState::Deactivated || record.provisioning_state != Some(ProvisioningState::Provisioned) {
        debug!(connection_id = %connection_id, "activate: precondition not met, skipping");
        return Ok(());
    }
    let now = Utc::now();
    with_connection_lock(ctx, &connection_id, async {
        let new_state = dpsm_transition(DataPlaneState::Deactivated, DataPlaneEvent::ActivateRequest)?;
        ctx.store.cas_data_plane_state(&connection_id, DataPlaneState::Deactivated, new_state, now).await?;
        Ok::<(), EngineError>(())
    })
    .await?;

    match ctx.nrm.activate(&nrm_params(record)).await {
        Ok(circuit_id) => {
            with_connection_lock(ctx, &connection_id, async {
                let confirmed = dpsm_transition(DataPlaneState::Activating, DataPlaneEvent::ActivateConfirmed)?;
                ctx.store.cas_data_plane_state(&connection_id, DataPlaneState::Activating, confirmed, now).await?;
                if let Some(circuit_id) = circuit_id {
                    ctx.store.set_circuit_id(&connection_id, circuit_id, now).await?;
                } else {
                    warn!(connection_id = %connection_id, "activate: backend returned no circuit_id");
                }
                ctx.store
                    .append_notification(&connection_id, NotificationKind::DataPlaneStateChange, json!({"activated": true}), now)
                    .await?;
                Ok(())
            })
            .await
        }
        Err(e) => {
            with_connection_lock(ctx, &connection_id, async {
                let failed = dpsm_transition(DataPlaneState::Activating, DataPlaneEvent::ActivateFailed)?;
                ctx.store.cas_data_plane_state(&connection_id, DataPlaneState::Activating, failed, now).await?;
                ctx.store
                    .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                    .await?;
                ctx.store
                    .append_notification(&connection_id, NotificationKind::DataPlaneStateChange, json!({"activated": false}), now)
                    .await?;
                Err(e.into())
            })
            .await
        }
    }
}

pub async fn handle_deactivate(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        warn!(job_id = %job.job_id, "deactivate job: connection vanished, dropping");
        return Ok(());
    };
    do_deactivate(ctx, &record).await
}

async fn do_deactivate(ctx: &EngineContext, record: &ConnectionRecord) -> Result<(), EngineError> {
    let connection_id = record.connection_id().clone();
    if record.data_plane_state != DataPlaneState::Activated && record.data_plane_state != DataPlaneState::ActivateFailed {
        debug!(connection_id = %connection_id, "deactivate: precondition not met, skipping");
        return Ok(());
    }
    let now = Utc::now();
    let prev = record.data_plane_state;
    with_connection_lock(ctx, &connection_id, async {
        let new_state = dpsm_transition(prev, DataPlaneEvent::DeactivateRequest)?;
        ctx.store.cas_data_plane_state(&connection_id, prev, new_state, now).await?;
        Ok::<(), EngineError>(())
    })
    .await?;

    match ctx.nrm.deactivate(&nrm_params(record)).await {
        Ok(_) => {
            with_connection_lock(ctx, &connection_id, async {
                let confirmed = dpsm_transition(DataPlaneState::Deactivating, DataPlaneEvent::DeactivateConfirmed)?;
                ctx.store.cas_data_plane_state(&connection_id, DataPlaneState::Deactivating, confirmed, now).await?;
                ctx.store
                    .append_notification(&connection_id, NotificationKind::DataPlaneStateChange, json!({"activated": false}), now)
                    .await?;
                Ok(())
            })
            .await
        }
        Err(e) => {
            with_connection_lock(ctx, &connection_id, async {
                let failed = dpsm_transition(DataPlaneState::Deactivating, DataPlaneEvent::DeactivateFailed)?;
                ctx.store.cas_data_plane_state(&connection_id, DataPlaneState::Deactivating, failed, now).await?;
                ctx.store
                    .append_notification(&connection_id, NotificationKind::ErrorEvent, json!({"message": e.to_string()}), now)
                    .await?;
                Err(e.into())
            })
            .await
        }
    }
}

// ── Timers ────────────────────────────────────────────────────────────────────

pub async fn handle_reserve_timeout(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        return Ok(());
    };
    if record.reservation_state != ReservationState::Held {
        debug!(connection_id = %record.connection_id(), "reserve_timeout: no longer held, skipping");
        return Ok(());
    }
    let now = Utc::now();
    let connection_id = record.connection_id().clone();
    with_connection_lock(ctx, &connection_id, async {
        let new_state = rsm_transition(ReservationState::Held, ReservationEvent::ReserveTimeoutNotification)?;
        ctx.store.cas_reservation_state(&connection_id, ReservationState::Held, new_state, now).await?;
        ctx.store
            .append_notification(&connection_id, NotificationKind::ReserveTimeout, json!({}), now)
            .await?;
        Ok::<(), EngineError>(())
    })
    .await?;
    enqueue_callback(ctx, &connection_id, RequesterMessage::ReserveTimeout { connection_id: connection_id.clone() }).await?;
    Ok(())
}

pub async fn handle_auto_start(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(record) = load(ctx, job).await? else {
        return Ok(());
    };
    if record.provisioning_state != Some(ProvisioningState::Provisioned) || record.data_plane_state != DataPlaneState::Deactivated {
        debug!(connection_id = %record.connection_id(), "auto_start: not yet provisioned, skipping (provision will activate directly once it completes)");
        return Ok(());
    }
    let connection_id = record.connection_id().clone();
    ctx.jobs
        .enqueue(JobRecord::new(JobKind::Activate, Some(connection_id), JobTrigger::Now, json!({})))
        .await?;
    Ok(())
}

pub async fn handle_auto_end(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let Some(mut record) = load(ctx, job).await? else {
        return Ok(());
    };
    if matches!(record.lifecycle_state, LifecycleState::Terminating | LifecycleState::Terminated) {
        debug!(connection_id = %record.connection_id(), "auto_end: already terminating, skipping");
        return Ok(());
    }
    let connection_id = record.connection_id().clone();

    if record.data_plane_state == DataPlaneState::Activated {
        do_deactivate(ctx, &record).await?;
        record = ctx.store.load(&connection_id).await?.ok_or_else(|| {
            EngineError::ConnectionNotFound(connection_id.to_string())
        })?;
    }

    if record.lifecycle_state == LifecycleState::Created {
        let now = Utc::now();
        with_connection_lock(ctx, &connection_id, async {
            let new_state = lsm_transition(LifecycleState::Created, LifecycleEvent::EndtimeEvent)?;
            ctx.store.cas_lifecycle_state(&connection_id, LifecycleState::Created, new_state, now).await?;
            Ok::<(), EngineError>(())
        })
        .await?;
    } else {
        debug!(connection_id = %connection_id, state = ?record.lifecycle_state, "auto_end: lifecycle moved on, skipping endtime transition");
    }
    Ok(())
}

/// The backend may raise a fault outside the normal request/response flow
/// (e.g. a device alarm). Not a `JobKind` — injected directly by whatever
/// surface observes the fault (a polling job, a webhook handler, a CLI
/// command); exposed here so callers share the same transition logic.
pub async fn apply_forced_end(ctx: &EngineContext, connection_id: &nsi_domain::ConnectionId, message: String) -> Result<(), EngineError> {
    let Some(record) = ctx.store.load(connection_id).await? else {
        return Err(EngineError::ConnectionNotFound(connection_id.to_string()));
    };
    let now = Utc::now();
    with_connection_lock(ctx, connection_id, async {
        let new_state = lsm_transition(record.lifecycle_state, LifecycleEvent::ForcedEndNotification)?;
        ctx.store.cas_lifecycle_state(connection_id, record.lifecycle_state, new_state, now).await?;
        ctx.store
            .append_notification(connection_id, NotificationKind::ErrorEvent, json!({"message": message}), now)
            .await?;
        Ok::<(), EngineError>(())
    })
    .await?;
    Ok(())
}

// ── Requester callback delivery ───────────────────────────────────────────────

pub async fn handle_requester_callback(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    let message: RequesterMessage = serde_json::from_value(job.payload.clone())
        .map_err(|e| EngineError::Internal(format!("job {} payload decode: {e}", job.job_id)))?;
    let connection_id = job
        .connection_id
        .clone()
        .ok_or_else(|| EngineError::Internal(format!("callback job {} has no connection_id", job.job_id)))?;

    let result = send_with_retry(
        &ctx.requester,
        message,
        ctx.config.requester.max_attempts,
        ctx.config.requester.base_backoff,
        ctx.config.requester.backoff_factor,
    )
    .await;

    if result.is_err() {
        let now = Utc::now();
        ctx.store
            .append_notification(&connection_id, NotificationKind::MessageDeliveryTimeout, json!({}), now)
            .await?;
        info!(connection_id = %connection_id, job_id = %job.job_id, "requester callback permanently failed");
    }
    Ok(())
}

// ── Topology refresh (self-rescheduling interval job) ─────────────────────────

pub async fn handle_topology_refresh(ctx: &EngineContext, _job: &JobRecord) -> Result<(), EngineError> {
    if let Err(e) = ctx.topology.reload().await {
        warn!(error = %e, "topology refresh failed, keeping previous snapshot");
    }
    let next_at = Utc::now() + chrono::Duration::from_std(ctx.config.topology_refresh).unwrap_or_default();
    ctx.jobs
        .enqueue(JobRecord::new(JobKind::TopologyRefresh, None, JobTrigger::RunAt { at: next_at }, json!({})))
        .await?;
    Ok(())
}

/// Dispatch table entry point used by the job engine.
pub async fn run(ctx: &EngineContext, job: &JobRecord) -> Result<(), EngineError> {
    match job.job_kind {
        JobKind::Reserve => handle_reserve(ctx, job).await,
        JobKind::ReserveCommit => handle_reserve_commit(ctx, job).await,
        JobKind::ReserveAbort => handle_reserve_abort(ctx, job).await,
        JobKind::Provision => handle_provision(ctx, job).await,
        JobKind::Release => handle_release(ctx, job).await,
        JobKind::Terminate => handle_terminate(ctx, job).await,
        JobKind::Activate => handle_activate(ctx, job).await,
        JobKind::Deactivate => handle_deactivate(ctx, job).await,
        JobKind::ReserveTimeout => handle_reserve_timeout(ctx, job).await,
        JobKind::AutoStart => handle_auto_start(ctx, job).await,
        JobKind::AutoEnd => handle_auto_end(ctx, job).await,
        JobKind::RequesterCallback => handle_requester_callback(ctx, job).await,
        JobKind::TopologyRefresh => handle_topology_refresh(ctx, job).await,
    }
}
