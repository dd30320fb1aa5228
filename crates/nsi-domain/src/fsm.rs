//! The three NSI Connection Service state machines (RSM, PSM, LSM) plus the
//! derived data-plane state machine (DPSM).
//!
//! Each machine is a pure tagged-sum `transition(state, event) -> state`
//! function: no class-level hidden state, no mutation. An event not listed
//! for the current state returns `Err(DomainError::InvalidTransition)`
//! without side effects, per spec §4.1.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Reservation State Machine (RSM) ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Start,
    Checking,
    Held,
    Committing,
    Failed,
    Timeout,
    Aborting,
}

impl Default for ReservationState {
    fn default() -> Self {
        ReservationState::Start
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationEvent {
    ReserveRequest,
    ReserveConfirmed,
    ReserveFailed,
    ReserveAbortRequest,
    ReserveAbortConfirmed,
    ReserveTimeoutNotification,
    ReserveCommitRequest,
    ReserveCommitConfirmed,
    ReserveCommitFailed,
}

impl std::fmt::Display for ReservationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub fn rsm_transition(
    state: ReservationState,
    event: ReservationEvent,
) -> Result<ReservationState, DomainError> {
    use ReservationEvent as E;
    use ReservationState as S;
    match (state, event) {
        (S::Start, E::ReserveRequest) => Ok(S::Checking),
        (S::Checking, E::ReserveConfirmed) => Ok(S::Held),
        (S::Checking, E::ReserveFailed) => Ok(S::Failed),
        (S::Failed, E::ReserveAbortRequest) => Ok(S::Aborting),
        (S::Held, E::ReserveAbortRequest) => Ok(S::Aborting),
        (S::Aborting, E::ReserveAbortConfirmed) => Ok(S::Start),
        (S::Held, E::ReserveTimeoutNotification) => Ok(S::Timeout),
        (S::Held, E::ReserveCommitRequest) => Ok(S::Committing),
        (S::Timeout, E::ReserveCommitRequest) => Ok(S::Committing),
        (S::Committing, E::ReserveCommitConfirmed) => Ok(S::Start),
        (S::Committing, E::ReserveCommitFailed) => Ok(S::Start),
        (state, event) => Err(DomainError::InvalidTransition {
            machine: "RSM",
            state: state.to_string(),
            event: event.to_string(),
        }),
    }
}

// ── Provisioning State Machine (PSM) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Released,
    Provisioning,
    Provisioned,
    Releasing,
}

impl Default for ProvisioningState {
    fn default() -> Self {
        ProvisioningState::Released
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningEvent {
    ProvisionRequest,
    ProvisionConfirmed,
    ReleaseRequest,
    ReleaseConfirmed,
}

impl std::fmt::Display for ProvisioningEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub fn psm_transition(
    state: ProvisioningState,
    event: ProvisioningEvent,
) -> Result<ProvisioningState, DomainError> {
    use ProvisioningEvent as E;
    use ProvisioningState as S;
    match (state, event) {
        (S::Released, E::ProvisionRequest) => Ok(S::Provisioning),
        (S::Provisioning, E::ProvisionConfirmed) => Ok(S::Provisioned),
        (S::Provisioned, E::ReleaseRequest) => Ok(S::Releasing),
        (S::Releasing, E::ReleaseConfirmed) => Ok(S::Released),
        (state, event) => Err(DomainError::InvalidTransition {
            machine: "PSM",
            state: state.to_string(),
            event: event.to_string(),
        }),
    }
}

// ── Lifecycle State Machine (LSM) ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Failed,
    Terminating,
    PassedEndTime,
    Terminated,
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Created
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    ForcedEndNotification,
    TerminateRequest,
    EndtimeEvent,
    TerminateConfirmed,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub fn lsm_transition(
    state: LifecycleState,
    event: LifecycleEvent,
) -> Result<LifecycleState, DomainError> {
    use LifecycleEvent as E;
    use LifecycleState as S;
    match (state, event) {
        (S::Created, E::ForcedEndNotification) => Ok(S::Failed),
        (S::Created, E::TerminateRequest) => Ok(S::Terminating),
        (S::PassedEndTime, E::TerminateRequest) => Ok(S::Terminating),
        (S::Failed, E::TerminateRequest) => Ok(S::Terminating),
        (S::Created, E::EndtimeEvent) => Ok(S::PassedEndTime),
        (S::Terminating, E::TerminateConfirmed) => Ok(S::Terminated),
        (state, event) => Err(DomainError::InvalidTransition {
            machine: "LSM",
            state: state.to_string(),
            event: event.to_string(),
        }),
    }
}

// ── Data-Plane State Machine (DPSM) ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPlaneState {
    Deactivated,
    Activating,
    Activated,
    Deactivating,
    ActivateFailed,
    DeactivateFailed,
}

impl Default for DataPlaneState {
    fn default() -> Self {
        DataPlaneState::Deactivated
    }
}

impl std::fmt::Display for DataPlaneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPlaneEvent {
    ActivateRequest,
    ActivateConfirmed,
    ActivateFailed,
    DeactivateRequest,
    DeactivateConfirmed,
    DeactivateFailed,
}

impl std::fmt::Display for DataPlaneEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub fn dpsm_transition(
    state: DataPlaneState,
    event: DataPlaneEvent,
) -> Result<DataPlaneState, DomainError> {
    use DataPlaneEvent as E;
    use DataPlaneState as S;
    match (state, event) {
        (S::Deactivated, E::ActivateRequest) => Ok(S::Activating),
        (S::Activating, E::ActivateConfirmed) => Ok(S::Activated),
        (S::Activating, E::ActivateFailed) => Ok(S::ActivateFailed),
        (S::Activated, E::DeactivateRequest) => Ok(S::Deactivating),
        (S::ActivateFailed, E::DeactivateRequest) => Ok(S::Deactivating),
        (S::Deactivating, E::DeactivateConfirmed) => Ok(S::Deactivated),
        (S::Deactivating, E::DeactivateFailed) => Ok(S::DeactivateFailed),
        (state, event) => Err(DomainError::InvalidTransition {
            machine: "DPSM",
            state: state.to_string(),
            event: event.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsm_happy_path() {
        let s = rsm_transition(ReservationState::Start, ReservationEvent::ReserveRequest).unwrap();
        assert_eq!(s, ReservationState::Checking);
        let s = rsm_transition(s, ReservationEvent::ReserveConfirmed).unwrap();
        assert_eq!(s, ReservationState::Held);
        let s = rsm_transition(s, ReservationEvent::ReserveCommitRequest).unwrap();
        assert_eq!(s, ReservationState::Committing);
        let s = rsm_transition(s, ReservationEvent::ReserveCommitConfirmed).unwrap();
        assert_eq!(s, ReservationState::Start);
    }

    #[test]
    fn rsm_commit_after_timeout_still_accepted() {
        let s = rsm_transition(ReservationState::Held, ReservationEvent::ReserveTimeoutNotification).unwrap();
        assert_eq!(s, ReservationState::Timeout);
        let s = rsm_transition(s, ReservationEvent::ReserveCommitRequest).unwrap();
        assert_eq!(s, ReservationState::Committing);
    }

    #[test]
    fn rsm_rejects_unlisted_event() {
        let err = rsm_transition(ReservationState::Start, ReservationEvent::ReserveConfirmed).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { machine: "RSM", .. }));
    }

    #[test]
    fn rsm_abort_from_failed_and_held() {
        assert!(rsm_transition(ReservationState::Failed, ReservationEvent::ReserveAbortRequest).is_ok());
        assert!(rsm_transition(ReservationState::Held, ReservationEvent::ReserveAbortRequest).is_ok());
        assert!(rsm_transition(ReservationState::Checking, ReservationEvent::ReserveAbortRequest).is_err());
    }

    #[test]
    fn psm_has_no_back_edges() {
        let s = psm_transition(ProvisioningState::Released, ProvisioningEvent::ProvisionRequest).unwrap();
        assert_eq!(s, ProvisioningState::Provisioning);
        assert!(psm_transition(s, ProvisioningEvent::ReleaseRequest).is_err());
    }

    #[test]
    fn lsm_terminate_reachable_from_three_states() {
        for start in [LifecycleState::Created, LifecycleState::PassedEndTime, LifecycleState::Failed] {
            assert!(lsm_transition(start, LifecycleEvent::TerminateRequest).is_ok());
        }
    }

    #[test]
    fn lsm_terminated_is_a_sink() {
        let s = LifecycleState::Terminated;
        for event in [
            LifecycleEvent::ForcedEndNotification,
            LifecycleEvent::TerminateRequest,
            LifecycleEvent::EndtimeEvent,
            LifecycleEvent::TerminateConfirmed,
        ] {
            assert!(lsm_transition(s, event).is_err());
        }
    }

    #[test]
    fn dpsm_activate_and_deactivate_round_trip() {
        let s = dpsm_transition(DataPlaneState::Deactivated, DataPlaneEvent::ActivateRequest).unwrap();
        let s = dpsm_transition(s, DataPlaneEvent::ActivateConfirmed).unwrap();
        assert_eq!(s, DataPlaneState::Activated);
        let s = dpsm_transition(s, DataPlaneEvent::DeactivateRequest).unwrap();
        let s = dpsm_transition(s, DataPlaneEvent::DeactivateConfirmed).unwrap();
        assert_eq!(s, DataPlaneState::Deactivated);
    }

    #[test]
    fn dpsm_retry_deactivate_from_activate_failed() {
        let s = dpsm_transition(DataPlaneState::Activating, DataPlaneEvent::ActivateFailed).unwrap();
        assert_eq!(s, DataPlaneState::ActivateFailed);
        assert!(dpsm_transition(s, DataPlaneEvent::DeactivateRequest).is_ok());
    }
}
