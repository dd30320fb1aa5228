pub mod error;
pub mod fsm;
pub mod types;

pub use error::DomainError;
pub use fsm::{
    dpsm_transition, lsm_transition, psm_transition, rsm_transition, DataPlaneEvent,
    DataPlaneState, LifecycleEvent, LifecycleState, ProvisioningEvent, ProvisioningState,
    ReservationEvent, ReservationState,
};
pub use types::{Connection, ConnectionId, Criteria, NotificationKind, PtpEndpoint, Schedule};
