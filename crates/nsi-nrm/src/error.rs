use thiserror::Error;

#[derive(Debug, Error)]
pub enum NrmError {
    #[error("generic RM error: {0}")]
    GenericRmError(String),

    #[error("reservation error: {0}")]
    ReservationError(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal backend error: {0}")]
    Internal(String),
}
