use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("connection already exists: {0}")]
    Duplicate(String),

    /// A compare-and-swap state write lost the race: the persisted state no
    /// longer matched `expected` by the time the write was attempted.
    #[error("state conflict on {connection_id} ({machine}): expected {expected}, found {actual}")]
    Conflict { connection_id: String, machine: &'static str, expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
