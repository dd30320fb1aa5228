use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nsi_domain::ConnectionId;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::EngineError;

/// One outbound callback to the requester endpoint. Carried as the payload
/// of a `RequesterCallback` job so delivery benefits from crash recovery.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum RequesterMessage {
    ReserveConfirmed { connection_id: ConnectionId, correlation_id: String },
    ReserveFailed { connection_id: ConnectionId, correlation_id: String, error: String },
    ReserveCommitConfirmed { connection_id: ConnectionId, correlation_id: String },
    ReserveCommitFailed { connection_id: ConnectionId, correlation_id: String, error: String },
    ReserveAbortConfirmed { connection_id: ConnectionId, correlation_id: String },
    ProvisionConfirmed { connection_id: ConnectionId, correlation_id: String },
    ProvisionFailed { connection_id: ConnectionId, correlation_id: String, error: String },
    ReleaseConfirmed { connection_id: ConnectionId, correlation_id: String },
    ReleaseFailed { connection_id: ConnectionId, correlation_id: String, error: String },
    TerminateConfirmed { connection_id: ConnectionId, correlation_id: String },
    TerminateFailed { connection_id: ConnectionId, correlation_id: String, error: String },
    ReserveTimeout { connection_id: ConnectionId },
    ErrorEvent { connection_id: ConnectionId, message: String },
    DataPlaneStateChange { connection_id: ConnectionId, activated: bool },
}

/// Outbound callback delivery to the requester NSA. Implementations must be
/// idempotent on (connection_id, correlation_id) from the caller's side —
/// this trait only governs how a single attempt is sent.
#[async_trait]
pub trait RequesterClient: Send + Sync + 'static {
    async fn send(&self, message: &RequesterMessage) -> Result<(), EngineError>;
}

/// Delivers callbacks over HTTP to a configured requester endpoint, retrying
/// on transport failure with exponential backoff. Exhaustion is the caller's
/// responsibility to observe (the job handler emits `MessageDeliveryTimeout`
/// after `send_with_retry` gives up).
pub struct HttpRequesterClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRequesterClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

#[async_trait]
impl RequesterClient for HttpRequesterClient {
    async fn send(&self, message: &RequesterMessage) -> Result<(), EngineError> {
        debug!(endpoint = %self.endpoint, "delivering requester callback");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| EngineError::Internal(format!("requester callback: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::Internal(format!(
                "requester callback rejected with {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Test double that records every send instead of making a network call.
#[derive(Default)]
pub struct NoopRequesterClient {
    pub sent: Mutex<Vec<RequesterMessage>>,
}

#[async_trait]
impl RequesterClient for NoopRequesterClient {
    async fn send(&self, message: &RequesterMessage) -> Result<(), EngineError> {
        debug!(?message, "noop requester client recording send");
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Delivers `message` via `client`, retrying on failure with exponential
/// backoff (base 1s, factor 2, `max_attempts` ceiling). Returns `Ok(())` on
/// first success; `Err` once every attempt is exhausted.
pub async fn send_with_retry(
    client: &Arc<dyn RequesterClient>,
    message: RequesterMessage,
    max_attempts: u32,
    base_backoff: Duration,
    backoff_factor: f64,
) -> Result<(), EngineError> {
    let mut delay = base_backoff;
    for attempt in 1..=max_attempts {
        match client.send(&message).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt == max_attempts {
                    warn!(attempt, error = %e, "requester callback exhausted retries");
                    return Err(e);
                }
                warn!(attempt, error = %e, delay = ?delay, "requester callback failed, retrying");
                tokio::time::sleep(delay).await;
                delay = Duration::from_secs_f64(delay.as_secs_f64() * backoff_factor);
            }
        }
    }
    unreachable!("loop always returns on last attempt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_client_records_sends() {
        let client = NoopRequesterClient::default();
        client
            .send(&RequesterMessage::ReserveTimeout { connection_id: ConnectionId::new() })
            .await
            .unwrap();
        assert_eq!(client.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn send_with_retry_succeeds_first_try() {
        let client: Arc<dyn RequesterClient> = Arc::new(NoopRequesterClient::default());
        let message = RequesterMessage::ErrorEvent { connection_id: ConnectionId::new(), message: "x".into() };
        send_with_retry(&client, message, 3, Duration::from_millis(1), 2.0).await.unwrap();
    }

    struct AlwaysFailClient;

    #[async_trait]
    impl RequesterClient for AlwaysFailClient {
        async fn send(&self, _message: &RequesterMessage) -> Result<(), EngineError> {
            Err(EngineError::Internal("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn send_with_retry_exhausts_after_max_attempts() {
        let client: Arc<dyn RequesterClient> = Arc::new(AlwaysFailClient);
        let message = RequesterMessage::ReserveTimeout { connection_id: ConnectionId::new() };
        let result = send_with_retry(&client, message, 3, Duration::from_millis(1), 2.0).await;
        assert!(result.is_err());
    }
}
