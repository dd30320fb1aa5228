use async_trait::async_trait;
use tracing::debug;

use crate::backend::{NrmBackend, NrmCallParams};
use crate::error::NrmError;

/// A stub backend that simulates an NRM locally: every call succeeds, no
/// physical state is touched, and `activate` hands back a synthetic
/// `local://<connection_id>` circuit id.
#[derive(Debug, Default, Clone)]
pub struct YamlStubBackend {
    topology_yaml: String,
}

impl YamlStubBackend {
    pub fn new(topology_yaml: impl Into<String>) -> Self {
        Self { topology_yaml: topology_yaml.into() }
    }
}

#[async_trait]
impl NrmBackend for YamlStubBackend {
    fn name(&self) -> &'static str {
        "yaml-stub"
    }

    async fn reserve(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: reserve");
        Ok(None)
    }

    async fn reserve_commit(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: reserve_commit");
        Ok(None)
    }

    async fn reserve_abort(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: reserve_abort");
        Ok(None)
    }

    async fn reserve_timeout(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: reserve_timeout");
        Ok(None)
    }

    async fn provision(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: provision");
        Ok(None)
    }

    async fn release(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: release");
        Ok(None)
    }

    async fn activate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        let circuit_id = format!("local://{}", params.connection_id);
        debug!(connection_id = %params.connection_id, %circuit_id, "yaml-stub: activate");
        Ok(Some(circuit_id))
    }

    async fn deactivate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: deactivate");
        Ok(None)
    }

    async fn terminate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError> {
        debug!(connection_id = %params.connection_id, "yaml-stub: terminate");
        Ok(None)
    }

    async fn topology(&self) -> Result<String, NrmError> {
        Ok(self.topology_yaml.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsi_domain::ConnectionId;

    fn params() -> NrmCallParams {
        NrmCallParams {
            connection_id: ConnectionId::new(),
            bandwidth_mbps: 1000,
            src_port_id: "Eth1".to_string(),
            src_vlan: 1780,
            dst_port_id: "Eth2".to_string(),
            dst_vlan: 1780,
            circuit_id: None,
        }
    }

    #[tokio::test]
    async fn activate_returns_synthetic_circuit_id() {
        let backend = YamlStubBackend::new("stps: []");
        let result = backend.activate(&params()).await.unwrap();
        assert!(result.unwrap().starts_with("local://"));
    }

    #[tokio::test]
    async fn reserve_is_a_no_op() {
        let backend = YamlStubBackend::new("stps: []");
        assert_eq!(backend.reserve(&params()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn topology_returns_configured_yaml() {
        let backend = YamlStubBackend::new("stps: []");
        assert_eq!(backend.topology().await.unwrap(), "stps: []");
    }
}
