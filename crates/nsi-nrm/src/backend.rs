use async_trait::async_trait;
use nsi_domain::ConnectionId;

use crate::error::NrmError;

/// The arguments common to every NRM call: the circuit endpoints and the
/// circuit id if one has already been assigned (set once `activate` first
/// returns one, carried on every later call for the same connection).
#[derive(Debug, Clone)]
pub struct NrmCallParams {
    pub connection_id: ConnectionId,
    pub bandwidth_mbps: u32,
    pub src_port_id: String,
    pub src_vlan: u16,
    pub dst_port_id: String,
    pub dst_vlan: u16,
    pub circuit_id: Option<String>,
}

/// The uniform callback set a Network Resource Manager integration must
/// implement. Every call either returns a circuit id (non-empty only from
/// `activate`) or fails with an [`NrmError`]; only `activate`/`deactivate`
/// are required to mutate physical state, the rest may be no-ops that just
/// validate resource availability.
#[async_trait]
pub trait NrmBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn reserve(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn reserve_commit(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn reserve_abort(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn reserve_timeout(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn provision(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn release(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn activate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn deactivate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;
    async fn terminate(&self, params: &NrmCallParams) -> Result<Option<String>, NrmError>;

    /// Raw contents of this backend's current topology description, handed
    /// to `nsi_topology::load_topology_file` on each refresh tick.
    async fn topology(&self) -> Result<String, NrmError>;
}
