use std::collections::HashMap;
use std::sync::Arc;

use nsi_config::ProviderConfig;
use nsi_domain::ConnectionId;
use nsi_nrm::NrmBackend;
use nsi_store::{ConnectionStore, JobStore};
use nsi_topology::TopologyCache;
use tokio::sync::{Mutex, RwLock};

use crate::requester::RequesterClient;

type ConnectionLocks = Arc<RwLock<HashMap<ConnectionId, Arc<Mutex<()>>>>>;

/// Everything a message processor or job handler needs: the stores, the
/// single configured NRM backend, the shared topology cache, the requester
/// callback client, and the validated provider settings. Built once at
/// startup and cloned (cheaply, everything inside is `Arc`) into every
/// spawned task.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn ConnectionStore>,
    pub jobs: Arc<dyn JobStore>,
    pub nrm: Arc<dyn NrmBackend>,
    pub topology: TopologyCache,
    pub requester: Arc<dyn RequesterClient>,
    pub config: ProviderConfig,
    locks: ConnectionLocks,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        jobs: Arc<dyn JobStore>,
        nrm: Arc<dyn NrmBackend>,
        topology: TopologyCache,
        requester: Arc<dyn RequesterClient>,
        config: ProviderConfig,
    ) -> Self {
        Self { store, jobs, nrm, topology, requester, config, locks: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Per-connection lock handlers take to apply a state transition. Held
    /// only around the CAS (and the store writes that go with it), never
    /// across an NRM backend call or a requester callback delivery — see
    /// [`crate::handlers::with_connection_lock`].
    pub async fn connection_lock(&self, connection_id: &ConnectionId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(connection_id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(connection_id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
