use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::TopologyError;
use crate::loader::load_topology_file;
use crate::stp::Stp;
use crate::validate::validate;

/// In-memory index over the STPs loaded from a topology file.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    by_id: HashMap<String, Stp>,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let stps = load_topology_file(path)?;
        validate(&stps)?;
        let by_id = stps.into_iter().map(|s| (s.stp_id.clone(), s)).collect();
        Ok(Self { by_id })
    }

    pub fn lookup(&self, stp_id: &str) -> Option<&Stp> {
        self.by_id.get(stp_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Read-shared topology cache, refreshed periodically by a singleton timer
/// job in the engine.
#[derive(Clone)]
pub struct TopologyCache {
    path: PathBuf,
    inner: Arc<RwLock<Topology>>,
}

impl TopologyCache {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TopologyError> {
        let path = path.into();
        let topology = Topology::load(&path)?;
        Ok(Self { path, inner: Arc::new(RwLock::new(topology)) })
    }

    pub async fn snapshot(&self) -> Topology {
        self.inner.read().await.clone()
    }

    /// Re-read the topology file from disk, replacing the cached snapshot
    /// only if it parses and validates successfully.
    pub async fn reload(&self) -> Result<(), TopologyError> {
        let fresh = Topology::load(&self.path)?;
        info!(stp_count = fresh.len(), "topology reloaded");
        *self.inner.write().await = fresh;
        Ok(())
    }
}
