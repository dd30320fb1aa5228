use std::time::Duration;

/// Which `ConnectionStore` / `JobStore` backend to construct. The concrete
/// types live in `nsi-store`; this crate only carries the selection.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Memory,
    Redb { path: String },
    Postgres { url: String },
}

/// Which `NrmBackend` to construct. The concrete types live in `nsi-nrm`.
#[derive(Debug, Clone)]
pub enum NrmBackendSelection {
    YamlStub,
    CliSsh { script_path: String },
}

#[derive(Debug, Clone)]
pub struct RequesterConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub backoff_factor: f64,
    /// HTTP endpoint to deliver callbacks to. `None` runs with a no-op
    /// client (e.g. single-provider test deployments with no requester NSA
    /// listening).
    pub callback_endpoint: Option<String>,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff: Duration::from_secs(1),
            backoff_factor: 2.0,
            callback_endpoint: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub auth_token: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            auth_token: "change-me".to_string(),
        }
    }
}

/// Fully validated provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub requester_nsa: String,
    pub provider_nsa: String,
    pub topology_path: String,
    pub topology_refresh: Duration,
    /// Default reserve-hold timeout, default 120s.
    pub hold_timeout: Duration,
    /// Per-call timeout bound for NRM backend and requester callbacks.
    pub backend_call_timeout: Duration,
    /// How far into the past `criteria.schedule.start_time` may sit at
    /// `reserve_commit` time before it's rejected, default 30s.
    pub grace: Duration,
    pub worker_pool_size: usize,
    pub store: StoreBackend,
    pub nrm_backend: NrmBackendSelection,
    pub requester: RequesterConfig,
    pub api: ApiConfig,
}
