use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawProviderConfig {
    pub requester_nsa: String,
    pub provider_nsa: String,
    pub topology_path: String,
    #[serde(default)]
    pub topology_refresh_secs: Option<u64>,
    #[serde(default)]
    pub hold_timeout_secs: Option<u64>,
    #[serde(default)]
    pub backend_call_timeout_secs: Option<u64>,
    #[serde(default)]
    pub grace_secs: Option<u64>,
    #[serde(default)]
    pub worker_pool_size: Option<usize>,
    pub store: RawStoreConfig,
    pub nrm_backend: RawNrmBackendConfig,
    #[serde(default)]
    pub requester: Option<RawRequesterConfig>,
    #[serde(default)]
    pub api: Option<RawApiConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawStoreConfig {
    Memory,
    Redb { path: String },
    Postgres { url: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawNrmBackendConfig {
    YamlStub,
    CliSsh { script_path: String },
}

#[derive(Debug, Deserialize, Default)]
pub struct RawRequesterConfig {
    pub max_attempts: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub callback_endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawApiConfig {
    pub bind_addr: Option<String>,
    pub auth_token: Option<String>,
}
