use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawApiConfig, RawNrmBackendConfig, RawProviderConfig, RawRequesterConfig, RawStoreConfig};
use crate::settings::{ApiConfig, NrmBackendSelection, ProviderConfig, RequesterConfig, StoreBackend};

/// Load and validate provider configuration from a YAML file.
pub fn load_provider_config(path: &Path) -> Result<ProviderConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!(path = %path.display(), "loading provider config");
    let raw: RawProviderConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    convert(raw, path)
}

fn convert(raw: RawProviderConfig, path: &Path) -> Result<ProviderConfig, ConfigError> {
    if raw.requester_nsa.trim().is_empty() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "requester_nsa must not be empty".to_string(),
        });
    }
    if raw.provider_nsa.trim().is_empty() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "provider_nsa must not be empty".to_string(),
        });
    }

    let store = match raw.store {
        RawStoreConfig::Memory => StoreBackend::Memory,
        RawStoreConfig::Redb { path } => StoreBackend::Redb { path },
        RawStoreConfig::Postgres { url } => StoreBackend::Postgres { url },
    };

    let nrm_backend = match raw.nrm_backend {
        RawNrmBackendConfig::YamlStub => NrmBackendSelection::YamlStub,
        RawNrmBackendConfig::CliSsh { script_path } => {
            if script_path.trim().is_empty() {
                return Err(ConfigError::Conversion {
                    path: path.display().to_string(),
                    message: "cli-ssh backend requires a non-empty script_path".to_string(),
                });
            }
            NrmBackendSelection::CliSsh { script_path }
        }
    };

    let requester = convert_requester(raw.requester);
    let api = convert_api(raw.api);

    Ok(ProviderConfig {
        requester_nsa: raw.requester_nsa,
        provider_nsa: raw.provider_nsa,
        topology_path: raw.topology_path,
        topology_refresh: Duration::from_secs(raw.topology_refresh_secs.unwrap_or(300)),
        hold_timeout: Duration::from_secs(raw.hold_timeout_secs.unwrap_or(120)),
        backend_call_timeout: Duration::from_secs(raw.backend_call_timeout_secs.unwrap_or(30)),
        grace: Duration::from_secs(raw.grace_secs.unwrap_or(30)),
        worker_pool_size: raw.worker_pool_size.unwrap_or(8),
        store,
        nrm_backend,
        requester,
        api,
    })
}

fn convert_requester(raw: Option<RawRequesterConfig>) -> RequesterConfig {
    let default = RequesterConfig::default();
    match raw {
        None => default,
        Some(r) => RequesterConfig {
            max_attempts: r.max_attempts.unwrap_or(default.max_attempts),
            base_backoff: r
                .base_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default.base_backoff),
            backoff_factor: r.backoff_factor.unwrap_or(default.backoff_factor),
            callback_endpoint: r.callback_endpoint,
        },
    }
}

fn convert_api(raw: Option<RawApiConfig>) -> ApiConfig {
    let default = ApiConfig::default();
    match raw {
        None => default,
        Some(r) => ApiConfig {
            bind_addr: r.bind_addr.unwrap_or(default.bind_addr),
            auth_token: r.auth_token.unwrap_or(default.auth_token),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_minimal_memory_config() {
        let f = write_config(
            r#"
requester_nsa: "urn:ogf:network:example.org:2023:requester"
provider_nsa: "urn:ogf:network:example.org:2023:provider"
topology_path: "/etc/nsi/topology.yml"
store:
  kind: memory
nrm_backend:
  kind: yaml_stub
"#,
        );
        let cfg = load_provider_config(f.path()).unwrap();
        assert_eq!(cfg.hold_timeout.as_secs(), 120);
        assert_eq!(cfg.grace.as_secs(), 30);
        assert!(matches!(cfg.store, StoreBackend::Memory));
        assert!(matches!(cfg.nrm_backend, NrmBackendSelection::YamlStub));
    }

    #[test]
    fn rejects_empty_requester_nsa() {
        let f = write_config(
            r#"
requester_nsa: ""
provider_nsa: "urn:ogf:network:example.org:2023:provider"
topology_path: "/etc/nsi/topology.yml"
store:
  kind: memory
nrm_backend:
  kind: yaml_stub
"#,
        );
        assert!(load_provider_config(f.path()).is_err());
    }

    #[test]
    fn cli_ssh_requires_script_path() {
        let f = write_config(
            r#"
requester_nsa: "urn:ogf:network:example.org:2023:requester"
provider_nsa: "urn:ogf:network:example.org:2023:provider"
topology_path: "/etc/nsi/topology.yml"
store:
  kind: memory
nrm_backend:
  kind: cli_ssh
  script_path: ""
"#,
        );
        assert!(load_provider_config(f.path()).is_err());
    }

    #[test]
    fn overrides_apply() {
        let f = write_config(
            r#"
requester_nsa: "urn:ogf:network:example.org:2023:requester"
provider_nsa: "urn:ogf:network:example.org:2023:provider"
topology_path: "/etc/nsi/topology.yml"
hold_timeout_secs: 60
store:
  kind: redb
  path: "/var/lib/nsi/state.redb"
nrm_backend:
  kind: cli_ssh
  script_path: "/usr/local/bin/nrm-switch.sh"
requester:
  max_attempts: 5
"#,
        );
        let cfg = load_provider_config(f.path()).unwrap();
        assert_eq!(cfg.hold_timeout.as_secs(), 60);
        assert_eq!(cfg.requester.max_attempts, 5);
        match cfg.store {
            StoreBackend::Redb { path } => assert_eq!(path, "/var/lib/nsi/state.redb"),
            _ => panic!("expected redb"),
        }
    }
}
