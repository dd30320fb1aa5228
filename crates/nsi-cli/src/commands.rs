use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use nsi_config::{NrmBackendSelection, ProviderConfig, StoreBackend};
use nsi_engine::{EngineContext, HttpRequesterClient, JobEngine, NoopRequesterClient, RequesterClient};
use nsi_nrm::{CliSshBackend, NrmBackend, YamlStubBackend};
use nsi_store::{ConnectionStore, InMemoryStore, JobStore, PostgresStore, RedbStore};
use nsi_topology::TopologyCache;

fn build_nrm_backend(config: &ProviderConfig) -> Result<Arc<dyn NrmBackend>> {
    Ok(match &config.nrm_backend {
        NrmBackendSelection::YamlStub => {
            let topology_yaml = std::fs::read_to_string(&config.topology_path)
                .with_context(|| format!("Failed to read topology file {}", config.topology_path))?;
            Arc::new(YamlStubBackend::new(topology_yaml))
        }
        NrmBackendSelection::CliSsh { script_path } => {
            let hostname = std::env::var("NSI_NRM_SSH_HOSTNAME").unwrap_or_default();
            let username = std::env::var("NSI_NRM_SSH_USERNAME").unwrap_or_default();
            Arc::new(CliSshBackend::new(script_path.clone(), hostname, username))
        }
    })
}

fn build_requester_client(config: &ProviderConfig) -> Arc<dyn RequesterClient> {
    match &config.requester.callback_endpoint {
        Some(endpoint) => Arc::new(HttpRequesterClient::new(endpoint.clone())),
        None => Arc::new(NoopRequesterClient::default()),
    }
}

async fn build_context(config: ProviderConfig) -> Result<EngineContext> {
    let topology = TopologyCache::load(config.topology_path.clone())
        .with_context(|| format!("Failed to load topology file {}", config.topology_path))?;

    let (store, jobs): (Arc<dyn ConnectionStore>, Arc<dyn JobStore>) = match &config.store {
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            (store.clone(), store)
        }
        StoreBackend::Redb { path } => {
            let store = Arc::new(
                RedbStore::open(std::path::Path::new(path))
                    .with_context(|| format!("Failed to open redb store at {path}"))?,
            );
            (store.clone(), store)
        }
        StoreBackend::Postgres { url } => {
            let store = Arc::new(
                PostgresStore::connect(url)
                    .await
                    .context("Failed to connect to postgres store")?,
            );
            (store.clone(), store)
        }
    };

    let nrm = build_nrm_backend(&config)?;
    let requester = build_requester_client(&config);

    Ok(EngineContext::new(store, jobs, nrm, topology, requester, config))
}

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(config_path: PathBuf) -> Result<()> {
    let config = nsi_config::load_provider_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let bind_addr = config.api.bind_addr.clone();

    let ctx = build_context(config).await?;

    let engine = Arc::new(JobEngine::new(ctx.clone()));
    engine.recover().await.context("Failed to recover pending jobs")?;
    let dispatch_handle = tokio::spawn(engine.dispatch_loop());

    let app = nsi_api::build_app(ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    info!(addr = %bind_addr, "nsi provider listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    dispatch_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

// ── Reload topology ───────────────────────────────────────────────────────────

pub async fn reload_topology(config_path: PathBuf) -> Result<()> {
    let config = nsi_config::load_provider_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let url = format!("http://{}/admin/topology/reload", config.api.bind_addr);

    let resp = authed_client(&config.api.auth_token)
        .post(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach running server at {url}"))?;

    if resp.status().is_success() {
        println!("Topology reloaded.");
        Ok(())
    } else {
        anyhow::bail!("reload-topology failed: {}", resp.status());
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(url: String, token: Option<String>) -> Result<()> {
    let base = url.trim_end_matches('/');
    let token = token.context("--token or NSI_TOKEN is required")?;

    let resp = authed_client(&token)
        .get(format!("{base}/ready"))
        .send()
        .await
        .with_context(|| format!("Failed to reach server at {url}"))?;

    println!("ready: {}", resp.status().is_success());

    let health = authed_client(&token)
        .get(format!("{base}/health"))
        .send()
        .await
        .with_context(|| format!("Failed to reach server at {url}"))?;
    println!("health: {}", health.status().is_success());

    Ok(())
}

fn authed_client(token: &str) -> reqwest::Client {
    let mut headers = reqwest::header::HeaderMap::new();
    let bearer = format!("Bearer {}", token);
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&bearer).expect("token contains invalid header characters"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .expect("failed to build HTTP client")
}
