use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use nsi_engine::EngineContext;

use crate::auth::require_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(ctx: EngineContext) -> Router {
    let state = AppState { ctx };

    Router::new()
        .route("/messages/reserve", post(handlers::reserve))
        .route("/messages/reserve-commit", post(handlers::reserve_commit))
        .route("/messages/reserve-abort", post(handlers::reserve_abort))
        .route("/messages/provision", post(handlers::provision))
        .route("/messages/release", post(handlers::release))
        .route("/messages/terminate", post(handlers::terminate))
        .route("/connections", get(handlers::list_connections))
        .route("/connections/:id", get(handlers::get_connection))
        .route("/connections/:id/notifications", get(handlers::list_notifications))
        .route("/connections/:id/results", get(handlers::list_results))
        .route("/ready", get(handlers::ready))
        .route("/admin/topology/reload", post(handlers::reload_topology))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        // /health is intentionally outside the auth layer — load balancers hit
        // it without credentials.
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine as _;
    use tower::util::ServiceExt;

    use nsi_config::{ApiConfig, NrmBackendSelection, ProviderConfig, RequesterConfig, StoreBackend};
    use nsi_nrm::YamlStubBackend;
    use nsi_store::InMemoryStore;
    use nsi_topology::TopologyCache;

    use nsi_engine::NoopRequesterClient;

    const TEST_TOKEN: &str = "test-token";

    fn test_app() -> Router {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.yaml");
        std::fs::write(&path, "stps: []").unwrap();
        let topology = TopologyCache::load(&path).unwrap();
        std::mem::forget(dir);

        let store = Arc::new(InMemoryStore::new());
        let ctx = EngineContext::new(
            store.clone(),
            store,
            Arc::new(YamlStubBackend::default()),
            topology,
            Arc::new(NoopRequesterClient::default()),
            ProviderConfig {
                requester_nsa: "urn:ogf:network:example.org:requester".into(),
                provider_nsa: "urn:ogf:network:example.org:provider".into(),
                topology_path: path.to_string_lossy().into_owned(),
                topology_refresh: std::time::Duration::from_secs(300),
                hold_timeout: std::time::Duration::from_secs(120),
                backend_call_timeout: std::time::Duration::from_secs(30),
                grace: std::time::Duration::from_secs(30),
                worker_pool_size: 4,
                store: StoreBackend::Memory,
                nrm_backend: NrmBackendSelection::YamlStub,
                requester: RequesterConfig::default(),
                api: ApiConfig { bind_addr: "127.0.0.1:0".into(), auth_token: TEST_TOKEN.into() },
            },
        );
        build_app(ctx)
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let app = test_app();
        let resp = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_without_auth_is_rejected() {
        let app = test_app();
        let resp = app.oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ready_with_bearer_token_succeeds() {
        let app = test_app();
        let resp = app
            .oneshot(authed(Request::builder().uri("/ready")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_with_basic_auth_succeeds() {
        let app = test_app();
        let credentials = base64::engine::general_purpose::STANDARD.encode(format!("nsi:{}", TEST_TOKEN));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .header("Authorization", format!("Basic {}", credentials))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn connections_empty_list() {
        let app = test_app();
        let resp = app
            .oneshot(authed(Request::builder().uri("/connections")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn connections_filtered_by_connection_ids() {
        let app = test_app();
        let resp = app
            .oneshot(
                authed(Request::builder().uri(format!("/connections?connection_ids={}", uuid::Uuid::new_v4())))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn connection_not_found_returns_404() {
        let app = test_app();
        let resp = app
            .oneshot(
                authed(Request::builder().uri(format!("/connections/{}", uuid::Uuid::new_v4())))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
