//! Read-only aggregation over the connection store — `QuerySummary`,
//! `QueryNotification`, `QueryResult`, and the local half of
//! `QueryRecursive`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nsi_domain::{ConnectionId, ReservationState};
use nsi_store::{ConnectionRecord, Notification, ResultRecord};

use crate::context::EngineContext;
use crate::error::EngineError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuerySummaryFilter {
    pub connection_ids: Vec<ConnectionId>,
    pub global_reservation_ids: Vec<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySummaryResponse {
    pub connections: Vec<ConnectionRecord>,
    pub last_modified: Option<DateTime<Utc>>,
}

fn matches_filter(record: &ConnectionRecord, filter: &QuerySummaryFilter) -> bool {
    let no_identity_filter = filter.connection_ids.is_empty() && filter.global_reservation_ids.is_empty();
    let identity_match = no_identity_filter
        || filter.connection_ids.contains(record.connection_id())
        || record
            .connection
            .global_reservation_id
            .as_ref()
            .is_some_and(|grid| filter.global_reservation_ids.contains(grid));
    if !identity_match {
        return false;
    }
    if matches!(record.reservation_state, ReservationState::Checking | ReservationState::Failed) {
        return false;
    }
    if let Some(since) = filter.if_modified_since {
        if record.last_modified <= since {
            return false;
        }
    }
    true
}

/// Excludes connections whose RSM is `Checking` or `Failed` (a reservation
/// not yet confirmed has nothing useful to summarize) and anything not
/// modified since `filter.if_modified_since`. The response's `last_modified`
/// is the latest timestamp among the returned connections.
pub async fn query_summary(ctx: &EngineContext, filter: QuerySummaryFilter) -> Result<QuerySummaryResponse, EngineError> {
    let all = ctx.store.list().await?;
    let connections: Vec<ConnectionRecord> = all.into_iter().filter(|r| matches_filter(r, &filter)).collect();
    let last_modified = connections.iter().map(|r| r.last_modified).max();
    Ok(QuerySummaryResponse { connections, last_modified })
}

/// `QueryRecursive` performs the same local aggregation as `QuerySummary`;
/// forwarding to downstream providers over a chain is not implemented.
pub async fn query_recursive(ctx: &EngineContext, filter: QuerySummaryFilter) -> Result<QuerySummaryResponse, EngineError> {
    query_summary(ctx, filter).await
}

pub async fn query_notification(ctx: &EngineContext, connection_id: &ConnectionId, since: Option<u64>) -> Result<Vec<Notification>, EngineError> {
    Ok(ctx.store.list_notifications(connection_id, since).await?)
}

pub async fn query_result(ctx: &EngineContext, connection_id: &ConnectionId, since: Option<u64>) -> Result<Vec<ResultRecord>, EngineError> {
    Ok(ctx.store.list_results(connection_id, since).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nsi_config::{ApiConfig, NrmBackendSelection, ProviderConfig, RequesterConfig, StoreBackend};
    use nsi_domain::{Connection, Criteria, PtpEndpoint, Schedule};
    use nsi_nrm::YamlStubBackend;
    use nsi_store::{ConnectionStore, InMemoryStore};
    use nsi_topology::TopologyCache;

    use crate::requester::NoopRequesterClient;

    fn connection(id: ConnectionId) -> Connection {
        Connection {
            connection_id: id,
            global_reservation_id: None,
            requester_nsa: "urn:ogf:network:example.org:requester".into(),
            provider_nsa: "urn:ogf:network:example.org:provider".into(),
            criteria: Criteria {
                description: None,
                schedule: Schedule::default(),
                bandwidth_mbps: 100,
                src_stp: PtpEndpoint::new("PortA", 100),
                dst_stp: PtpEndpoint::new("PortB", 100),
                version: 0,
            },
        }
    }

    async fn context_with_store(store: Arc<InMemoryStore>) -> EngineContext {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.yaml");
        std::fs::write(&path, "stps: []").unwrap();
        let topology = TopologyCache::load(&path).unwrap();
        std::mem::forget(dir);

        EngineContext::new(
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
                api: ApiConfig::default(),
            },
        )
    }

    #[tokio::test]
    async fn excludes_checking_and_failed() {
        let store = Arc::new(InMemoryStore::new());
        let t0 = Utc::now();

        let mut held = ConnectionRecord::new(connection(ConnectionId::new()), "corr-held", t0);
        held.reservation_state = ReservationState::Held;
        store.create(&held).await.unwrap();

        let mut checking = ConnectionRecord::new(connection(ConnectionId::new()), "corr-checking", t0);
        checking.reservation_state = ReservationState::Checking;
        store.create(&checking).await.unwrap();

        let ctx = context_with_store(store).await;
        let resp = query_summary(&ctx, QuerySummaryFilter::default()).await.unwrap();
        assert_eq!(resp.connections.len(), 1);
        assert_eq!(resp.connections[0].connection_id(), held.connection_id());
    }

    #[tokio::test]
    async fn if_modified_since_filters_out_stale_connections() {
        let store = Arc::new(InMemoryStore::new());
        let t0 = Utc::now();

        let mut old = ConnectionRecord::new(connection(ConnectionId::new()), "corr-old", t0 - chrono::Duration::hours(1));
        old.reservation_state = ReservationState::Held;
        store.create(&old).await.unwrap();

        let ctx = context_with_store(store).await;
        let filter = QuerySummaryFilter { if_modified_since: Some(t0), ..Default::default() };
        let resp = query_summary(&ctx, filter).await.unwrap();
        assert!(resp.connections.is_empty());
        assert_eq!(resp.last_modified, None);
    }
}
