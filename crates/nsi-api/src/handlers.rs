use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use chrono::{DateTime, Utc};

use nsi_domain::ConnectionId;
use nsi_engine::{processors, query, Ack, ConnectionCorrelated, ReserveRequest};
use nsi_store::ConnectionStore;

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::bad_request(format!("invalid RFC3339 timestamp: {raw}")))
}

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.ctx.store.list().await.map_err(nsi_engine::EngineError::from)?;
    Ok(StatusCode::OK)
}

// ── Admin ─────────────────────────────────────────────────────────────────────

pub async fn reload_topology(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state
        .ctx
        .topology
        .reload()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(StatusCode::OK)
}

// ── Messages ──────────────────────────────────────────────────────────────────

pub async fn reserve(State(state): State<AppState>, Json(body): Json<ReserveRequest>) -> Result<Json<Ack>, ApiError> {
    Ok(Json(processors::reserve(&state.ctx, body).await?))
}

pub async fn reserve_commit(State(state): State<AppState>, Json(body): Json<ConnectionCorrelated>) -> Result<Json<Ack>, ApiError> {
    Ok(Json(processors::reserve_commit(&state.ctx, body).await?))
}

pub async fn reserve_abort(State(state): State<AppState>, Json(body): Json<ConnectionCorrelated>) -> Result<Json<Ack>, ApiError> {
    Ok(Json(processors::reserve_abort(&state.ctx, body).await?))
}

pub async fn provision(State(state): State<AppState>, Json(body): Json<ConnectionCorrelated>) -> Result<Json<Ack>, ApiError> {
    Ok(Json(processors::provision(&state.ctx, body).await?))
}

pub async fn release(State(state): State<AppState>, Json(body): Json<ConnectionCorrelated>) -> Result<Json<Ack>, ApiError> {
    Ok(Json(processors::release(&state.ctx, body).await?))
}

pub async fn terminate(State(state): State<AppState>, Json(body): Json<ConnectionCorrelated>) -> Result<Json<Ack>, ApiError> {
    Ok(Json(processors::terminate(&state.ctx, body).await?))
}

// ── Connections / queries ─────────────────────────────────────────────────────

fn parse_connection_id(raw: &str) -> Result<ConnectionId, ApiError> {
    raw.parse().map_err(|_| ApiError::bad_request(format!("invalid connection id: {raw}")))
}

fn parse_csv_connection_ids(raw: &str) -> Result<Vec<ConnectionId>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_connection_id)
        .collect()
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

pub async fn list_connections(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let if_modified_since = params.get("if_modified_since").map(|s| parse_rfc3339(s)).transpose()?;
    let connection_ids = params.get("connection_ids").map(|s| parse_csv_connection_ids(s)).transpose()?.unwrap_or_default();
    let global_reservation_ids = params.get("global_reservation_ids").map(|s| parse_csv(s)).unwrap_or_default();
    let filter = query::QuerySummaryFilter { connection_ids, global_reservation_ids, if_modified_since };
    let resp = query::query_summary(&state.ctx, filter).await?;
    Ok(Json(json!(resp)))
}

pub async fn get_connection(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let connection_id = parse_connection_id(&id)?;
    let record = state
        .ctx
        .store
        .load(&connection_id)
        .await
        .map_err(nsi_engine::EngineError::from)?
        .ok_or_else(|| ApiError::not_found(format!("connection '{id}' not found")))?;
    Ok(Json(json!(record)))
}

fn parse_since(params: &HashMap<String, String>) -> Result<Option<u64>, ApiError> {
    params
        .get("since")
        .map(|s| s.parse().map_err(|_| ApiError::bad_request("invalid since")))
        .transpose()
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let connection_id = parse_connection_id(&id)?;
    let since = parse_since(&params)?;
    let notifications = query::query_notification(&state.ctx, &connection_id, since).await?;
    Ok(Json(json!(notifications)))
}

pub async fn list_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let connection_id = parse_connection_id(&id)?;
    let since = parse_since(&params)?;
    let results = query::query_result(&state.ctx, &connection_id, since).await?;
    Ok(Json(json!(results)))
}
