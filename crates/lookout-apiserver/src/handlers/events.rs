use crate::params::{ClusterParams, InterceptedEventParams};
use crate::response::ApiResponse;
use crate::{AppState, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lookout_core::EventBatch;
use std::sync::Arc;
use tracing::{debug, warn};

/// POST /scoop/intercept-event?clusterId=
///
/// 204 when every event was stored or deliberately dropped, 207 with the
/// report when some events failed.
pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClusterParams>,
    payload: std::result::Result<Json<EventBatch>, JsonRejection>,
) -> Result<Response> {
    let cluster_id = params.cluster_id()?;
    let Json(batch) = payload?;
    debug!(cluster_id, "Received {} intercepted events", batch.events.len());

    let report = state.ingestor.ingest(cluster_id, batch).await?;
    if report.is_complete() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    warn!(cluster_id, "{} events failed ingestion", report.failed.len());
    Ok(ApiResponse::with_status(StatusCode::MULTI_STATUS, report).into_response())
}

/// GET /scoop/intercepted-events
pub async fn list_intercepted_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InterceptedEventParams>,
) -> Result<Response> {
    let query = params.into_query()?;
    let page = state.query().list_intercepted_events(&query).await?;

    Ok(ApiResponse::ok(page).into_response())
}

/// GET /scoop/intercepted-events/{id}
pub async fn get_intercepted_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Response> {
    let event = state.query().get_intercepted_event(id).await?;

    Ok(ApiResponse::ok(event).into_response())
}

/// GET /scoop/watchers?clusterId=
///
/// Full watcher set of one cluster, for agents resyncing after a restart.
pub async fn watchers_for_cluster(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClusterParams>,
) -> Result<Response> {
    let cluster_id = params.cluster_id()?;
    let snapshots = state.service.get_for_cluster(cluster_id).await?;

    Ok(ApiResponse::ok(snapshots).into_response())
}
