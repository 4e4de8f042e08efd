use crate::params::{user_id, WatcherListParams};
use crate::response::{ApiResponse, IdResult};
use crate::{AppState, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lookout_core::WatcherRequest;
use std::sync::Arc;
use tracing::info;

/// POST /k8s/watcher
pub async fn create_watcher(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<WatcherRequest>, JsonRejection>,
) -> Result<Response> {
    let user = user_id(&headers)?;
    let Json(req) = payload?;
    info!("Creating watcher '{}'", req.name);

    let id = state.service.create(&req, user).await?;

    Ok(ApiResponse::ok(IdResult { id }).into_response())
}

/// GET /k8s/watcher/{id}
pub async fn get_watcher(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Response> {
    let watcher = state.service.get(id).await?;

    Ok(ApiResponse::ok(watcher).into_response())
}

/// PUT /k8s/watcher/{id}
pub async fn replace_watcher(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    payload: std::result::Result<Json<WatcherRequest>, JsonRejection>,
) -> Result<Response> {
    let user = user_id(&headers)?;
    let Json(req) = payload?;
    info!("Replacing watcher {}", id);

    state.service.update(id, &req, user).await?;

    Ok(ApiResponse::ok(IdResult { id }).into_response())
}

/// DELETE /k8s/watcher/{id}
pub async fn delete_watcher(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response> {
    let user = user_id(&headers)?;
    info!("Deleting watcher {}", id);

    state.service.delete(id, user).await?;

    Ok(ApiResponse::ok(IdResult { id }).into_response())
}

/// GET /k8s/watcher
pub async fn list_watchers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WatcherListParams>,
) -> Result<Response> {
    let query = params.into_query()?;
    let page = state.service.list(&query).await?;

    Ok(ApiResponse::ok(page).into_response())
}
