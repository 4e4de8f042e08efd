use crate::error::{Result, WatcherError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lookout_core::{ExecutionStatus, InterceptedEventExecution, JobTriggerData, RuntimeParameter};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Job run handed to the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunRequest {
    pub job_id: u64,
    pub pipeline_id: u64,
    pub workflow_id: u64,
    pub execution_environment_id: u64,
    pub runtime_parameters: Vec<RuntimeParameter>,
    pub intercepted_event_id: u64,
    pub cluster_id: u64,
    pub namespace: String,
}

impl JobRunRequest {
    pub fn new(data: &JobTriggerData, execution: &InterceptedEventExecution) -> Self {
        Self {
            job_id: data.job_id,
            pipeline_id: data.pipeline_id,
            workflow_id: data.workflow_id,
            execution_environment_id: data.execution_environment_id,
            runtime_parameters: data.runtime_parameters.clone(),
            intercepted_event_id: execution.id,
            cluster_id: execution.cluster_id,
            namespace: execution.namespace.clone(),
        }
    }
}

/// The CI system that runs job triggers and owns workflow status
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Start a run; returns the trigger execution (workflow run) id
    async fn trigger_job(&self, request: &JobRunRequest) -> Result<u64>;

    /// Latest status of each run; ids the executor does not know are absent
    async fn workflow_statuses(&self, ids: &[u64]) -> Result<HashMap<u64, ExecutionStatus>>;

    /// Start time of the most recent run of each pipeline
    async fn last_triggered_at(&self, pipeline_ids: &[u64]) -> Result<HashMap<u64, DateTime<Utc>>>;
}

#[derive(Debug, Deserialize)]
struct TriggeredRun {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WorkflowStatus {
    id: u64,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineLastRun {
    pipeline_id: u64,
    started_on: DateTime<Utc>,
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",")
}

fn executor_error(message: impl Into<String>, err: reqwest::Error) -> WatcherError {
    WatcherError::executor(message, Some(Box::new(err)))
}

/// Executor reached over HTTP
pub struct HttpJobExecutor {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpJobExecutor {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| executor_error("executor request failed", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(WatcherError::executor(
                format!("executor GET failed with status {}: {}", status, body),
                None,
            ));
        }

        resp.json::<T>()
            .await
            .map_err(|e| executor_error("failed to parse executor response", e))
    }
}

#[async_trait]
impl JobExecutor for HttpJobExecutor {
    async fn trigger_job(&self, request: &JobRunRequest) -> Result<u64> {
        let url = format!("{}/workflows", self.base_url);
        debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| executor_error("executor request failed", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(WatcherError::executor(
                format!("executor refused the run with status {}: {}", status, body),
                None,
            ));
        }

        let run: TriggeredRun = resp
            .json()
            .await
            .map_err(|e| executor_error("failed to parse executor response", e))?;
        Ok(run.id)
    }

    async fn workflow_statuses(&self, ids: &[u64]) -> Result<HashMap<u64, ExecutionStatus>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/workflows/status?ids={}", self.base_url, join_ids(ids));
        let statuses: Vec<WorkflowStatus> = self.get_json(&url).await?;

        Ok(statuses
            .into_iter()
            .filter_map(|s| ExecutionStatus::from_workflow_status(&s.status).map(|st| (s.id, st)))
            .collect())
    }

    async fn last_triggered_at(&self, pipeline_ids: &[u64]) -> Result<HashMap<u64, DateTime<Utc>>> {
        if pipeline_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!(
            "{}/pipelines/last-run?ids={}",
            self.base_url,
            join_ids(pipeline_ids)
        );
        let runs: Vec<PipelineLastRun> = self.get_json(&url).await?;

        Ok(runs
            .into_iter()
            .map(|r| (r.pipeline_id, r.started_on))
            .collect())
    }
}

#[derive(Default)]
struct InMemoryState {
    next_id: u64,
    runs: Vec<(u64, JobRunRequest)>,
    statuses: HashMap<u64, ExecutionStatus>,
    last_runs: HashMap<u64, DateTime<Utc>>,
    reject_runs: bool,
    unreachable: bool,
}

/// Executor that records runs in memory
///
/// Used by the binary when no executor URL is configured, and by tests.
/// New runs start out Progressing.
#[derive(Default)]
pub struct InMemoryJobExecutor {
    state: Mutex<InMemoryState>,
}

impl InMemoryJobExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, run_id: u64, status: ExecutionStatus) {
        self.state.lock().statuses.insert(run_id, status);
    }

    pub fn set_last_run(&self, pipeline_id: u64, at: DateTime<Utc>) {
        self.state.lock().last_runs.insert(pipeline_id, at);
    }

    /// Refuse every new run
    pub fn reject_runs(&self, reject: bool) {
        self.state.lock().reject_runs = reject;
    }

    /// Fail every call as if the executor were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Runs started so far with their ids
    pub fn runs(&self) -> Vec<(u64, JobRunRequest)> {
        self.state.lock().runs.clone()
    }

    fn check_reachable(state: &InMemoryState) -> Result<()> {
        if state.unreachable {
            return Err(WatcherError::executor("executor unreachable", None));
        }
        Ok(())
    }
}

#[async_trait]
impl JobExecutor for InMemoryJobExecutor {
    async fn trigger_job(&self, request: &JobRunRequest) -> Result<u64> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if state.reject_runs {
            return Err(WatcherError::executor(
                format!("pipeline {} cannot be triggered", request.pipeline_id),
                None,
            ));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.runs.push((id, request.clone()));
        state.statuses.insert(id, ExecutionStatus::Progressing);
        state.last_runs.insert(request.pipeline_id, Utc::now());
        debug!("InMemory: started run {} of pipeline {}", id, request.pipeline_id);
        Ok(id)
    }

    async fn workflow_statuses(&self, ids: &[u64]) -> Result<HashMap<u64, ExecutionStatus>> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.statuses.get(id).map(|s| (*id, *s)))
            .collect())
    }

    async fn last_triggered_at(&self, pipeline_ids: &[u64]) -> Result<HashMap<u64, DateTime<Utc>>> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        Ok(pipeline_ids
            .iter()
            .filter_map(|id| state.last_runs.get(id).map(|t| (*id, *t)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn run_request(pipeline_id: u64) -> JobRunRequest {
        JobRunRequest {
            job_id: 10,
            pipeline_id,
            workflow_id: 1000,
            execution_environment_id: 5,
            runtime_parameters: vec![],
            intercepted_event_id: 1,
            cluster_id: 1,
            namespace: "ns1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_runs_start_progressing() {
        let executor = InMemoryJobExecutor::new();
        let id = executor.trigger_job(&run_request(100)).await.unwrap();

        let statuses = executor.workflow_statuses(&[id, 999]).await.unwrap();
        assert_eq!(statuses.get(&id), Some(&ExecutionStatus::Progressing));
        assert!(!statuses.contains_key(&999));

        executor.set_status(id, ExecutionStatus::Success);
        let statuses = executor.workflow_statuses(&[id]).await.unwrap();
        assert_eq!(statuses[&id], ExecutionStatus::Success);

        assert!(executor.last_triggered_at(&[100]).await.unwrap().contains_key(&100));
    }

    #[tokio::test]
    async fn test_in_memory_failure_modes() {
        let executor = InMemoryJobExecutor::new();
        executor.reject_runs(true);
        let err = executor.trigger_job(&run_request(1)).await.unwrap_err();
        assert!(matches!(err, WatcherError::Executor { .. }));
        assert!(executor.runs().is_empty());

        executor.set_unreachable(true);
        let err = executor.workflow_statuses(&[1]).await.unwrap_err();
        assert!(matches!(err, WatcherError::Executor { .. }));
    }

    #[tokio::test]
    async fn test_http_executor_down_is_executor_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}", addr);
        let executor = HttpJobExecutor::new(&url, Duration::from_millis(500));
        let err = executor.trigger_job(&run_request(1)).await.unwrap_err();
        assert!(matches!(err, WatcherError::Executor { .. }));
        assert!(err.to_string().starts_with("Job executor failed"));
    }

    async fn spawn_executor() -> String {
        let app = Router::new()
            .route(
                "/workflows",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({"id": body["pipelineId"].as_u64().unwrap_or(0) + 1}))
                }),
            )
            .route(
                "/workflows/status",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q.get("ids").map(String::as_str), Some("7,8"));
                    Json(json!([
                        {"id": 7, "status": "Succeeded"},
                        {"id": 8, "status": "SomethingNew"}
                    ]))
                }),
            )
            .route(
                "/pipelines/last-run",
                get(|| async {
                    Json(json!([{"pipelineId": 100, "startedOn": "2026-03-01T12:00:00Z"}]))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_http_executor() {
        let url = spawn_executor().await;
        let executor = HttpJobExecutor::new(&url, Duration::from_secs(5));

        assert_eq!(executor.trigger_job(&run_request(41)).await.unwrap(), 42);

        let statuses = executor.workflow_statuses(&[7, 8]).await.unwrap();
        assert_eq!(statuses.get(&7), Some(&ExecutionStatus::Success));
        assert!(!statuses.contains_key(&8));

        let last = executor.last_triggered_at(&[100]).await.unwrap();
        assert_eq!(last[&100].to_rfc3339(), "2026-03-01T12:00:00+00:00");

        assert!(executor.workflow_statuses(&[]).await.unwrap().is_empty());
    }
}
