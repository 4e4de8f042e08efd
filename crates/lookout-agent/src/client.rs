use crate::error::{AgentError, Result};
use crate::types::{AgentEndpoint, PushRequest, PushResponse, PASS_KEY_HEADER};
use async_trait::async_trait;
use lookout_core::{EventAction, WatcherSnapshot};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Default per-call timeout for agent RPCs
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes watcher configuration to a cluster agent
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Deliver one watcher change to one agent
    ///
    /// ADD and UPDATE upsert the snapshot on the agent. DELETE removes it and
    /// succeeds for a watcher the agent does not know.
    async fn push_watcher_config(
        &self,
        endpoint: &AgentEndpoint,
        action: EventAction,
        snapshot: &WatcherSnapshot,
    ) -> Result<()>;
}

/// HTTP client for the agent's `POST /watcher` endpoint
pub struct HttpAgentClient {
    client: Client,
    timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for HttpAgentClient {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_TIMEOUT)
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn push_watcher_config(
        &self,
        endpoint: &AgentEndpoint,
        action: EventAction,
        snapshot: &WatcherSnapshot,
    ) -> Result<()> {
        let url = format!("{}/watcher", endpoint.url);
        debug!("POST {} ({} watcher {})", url, action, snapshot.id);

        let body = PushRequest {
            action,
            watcher: snapshot.clone(),
        };

        let resp = self
            .client
            .post(&url)
            .header(PASS_KEY_HEADER, &endpoint.pass_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::timeout(endpoint.cluster_id, self.timeout.as_millis() as u64)
                } else {
                    AgentError::request_failed(endpoint.cluster_id, e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::rejected(endpoint.cluster_id, status.as_u16(), text));
        }

        let reply: PushResponse = resp.json().await.map_err(|e| {
            AgentError::request_failed(
                endpoint.cluster_id,
                format!("Failed to parse agent response: {}", e),
            )
        })?;

        if !reply.ok {
            return Err(AgentError::rejected(
                endpoint.cluster_id,
                status.as_u16(),
                reply.error.unwrap_or_else(|| "agent reported failure".to_string()),
            ));
        }

        Ok(())
    }
}
