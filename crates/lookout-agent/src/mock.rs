use crate::client::AgentClient;
use crate::error::{AgentError, Result};
use crate::types::AgentEndpoint;
use async_trait::async_trait;
use lookout_core::{EventAction, WatcherSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One push observed by `MockAgentClient`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPush {
    pub cluster_id: u64,
    pub action: EventAction,
    pub snapshot: WatcherSnapshot,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    action: Option<EventAction>,
    status: u16,
}

/// In-memory agent fleet for tests
///
/// Keeps the snapshot each simulated agent holds so tests can compare agent
/// state with the store. Failures can be injected per cluster, optionally
/// narrowed to one action.
#[derive(Clone, Default)]
pub struct MockAgentClient {
    attempts: Arc<RwLock<Vec<RecordedPush>>>,
    pushes: Arc<RwLock<Vec<RecordedPush>>>,
    agents: Arc<RwLock<HashMap<u64, HashMap<u64, WatcherSnapshot>>>>,
    failures: Arc<RwLock<HashMap<u64, InjectedFailure>>>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every push to `cluster_id` fail with `status`
    pub async fn fail_cluster(&self, cluster_id: u64, status: u16) {
        self.failures
            .write()
            .await
            .insert(cluster_id, InjectedFailure { action: None, status });
    }

    /// Make pushes of `action` to `cluster_id` fail with `status`
    pub async fn fail_cluster_on(&self, cluster_id: u64, action: EventAction, status: u16) {
        self.failures.write().await.insert(
            cluster_id,
            InjectedFailure {
                action: Some(action),
                status,
            },
        );
    }

    pub async fn heal_cluster(&self, cluster_id: u64) {
        self.failures.write().await.remove(&cluster_id);
    }

    /// Every push, failed or not, in arrival order
    pub async fn attempts(&self) -> Vec<RecordedPush> {
        self.attempts.read().await.clone()
    }

    /// Every successful push, in arrival order
    pub async fn pushes(&self) -> Vec<RecordedPush> {
        self.pushes.read().await.clone()
    }

    pub async fn pushes_for(&self, cluster_id: u64) -> Vec<RecordedPush> {
        self.pushes
            .read()
            .await
            .iter()
            .filter(|p| p.cluster_id == cluster_id)
            .cloned()
            .collect()
    }

    /// Snapshot the agent of `cluster_id` currently holds for `watcher_id`
    pub async fn agent_snapshot(
        &self,
        cluster_id: u64,
        watcher_id: u64,
    ) -> Option<WatcherSnapshot> {
        self.agents
            .read()
            .await
            .get(&cluster_id)
            .and_then(|w| w.get(&watcher_id))
            .cloned()
    }

    /// Watcher ids the agent of `cluster_id` holds, sorted
    pub async fn agent_watchers(&self, cluster_id: u64) -> Vec<u64> {
        let agents = self.agents.read().await;
        let mut ids: Vec<u64> = agents
            .get(&cluster_id)
            .map(|w| w.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn push_watcher_config(
        &self,
        endpoint: &AgentEndpoint,
        action: EventAction,
        snapshot: &WatcherSnapshot,
    ) -> Result<()> {
        let cluster_id = endpoint.cluster_id;
        let push = RecordedPush {
            cluster_id,
            action,
            snapshot: snapshot.clone(),
        };
        self.attempts.write().await.push(push.clone());

        if let Some(failure) = self.failures.read().await.get(&cluster_id) {
            if failure.action.is_none_or(|a| a == action) {
                debug!("Mock: {} to cluster {} fails with {}", action, cluster_id, failure.status);
                return Err(AgentError::rejected(
                    cluster_id,
                    failure.status,
                    "injected failure",
                ));
            }
        }

        {
            let mut agents = self.agents.write().await;
            let watchers = agents.entry(cluster_id).or_default();
            match action {
                EventAction::Add | EventAction::Update => {
                    watchers.insert(snapshot.id, snapshot.clone());
                }
                EventAction::Delete => {
                    watchers.remove(&snapshot.id);
                }
            }
        }

        self.pushes.write().await.push(push);
        debug!("Mock: {} watcher {} on cluster {}", action, snapshot.id, cluster_id);
        Ok(())
    }
}
