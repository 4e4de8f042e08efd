use lookout_core::{EventAction, WatcherSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the agent's shared secret
pub const PASS_KEY_HEADER: &str = "X-PASS-KEY";

/// A registered cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: u64,
    pub name: String,
}

/// Where and how to reach a cluster's agent
#[derive(Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub cluster_id: u64,
    /// Base URL, e.g. `http://scoop.devtroncd:8080`
    pub url: String,
    pub pass_key: String,
}

impl fmt::Debug for AgentEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentEndpoint")
            .field("cluster_id", &self.cluster_id)
            .field("url", &self.url)
            .field("pass_key", &"<redacted>")
            .finish()
    }
}

/// Agent section of a cluster entry in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub url: String,
    pub pass_key: String,
}

/// Cluster entry in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub agent: Option<AgentConfig>,
}

/// Body of `POST /watcher` on an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub action: EventAction,
    pub watcher: WatcherSnapshot,
}

/// Agent reply to a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
