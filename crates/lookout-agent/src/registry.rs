use crate::error::{AgentError, Result};
use crate::types::{AgentEndpoint, ClusterConfig, ClusterInfo};
use async_trait::async_trait;
use std::collections::HashSet;

/// Maps clusters to their agents
///
/// This trait abstracts over where cluster and agent records live. The
/// binary ships `StaticAgentRegistry`, loaded from the configuration file.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Every registered cluster, in id order
    async fn list_all_clusters(&self) -> Result<Vec<ClusterInfo>>;

    /// Clusters whose name is in `names`; unknown names are skipped
    async fn find_clusters_by_names(&self, names: &[String]) -> Result<Vec<ClusterInfo>>;

    /// Clusters whose id is in `ids`; unknown ids are skipped
    async fn find_clusters_by_ids(&self, ids: &[u64]) -> Result<Vec<ClusterInfo>>;

    /// Resolve the agent endpoint and shared secret of a cluster
    ///
    /// Returns `AgentError::NotConfigured` when the cluster has no agent.
    async fn resolve_agent(&self, cluster_id: u64) -> Result<AgentEndpoint>;
}

/// Registry backed by a fixed list of clusters
pub struct StaticAgentRegistry {
    clusters: Vec<ClusterConfig>,
}

impl StaticAgentRegistry {
    pub fn new(mut clusters: Vec<ClusterConfig>) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for cluster in &clusters {
            if !ids.insert(cluster.id) {
                return Err(AgentError::invalid_config(
                    format!("cluster id {} is listed twice", cluster.id),
                    "Give every cluster a unique id",
                ));
            }
            if !names.insert(cluster.name.as_str()) {
                return Err(AgentError::invalid_config(
                    format!("cluster name '{}' is listed twice", cluster.name),
                    "Give every cluster a unique name",
                ));
            }
            if cluster.name == lookout_core::ALL_CLUSTERS_GROUP {
                return Err(AgentError::invalid_config(
                    format!("'{}' is reserved", cluster.name),
                    "Rename the cluster",
                ));
            }
        }

        clusters.sort_by_key(|c| c.id);
        Ok(Self { clusters })
    }

    fn info(cluster: &ClusterConfig) -> ClusterInfo {
        ClusterInfo {
            id: cluster.id,
            name: cluster.name.clone(),
        }
    }
}

#[async_trait]
impl AgentRegistry for StaticAgentRegistry {
    async fn list_all_clusters(&self) -> Result<Vec<ClusterInfo>> {
        Ok(self.clusters.iter().map(Self::info).collect())
    }

    async fn find_clusters_by_names(&self, names: &[String]) -> Result<Vec<ClusterInfo>> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(self
            .clusters
            .iter()
            .filter(|c| wanted.contains(c.name.as_str()))
            .map(Self::info)
            .collect())
    }

    async fn find_clusters_by_ids(&self, ids: &[u64]) -> Result<Vec<ClusterInfo>> {
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        Ok(self
            .clusters
            .iter()
            .filter(|c| wanted.contains(&c.id))
            .map(Self::info)
            .collect())
    }

    async fn resolve_agent(&self, cluster_id: u64) -> Result<AgentEndpoint> {
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.id == cluster_id)
            .ok_or_else(|| AgentError::unknown_cluster(cluster_id.to_string()))?;

        let agent = cluster
            .agent
            .as_ref()
            .ok_or_else(|| AgentError::not_configured(cluster_id))?;

        Ok(AgentEndpoint {
            cluster_id,
            url: agent.url.trim_end_matches('/').to_string(),
            pass_key: agent.pass_key.clone(),
        })
    }
}
