use crate::error::{Result, WatcherError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A CI job (application) known to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub id: u64,
    pub name: String,
}

/// A CI pipeline belonging to a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRef {
    pub id: u64,
    pub job_id: u64,
    pub name: String,
    #[serde(default)]
    pub workflow_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRef {
    pub id: u64,
    pub name: String,
}

/// Name lookups against the platform catalog
///
/// Every method is a batch lookup; names that do not exist are simply
/// absent from the result.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn find_jobs_by_names(&self, names: &[String]) -> Result<Vec<JobRef>>;

    /// Pipelines named in `names` that belong to one of `job_ids`
    async fn find_pipelines(&self, job_ids: &[u64], names: &[String]) -> Result<Vec<PipelineRef>>;

    async fn find_environments_by_names(&self, names: &[String]) -> Result<Vec<EnvironmentRef>>;

    /// Map pipeline id to the workflow id that runs it
    async fn find_workflow_ids(&self, pipeline_ids: &[u64]) -> Result<HashMap<u64, u64>>;
}

/// Catalog section of the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub jobs: Vec<JobRef>,
    #[serde(default)]
    pub pipelines: Vec<PipelineRef>,
    #[serde(default)]
    pub environments: Vec<EnvironmentRef>,
}

/// Catalog backed by a fixed list of jobs, pipelines and environments
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    config: CatalogConfig,
}

impl StaticCatalog {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let mut job_ids = HashSet::new();
        for job in &config.jobs {
            if !job_ids.insert(job.id) {
                return Err(WatcherError::validation(format!(
                    "catalog lists job id {} twice",
                    job.id
                )));
            }
        }
        for pipeline in &config.pipelines {
            if !job_ids.contains(&pipeline.job_id) {
                return Err(WatcherError::validation(format!(
                    "pipeline '{}' references unknown job {}",
                    pipeline.name, pipeline.job_id
                )));
            }
        }
        Ok(Self { config })
    }
}

fn name_set(names: &[String]) -> HashSet<&str> {
    names.iter().map(String::as_str).collect()
}

#[async_trait]
impl CatalogLookup for StaticCatalog {
    async fn find_jobs_by_names(&self, names: &[String]) -> Result<Vec<JobRef>> {
        let wanted = name_set(names);
        Ok(self
            .config
            .jobs
            .iter()
            .filter(|j| wanted.contains(j.name.as_str()))
            .cloned()
            .collect())
    }

    async fn find_pipelines(&self, job_ids: &[u64], names: &[String]) -> Result<Vec<PipelineRef>> {
        let wanted = name_set(names);
        Ok(self
            .config
            .pipelines
            .iter()
            .filter(|p| job_ids.contains(&p.job_id) && wanted.contains(p.name.as_str()))
            .cloned()
            .collect())
    }

    async fn find_environments_by_names(&self, names: &[String]) -> Result<Vec<EnvironmentRef>> {
        let wanted = name_set(names);
        Ok(self
            .config
            .environments
            .iter()
            .filter(|e| wanted.contains(e.name.as_str()))
            .cloned()
            .collect())
    }

    async fn find_workflow_ids(&self, pipeline_ids: &[u64]) -> Result<HashMap<u64, u64>> {
        Ok(self
            .config
            .pipelines
            .iter()
            .filter(|p| p.workflow_id != 0 && pipeline_ids.contains(&p.id))
            .map(|p| (p.id, p.workflow_id))
            .collect())
    }
}
