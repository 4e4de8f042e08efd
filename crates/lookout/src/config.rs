use lookout_agent::ClusterConfig;
use lookout_watcher::CatalogConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Contents of the YAML configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookoutConfig {
    /// Registered clusters and their agents
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,

    /// Jobs, pipelines and environments triggers may reference
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Base URL of the CI executor; runs stay in memory when unset
    #[serde(default)]
    pub executor_url: Option<String>,
}

impl LookoutConfig {
    /// Load the configuration file; a missing file yields an empty config
    pub fn load(path: &Path) -> miette::Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, starting without clusters or catalog",
                path.display()
            );
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| miette::miette!("Failed to read config '{}': {}", path.display(), e))?;
        let config: Self = lookout_core::from_yaml(&data)?;
        info!(
            "Loaded {} clusters and {} jobs from {}",
            config.clusters.len(),
            config.catalog.jobs.len(),
            path.display()
        );
        Ok(config)
    }
}
