use crate::catalog::CatalogLookup;
use crate::error::Result;
use lookout_core::{JobTriggerData, TriggerRequest};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Stamps catalog ids onto trigger drafts
///
/// One lookup per kind of name for the whole request. Names that do not
/// resolve keep id 0; the trigger is still accepted.
pub struct ReferenceResolver {
    catalog: Arc<dyn CatalogLookup>,
}

fn distinct<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    names
        .filter(|n| !n.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl ReferenceResolver {
    pub fn new(catalog: Arc<dyn CatalogLookup>) -> Self {
        Self { catalog }
    }

    /// Resolve every trigger of a request, preserving order
    pub async fn resolve(&self, triggers: &[TriggerRequest]) -> Result<Vec<JobTriggerData>> {
        let mut drafts: Vec<JobTriggerData> =
            triggers.iter().map(|t| t.data.without_ids()).collect();
        if drafts.is_empty() {
            return Ok(drafts);
        }

        let job_names = distinct(drafts.iter().map(|d| d.job_name.as_str()));
        let job_ids: HashMap<String, u64> = if job_names.is_empty() {
            HashMap::new()
        } else {
            self.catalog
                .find_jobs_by_names(&job_names)
                .await?
                .into_iter()
                .map(|j| (j.name, j.id))
                .collect()
        };

        let pipeline_names = distinct(drafts.iter().map(|d| d.pipeline_name.as_str()));
        let resolved_jobs: Vec<u64> = job_ids
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let pipeline_ids: HashMap<(u64, String), u64> =
            if pipeline_names.is_empty() || resolved_jobs.is_empty() {
                HashMap::new()
            } else {
                self.catalog
                    .find_pipelines(&resolved_jobs, &pipeline_names)
                    .await?
                    .into_iter()
                    .map(|p| ((p.job_id, p.name), p.id))
                    .collect()
            };

        let env_names = distinct(drafts.iter().map(|d| d.execution_environment.as_str()));
        let env_ids: HashMap<String, u64> = if env_names.is_empty() {
            HashMap::new()
        } else {
            self.catalog
                .find_environments_by_names(&env_names)
                .await?
                .into_iter()
                .map(|e| (e.name, e.id))
                .collect()
        };

        for draft in &mut drafts {
            draft.job_id = job_ids.get(&draft.job_name).copied().unwrap_or(0);
            draft.pipeline_id = pipeline_ids
                .get(&(draft.job_id, draft.pipeline_name.clone()))
                .copied()
                .unwrap_or(0);
            draft.execution_environment_id =
                env_ids.get(&draft.execution_environment).copied().unwrap_or(0);
        }

        let resolved_pipelines: Vec<u64> = drafts
            .iter()
            .map(|d| d.pipeline_id)
            .filter(|id| *id != 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !resolved_pipelines.is_empty() {
            let workflow_ids = self.catalog.find_workflow_ids(&resolved_pipelines).await?;
            for draft in &mut drafts {
                draft.workflow_id = workflow_ids.get(&draft.pipeline_id).copied().unwrap_or(0);
            }
        }

        for draft in &drafts {
            if draft.job_id == 0 || draft.pipeline_id == 0 {
                warn!(
                    job = %draft.job_name,
                    pipeline = %draft.pipeline_name,
                    "Trigger references an unresolved job or pipeline; storing by name only"
                );
            }
        }
        debug!("Resolved {} trigger drafts", drafts.len());
        Ok(drafts)
    }
}
