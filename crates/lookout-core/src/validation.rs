use crate::error::{CoreError, Result};
use crate::trigger::TriggerRequest;
use crate::watcher::WatcherRequest;
use std::collections::HashSet;

/// Maximum watcher name length
pub const MAX_NAME_LEN: usize = 253;

/// Maximum watcher description length
pub const MAX_DESCRIPTION_LEN: usize = 350;

fn invalid(details: impl Into<String>, help: impl Into<String>) -> CoreError {
    CoreError::validation_failed("Watcher", details, help)
}

/// Validate a watcher create/replace payload
///
/// Checks only what can be decided from the request itself; cluster
/// existence and name uniqueness need the registry and the store.
pub fn validate_watcher_request(req: &WatcherRequest) -> Result<()> {
    validate_name(&req.name)?;

    if req.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(invalid(
            format!("description exceeds {} characters", MAX_DESCRIPTION_LEN),
            "Shorten the description",
        ));
    }

    let config = &req.event_configuration;

    if config.k8s_resources.is_empty() {
        return Err(invalid(
            "k8sResources must not be empty",
            "Select at least one Kubernetes resource type to watch",
        ));
    }
    let mut seen_gvks = HashSet::new();
    for gvk in &config.k8s_resources {
        if gvk.version.trim().is_empty() || gvk.kind.trim().is_empty() {
            return Err(invalid(
                format!("resource '{}' needs a version and a kind", gvk),
                "Core resources use an empty group, e.g. group \"\", version \"v1\", kind \"Pod\"",
            ));
        }
        if !seen_gvks.insert(gvk) {
            return Err(invalid(
                format!("resource '{}' is listed twice", gvk),
                "List each resource type once",
            ));
        }
    }

    if config.selected_actions.is_empty() {
        return Err(invalid(
            "selectedActions must not be empty",
            "Pick at least one of ADD, UPDATE, DELETE",
        ));
    }
    let mut seen_actions = HashSet::new();
    for action in &config.selected_actions {
        if !seen_actions.insert(action) {
            return Err(invalid(
                format!("action {} is listed twice", action),
                "List each action once",
            ));
        }
    }

    validate_selectors(req)?;

    for (i, trigger) in req.triggers.iter().enumerate() {
        validate_trigger(i, trigger)?;
    }

    Ok(())
}

/// Validate a watcher name
pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if name.trim().is_empty() {
        return Err(invalid("name must not be empty", "Provide a watcher name"));
    }
    if len > MAX_NAME_LEN {
        return Err(invalid(
            format!("name is {} characters, limit is {}", len, MAX_NAME_LEN),
            "Use a shorter watcher name",
        ));
    }
    Ok(())
}

fn validate_selectors(req: &WatcherRequest) -> Result<()> {
    let selectors = &req.event_configuration.selectors;

    if selectors.is_empty() {
        return Err(invalid(
            "selectors must not be empty",
            "Select a cluster, or use groupName \"__all__\" for every cluster",
        ));
    }

    let has_all = selectors.iter().any(|s| s.is_all_clusters());
    if has_all && selectors.len() > 1 {
        return Err(invalid(
            "an all-clusters selector cannot be combined with other selectors",
            "Use either a single \"__all__\" selector or a list of specific clusters",
        ));
    }

    let mut seen = HashSet::new();
    for selector in selectors {
        if selector.group_name.trim().is_empty() {
            return Err(invalid(
                "selector groupName must not be empty",
                "Set groupName to a cluster name",
            ));
        }
        if !seen.insert(selector.group_name.as_str()) {
            return Err(invalid(
                format!("cluster '{}' is selected twice", selector.group_name),
                "Merge the namespace lists into a single selector per cluster",
            ));
        }
        if selector.names.iter().any(|n| n.trim().is_empty()) {
            return Err(invalid(
                format!("cluster '{}' lists an empty namespace", selector.group_name),
                "Use \"*\" or an empty list to watch every namespace",
            ));
        }
    }

    Ok(())
}

fn validate_trigger(index: usize, trigger: &TriggerRequest) -> Result<()> {
    let data = &trigger.data;
    if data.job_name.trim().is_empty() {
        return Err(invalid(
            format!("triggers[{}]: jobName must not be empty", index),
            "Name the job to run",
        ));
    }
    if data.pipeline_name.trim().is_empty() {
        return Err(invalid(
            format!("triggers[{}]: pipelineName must not be empty", index),
            "Name the job pipeline to run",
        ));
    }
    if data.runtime_parameters.iter().any(|p| p.key.trim().is_empty()) {
        return Err(invalid(
            format!("triggers[{}]: runtime parameter keys must not be empty", index),
            "Give every runtime parameter a key",
        ));
    }
    Ok(())
}
