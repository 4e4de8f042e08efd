//! Lookout Core - Data model for the Kubernetes event watcher control plane
//!
//! This crate provides:
//! - Watcher, trigger and intercepted-event entities
//! - Request/response shapes shared by the service and the store
//! - Request validation
//! - Error types with miette diagnostics
//! - YAML loading helper

pub mod error;
pub mod execution;
pub mod trigger;
pub mod types;
pub mod validation;
pub mod watcher;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use execution::{
    ClusterNamespace, EventBatch, ExecutionStatus, ExecutionUpdate, IngestFailure, IngestReport,
    InterceptedEvent, InterceptedEventDto, InterceptedEventExecution, InterceptedEventQuery,
    MatchedWatcher,
};
pub use trigger::{
    JobTriggerData, RuntimeParameter, Trigger, TriggerDto, TriggerRequest, TriggerType,
};
pub use types::{
    AuditLog, EventAction, GroupVersionKind, Page, PageRequest, Selector, SelectorType, SortOrder,
    ALL_CLUSTERS_GROUP, ALL_NAMESPACES, SYSTEM_USER_ID,
};
pub use validation::validate_watcher_request;
pub use watcher::{
    EventConfiguration, Watcher, WatcherDto, WatcherListItem, WatcherOrderBy, WatcherQuery,
    WatcherRequest, WatcherSnapshot,
};

/// Deserialize a value from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_request() {
        let yaml = r#"
name: prod-pod-evictions
eventConfiguration:
  selectors:
    - type: environment
      groupName: cluster-a
      names: [ns1, ns2]
  k8sResources:
    - group: ""
      version: v1
      kind: Pod
  selectedActions: [DELETE]
"#;
        let req: WatcherRequest = from_yaml(yaml).unwrap();
        assert_eq!(req.event_configuration.selectors[0].names, vec!["ns1", "ns2"]);
        assert!(req.triggers.is_empty());
        assert!(req.event_configuration.event_expression.is_empty());
    }
}
