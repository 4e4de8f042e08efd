use crate::error::{CoreError, Result};
use crate::trigger::TriggerDto;
use crate::types::{EventAction, PageRequest, SortOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution status of a fired trigger
///
/// Progressing is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Progressing,
    Success,
    Failure,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Progressing => "Progressing",
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Failure => "Failure",
            ExecutionStatus::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Progressing)
    }

    /// Check a persisted transition; re-writing the same status is allowed
    pub fn transition_to(self, next: ExecutionStatus) -> Result<ExecutionStatus> {
        if self.is_terminal() && next != self {
            return Err(CoreError::invalid_status_transition(self.as_str(), next.as_str()));
        }
        Ok(next)
    }

    /// Merge the executor's latest status over the persisted one
    pub fn overlay(self, latest: ExecutionStatus) -> ExecutionStatus {
        if self.is_terminal() && !latest.is_terminal() {
            self
        } else {
            latest
        }
    }

    /// Map a CI workflow status string onto an execution status
    pub fn from_workflow_status(status: &str) -> Option<ExecutionStatus> {
        match status.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "starting" | "running" | "pending" | "queued" | "initiating" | "progressing" => {
                Some(ExecutionStatus::Progressing)
            }
            "succeeded" | "success" | "healthy" => Some(ExecutionStatus::Success),
            "failed" | "failure" | "aborted" | "cancelled" => Some(ExecutionStatus::Failure),
            "error" | "degraded" | "timedout" => Some(ExecutionStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "Progressing" => Ok(ExecutionStatus::Progressing),
            "Success" => Ok(ExecutionStatus::Success),
            "Failure" => Ok(ExecutionStatus::Failure),
            "Error" => Ok(ExecutionStatus::Error),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

/// Persisted execution row (`intercepted_event_execution`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedEventExecution {
    pub id: u64,
    pub cluster_id: u64,
    pub namespace: String,
    pub action: EventAction,
    pub involved_objects: serde_json::Value,
    pub metadata: serde_json::Value,
    pub intercepted_at: DateTime<Utc>,
    pub watcher_id: u64,
    pub watcher_name: String,
    pub trigger_id: u64,
    pub trigger_execution_id: u64,
    pub status: ExecutionStatus,
    pub execution_message: String,
}

/// The mutable part of an execution row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub trigger_execution_id: Option<u64>,
    pub execution_message: Option<String>,
}

impl ExecutionUpdate {
    pub fn accepted(trigger_execution_id: u64) -> Self {
        Self {
            status: ExecutionStatus::Progressing,
            trigger_execution_id: Some(trigger_execution_id),
            execution_message: None,
        }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            trigger_execution_id: None,
            execution_message: Some(message.into()),
        }
    }
}

/// Watcher an agent matched, with the triggers it decided to fire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedWatcher {
    pub watcher_id: u64,
    #[serde(default)]
    pub trigger_ids: Vec<u64>,
}

/// One event captured by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedEvent {
    pub action: EventAction,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub involved_objects: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Stamped by the agent
    pub intercepted_at: DateTime<Utc>,
    #[serde(default)]
    pub watchers: Vec<MatchedWatcher>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<InterceptedEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub index: usize,
    pub message: String,
}

/// Outcome of ingesting one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Execution rows persisted
    pub accepted: usize,
    /// Indexes of events dropped by policy
    pub dropped: Vec<usize>,
    pub failed: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A `(cluster, namespace)` filter pair, `<clusterId>_<namespace>` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterNamespace {
    pub cluster_id: u64,
    pub namespace: String,
}

impl FromStr for ClusterNamespace {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (cluster, namespace) = s
            .split_once('_')
            .ok_or_else(|| format!("expected <clusterId>_<namespace>, got '{}'", s))?;
        let cluster_id = cluster
            .parse()
            .map_err(|_| format!("invalid cluster id in '{}'", s))?;
        Ok(Self {
            cluster_id,
            namespace: namespace.to_string(),
        })
    }
}

/// Filters of the intercepted-event list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterceptedEventQuery {
    pub page: PageRequest,
    pub sort_order: SortOrder,
    /// Case-insensitive substring of the metadata JSON
    pub search_string: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cluster_ids: Vec<u64>,
    pub cluster_namespaces: Vec<ClusterNamespace>,
    pub watcher_names: Vec<String>,
    pub statuses: Vec<ExecutionStatus>,
    pub actions: Vec<EventAction>,
}

impl InterceptedEventQuery {
    pub fn matches(&self, row: &InterceptedEventExecution) -> bool {
        if let Some(from) = self.from {
            if row.intercepted_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if row.intercepted_at > to {
                return false;
            }
        }

        let located = (self.cluster_ids.is_empty() && self.cluster_namespaces.is_empty())
            || self.cluster_ids.contains(&row.cluster_id)
            || self
                .cluster_namespaces
                .iter()
                .any(|p| p.cluster_id == row.cluster_id && p.namespace == row.namespace);
        if !located {
            return false;
        }

        if !self.watcher_names.is_empty()
            && !self
                .watcher_names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&row.watcher_name))
        {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&row.status) {
            return false;
        }
        if !self.actions.is_empty() && !self.actions.contains(&row.action) {
            return false;
        }

        match self.search_string.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => row
                .metadata
                .to_string()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

/// Intercepted event as returned by the query API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedEventDto {
    pub intercepted_event_id: u64,
    pub action: EventAction,
    pub involved_objects: serde_json::Value,
    pub metadata: serde_json::Value,
    pub cluster_id: u64,
    pub cluster_name: String,
    pub namespace: String,
    pub environment_name: String,
    pub watcher_name: String,
    pub intercepted_time: DateTime<Utc>,
    pub execution_status: ExecutionStatus,
    pub trigger_id: u64,
    pub trigger_execution_id: u64,
    pub execution_message: String,
    pub trigger: Option<TriggerDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> InterceptedEventExecution {
        InterceptedEventExecution {
            id: 1,
            cluster_id: 2,
            namespace: "ns1".to_string(),
            action: EventAction::Delete,
            involved_objects: json!({"kind": "Pod", "name": "web-0"}),
            metadata: json!({"message": "Evicted: node pressure"}),
            intercepted_at: "2026-01-02T03:04:05Z".parse().unwrap(),
            watcher_id: 4,
            watcher_name: "prod-pod-evictions".to_string(),
            trigger_id: 5,
            trigger_execution_id: 0,
            status: ExecutionStatus::Progressing,
            execution_message: String::new(),
        }
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use ExecutionStatus::*;
        assert_eq!(Progressing.transition_to(Success).unwrap(), Success);
        assert_eq!(Progressing.transition_to(Progressing).unwrap(), Progressing);
        assert_eq!(Failure.transition_to(Failure).unwrap(), Failure);
        assert!(matches!(
            Failure.transition_to(Error),
            Err(CoreError::InvalidStatusTransition { .. })
        ));
        assert!(Success.transition_to(Failure).is_err());
        assert!(Success.transition_to(Progressing).is_err());
        assert!(Error.transition_to(Progressing).is_err());
    }

    #[test]
    fn test_overlay_never_regresses_terminal() {
        use ExecutionStatus::*;
        assert_eq!(Progressing.overlay(Success), Success);
        assert_eq!(Success.overlay(Progressing), Success);
        assert_eq!(Success.overlay(Failure), Failure);
        assert_eq!(Progressing.overlay(Progressing), Progressing);
    }

    #[test]
    fn test_workflow_status_mapping() {
        assert_eq!(
            ExecutionStatus::from_workflow_status("Succeeded"),
            Some(ExecutionStatus::Success)
        );
        assert_eq!(
            ExecutionStatus::from_workflow_status("CANCELLED"),
            Some(ExecutionStatus::Failure)
        );
        assert_eq!(
            ExecutionStatus::from_workflow_status("Running"),
            Some(ExecutionStatus::Progressing)
        );
        assert_eq!(ExecutionStatus::from_workflow_status(""), None);
    }

    #[test]
    fn test_cluster_namespace_parse() {
        let pair: ClusterNamespace = "12_kube-system".parse().unwrap();
        assert_eq!(pair.cluster_id, 12);
        assert_eq!(pair.namespace, "kube-system");
        assert!("nope".parse::<ClusterNamespace>().is_err());
        assert!("x_ns".parse::<ClusterNamespace>().is_err());
    }

    #[test]
    fn test_query_location_filter() {
        let mut query = InterceptedEventQuery::default();
        assert!(query.matches(&row()));

        query.cluster_ids = vec![9];
        assert!(!query.matches(&row()));

        query.cluster_namespaces = vec!["2_ns1".parse().unwrap()];
        assert!(query.matches(&row()));

        query.cluster_namespaces = vec!["2_other".parse().unwrap()];
        assert!(!query.matches(&row()));
    }

    #[test]
    fn test_query_search_and_window() {
        let mut query = InterceptedEventQuery {
            search_string: Some("EVICTED".to_string()),
            ..Default::default()
        };
        assert!(query.matches(&row()));

        query.search_string = Some("oomkilled".to_string());
        assert!(!query.matches(&row()));

        query.search_string = None;
        query.from = Some("2026-01-03T00:00:00Z".parse().unwrap());
        assert!(!query.matches(&row()));
    }

    #[test]
    fn test_query_watcher_name_is_case_insensitive() {
        let query = InterceptedEventQuery {
            watcher_names: vec!["PROD-POD-EVICTIONS".to_string()],
            actions: vec![EventAction::Delete],
            statuses: vec![ExecutionStatus::Progressing],
            ..Default::default()
        };
        assert!(query.matches(&row()));
    }
}
