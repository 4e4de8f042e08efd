use crate::trigger::{TriggerDto, TriggerRequest};
use crate::types::{AuditLog, EventAction, GroupVersionKind, PageRequest, Selector, SortOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a watcher observes and where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfiguration {
    pub selectors: Vec<Selector>,
    pub k8s_resources: Vec<GroupVersionKind>,
    #[serde(default)]
    pub event_expression: String,
    pub selected_actions: Vec<EventAction>,
}

/// Create/replace payload for a watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub event_configuration: EventConfiguration,
    #[serde(default)]
    pub triggers: Vec<TriggerRequest>,
}

/// Persisted watcher row (`k8s_event_watcher`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watcher {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub gvks: Vec<GroupVersionKind>,
    pub selected_actions: Vec<EventAction>,
    pub selectors: Vec<Selector>,
    pub event_filter_expression: String,
    pub active: bool,
    pub audit: AuditLog,
}

impl Watcher {
    /// Build an unsaved row from a request; the store assigns the id
    pub fn from_request(req: &WatcherRequest, user: u64, now: DateTime<Utc>) -> Self {
        let config = &req.event_configuration;
        Self {
            id: 0,
            name: req.name.clone(),
            description: req.description.clone(),
            gvks: config.k8s_resources.clone(),
            selected_actions: config.selected_actions.clone(),
            selectors: config.selectors.clone(),
            event_filter_expression: config.event_expression.clone(),
            active: true,
            audit: AuditLog::new(user, now),
        }
    }

    /// Overwrite the mutable columns from a replace request
    pub fn apply_request(&mut self, req: &WatcherRequest, user: u64, now: DateTime<Utc>) {
        let config = &req.event_configuration;
        self.name = req.name.clone();
        self.description = req.description.clone();
        self.gvks = config.k8s_resources.clone();
        self.selected_actions = config.selected_actions.clone();
        self.selectors = config.selectors.clone();
        self.event_filter_expression = config.event_expression.clone();
        self.audit.touch(user, now);
    }

    pub fn event_configuration(&self) -> EventConfiguration {
        EventConfiguration {
            selectors: self.selectors.clone(),
            k8s_resources: self.gvks.clone(),
            event_expression: self.event_filter_expression.clone(),
            selected_actions: self.selected_actions.clone(),
        }
    }

    /// Selector governing `cluster_name`, if the watcher targets it
    pub fn selector_for_cluster(&self, cluster_name: &str) -> Option<&Selector> {
        self.selectors
            .iter()
            .find(|s| s.is_all_clusters() || s.group_name == cluster_name)
    }

    pub fn watches_action(&self, action: EventAction) -> bool {
        self.selected_actions.contains(&action)
    }

    /// Per-cluster configuration pushed to that cluster's agent
    pub fn snapshot_for(
        &self,
        cluster_id: u64,
        selector: &Selector,
        job_configured: bool,
    ) -> WatcherSnapshot {
        WatcherSnapshot {
            id: self.id,
            name: self.name.clone(),
            gvks: self.gvks.clone(),
            event_filter_expression: self.event_filter_expression.clone(),
            selected_actions: self.selected_actions.clone(),
            namespaces: selector.namespaces(),
            job_configured,
            cluster_id,
        }
    }
}

/// Watcher as returned by `get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherDto {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub event_configuration: EventConfiguration,
    pub triggers: Vec<TriggerDto>,
}

/// Self-contained watcher configuration for one cluster's agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherSnapshot {
    pub id: u64,
    pub name: String,
    pub gvks: Vec<GroupVersionKind>,
    pub event_filter_expression: String,
    pub selected_actions: Vec<EventAction>,
    /// Namespaces this cluster should watch; empty means all
    pub namespaces: Vec<String>,
    pub job_configured: bool,
    pub cluster_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatcherOrderBy {
    #[default]
    Name,
    TriggeredAt,
}

impl FromStr for WatcherOrderBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(WatcherOrderBy::Name),
            "triggeredAt" => Ok(WatcherOrderBy::TriggeredAt),
            other => Err(format!("unknown orderBy '{}'", other)),
        }
    }
}

/// Parameters of the watcher list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherQuery {
    /// Case-insensitive substring of the watcher name
    pub search: Option<String>,
    pub order_by: WatcherOrderBy,
    pub order: SortOrder,
    pub page: PageRequest,
}

/// One row of the watcher list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherListItem {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub triggered_at: Option<DateTime<Utc>>,
    pub job_pipeline_name: String,
    pub job_pipeline_id: u64,
    pub workflow_id: u64,
    pub job_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WatcherRequest {
        WatcherRequest {
            name: "prod-pod-evictions".to_string(),
            description: "evictions".to_string(),
            event_configuration: EventConfiguration {
                selectors: vec![
                    Selector::cluster("cluster-a", vec!["ns1".into()]),
                    Selector::cluster("cluster-b", vec!["*".into()]),
                ],
                k8s_resources: vec![GroupVersionKind::new("", "v1", "Pod")],
                event_expression: String::new(),
                selected_actions: vec![EventAction::Delete],
            },
            triggers: vec![],
        }
    }

    #[test]
    fn test_row_reflects_request() {
        let watcher = Watcher::from_request(&request(), 3, Utc::now());
        assert_eq!(watcher.id, 0);
        assert!(watcher.active);
        assert_eq!(watcher.audit.created_by, 3);
        assert_eq!(watcher.event_configuration(), request().event_configuration);
    }

    #[test]
    fn test_selector_for_cluster() {
        let watcher = Watcher::from_request(&request(), 1, Utc::now());
        assert_eq!(
            watcher.selector_for_cluster("cluster-a").unwrap().names,
            vec!["ns1"]
        );
        assert!(watcher.selector_for_cluster("cluster-c").is_none());
    }

    #[test]
    fn test_snapshot_restricts_namespaces() {
        let mut watcher = Watcher::from_request(&request(), 1, Utc::now());
        watcher.id = 9;
        let selector = watcher.selector_for_cluster("cluster-b").unwrap().clone();

        let snapshot = watcher.snapshot_for(2, &selector, true);
        assert_eq!(snapshot.id, 9);
        assert_eq!(snapshot.cluster_id, 2);
        assert!(snapshot.namespaces.is_empty());
        assert!(snapshot.job_configured);
    }

    #[test]
    fn test_apply_request_touches_audit() {
        let created = Utc::now();
        let mut watcher = Watcher::from_request(&request(), 1, created);
        let mut req = request();
        req.description = "changed".to_string();

        watcher.apply_request(&req, 2, created + chrono::Duration::seconds(5));
        assert_eq!(watcher.description, "changed");
        assert_eq!(watcher.audit.created_by, 1);
        assert_eq!(watcher.audit.updated_by, 2);
        assert!(watcher.audit.updated_at > watcher.audit.created_at);
    }
}
