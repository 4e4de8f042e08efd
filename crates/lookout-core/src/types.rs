use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selector group name that stands for every registered cluster
pub const ALL_CLUSTERS_GROUP: &str = "__all__";

/// Namespace wildcard accepted in selector name lists
pub const ALL_NAMESPACES: &str = "*";

/// User id stamped on rows mutated without an authenticated caller
pub const SYSTEM_USER_ID: u64 = 1;

/// GroupVersionKind uniquely identifies a Kubernetes resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group (e.g., "", "apps", "batch")
    #[serde(default)]
    pub group: String,
    /// API version (e.g., "v1", "v1beta1")
    pub version: String,
    /// Resource kind (e.g., "Pod", "Deployment")
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a new GVK
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Get the apiVersion string (group/version or just version)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Kubernetes event action a watcher can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventAction {
    Add,
    Update,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Add => "ADD",
            EventAction::Update => "UPDATE",
            EventAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADD" => Ok(EventAction::Add),
            "UPDATE" => Ok(EventAction::Update),
            "DELETE" => Ok(EventAction::Delete),
            other => Err(format!("unknown event action '{}'", other)),
        }
    }
}

/// Kind of selector; only environment (cluster) selectors exist today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    Environment,
}

/// "In cluster X, watch namespaces Y" or "in all clusters"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(rename = "type")]
    pub selector_type: SelectorType,
    /// Cluster name, or `__all__`
    pub group_name: String,
    /// Namespaces; empty or containing `*` means every namespace
    #[serde(default)]
    pub names: Vec<String>,
}

impl Selector {
    pub fn cluster(group_name: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            selector_type: SelectorType::Environment,
            group_name: group_name.into(),
            names,
        }
    }

    pub fn all_clusters(names: Vec<String>) -> Self {
        Self::cluster(ALL_CLUSTERS_GROUP, names)
    }

    pub fn is_all_clusters(&self) -> bool {
        self.group_name == ALL_CLUSTERS_GROUP
    }

    /// Namespace list as sent to an agent; empty means all namespaces
    pub fn namespaces(&self) -> Vec<String> {
        if self.names.iter().any(|n| n == ALL_NAMESPACES) {
            return Vec::new();
        }
        self.names.clone()
    }
}

/// Audit columns shared by watcher and trigger rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
    pub updated_by: u64,
    pub updated_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(user: u64, now: DateTime<Utc>) -> Self {
        Self {
            created_by: user,
            created_at: now,
            updated_by: user,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, user: u64, now: DateTime<Utc>) {
        self.updated_by = user;
        self.updated_at = now;
    }
}

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Offset/size window over an ordered result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub size: usize,
}

impl PageRequest {
    pub const DEFAULT_SIZE: usize = 20;

    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Slice one page out of an already ordered list
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.size).collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            size: Self::DEFAULT_SIZE,
        }
    }
}

/// A page of results plus the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub offset: usize,
    pub size: usize,
    pub total: usize,
    pub list: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(page: PageRequest, total: usize, list: Vec<T>) -> Self {
        Self {
            offset: page.offset,
            size: page.size,
            total,
            list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvk_display() {
        let gvk = GroupVersionKind::new("apps", "v1", "Deployment");
        assert_eq!(gvk.api_version(), "apps/v1");
        assert_eq!(gvk.to_string(), "apps/v1/Deployment");

        let gvk = GroupVersionKind::new("", "v1", "Pod");
        assert_eq!(gvk.to_string(), "v1/Pod");
    }

    #[test]
    fn test_event_action_wire_format() {
        let json = serde_json::to_string(&vec![EventAction::Add, EventAction::Delete]).unwrap();
        assert_eq!(json, r#"["ADD","DELETE"]"#);
        assert_eq!("update".parse::<EventAction>().unwrap(), EventAction::Update);
        assert!("PATCH".parse::<EventAction>().is_err());
    }

    #[test]
    fn test_selector_namespaces() {
        let selector = Selector::cluster("cluster-a", vec!["ns1".into(), "ns2".into()]);
        assert_eq!(selector.namespaces(), vec!["ns1", "ns2"]);
        assert!(!selector.is_all_clusters());

        let wildcard = Selector::cluster("cluster-b", vec!["*".into()]);
        assert!(wildcard.namespaces().is_empty());

        assert!(Selector::all_clusters(vec![]).is_all_clusters());
    }

    #[test]
    fn test_selector_wire_format() {
        let selector: Selector = serde_json::from_str(
            r#"{"type":"environment","groupName":"__all__","names":["default"]}"#,
        )
        .unwrap();
        assert!(selector.is_all_clusters());
        assert_eq!(selector.selector_type, SelectorType::Environment);
    }

    #[test]
    fn test_page_request_apply() {
        let page = PageRequest::new(2, 2);
        assert_eq!(page.apply(vec![1, 2, 3, 4, 5]), vec![3, 4]);
        assert!(PageRequest::new(10, 5).apply(vec![1, 2]).is_empty());
    }
}
