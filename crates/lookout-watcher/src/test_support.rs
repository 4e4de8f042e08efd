use crate::catalog::{CatalogConfig, EnvironmentRef, JobRef, PipelineRef, StaticCatalog};
use crate::executor::InMemoryJobExecutor;
use crate::ingest::EventIngestor;
use crate::notifier::BroadcastNotifier;
use crate::service::WatcherService;
use chrono::{DateTime, Duration, Utc};
use lookout_agent::{AgentConfig, ClusterConfig, MockAgentClient, StaticAgentRegistry};
use lookout_core::{
    EventAction, EventConfiguration, GroupVersionKind, InterceptedEvent, JobTriggerData,
    MatchedWatcher, Selector, TriggerRequest, TriggerType, WatcherRequest,
};
use lookout_storage::Store;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

pub const CLUSTER_A: u64 = 1;
pub const CLUSTER_B: u64 = 2;
/// Registered but without an agent
pub const CLUSTER_C: u64 = 3;

pub struct Harness {
    _dir: TempDir,
    pub store: Store,
    pub agents: Arc<MockAgentClient>,
    pub executor: Arc<InMemoryJobExecutor>,
    pub notifier: Arc<BroadcastNotifier>,
    pub service: WatcherService,
    pub ingestor: EventIngestor,
}

fn cluster(id: u64, name: &str, agent: bool) -> ClusterConfig {
    ClusterConfig {
        id,
        name: name.to_string(),
        agent: agent.then(|| AgentConfig {
            url: format!("http://scoop-{}:8080", id),
            pass_key: format!("key-{}", id),
        }),
    }
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("lookout.redb")).unwrap();

    let registry = Arc::new(
        StaticAgentRegistry::new(vec![
            cluster(CLUSTER_A, "cluster-A", true),
            cluster(CLUSTER_B, "cluster-B", true),
            cluster(CLUSTER_C, "cluster-C", false),
        ])
        .unwrap(),
    );
    let catalog = Arc::new(
        StaticCatalog::new(CatalogConfig {
            jobs: vec![JobRef { id: 10, name: "notify".into() }],
            pipelines: vec![PipelineRef {
                id: 100,
                job_id: 10,
                name: "p1".into(),
                workflow_id: 1000,
            }],
            environments: vec![EnvironmentRef { id: 5, name: "dev".into() }],
        })
        .unwrap(),
    );
    let agents = Arc::new(MockAgentClient::new());
    let executor = Arc::new(InMemoryJobExecutor::new());
    let notifier = Arc::new(BroadcastNotifier::default());

    let service = WatcherService::new(
        store.clone(),
        registry,
        agents.clone(),
        catalog,
        executor.clone(),
    );
    let ingestor = EventIngestor::new(store.clone(), executor.clone(), notifier.clone());

    Harness {
        _dir: dir,
        store,
        agents,
        executor,
        notifier,
        service,
        ingestor,
    }
}

pub fn job_trigger(job: &str, pipeline: &str, env: &str) -> TriggerRequest {
    TriggerRequest {
        identifier_type: TriggerType::DevtronJob,
        data: JobTriggerData::new(job, pipeline, env),
    }
}

pub fn request(name: &str, selectors: Vec<Selector>, actions: Vec<EventAction>) -> WatcherRequest {
    WatcherRequest {
        name: name.to_string(),
        description: String::new(),
        event_configuration: EventConfiguration {
            selectors,
            k8s_resources: vec![GroupVersionKind::new("", "v1", "Pod")],
            event_expression: String::new(),
            selected_actions: actions,
        },
        triggers: vec![],
    }
}

/// The watcher of the pod-eviction walkthrough
pub fn evictions_request() -> WatcherRequest {
    let mut req = request(
        "prod-pod-evictions",
        vec![Selector::cluster("cluster-A", vec!["ns1".into(), "ns2".into()])],
        vec![EventAction::Delete],
    );
    req.description = "Pods evicted in prod".to_string();
    req.triggers = vec![job_trigger("notify", "p1", "dev")];
    req
}

pub fn base_time() -> DateTime<Utc> {
    "2026-03-01T12:00:00Z".parse().unwrap()
}

pub fn event(
    action: EventAction,
    namespace: &str,
    minutes: i64,
    watcher_id: u64,
    trigger_ids: Vec<u64>,
) -> InterceptedEvent {
    InterceptedEvent {
        action,
        namespace: namespace.to_string(),
        involved_objects: json!({"kind": "Pod", "name": "web-0"}),
        metadata: json!({"reason": "Evicted", "message": "The node was low on memory"}),
        intercepted_at: base_time() + Duration::minutes(minutes),
        watchers: vec![MatchedWatcher {
            watcher_id,
            trigger_ids,
        }],
    }
}
