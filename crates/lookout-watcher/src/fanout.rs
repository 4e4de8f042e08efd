use crate::error::Result;
use crate::locks::WatcherGuard;
use futures_util::future::join_all;
use lookout_agent::{AgentClient, AgentError, AgentRegistry, ClusterInfo};
use lookout_core::{EventAction, Selector, Watcher, WatcherSnapshot};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// A cluster a watcher is pushed to, with the selector governing it there
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTarget {
    pub cluster: ClusterInfo,
    pub selector: Selector,
}

/// Clusters derived from a selector list
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    /// Sorted by cluster id
    pub targets: Vec<ClusterTarget>,
    /// Selector cluster names the registry does not know
    pub unknown: Vec<String>,
}

/// Expand selectors into target clusters
///
/// An "all clusters" selector expands to every registered cluster. Otherwise
/// the named clusters are looked up in one call.
pub async fn expand_targets(
    registry: &dyn AgentRegistry,
    selectors: &[Selector],
) -> Result<TargetSet> {
    if let Some(all) = selectors.iter().find(|s| s.is_all_clusters()) {
        let mut targets: Vec<ClusterTarget> = registry
            .list_all_clusters()
            .await?
            .into_iter()
            .map(|cluster| ClusterTarget {
                cluster,
                selector: all.clone(),
            })
            .collect();
        targets.sort_by_key(|t| t.cluster.id);
        return Ok(TargetSet {
            targets,
            unknown: Vec::new(),
        });
    }

    let names: Vec<String> = selectors
        .iter()
        .map(|s| s.group_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if names.is_empty() {
        return Ok(TargetSet::default());
    }

    let clusters = registry.find_clusters_by_names(&names).await?;
    let by_name: BTreeMap<&str, &ClusterInfo> =
        clusters.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut set = TargetSet::default();
    for selector in selectors {
        match by_name.get(selector.group_name.as_str()) {
            Some(cluster) => set.targets.push(ClusterTarget {
                cluster: (*cluster).clone(),
                selector: selector.clone(),
            }),
            None => set.unknown.push(selector.group_name.clone()),
        }
    }
    set.targets.sort_by_key(|t| t.cluster.id);
    set.targets.dedup_by_key(|t| t.cluster.id);
    Ok(set)
}

/// One RPC of a broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct PushPlan {
    pub cluster_id: u64,
    pub action: EventAction,
    pub snapshot: WatcherSnapshot,
}

/// The same action to every target
pub fn plan_all(
    action: EventAction,
    watcher: &Watcher,
    targets: &[ClusterTarget],
    job_configured: bool,
) -> Vec<PushPlan> {
    targets
        .iter()
        .map(|t| PushPlan {
            cluster_id: t.cluster.id,
            action,
            snapshot: watcher.snapshot_for(t.cluster.id, &t.selector, job_configured),
        })
        .collect()
}

/// Plans for a replaced watcher
///
/// Clusters kept by the update get UPDATE, clusters it adds get ADD, and
/// clusters it drops get DELETE with the previous snapshot.
pub fn plan_update(
    previous: &Watcher,
    previous_targets: &[ClusterTarget],
    previous_job_configured: bool,
    current: &Watcher,
    current_targets: &[ClusterTarget],
    current_job_configured: bool,
) -> Vec<PushPlan> {
    let before: BTreeSet<u64> = previous_targets.iter().map(|t| t.cluster.id).collect();
    let after: BTreeSet<u64> = current_targets.iter().map(|t| t.cluster.id).collect();

    let mut plans: Vec<PushPlan> = current_targets
        .iter()
        .map(|t| PushPlan {
            cluster_id: t.cluster.id,
            action: if before.contains(&t.cluster.id) {
                EventAction::Update
            } else {
                EventAction::Add
            },
            snapshot: current.snapshot_for(t.cluster.id, &t.selector, current_job_configured),
        })
        .collect();

    plans.extend(
        previous_targets
            .iter()
            .filter(|t| !after.contains(&t.cluster.id))
            .map(|t| PushPlan {
                cluster_id: t.cluster.id,
                action: EventAction::Delete,
                snapshot: previous.snapshot_for(t.cluster.id, &t.selector, previous_job_configured),
            }),
    );
    plans.sort_by_key(|p| p.cluster_id);
    plans
}

#[derive(Debug)]
pub enum PushOutcome {
    Delivered,
    /// The cluster has no agent
    Skipped,
    Failed(AgentError),
}

#[derive(Debug)]
pub struct ClusterOutcome {
    pub cluster_id: u64,
    pub action: EventAction,
    pub outcome: PushOutcome,
}

/// Result of one fan-out, per cluster
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub watcher_id: u64,
    pub outcomes: Vec<ClusterOutcome>,
}

impl BroadcastReport {
    fn clusters(&self, pred: impl Fn(&PushOutcome) -> bool) -> Vec<u64> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.outcome))
            .map(|o| o.cluster_id)
            .collect()
    }

    pub fn delivered(&self) -> Vec<u64> {
        self.clusters(|o| matches!(o, PushOutcome::Delivered))
    }

    pub fn skipped(&self) -> Vec<u64> {
        self.clusters(|o| matches!(o, PushOutcome::Skipped))
    }

    pub fn failed(&self) -> Vec<u64> {
        self.clusters(|o| matches!(o, PushOutcome::Failed(_)))
    }
}

/// Pushes watcher snapshots to cluster agents
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    tasks: TaskTracker,
}

impl Broadcaster {
    pub fn new(registry: Arc<dyn AgentRegistry>, client: Arc<dyn AgentClient>) -> Self {
        Self {
            registry,
            client,
            tasks: TaskTracker::new(),
        }
    }

    /// Tracker of every task started by `spawn`
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    async fn push_one(&self, plan: PushPlan) -> ClusterOutcome {
        let PushPlan {
            cluster_id,
            action,
            snapshot,
        } = plan;

        let outcome = match self.registry.resolve_agent(cluster_id).await {
            Err(e) if e.is_not_configured() => PushOutcome::Skipped,
            Err(e) => PushOutcome::Failed(e),
            Ok(endpoint) => {
                match self
                    .client
                    .push_watcher_config(&endpoint, action, &snapshot)
                    .await
                {
                    Ok(()) => PushOutcome::Delivered,
                    Err(e) => PushOutcome::Failed(e),
                }
            }
        };

        ClusterOutcome {
            cluster_id,
            action,
            outcome,
        }
    }

    /// Deliver every plan; failures are collected, never returned
    pub async fn broadcast(&self, watcher_id: u64, mut plans: Vec<PushPlan>) -> BroadcastReport {
        plans.sort_by_key(|p| p.cluster_id);
        debug!(watcher_id, "Broadcasting to {} clusters", plans.len());

        let outcomes = join_all(plans.into_iter().map(|plan| self.push_one(plan))).await;

        for o in &outcomes {
            match &o.outcome {
                PushOutcome::Delivered => debug!(
                    watcher_id,
                    cluster_id = o.cluster_id,
                    action = %o.action,
                    "Agent updated"
                ),
                PushOutcome::Skipped => warn!(
                    watcher_id,
                    cluster_id = o.cluster_id,
                    action = %o.action,
                    "No agent configured, skipping cluster"
                ),
                PushOutcome::Failed(e) => error!(
                    watcher_id,
                    cluster_id = o.cluster_id,
                    action = %o.action,
                    "Agent push failed: {}",
                    e
                ),
            }
        }

        let report = BroadcastReport {
            watcher_id,
            outcomes,
        };
        info!(
            watcher_id,
            delivered = report.delivered().len(),
            skipped = report.skipped().len(),
            failed = report.failed().len(),
            "Broadcast finished"
        );
        report
    }

    /// Run a broadcast on its own task, holding the watcher's lock until done
    ///
    /// The task is not tied to the caller, so it completes even when the
    /// request that started it goes away.
    pub fn spawn(
        &self,
        guard: WatcherGuard,
        watcher_id: u64,
        plans: Vec<PushPlan>,
    ) -> JoinHandle<BroadcastReport> {
        let broadcaster = self.clone();
        self.tasks.spawn(async move {
            let report = broadcaster.broadcast(watcher_id, plans).await;
            drop(guard);
            report
        })
    }
}
