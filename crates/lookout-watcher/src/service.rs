use crate::catalog::CatalogLookup;
use crate::error::{Result, WatcherError};
use crate::executor::JobExecutor;
use crate::fanout::{
    expand_targets, plan_all, plan_update, BroadcastReport, Broadcaster, ClusterTarget, PushPlan,
};
use crate::locks::{WatcherGuard, WatcherLocks};
use crate::query::QueryApi;
use crate::resolver::ReferenceResolver;
use chrono::{DateTime, Utc};
use lookout_agent::{AgentClient, AgentRegistry};
use lookout_core::{
    validate_watcher_request, EventAction, JobTriggerData, Page, Selector, Trigger, Watcher,
    WatcherDto, WatcherListItem, WatcherQuery, WatcherRequest, WatcherSnapshot,
};
use lookout_storage::{Store, StoreTx};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Watcher CRUD and fan-out to cluster agents
///
/// Mutations of one watcher id are serialized: the id's lock is taken
/// before the transaction and released only when the broadcast of that
/// mutation is finished. The broadcast starts after the commit and runs on
/// its own task.
pub struct WatcherService {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    resolver: ReferenceResolver,
    broadcaster: Broadcaster,
    locks: WatcherLocks,
    query: QueryApi,
}

/// Roll back and hand the original error back
fn abort(tx: StoreTx, err: WatcherError) -> WatcherError {
    if let Err(e) = tx.rollback() {
        warn!("Rollback failed: {}", e);
    }
    err
}

impl WatcherService {
    pub fn new(
        store: Store,
        registry: Arc<dyn AgentRegistry>,
        client: Arc<dyn AgentClient>,
        catalog: Arc<dyn CatalogLookup>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            query: QueryApi::new(store.clone(), registry.clone(), executor),
            broadcaster: Broadcaster::new(registry.clone(), client),
            resolver: ReferenceResolver::new(catalog),
            locks: WatcherLocks::new(),
            registry,
            store,
        }
    }

    pub fn query(&self) -> &QueryApi {
        &self.query
    }

    /// Agent broadcasts still running or finished; wait on it before exit
    pub fn broadcast_tasks(&self) -> TaskTracker {
        self.broadcaster.tasks().clone()
    }

    /// Targets of a new selector list; unknown clusters are a validation error
    async fn new_targets(&self, selectors: &[Selector]) -> Result<Vec<ClusterTarget>> {
        let set = expand_targets(self.registry.as_ref(), selectors).await?;
        if !set.unknown.is_empty() {
            return Err(WatcherError::validation(format!(
                "unknown cluster(s): {}",
                set.unknown.join(", ")
            )));
        }
        Ok(set.targets)
    }

    /// Targets of a stored selector list; clusters removed since are skipped
    async fn stored_targets(&self, watcher: &Watcher) -> Result<Vec<ClusterTarget>> {
        let set = expand_targets(self.registry.as_ref(), &watcher.selectors).await?;
        for name in &set.unknown {
            warn!(watcher_id = watcher.id, "Selector names unregistered cluster '{}'", name);
        }
        Ok(set.targets)
    }

    fn has_triggers(&self, watcher_id: u64) -> Result<bool> {
        Ok(!self.store.triggers().list_by_watcher_ids(&[watcher_id])?.is_empty())
    }

    fn ensure_name_free(&self, tx: &StoreTx, name: &str, own_id: Option<u64>) -> Result<()> {
        match self.store.watchers().find_active_by_name(tx, name)? {
            Some(other) if Some(other.id) != own_id => Err(WatcherError::conflict(format!(
                "an active watcher named '{}' already exists",
                other.name
            ))),
            _ => Ok(()),
        }
    }

    fn save_triggers(
        &self,
        tx: &mut StoreTx,
        watcher_id: u64,
        resolved: &[JobTriggerData],
        user: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let rows = resolved
            .iter()
            .map(|data| Trigger::new_job(watcher_id, data, user, now))
            .collect::<lookout_core::Result<Vec<_>>>()?;
        self.store.triggers().save_bulk(tx, rows)?;
        Ok(())
    }

    /// Broadcast on a detached task and wait for it
    async fn finish_broadcast(
        &self,
        guard: WatcherGuard,
        watcher_id: u64,
        plans: Vec<PushPlan>,
    ) -> Option<BroadcastReport> {
        match self.broadcaster.spawn(guard, watcher_id, plans).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(watcher_id, "Broadcast task failed: {}", e);
                None
            }
        }
    }

    pub async fn create(&self, req: &WatcherRequest, user: u64) -> Result<u64> {
        validate_watcher_request(req)?;
        let targets = self.new_targets(&req.event_configuration.selectors).await?;
        let resolved = self.resolver.resolve(&req.triggers).await?;
        let now = Utc::now();

        let mut tx = self.store.begin_tx()?;
        let inserted = self.ensure_name_free(&tx, &req.name, None).and_then(|_| {
            let watcher = self
                .store
                .watchers()
                .save(&mut tx, Watcher::from_request(req, user, now))?;
            self.save_triggers(&mut tx, watcher.id, &resolved, user, now)?;
            Ok(watcher)
        });
        let mut watcher = match inserted {
            Ok(w) => w,
            Err(e) => return Err(abort(tx, e)),
        };
        let id = watcher.id;

        // Nobody else knows the id yet, so the lock is normally free
        let guard = self.locks.try_acquire(id);
        tx.commit()?;
        info!(watcher_id = id, "Created watcher '{}'", watcher.name);

        let mut targets = targets;
        let mut job_configured = !resolved.is_empty();
        let guard = match guard {
            Some(guard) => guard,
            None => {
                let guard = self.locks.acquire(id).await;
                // Someone touched the id in between; push what is stored now
                let Ok(current) = self.store.watchers().get_by_id(id) else {
                    return Ok(id);
                };
                match (self.stored_targets(&current).await, self.has_triggers(id)) {
                    (Ok(t), Ok(j)) => {
                        targets = t;
                        job_configured = j;
                        watcher = current;
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        error!(watcher_id = id, "Skipping broadcast of new watcher: {}", e);
                        return Ok(id);
                    }
                }
                guard
            }
        };

        let plans = plan_all(EventAction::Add, &watcher, &targets, job_configured);
        self.finish_broadcast(guard, id, plans).await;
        Ok(id)
    }

    pub async fn get(&self, id: u64) -> Result<WatcherDto> {
        let watcher = self.store.watchers().get_by_id(id)?;
        let triggers = self
            .store
            .triggers()
            .list_by_watcher_ids(&[id])?
            .iter()
            .map(Trigger::to_dto)
            .collect::<lookout_core::Result<Vec<_>>>()?;

        Ok(WatcherDto {
            id: watcher.id,
            name: watcher.name.clone(),
            description: watcher.description.clone(),
            event_configuration: watcher.event_configuration(),
            triggers,
        })
    }

    /// Replace a watcher and its whole trigger set
    pub async fn update(&self, id: u64, req: &WatcherRequest, user: u64) -> Result<()> {
        validate_watcher_request(req)?;
        let guard = self.locks.acquire(id).await;

        let previous = self.store.watchers().get_by_id(id)?;
        let previous_job_configured = self.has_triggers(id)?;
        let previous_targets = self.stored_targets(&previous).await?;
        let current_targets = self.new_targets(&req.event_configuration.selectors).await?;
        let resolved = self.resolver.resolve(&req.triggers).await?;
        let now = Utc::now();

        let mut tx = self.store.begin_tx()?;
        let replaced = self.ensure_name_free(&tx, &req.name, Some(id)).and_then(|_| {
            let mut watcher = self.store.watchers().get_for_update(&tx, id)?;
            watcher.apply_request(req, user, now);
            self.store.watchers().update(&mut tx, &watcher)?;
            self.store
                .triggers()
                .deactivate_by_watcher_id(&mut tx, id, user, now)?;
            self.save_triggers(&mut tx, id, &resolved, user, now)?;
            Ok(watcher)
        });
        let current = match replaced {
            Ok(w) => w,
            Err(e) => return Err(abort(tx, e)),
        };
        tx.commit()?;
        info!(watcher_id = id, "Updated watcher '{}'", current.name);

        let plans = plan_update(
            &previous,
            &previous_targets,
            previous_job_configured,
            &current,
            &current_targets,
            !resolved.is_empty(),
        );
        self.finish_broadcast(guard, id, plans).await;
        Ok(())
    }

    /// Logically delete a watcher and its triggers
    pub async fn delete(&self, id: u64, user: u64) -> Result<()> {
        let guard = self.locks.acquire(id).await;

        let watcher = self.store.watchers().get_by_id(id)?;
        let job_configured = self.has_triggers(id)?;
        let targets = self.stored_targets(&watcher).await?;
        let now = Utc::now();

        let mut tx = self.store.begin_tx()?;
        let deleted = self
            .store
            .watchers()
            .deactivate_by_id(&mut tx, id, user, now)
            .map_err(WatcherError::from)
            .and_then(|changed| {
                if changed == 0 {
                    return Err(WatcherError::not_found("k8s_event_watcher", id));
                }
                self.store
                    .triggers()
                    .deactivate_by_watcher_id(&mut tx, id, user, now)?;
                Ok(())
            });
        if let Err(e) = deleted {
            return Err(abort(tx, e));
        }
        tx.commit()?;
        info!(watcher_id = id, "Deleted watcher '{}'", watcher.name);

        let plans = plan_all(EventAction::Delete, &watcher, &targets, job_configured);
        self.finish_broadcast(guard, id, plans).await;
        Ok(())
    }

    pub async fn list(&self, query: &WatcherQuery) -> Result<Page<WatcherListItem>> {
        self.query.list_watchers(query).await
    }

    /// Every active watcher targeting a cluster, as that cluster's agent sees it
    pub async fn get_for_cluster(&self, cluster_id: u64) -> Result<Vec<WatcherSnapshot>> {
        let cluster = self
            .registry
            .find_clusters_by_ids(&[cluster_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WatcherError::not_found("cluster", cluster_id))?;

        let watchers = self.store.watchers().list_active()?;
        let ids: Vec<u64> = watchers.iter().map(|w| w.id).collect();
        let with_triggers: HashSet<u64> = self
            .store
            .triggers()
            .list_by_watcher_ids(&ids)?
            .iter()
            .map(|t| t.watcher_id)
            .collect();

        Ok(watchers
            .iter()
            .filter_map(|w| {
                w.selector_for_cluster(&cluster.name)
                    .map(|s| w.snapshot_for(cluster.id, s, with_triggers.contains(&w.id)))
            })
            .collect())
    }
}
