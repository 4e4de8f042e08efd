use crate::error::Result;
use crate::executor::JobExecutor;
use lookout_agent::AgentRegistry;
use lookout_core::{
    ExecutionStatus, InterceptedEventDto, InterceptedEventExecution, InterceptedEventQuery,
    JobTriggerData, Page, SortOrder, Trigger, WatcherListItem, WatcherOrderBy, WatcherQuery,
};
use lookout_storage::{Store, WatcherFilter};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Read side: watcher list and intercepted-event browsing
#[derive(Clone)]
pub struct QueryApi {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    executor: Arc<dyn JobExecutor>,
}

impl QueryApi {
    pub fn new(
        store: Store,
        registry: Arc<dyn AgentRegistry>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            store,
            registry,
            executor,
        }
    }

    /// Watchers with their latest trigger and the last run of its pipeline
    pub async fn list_watchers(&self, query: &WatcherQuery) -> Result<Page<WatcherListItem>> {
        let filter = WatcherFilter {
            search: query.search.clone(),
        };

        // Trigger time is not a stored column: order by it in memory over
        // every match, then cut the page
        let repo = self.store.watchers();
        let (watchers, total) = match query.order_by {
            WatcherOrderBy::Name => repo.list(&filter, query.order, Some(query.page))?,
            WatcherOrderBy::TriggeredAt => repo.list(&filter, SortOrder::Asc, None)?,
        };

        let ids: Vec<u64> = watchers.iter().map(|w| w.id).collect();
        let mut latest: HashMap<u64, JobTriggerData> = HashMap::new();
        let mut triggers = self.store.triggers().list_by_watcher_ids(&ids)?;
        triggers.sort_by_key(|t| t.id);
        for trigger in triggers {
            latest.insert(trigger.watcher_id, trigger.job_data()?);
        }

        let pipeline_ids: Vec<u64> = latest
            .values()
            .map(|d| d.pipeline_id)
            .filter(|id| *id != 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let last_runs = if pipeline_ids.is_empty() {
            HashMap::new()
        } else {
            self.executor
                .last_triggered_at(&pipeline_ids)
                .await
                .unwrap_or_else(|e| {
                    warn!("Executor unavailable, omitting trigger times: {}", e);
                    HashMap::new()
                })
        };

        let mut items: Vec<WatcherListItem> = watchers
            .into_iter()
            .map(|w| {
                let data = latest.get(&w.id);
                WatcherListItem {
                    id: w.id,
                    name: w.name,
                    description: w.description,
                    triggered_at: data.and_then(|d| last_runs.get(&d.pipeline_id).copied()),
                    job_pipeline_name: data.map(|d| d.pipeline_name.clone()).unwrap_or_default(),
                    job_pipeline_id: data.map(|d| d.pipeline_id).unwrap_or(0),
                    workflow_id: data.map(|d| d.workflow_id).unwrap_or(0),
                    job_id: data.map(|d| d.job_id).unwrap_or(0),
                }
            })
            .collect();

        if query.order_by == WatcherOrderBy::TriggeredAt {
            items.sort_by(|a, b| {
                a.triggered_at
                    .cmp(&b.triggered_at)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                    .then(a.id.cmp(&b.id))
            });
            if query.order == SortOrder::Desc {
                items.reverse();
            }
            items = query.page.apply(items);
        }

        debug!("Listed {} of {} watchers", items.len(), total);
        Ok(Page::new(query.page, total, items))
    }

    pub async fn list_intercepted_events(
        &self,
        query: &InterceptedEventQuery,
    ) -> Result<Page<InterceptedEventDto>> {
        let (rows, total) = self.store.executions().list(query)?;
        let list = self.to_dtos(rows).await?;
        Ok(Page::new(query.page, total, list))
    }

    pub async fn get_intercepted_event(&self, id: u64) -> Result<InterceptedEventDto> {
        let row = self.store.executions().get_by_id(id)?;
        let mut dtos = self.to_dtos(vec![row]).await?;
        dtos.pop()
            .ok_or_else(|| crate::WatcherError::not_found("intercepted event", id))
    }

    /// Latest executor status for each run; empty when the executor is down
    async fn latest_statuses(
        &self,
        rows: &[InterceptedEventExecution],
    ) -> HashMap<u64, ExecutionStatus> {
        let run_ids: Vec<u64> = rows
            .iter()
            .map(|r| r.trigger_execution_id)
            .filter(|id| *id != 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if run_ids.is_empty() {
            return HashMap::new();
        }

        match self.executor.workflow_statuses(&run_ids).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!("Executor unavailable, returning persisted statuses: {}", e);
                HashMap::new()
            }
        }
    }

    async fn to_dtos(
        &self,
        rows: Vec<InterceptedEventExecution>,
    ) -> Result<Vec<InterceptedEventDto>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let trigger_ids: Vec<u64> = rows
            .iter()
            .map(|r| r.trigger_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let triggers: HashMap<u64, Trigger> = self
            .store
            .triggers()
            .get_by_ids(&trigger_ids)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let cluster_ids: Vec<u64> = rows
            .iter()
            .map(|r| r.cluster_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let cluster_names: HashMap<u64, String> = self
            .registry
            .find_clusters_by_ids(&cluster_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let statuses = self.latest_statuses(&rows).await;

        let mut dtos = Vec::with_capacity(rows.len());
        for row in rows {
            let trigger = match triggers.get(&row.trigger_id) {
                Some(t) => Some(t.to_dto()?),
                None => None,
            };
            let status = match statuses.get(&row.trigger_execution_id) {
                Some(latest) if row.trigger_execution_id != 0 => row.status.overlay(*latest),
                _ => row.status,
            };

            dtos.push(InterceptedEventDto {
                intercepted_event_id: row.id,
                action: row.action,
                involved_objects: row.involved_objects,
                metadata: row.metadata,
                cluster_name: cluster_names.get(&row.cluster_id).cloned().unwrap_or_default(),
                cluster_id: row.cluster_id,
                namespace: row.namespace,
                environment_name: trigger
                    .as_ref()
                    .map(|t| t.data.execution_environment.clone())
                    .unwrap_or_default(),
                watcher_name: row.watcher_name,
                intercepted_time: row.intercepted_at,
                execution_status: status,
                trigger_id: row.trigger_id,
                trigger_execution_id: row.trigger_execution_id,
                execution_message: row.execution_message,
                trigger,
            });
        }
        Ok(dtos)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use chrono::Duration;
    use lookout_core::{
        ClusterNamespace, EventAction, EventBatch, ExecutionStatus, ExecutionUpdate,
        InterceptedEventQuery, PageRequest, Selector, SortOrder, WatcherOrderBy, WatcherQuery,
        SYSTEM_USER_ID,
    };

    /// One evictions watcher and one ingested DELETE per namespace
    async fn ingested(h: &Harness, namespaces: &[&str]) -> u64 {
        let watcher = h.service.create(&evictions_request(), SYSTEM_USER_ID).await.unwrap();
        let trigger = h.store.triggers().list_by_watcher_ids(&[watcher]).unwrap()[0].id;
        let events = namespaces
            .iter()
            .enumerate()
            .map(|(i, ns)| event(EventAction::Delete, ns, i as i64, watcher, vec![trigger]))
            .collect();
        h.ingestor
            .ingest(CLUSTER_A, EventBatch { events })
            .await
            .unwrap();
        watcher
    }

    #[tokio::test]
    async fn test_executor_status_overlays_persisted() {
        let h = harness();
        ingested(&h, &["ns1"]).await;
        let run_id = h.executor.runs()[0].0;
        h.executor.set_status(run_id, ExecutionStatus::Success);

        let page = h
            .service
            .query()
            .list_intercepted_events(&InterceptedEventQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.list[0].execution_status, ExecutionStatus::Success);
        assert_eq!(page.list[0].trigger_execution_id, run_id);

        // Only the returned view changes
        let stored = h.store.executions().get_by_id(page.list[0].intercepted_event_id).unwrap();
        assert_eq!(stored.status, ExecutionStatus::Progressing);
    }

    #[tokio::test]
    async fn test_terminal_status_not_downgraded_by_overlay() {
        let h = harness();
        ingested(&h, &["ns1"]).await;
        let row = h.store.executions().get_by_id(1).unwrap();

        let mut tx = h.store.begin_tx().unwrap();
        h.store
            .executions()
            .update_progress(
                &mut tx,
                row.id,
                &ExecutionUpdate {
                    status: ExecutionStatus::Failure,
                    trigger_execution_id: None,
                    execution_message: Some("exit code 1".into()),
                },
            )
            .unwrap();
        tx.commit().unwrap();

        let dto = h.service.query().get_intercepted_event(row.id).await.unwrap();
        assert_eq!(dto.execution_status, ExecutionStatus::Failure);
        assert_eq!(dto.execution_message, "exit code 1");
    }

    #[tokio::test]
    async fn test_unreachable_executor_returns_persisted_status() {
        let h = harness();
        ingested(&h, &["ns1"]).await;
        h.executor.set_unreachable(true);

        let page = h
            .service
            .query()
            .list_intercepted_events(&InterceptedEventQuery::default())
            .await
            .unwrap();
        assert_eq!(page.list[0].execution_status, ExecutionStatus::Progressing);
    }

    #[tokio::test]
    async fn test_event_details() {
        let h = harness();
        ingested(&h, &["ns2"]).await;

        let dto = h.service.query().get_intercepted_event(1).await.unwrap();
        assert_eq!(dto.cluster_id, CLUSTER_A);
        assert_eq!(dto.cluster_name, "cluster-A");
        assert_eq!(dto.namespace, "ns2");
        assert_eq!(dto.environment_name, "dev");
        assert_eq!(dto.watcher_name, "prod-pod-evictions");
        assert_eq!(dto.intercepted_time, base_time());
        assert_eq!(dto.action, EventAction::Delete);
        let trigger = dto.trigger.unwrap();
        assert_eq!(trigger.data.pipeline_name, "p1");
        assert_eq!(trigger.id, dto.trigger_id);

        assert!(h
            .service
            .query()
            .get_intercepted_event(42)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_event_filters() {
        let h = harness();
        let watcher = ingested(&h, &["ns1", "ns2", "ns1"]).await;
        let query = h.service.query();

        let by_pair = InterceptedEventQuery {
            cluster_namespaces: vec![ClusterNamespace {
                cluster_id: CLUSTER_A,
                namespace: "ns2".into(),
            }],
            ..Default::default()
        };
        assert_eq!(query.list_intercepted_events(&by_pair).await.unwrap().total, 1);

        let other_cluster = InterceptedEventQuery {
            cluster_ids: vec![CLUSTER_B],
            ..Default::default()
        };
        assert_eq!(query.list_intercepted_events(&other_cluster).await.unwrap().total, 0);

        let window = InterceptedEventQuery {
            from: Some(base_time() + Duration::minutes(1)),
            to: Some(base_time() + Duration::minutes(2)),
            sort_order: SortOrder::Desc,
            ..Default::default()
        };
        let page = query.list_intercepted_events(&window).await.unwrap();
        let namespaces: Vec<&str> = page.list.iter().map(|e| e.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["ns1", "ns2"]);

        // History stays searchable by name after the watcher is gone
        h.service.delete(watcher, SYSTEM_USER_ID).await.unwrap();
        let by_name = InterceptedEventQuery {
            watcher_names: vec!["Prod-Pod-Evictions".into()],
            search_string: Some("evicted".into()),
            ..Default::default()
        };
        assert_eq!(query.list_intercepted_events(&by_name).await.unwrap().total, 3);

        let paged = InterceptedEventQuery {
            page: PageRequest::new(2, 2),
            ..Default::default()
        };
        let page = query.list_intercepted_events(&paged).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.list.len(), 1);
        assert_eq!(page.list[0].intercepted_event_id, 3);
    }

    #[tokio::test]
    async fn test_list_watchers_by_trigger_time() {
        let h = harness();
        let triggered = h.service.create(&evictions_request(), SYSTEM_USER_ID).await.unwrap();
        for name in ["alpha", "zulu"] {
            let req = request(
                name,
                vec![Selector::cluster("cluster-B", vec![])],
                vec![EventAction::Add],
            );
            h.service.create(&req, SYSTEM_USER_ID).await.unwrap();
        }
        h.executor.set_last_run(100, base_time());

        let mut query = WatcherQuery {
            order_by: WatcherOrderBy::TriggeredAt,
            order: SortOrder::Desc,
            ..Default::default()
        };
        let page = h.service.list(&query).await.unwrap();
        let names: Vec<&str> = page.list.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["prod-pod-evictions", "zulu", "alpha"]);
        assert_eq!(page.list[0].id, triggered);
        assert_eq!(page.list[0].triggered_at, Some(base_time()));
        assert_eq!(page.list[0].job_pipeline_name, "p1");
        assert_eq!(page.list[0].workflow_id, 1000);
        // Watchers without triggers are listed with empty trigger fields
        assert_eq!(page.list[1].job_id, 0);
        assert_eq!(page.list[1].triggered_at, None);

        query.order = SortOrder::Asc;
        query.page = PageRequest::new(1, 1);
        let page = h.service.list(&query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.list.len(), 1);
        assert_eq!(page.list[0].name, "zulu");
    }

    #[tokio::test]
    async fn test_list_watchers_survives_executor_outage() {
        let h = harness();
        h.service.create(&evictions_request(), SYSTEM_USER_ID).await.unwrap();
        h.executor.set_last_run(100, base_time());
        h.executor.set_unreachable(true);

        let page = h.service.list(&WatcherQuery::default()).await.unwrap();
        assert_eq!(page.list.len(), 1);
        assert_eq!(page.list[0].triggered_at, None);
        assert_eq!(page.list[0].job_pipeline_id, 100);
    }
}
