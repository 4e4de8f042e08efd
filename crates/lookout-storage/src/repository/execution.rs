use crate::encoding::Table;
use crate::store::{get_record, scan_records, StoreTx};
use crate::{KVStore, Result, StorageError};
use lookout_core::{
    ExecutionUpdate, InterceptedEventExecution, InterceptedEventQuery, SortOrder, Trigger,
};
use std::sync::Arc;
use tracing::debug;

/// Repository over `intercepted_event_execution` rows
pub struct ExecutionRepository {
    kv: Arc<dyn KVStore>,
}

fn not_found(id: u64) -> StorageError {
    StorageError::row_not_found(Table::Execution, id)
}

impl ExecutionRepository {
    pub(crate) fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    /// Insert executions, assigning ids
    ///
    /// Each row must name a trigger that exists, active or not.
    pub fn save_bulk(
        &self,
        tx: &mut StoreTx,
        executions: Vec<InterceptedEventExecution>,
    ) -> Result<Vec<InterceptedEventExecution>> {
        let mut saved = Vec::with_capacity(executions.len());

        for mut execution in executions {
            if execution.trigger_id == 0
                || tx
                    .get_record::<Trigger>(Table::Trigger, execution.trigger_id)?
                    .is_none()
            {
                return Err(StorageError::conflict(format!(
                    "execution references unknown trigger {}",
                    execution.trigger_id
                )));
            }

            execution.id = tx.next_id(Table::Execution)?;
            tx.put_record(Table::Execution, execution.id, &execution)?;
            saved.push(execution);
        }

        debug!("Saved {} executions", saved.len());
        Ok(saved)
    }

    pub fn get_by_id(&self, id: u64) -> Result<InterceptedEventExecution> {
        get_record(self.kv.as_ref(), Table::Execution, id)?.ok_or_else(|| not_found(id))
    }

    /// Executions matching `query`, ordered by interception time, with the
    /// total number of matches
    pub fn list(
        &self,
        query: &InterceptedEventQuery,
    ) -> Result<(Vec<InterceptedEventExecution>, usize)> {
        let mut rows: Vec<InterceptedEventExecution> =
            scan_records::<InterceptedEventExecution>(self.kv.as_ref(), Table::Execution)?
                .into_iter()
                .filter(|row| query.matches(row))
                .collect();

        rows.sort_by(|a, b| {
            a.intercepted_at
                .cmp(&b.intercepted_at)
                .then(a.id.cmp(&b.id))
        });
        if query.sort_order == SortOrder::Desc {
            rows.reverse();
        }

        let total = rows.len();
        Ok((query.page.apply(rows), total))
    }

    /// Record execution progress; the only permitted mutation of a row
    pub fn update_progress(
        &self,
        tx: &mut StoreTx,
        id: u64,
        update: &ExecutionUpdate,
    ) -> Result<InterceptedEventExecution> {
        let mut execution = tx
            .get_record::<InterceptedEventExecution>(Table::Execution, id)?
            .ok_or_else(|| not_found(id))?;

        execution.status = execution
            .status
            .transition_to(update.status)
            .map_err(|e| StorageError::conflict(format!("execution {}: {}", id, e)))?;
        if let Some(trigger_execution_id) = update.trigger_execution_id {
            execution.trigger_execution_id = trigger_execution_id;
        }
        if let Some(message) = &update.execution_message {
            execution.execution_message = message.clone();
        }

        tx.put_record(Table::Execution, id, &execution)?;
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Store, StorageError};
    use chrono::{DateTime, Duration, Utc};
    use lookout_core::{
        EventAction, EventConfiguration, ExecutionStatus, ExecutionUpdate, GroupVersionKind,
        InterceptedEventExecution, InterceptedEventQuery, JobTriggerData, PageRequest, Selector,
        SortOrder, Trigger, Watcher, WatcherRequest,
    };
    use serde_json::json;
    use tempfile::tempdir;

    fn base_time() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn execution(trigger_id: u64, minutes: i64, action: EventAction) -> InterceptedEventExecution {
        InterceptedEventExecution {
            id: 0,
            cluster_id: 1,
            namespace: "ns1".to_string(),
            action,
            involved_objects: json!({"kind": "Pod"}),
            metadata: json!({"message": format!("event at +{}m", minutes)}),
            intercepted_at: base_time() + Duration::minutes(minutes),
            watcher_id: 1,
            watcher_name: "w".to_string(),
            trigger_id,
            trigger_execution_id: 0,
            status: ExecutionStatus::Progressing,
            execution_message: String::new(),
        }
    }

    fn seeded_store() -> (tempfile::TempDir, Store, u64) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.redb")).unwrap();
        let req = WatcherRequest {
            name: "w".to_string(),
            description: String::new(),
            event_configuration: EventConfiguration {
                selectors: vec![Selector::cluster("cluster-a", vec![])],
                k8s_resources: vec![GroupVersionKind::new("", "v1", "Pod")],
                event_expression: String::new(),
                selected_actions: vec![EventAction::Add, EventAction::Delete],
            },
            triggers: vec![],
        };

        let mut tx = store.begin_tx().unwrap();
        let w = store
            .watchers()
            .save(&mut tx, Watcher::from_request(&req, 1, Utc::now()))
            .unwrap();
        let data = JobTriggerData::new("j", "p", "e");
        let t = store
            .triggers()
            .save_bulk(
                &mut tx,
                vec![Trigger::new_job(w.id, &data, 1, Utc::now()).unwrap()],
            )
            .unwrap();
        store.commit(tx).unwrap();
        (dir, store, t[0].id)
    }

    #[test]
    fn test_save_bulk_requires_known_trigger() {
        let (_dir, store, trigger_id) = seeded_store();

        let mut tx = store.begin_tx().unwrap();
        let err = store
            .executions()
            .save_bulk(&mut tx, vec![execution(trigger_id + 1, 0, EventAction::Add)])
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let err = store
            .executions()
            .save_bulk(&mut tx, vec![execution(0, 0, EventAction::Add)])
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn test_list_orders_and_pages() {
        let (_dir, store, trigger_id) = seeded_store();

        let mut tx = store.begin_tx().unwrap();
        store
            .executions()
            .save_bulk(
                &mut tx,
                vec![
                    execution(trigger_id, 10, EventAction::Add),
                    execution(trigger_id, 0, EventAction::Delete),
                    execution(trigger_id, 5, EventAction::Delete),
                ],
            )
            .unwrap();
        store.commit(tx).unwrap();

        let query = InterceptedEventQuery {
            sort_order: SortOrder::Desc,
            ..Default::default()
        };
        let (rows, total) = store.executions().list(&query).unwrap();
        assert_eq!(total, 3);
        let minutes: Vec<_> = rows
            .iter()
            .map(|r| (r.intercepted_at - base_time()).num_minutes())
            .collect();
        assert_eq!(minutes, vec![10, 5, 0]);

        let query = InterceptedEventQuery {
            sort_order: SortOrder::Asc,
            actions: vec![EventAction::Delete],
            page: PageRequest::new(1, 5),
            ..Default::default()
        };
        let (rows, total) = store.executions().list(&query).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].intercepted_at - base_time()).num_minutes(), 5);
    }

    #[test]
    fn test_update_progress_is_monotonic() {
        let (_dir, store, trigger_id) = seeded_store();
        let repo = store.executions();

        let mut tx = store.begin_tx().unwrap();
        let saved = repo
            .save_bulk(&mut tx, vec![execution(trigger_id, 0, EventAction::Add)])
            .unwrap();
        let id = saved[0].id;

        let row = repo
            .update_progress(&mut tx, id, &ExecutionUpdate::accepted(77))
            .unwrap();
        assert_eq!(row.trigger_execution_id, 77);
        assert_eq!(row.status, ExecutionStatus::Progressing);

        let row = repo
            .update_progress(&mut tx, id, &ExecutionUpdate::errored("boom"))
            .unwrap();
        assert_eq!(row.status, ExecutionStatus::Error);
        assert_eq!(row.trigger_execution_id, 77);
        assert_eq!(row.execution_message, "boom");

        let err = repo
            .update_progress(&mut tx, id, &ExecutionUpdate::accepted(78))
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        store.commit(tx).unwrap();

        let row = repo.get_by_id(id).unwrap();
        assert_eq!(row.status, ExecutionStatus::Error);
        assert_eq!(row.action, EventAction::Add);
        assert!(repo.get_by_id(id + 1).is_err());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let (_dir, store, trigger_id) = seeded_store();
        let repo = store.executions();

        let mut tx = store.begin_tx().unwrap();
        let id = repo
            .save_bulk(&mut tx, vec![execution(trigger_id, 0, EventAction::Delete)])
            .unwrap()[0]
            .id;
        let failed = ExecutionUpdate {
            status: ExecutionStatus::Failure,
            trigger_execution_id: Some(9),
            execution_message: Some("exit code 1".to_string()),
        };
        repo.update_progress(&mut tx, id, &failed).unwrap();

        let err = repo
            .update_progress(&mut tx, id, &ExecutionUpdate::errored("late"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        // Same status again is accepted
        repo.update_progress(&mut tx, id, &failed).unwrap();
        store.commit(tx).unwrap();

        let row = repo.get_by_id(id).unwrap();
        assert_eq!(row.status, ExecutionStatus::Failure);
        assert_eq!(row.execution_message, "exit code 1");
    }
}
