use crate::error::Result;
use crate::executor::{JobExecutor, JobRunRequest};
use crate::notifier::{ExecutionNotification, Notifier};
use lookout_core::{
    EventBatch, ExecutionStatus, ExecutionUpdate, IngestFailure, IngestReport,
    InterceptedEventExecution, Trigger, Watcher,
};
use lookout_storage::Store;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persists agent-reported events and hands their triggers to the executor
pub struct EventIngestor {
    store: Store,
    executor: Arc<dyn JobExecutor>,
    notifier: Arc<dyn Notifier>,
}

impl EventIngestor {
    pub fn new(store: Store, executor: Arc<dyn JobExecutor>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            executor,
            notifier,
        }
    }

    /// Ingest one batch from one cluster
    ///
    /// Rows for every accepted (event, trigger) pair are written in a single
    /// transaction. An event whose action the watcher does not select, or
    /// whose watcher is gone, is dropped. An event naming a trigger that does
    /// not belong to its watcher fails on its own; the rest of the batch
    /// continues.
    pub async fn ingest(&self, cluster_id: u64, batch: EventBatch) -> Result<IngestReport> {
        let watcher_ids: Vec<u64> = batch
            .events
            .iter()
            .flat_map(|e| e.watchers.iter().map(|w| w.watcher_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let watchers: HashMap<u64, Watcher> = self
            .store
            .watchers()
            .get_by_ids(&watcher_ids)?
            .into_iter()
            .map(|w| (w.id, w))
            .collect();

        let trigger_ids: Vec<u64> = batch
            .events
            .iter()
            .flat_map(|e| e.watchers.iter().flat_map(|w| w.trigger_ids.iter().copied()))
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

        let mut report = IngestReport::default();
        let mut rows = Vec::new();

        for (index, event) in batch.events.into_iter().enumerate() {
            let mut event_rows = Vec::new();
            let mut dropped = false;
            let mut failure = None;

            for matched in &event.watchers {
                let Some(watcher) = watchers.get(&matched.watcher_id) else {
                    warn!(
                        cluster_id,
                        watcher_id = matched.watcher_id,
                        "Dropping event {} for unknown or inactive watcher",
                        index
                    );
                    dropped = true;
                    continue;
                };
                if !watcher.watches_action(event.action) {
                    debug!(
                        cluster_id,
                        watcher_id = watcher.id,
                        action = %event.action,
                        "Dropping event {}: action not selected",
                        index
                    );
                    dropped = true;
                    continue;
                }

                for trigger_id in &matched.trigger_ids {
                    match triggers.get(trigger_id) {
                        Some(t) if t.watcher_id == watcher.id => {
                            event_rows.push(InterceptedEventExecution {
                                id: 0,
                                cluster_id,
                                namespace: event.namespace.clone(),
                                action: event.action,
                                involved_objects: event.involved_objects.clone(),
                                metadata: event.metadata.clone(),
                                intercepted_at: event.intercepted_at,
                                watcher_id: watcher.id,
                                watcher_name: watcher.name.clone(),
                                trigger_id: *trigger_id,
                                trigger_execution_id: 0,
                                status: ExecutionStatus::Progressing,
                                execution_message: String::new(),
                            });
                        }
                        Some(_) => {
                            failure.get_or_insert_with(|| {
                                format!(
                                    "trigger {} does not belong to watcher {}",
                                    trigger_id, watcher.id
                                )
                            });
                        }
                        None => {
                            failure
                                .get_or_insert_with(|| format!("unknown trigger {}", trigger_id));
                        }
                    }
                }
            }

            if let Some(message) = failure {
                warn!(cluster_id, "Rejecting event {}: {}", index, message);
                report.failed.push(IngestFailure { index, message });
            } else if event_rows.is_empty() && dropped {
                report.dropped.push(index);
            } else {
                rows.extend(event_rows);
            }
        }

        if rows.is_empty() {
            return Ok(report);
        }

        let mut tx = self.store.begin_tx()?;
        let saved = match self.store.executions().save_bulk(&mut tx, rows) {
            Ok(saved) => saved,
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    warn!("Rollback failed: {}", rb);
                }
                return Err(e.into());
            }
        };
        tx.commit()?;
        report.accepted = saved.len();
        info!(cluster_id, "Ingested {} executions", saved.len());

        let saved = self.start_jobs(saved, &triggers).await;
        for row in &saved {
            self.notifier.notify(ExecutionNotification::from(row));
        }

        Ok(report)
    }

    /// Hand each execution to the executor and record the outcome
    ///
    /// Best effort: a failed follow-up write leaves the row as inserted.
    async fn start_jobs(
        &self,
        saved: Vec<InterceptedEventExecution>,
        triggers: &HashMap<u64, Trigger>,
    ) -> Vec<InterceptedEventExecution> {
        let mut updates = Vec::with_capacity(saved.len());

        for row in &saved {
            let update = match triggers.get(&row.trigger_id) {
                Some(trigger) if !trigger.active => {
                    ExecutionUpdate::errored("trigger was replaced before the event arrived")
                }
                Some(trigger) => match trigger.job_data() {
                    Ok(data) if !data.is_runnable() => ExecutionUpdate::errored(format!(
                        "pipeline '{}' of job '{}' is not resolved",
                        data.pipeline_name, data.job_name
                    )),
                    Ok(data) => {
                        let request = JobRunRequest::new(&data, row);
                        match self.executor.trigger_job(&request).await {
                            Ok(run_id) => ExecutionUpdate::accepted(run_id),
                            Err(e) => ExecutionUpdate::errored(e.to_string()),
                        }
                    }
                    Err(e) => ExecutionUpdate::errored(e.to_string()),
                },
                None => ExecutionUpdate::errored(format!("unknown trigger {}", row.trigger_id)),
            };
            updates.push(update);
        }

        let mut tx = match self.store.begin_tx() {
            Ok(tx) => tx,
            Err(e) => {
                warn!("Could not record job runs: {}", e);
                return saved;
            }
        };

        let mut recorded = Vec::with_capacity(saved.len());
        for (row, update) in saved.iter().cloned().zip(&updates) {
            match self.store.executions().update_progress(&mut tx, row.id, update) {
                Ok(updated) => recorded.push(updated),
                Err(e) => {
                    warn!("Could not record run of execution {}: {}", row.id, e);
                    recorded.push(row);
                }
            }
        }

        if let Err(e) = tx.commit() {
            warn!("Could not record job runs: {}", e);
            return saved;
        }
        recorded
    }
}
