use crate::encoding::{IndexKey, Table};
use crate::store::{get_record, scan_ids, StoreTx};
use crate::{KVStore, Result, StorageError};
use chrono::{DateTime, Utc};
use lookout_core::{Trigger, Watcher};
use std::sync::Arc;
use tracing::debug;

/// Repository over `auto_remediation_trigger` rows
///
/// Triggers are reachable from their watcher through a secondary index.
pub struct TriggerRepository {
    kv: Arc<dyn KVStore>,
}

impl TriggerRepository {
    pub(crate) fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    /// Insert triggers; every one must reference an active watcher
    pub fn save_bulk(&self, tx: &mut StoreTx, triggers: Vec<Trigger>) -> Result<Vec<Trigger>> {
        let mut saved = Vec::with_capacity(triggers.len());

        for mut trigger in triggers {
            match tx.get_record::<Watcher>(Table::Watcher, trigger.watcher_id)? {
                Some(watcher) if watcher.active => {}
                _ => {
                    return Err(StorageError::conflict(format!(
                        "trigger references inactive or unknown watcher {}",
                        trigger.watcher_id
                    )))
                }
            }

            trigger.id = tx.next_id(Table::Trigger)?;
            trigger.active = true;
            tx.put_record(Table::Trigger, trigger.id, &trigger)?;
            tx.put_index(
                &IndexKey::TriggerByWatcher {
                    watcher_id: trigger.watcher_id,
                    trigger_id: trigger.id,
                }
                .encode(),
            )?;
            saved.push(trigger);
        }

        debug!("Saved {} triggers", saved.len());
        Ok(saved)
    }

    /// Deactivate every active trigger of a watcher; returns rows changed
    pub fn deactivate_by_watcher_id(
        &self,
        tx: &mut StoreTx,
        watcher_id: u64,
        user: u64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ids = tx.scan_ids(&IndexKey::encode_prefix_for_watcher(watcher_id))?;
        let mut changed = 0;

        for id in ids {
            let Some(mut trigger) = tx.get_record::<Trigger>(Table::Trigger, id)? else {
                continue;
            };
            if !trigger.active {
                continue;
            }
            trigger.active = false;
            trigger.audit.touch(user, now);
            tx.put_record(Table::Trigger, id, &trigger)?;
            changed += 1;
        }

        debug!("Deactivated {} triggers of watcher {}", changed, watcher_id);
        Ok(changed)
    }

    /// Active triggers of the given watchers, grouped in the order given
    pub fn list_by_watcher_ids(&self, watcher_ids: &[u64]) -> Result<Vec<Trigger>> {
        let mut triggers = Vec::new();
        for watcher_id in watcher_ids {
            let ids = scan_ids(
                self.kv.as_ref(),
                &IndexKey::encode_prefix_for_watcher(*watcher_id),
            )?;
            for id in ids {
                let row = get_record::<Trigger>(self.kv.as_ref(), Table::Trigger, id)?;
                if let Some(trigger) = row.filter(|t| t.active) {
                    triggers.push(trigger);
                }
            }
        }
        Ok(triggers)
    }

    /// A trigger by id, active or not
    pub fn get_by_id(&self, id: u64) -> Result<Trigger> {
        get_record::<Trigger>(self.kv.as_ref(), Table::Trigger, id)?
            .ok_or_else(|| StorageError::row_not_found(Table::Trigger, id))
    }

    /// Triggers among `ids`, active or not; unknown ids are skipped
    pub fn get_by_ids(&self, ids: &[u64]) -> Result<Vec<Trigger>> {
        let mut triggers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(trigger) = get_record::<Trigger>(self.kv.as_ref(), Table::Trigger, *id)? {
                triggers.push(trigger);
            }
        }
        Ok(triggers)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Store, StorageError};
    use chrono::Utc;
    use lookout_core::{
        EventAction, EventConfiguration, GroupVersionKind, JobTriggerData, Selector, Trigger,
        Watcher, WatcherRequest,
    };
    use tempfile::tempdir;

    fn watcher(name: &str) -> Watcher {
        let req = WatcherRequest {
            name: name.to_string(),
            description: String::new(),
            event_configuration: EventConfiguration {
                selectors: vec![Selector::all_clusters(vec![])],
                k8s_resources: vec![GroupVersionKind::new("apps", "v1", "Deployment")],
                event_expression: String::new(),
                selected_actions: vec![EventAction::Update],
            },
            triggers: vec![],
        };
        Watcher::from_request(&req, 1, Utc::now())
    }

    fn trigger(watcher_id: u64, job: &str) -> Trigger {
        Trigger::new_job(watcher_id, &JobTriggerData::new(job, "p1", "dev"), 1, Utc::now()).unwrap()
    }

    #[test]
    fn test_save_bulk_and_list_by_watcher() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.redb")).unwrap();

        let mut tx = store.begin_tx().unwrap();
        let w1 = store.watchers().save(&mut tx, watcher("one")).unwrap();
        let w2 = store.watchers().save(&mut tx, watcher("two")).unwrap();
        let saved = store
            .triggers()
            .save_bulk(
                &mut tx,
                vec![trigger(w1.id, "a"), trigger(w2.id, "b"), trigger(w1.id, "c")],
            )
            .unwrap();
        store.commit(tx).unwrap();

        assert_eq!(saved.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let listed = store.triggers().list_by_watcher_ids(&[w1.id]).unwrap();
        let jobs: Vec<_> = listed
            .iter()
            .map(|t| t.job_data().unwrap().job_name)
            .collect();
        assert_eq!(jobs, vec!["a", "c"]);
    }

    #[test]
    fn test_save_bulk_rejects_inactive_watcher() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.redb")).unwrap();

        let mut tx = store.begin_tx().unwrap();
        let w = store.watchers().save(&mut tx, watcher("one")).unwrap();
        store
            .watchers()
            .deactivate_by_id(&mut tx, w.id, 1, Utc::now())
            .unwrap();

        let err = store
            .triggers()
            .save_bulk(&mut tx, vec![trigger(w.id, "a")])
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn test_deactivate_keeps_rows_readable() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.redb")).unwrap();

        let mut tx = store.begin_tx().unwrap();
        let w = store.watchers().save(&mut tx, watcher("one")).unwrap();
        store
            .triggers()
            .save_bulk(&mut tx, vec![trigger(w.id, "a"), trigger(w.id, "b")])
            .unwrap();
        let changed = store
            .triggers()
            .deactivate_by_watcher_id(&mut tx, w.id, 1, Utc::now())
            .unwrap();
        assert_eq!(changed, 2);
        let again = store
            .triggers()
            .deactivate_by_watcher_id(&mut tx, w.id, 1, Utc::now())
            .unwrap();
        assert_eq!(again, 0);
        store.commit(tx).unwrap();

        assert!(store.triggers().list_by_watcher_ids(&[w.id]).unwrap().is_empty());
        let old = store.triggers().get_by_id(1).unwrap();
        assert!(!old.active);
        assert_eq!(store.triggers().get_by_ids(&[1, 2, 42]).unwrap().len(), 2);
        assert!(store.triggers().get_by_id(42).is_err());
    }
}
