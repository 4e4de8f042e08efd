use crate::encoding::Table;
use crate::store::{get_record, scan_records, StoreTx};
use crate::{KVStore, Result, StorageError};
use chrono::{DateTime, Utc};
use lookout_core::{PageRequest, SortOrder, Watcher};
use std::sync::Arc;
use tracing::debug;

/// Filter of the watcher list
#[derive(Debug, Clone, Default)]
pub struct WatcherFilter {
    /// Case-insensitive substring of the name
    pub search: Option<String>,
}

impl WatcherFilter {
    fn matches(&self, watcher: &Watcher) -> bool {
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => watcher
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

/// Repository over `k8s_event_watcher` rows
pub struct WatcherRepository {
    kv: Arc<dyn KVStore>,
}

fn not_found(id: u64) -> StorageError {
    StorageError::row_not_found(Table::Watcher, id)
}

impl WatcherRepository {
    pub(crate) fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    /// Insert a new watcher, assigning its id
    pub fn save(&self, tx: &mut StoreTx, mut watcher: Watcher) -> Result<Watcher> {
        watcher.id = tx.next_id(Table::Watcher)?;
        watcher.active = true;
        tx.put_record(Table::Watcher, watcher.id, &watcher)?;
        debug!("Saved watcher {} ({})", watcher.id, watcher.name);
        Ok(watcher)
    }

    /// Overwrite an active watcher row
    pub fn update(&self, tx: &mut StoreTx, watcher: &Watcher) -> Result<()> {
        let current = self.get_for_update(tx, watcher.id)?;
        if !watcher.active {
            return Err(StorageError::conflict(format!(
                "watcher {} cannot be deactivated through update",
                current.id
            )));
        }
        tx.put_record(Table::Watcher, watcher.id, watcher)
    }

    /// Read an active watcher inside a write transaction
    ///
    /// Write transactions are serialized, so the row cannot change under
    /// the caller until the transaction ends.
    pub fn get_for_update(&self, tx: &StoreTx, id: u64) -> Result<Watcher> {
        match tx.get_record::<Watcher>(Table::Watcher, id)? {
            Some(watcher) if watcher.active => Ok(watcher),
            _ => Err(not_found(id)),
        }
    }

    /// Active watcher whose name equals `name` ignoring case
    pub fn find_active_by_name(&self, tx: &StoreTx, name: &str) -> Result<Option<Watcher>> {
        let wanted = name.to_lowercase();
        Ok(tx
            .scan_records::<Watcher>(Table::Watcher)?
            .into_iter()
            .find(|w| w.active && w.name.to_lowercase() == wanted))
    }

    pub fn get_by_id(&self, id: u64) -> Result<Watcher> {
        match get_record::<Watcher>(self.kv.as_ref(), Table::Watcher, id)? {
            Some(watcher) if watcher.active => Ok(watcher),
            _ => Err(not_found(id)),
        }
    }

    /// Active watchers among `ids`, in the order given; unknown ids are skipped
    pub fn get_by_ids(&self, ids: &[u64]) -> Result<Vec<Watcher>> {
        let mut watchers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(watcher) = get_record::<Watcher>(self.kv.as_ref(), Table::Watcher, *id)? {
                if watcher.active {
                    watchers.push(watcher);
                }
            }
        }
        Ok(watchers)
    }

    /// Every active watcher in id order
    pub fn list_active(&self) -> Result<Vec<Watcher>> {
        Ok(scan_records::<Watcher>(self.kv.as_ref(), Table::Watcher)?
            .into_iter()
            .filter(|w| w.active)
            .collect())
    }

    /// Active watchers matching `filter`, ordered by name, with the total
    /// number of matches; `page: None` returns every match
    pub fn list(
        &self,
        filter: &WatcherFilter,
        order: SortOrder,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Watcher>, usize)> {
        let mut watchers: Vec<Watcher> = self
            .list_active()?
            .into_iter()
            .filter(|w| filter.matches(w))
            .collect();

        watchers.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        if order == SortOrder::Desc {
            watchers.reverse();
        }

        let total = watchers.len();
        let items = match page {
            Some(page) => page.apply(watchers),
            None => watchers,
        };
        Ok((items, total))
    }

    /// Logically delete a watcher; returns the number of rows changed
    pub fn deactivate_by_id(
        &self,
        tx: &mut StoreTx,
        id: u64,
        user: u64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut watcher = tx
            .get_record::<Watcher>(Table::Watcher, id)?
            .ok_or_else(|| not_found(id))?;
        if !watcher.active {
            return Ok(0);
        }

        watcher.active = false;
        watcher.audit.touch(user, now);
        tx.put_record(Table::Watcher, id, &watcher)?;
        debug!("Deactivated watcher {}", id);
        Ok(1)
    }
}
