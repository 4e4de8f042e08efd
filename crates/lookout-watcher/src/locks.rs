use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-watcher-id mutation locks
///
/// A guard is held from before the transaction until the fan-out of that
/// mutation has finished. Entries nobody holds or waits on are pruned on
/// the next acquisition.
#[derive(Default)]
pub struct WatcherLocks {
    locks: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

pub type WatcherGuard = OwnedMutexGuard<()>;

impl WatcherLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: u64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|other, lock| *other == id || Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }

    pub async fn acquire(&self, id: u64) -> WatcherGuard {
        self.entry(id).lock_owned().await
    }

    /// Take the lock only if it is free
    pub fn try_acquire(&self, id: u64) -> Option<WatcherGuard> {
        self.entry(id).try_lock_owned().ok()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}
