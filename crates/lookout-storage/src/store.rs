use crate::encoding::{KeyEncoder, Table};
use crate::repository::{ExecutionRepository, TriggerRepository, WatcherRepository};
use crate::{KVStore, RedbBackend, Result, StorageError, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Entry point to the watcher, trigger and execution repositories
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct Store {
    kv: Arc<dyn KVStore>,
}

impl Store {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    /// Open (or create) a redb-backed store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Arc::new(RedbBackend::new(path)?)))
    }

    /// Begin a write transaction; only one is open at a time
    pub fn begin_tx(&self) -> Result<StoreTx> {
        Ok(StoreTx {
            inner: self.kv.transaction()?,
        })
    }

    pub fn commit(&self, tx: StoreTx) -> Result<()> {
        tx.commit()
    }

    pub fn rollback(&self, tx: StoreTx) -> Result<()> {
        tx.rollback()
    }

    pub fn watchers(&self) -> WatcherRepository {
        WatcherRepository::new(self.kv.clone())
    }

    pub fn triggers(&self) -> TriggerRepository {
        TriggerRepository::new(self.kv.clone())
    }

    pub fn executions(&self) -> ExecutionRepository {
        ExecutionRepository::new(self.kv.clone())
    }
}

/// An open write transaction
///
/// Dropping it without calling [`StoreTx::commit`] rolls it back.
pub struct StoreTx {
    inner: Box<dyn Transaction>,
}

impl StoreTx {
    pub fn commit(self) -> Result<()> {
        self.inner.commit()
    }

    pub fn rollback(self) -> Result<()> {
        self.inner.rollback()
    }

    /// Allocate the next id of `table`
    pub(crate) fn next_id(&mut self, table: Table) -> Result<u64> {
        let key = KeyEncoder::encode_sequence_key(table);
        let current = match self.inner.get(key.as_bytes())? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
                    StorageError::corrupt_record(&key, "sequence value is not 8 bytes", None)
                })?;
                u64::from_be_bytes(bytes)
            }
            None => 0,
        };

        let next = current + 1;
        self.inner.put(key.as_bytes(), &next.to_be_bytes())?;
        Ok(next)
    }

    pub(crate) fn get_record<T: DeserializeOwned>(
        &self,
        table: Table,
        id: u64,
    ) -> Result<Option<T>> {
        let key = KeyEncoder::encode_record_key(table, id);
        match self.inner.get(key.as_bytes())? {
            Some(data) => decode(key.as_bytes(), &data).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn put_record<T: Serialize>(
        &mut self,
        table: Table,
        id: u64,
        record: &T,
    ) -> Result<()> {
        let key = KeyEncoder::encode_record_key(table, id);
        debug!("Writing {}", key);
        let data = serde_json::to_vec(record).map_err(|e| StorageError::codec(&key, e))?;
        self.inner.put(key.as_bytes(), &data)
    }

    pub(crate) fn scan_records<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>> {
        let prefix = KeyEncoder::encode_table_prefix(table);
        self.inner
            .scan(prefix.as_bytes())?
            .iter()
            .map(|(key, data)| decode(key, data))
            .collect()
    }

    pub(crate) fn scan_ids(&self, prefix: &str) -> Result<Vec<u64>> {
        Ok(parse_ids(self.inner.scan(prefix.as_bytes())?))
    }

    pub(crate) fn put_index(&mut self, key: &str) -> Result<()> {
        self.inner.put(key.as_bytes(), &[])
    }
}

/// Decode the JSON row stored at `key`
fn decode<T: DeserializeOwned>(key: &[u8], data: &[u8]) -> Result<T> {
    serde_json::from_slice(data)
        .map_err(|e| StorageError::codec(&String::from_utf8_lossy(key), e))
}

pub(crate) fn get_record<T: DeserializeOwned>(
    kv: &dyn KVStore,
    table: Table,
    id: u64,
) -> Result<Option<T>> {
    let key = KeyEncoder::encode_record_key(table, id);
    match kv.get(key.as_bytes())? {
        Some(data) => decode(key.as_bytes(), &data).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn scan_records<T: DeserializeOwned>(kv: &dyn KVStore, table: Table) -> Result<Vec<T>> {
    let prefix = KeyEncoder::encode_table_prefix(table);
    kv.scan(prefix.as_bytes())?
        .iter()
        .map(|(key, data)| decode(key, data))
        .collect()
}

pub(crate) fn scan_ids(kv: &dyn KVStore, prefix: &str) -> Result<Vec<u64>> {
    Ok(parse_ids(kv.scan(prefix.as_bytes())?))
}

fn parse_ids(entries: Vec<(bytes::Bytes, bytes::Bytes)>) -> Vec<u64> {
    entries
        .iter()
        .filter_map(|(key, _)| KeyEncoder::parse_id(&String::from_utf8_lossy(key)))
        .collect()
}
