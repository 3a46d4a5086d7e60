//! In-memory record store
//!
//! `MemoryRecordStore` keeps every collection in a `BTreeMap` keyed by
//! `RecordKey`, so listings come back in key order. It is the default
//! store when no database URL is configured and the test double for
//! everything above this crate.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::storage_traits::*;

type Tables = HashMap<Collection, BTreeMap<RecordKey, Value>>;

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
    changes: ChangeFeed,
    writes: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves and effective deletes performed so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn tables(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Query("record store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: Collection, key: &RecordKey) -> StorageResult<Option<Value>> {
        let tables = self.tables()?;
        Ok(tables.get(&collection).and_then(|t| t.get(key)).cloned())
    }

    async fn list(&self, collection: Collection, scope: &RecordKey) -> StorageResult<Vec<Value>> {
        let tables = self.tables()?;
        Ok(tables
            .get(&collection)
            .map(|t| {
                t.iter()
                    .filter(|(k, _)| k.within(scope))
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save(
        &self,
        collection: Collection,
        key: &RecordKey,
        value: Value,
    ) -> StorageResult<()> {
        let before = {
            let mut tables = self.tables()?;
            tables
                .entry(collection)
                .or_default()
                .insert(key.clone(), value.clone())
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.changes.saved(collection, key, before, value);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &RecordKey) -> StorageResult<bool> {
        let removed = {
            let mut tables = self.tables()?;
            tables.get_mut(&collection).and_then(|t| t.remove(key))
        };
        match removed {
            Some(before) => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                self.changes.deleted(collection, key, before);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
