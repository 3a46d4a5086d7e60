//! SurrealDB-backed record store
//!
//! Works with any engine `surrealdb::engine::any` understands: `mem://`
//! for tests, `surrealkv://<dir>` for a durable local store, `ws://` for
//! a server. Each record is one row `{ path, data }` with a record id
//! derived from its key, so upserts are idempotent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::migrations::{init_schema, table_name};
use crate::storage_traits::*;

const NAMESPACE: &str = "board";
const DATABASE: &str = "main";

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    path: Vec<String>,
    data: String,
}

impl StoredRecord {
    fn value(&self) -> StorageResult<Value> {
        serde_json::from_str(&self.data).map_err(|e| StorageError::Deserialization(e.to_string()))
    }
}

#[derive(Clone)]
pub struct SurrealRecordStore {
    db: Surreal<Any>,
    changes: ChangeFeed,
}

impl SurrealRecordStore {
    /// Connect to an in-memory database.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to `url` and set up the schema.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> StorageResult<Self> {
        if let Some(dir) = url.strip_prefix("surrealkv://") {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::Connection(format!("Failed to create {}: {}", dir, e))
            })?;
        }

        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        init_schema(&db).await?;

        info!("SurrealDB record store connected");
        Ok(Self {
            db,
            changes: ChangeFeed::default(),
        })
    }

    async fn fetch(&self, collection: Collection, key: &RecordKey) -> StorageResult<Option<Value>> {
        let mut result = self
            .db
            .query("SELECT path, data FROM type::thing($table, $id)")
            .bind(("table", table_name(collection)))
            .bind(("id", key.storage_id()?))
            .await?;

        let rows: Vec<StoredRecord> = result.take(0)?;
        rows.into_iter().next().map(|r| r.value()).transpose()
    }
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    #[instrument(skip(self), fields(collection = %collection, key = %key))]
    async fn get(&self, collection: Collection, key: &RecordKey) -> StorageResult<Option<Value>> {
        self.fetch(collection, key).await
    }

    #[instrument(skip(self), fields(collection = %collection, scope = %scope))]
    async fn list(&self, collection: Collection, scope: &RecordKey) -> StorageResult<Vec<Value>> {
        let query = if scope.is_root() {
            self.db
                .query("SELECT path, data FROM type::table($table)")
                .bind(("table", table_name(collection)))
        } else {
            self.db
                .query("SELECT path, data FROM type::table($table) WHERE array::slice(path, 0, $depth) = $scope")
                .bind(("table", table_name(collection)))
                .bind(("depth", scope.parts().len()))
                .bind(("scope", scope.parts().to_vec()))
        };
        let mut result = query.await?;

        let rows: Vec<StoredRecord> = result.take(0)?;
        let mut rows: Vec<(RecordKey, StoredRecord)> = rows
            .into_iter()
            .map(|r| (RecordKey::new(r.path.clone()), r))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        debug!(count = rows.len(), "Listed records");
        rows.iter().map(|(_, r)| r.value()).collect()
    }

    #[instrument(skip(self, value), fields(collection = %collection, key = %key))]
    async fn save(
        &self,
        collection: Collection,
        key: &RecordKey,
        value: Value,
    ) -> StorageResult<()> {
        let before = self.fetch(collection, key).await?;
        let row = StoredRecord {
            path: key.parts().to_vec(),
            data: serde_json::to_string(&value)?,
        };

        self.db
            .query("UPSERT type::thing($table, $id) CONTENT $row")
            .bind(("table", table_name(collection)))
            .bind(("id", key.storage_id()?))
            .bind(("row", row))
            .await?
            .check()?;

        debug!("Saved record");
        self.changes.saved(collection, key, before, value);
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %collection, key = %key))]
    async fn delete(&self, collection: Collection, key: &RecordKey) -> StorageResult<bool> {
        let Some(before) = self.fetch(collection, key).await? else {
            return Ok(false);
        };

        self.db
            .query("DELETE type::thing($table, $id)")
            .bind(("table", table_name(collection)))
            .bind(("id", key.storage_id()?))
            .await?
            .check()?;

        debug!("Deleted record");
        self.changes.deleted(collection, key, before);
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
