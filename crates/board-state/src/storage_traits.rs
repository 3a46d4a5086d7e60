//! Storage trait definitions for the board
//!
//! - `Record`: a typed entity living in one of the board collections
//! - `RecordStore`: backend-agnostic persistence with a change feed
//! - `Records`: typed façade the reconcilers and the release orchestrator use
//!
//! Stores work on JSON values so the trait stays object safe; `Records`
//! does the (de)serialization. Every successful save or delete is published
//! on the change feed with the before/after images of the record.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Capacity of the change feed before slow subscribers start lagging.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Collections and keys
// ---------------------------------------------------------------------------

/// The persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    Projects,
    Repos,
    Branches,
    PullRequests,
    Releases,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Projects,
        Collection::Repos,
        Collection::Branches,
        Collection::PullRequests,
        Collection::Releases,
    ];

    /// Table / route name of the collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Repos => "repos",
            Collection::Branches => "branches",
            Collection::PullRequests => "pull-requests",
            Collection::Releases => "releases",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hierarchical record identity, e.g. `[project, repo, branch]`.
///
/// A key is also used as a scope: `RecordKey::root()` selects a whole
/// collection, `[project]` selects everything below that project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(Vec<String>);

impl RecordKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecordKey(parts.into_iter().map(Into::into).collect())
    }

    /// The empty scope (whole collection).
    pub fn root() -> Self {
        RecordKey(Vec::new())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `self` lies inside `scope`.
    pub fn within(&self, scope: &RecordKey) -> bool {
        self.0.len() >= scope.0.len() && self.0[..scope.0.len()] == scope.0[..]
    }

    /// Stable, collision-free id used by backends that need a flat key.
    pub fn storage_id(&self) -> StorageResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A typed entity stored in a collection.
///
/// `PartialEq` is the field-level comparison reconcilers use to decide
/// whether a write is needed.
pub trait Record: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn key(&self) -> RecordKey;
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A committed change to a record.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub key: RecordKey,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl ChangeEvent {
    pub fn is(&self, collection: Collection, kind: ChangeKind) -> bool {
        self.collection == collection && self.kind == kind
    }

    /// Decode the after-image as `T`, if present.
    pub fn after_as<T: Record>(&self) -> StorageResult<Option<T>> {
        self.after.clone().map(decode).transpose()
    }

    /// Decode the before-image as `T`, if present.
    pub fn before_as<T: Record>(&self) -> StorageResult<Option<T>> {
        self.before.clone().map(decode).transpose()
    }
}

/// Broadcast side of the change feed, shared by the store implementations.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }
}

impl ChangeFeed {
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish the outcome of a save (`before` is the previous image).
    pub fn saved(&self, collection: Collection, key: &RecordKey, before: Option<Value>, after: Value) {
        let kind = if before.is_some() {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        self.publish(ChangeEvent {
            collection,
            kind,
            key: key.clone(),
            before,
            after: Some(after),
        });
    }

    pub fn deleted(&self, collection: Collection, key: &RecordKey, before: Value) {
        self.publish(ChangeEvent {
            collection,
            kind: ChangeKind::Deleted,
            key: key.clone(),
            before: Some(before),
            after: None,
        });
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Keyed JSON persistence with change notifications.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read one record.
    async fn get(&self, collection: Collection, key: &RecordKey) -> StorageResult<Option<Value>>;

    /// List records within `scope`, ordered by key.
    async fn list(&self, collection: Collection, scope: &RecordKey) -> StorageResult<Vec<Value>>;

    /// Upsert a record and publish `Created` or `Updated`.
    async fn save(&self, collection: Collection, key: &RecordKey, value: Value)
        -> StorageResult<()>;

    /// Remove a record and publish `Deleted`. Returns whether it existed.
    async fn delete(&self, collection: Collection, key: &RecordKey) -> StorageResult<bool>;

    /// Subscribe to committed changes.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

fn decode<T: DeserializeOwned>(value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|e| StorageError::Deserialization(e.to_string()))
}

/// Typed access to a [`RecordStore`].
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn RecordStore>,
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn get<T: Record>(&self, key: &RecordKey) -> StorageResult<Option<T>> {
        self.store
            .get(T::COLLECTION, key)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn list<T: Record>(&self, scope: &RecordKey) -> StorageResult<Vec<T>> {
        self.store
            .list(T::COLLECTION, scope)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn save<T: Record>(&self, record: &T) -> StorageResult<()> {
        let value = serde_json::to_value(record)?;
        self.store.save(T::COLLECTION, &record.key(), value).await
    }

    pub async fn delete<T: Record>(&self, key: &RecordKey) -> StorageResult<bool> {
        self.store.delete(T::COLLECTION, key).await
    }

    /// Subscribe to the store's change feed.
    pub fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.store.subscribe()
    }
}
