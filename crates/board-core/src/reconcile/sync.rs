//! The reconciliation pass shared by every reconciler.
//!
//! A pass pages through a remote listing, upserts what changed, and then
//! deletes every local record in scope that the listing did not mention.

use std::collections::HashSet;
use std::future::Future;

use board_remote::{Page, PageRequest, RemoteResult};
use board_state::{Record, RecordKey, Records, StorageResult};
use serde::Serialize;

/// Pagination bounds for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSettings {
    pub max_pages: u32,
    pub page_limit: u32,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            max_pages: 20,
            page_limit: PageRequest::DEFAULT_LIMIT,
        }
    }
}

/// Counters of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub seen: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncStats {
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn absorb(&mut self, other: SyncStats) {
        self.seen += other.seen;
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Fetch pages until the server reports the last page, returns an empty
/// page, or `max_pages` is reached. At least one page of at least one item
/// is always requested.
pub async fn collect_pages<T, F, Fut>(settings: PageSettings, mut fetch: F) -> RemoteResult<Vec<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = RemoteResult<Page<T>>>,
{
    let mut items = Vec::new();
    let limit = settings.page_limit.max(1);
    for page in 0..settings.max_pages.max(1) {
        let result = fetch(PageRequest::new(page, limit)).await?;
        let last = result.is_last_page || result.values.is_empty();
        items.extend(result.values);
        if last {
            break;
        }
    }
    Ok(items)
}

/// Maps a remote item onto its local record.
pub trait Convert {
    type Remote;
    type Output: Record;

    fn key(&self, remote: &Self::Remote) -> RecordKey;

    /// Build the record for `remote`, carrying over whatever `existing`
    /// owns that the remote listing does not.
    fn convert(&self, remote: Self::Remote, existing: Option<&Self::Output>) -> Self::Output;
}

/// Converge the records under `scope` onto `items`.
///
/// Each item is read fresh right before it is written so fields owned by
/// other writers are not clobbered. Records are only saved when they differ.
pub async fn converge<C: Convert>(
    records: &Records,
    scope: &RecordKey,
    items: Vec<C::Remote>,
    converter: &C,
) -> StorageResult<SyncStats> {
    let mut stats = SyncStats::default();
    let mut seen = HashSet::new();

    for item in items {
        let key = converter.key(&item);
        if !seen.insert(key.clone()) {
            continue;
        }
        let existing = records.get::<C::Output>(&key).await?;
        let next = converter.convert(item, existing.as_ref());
        match existing {
            None => {
                records.save(&next).await?;
                stats.created += 1;
            }
            Some(previous) if previous != next => {
                records.save(&next).await?;
                stats.updated += 1;
            }
            Some(_) => {}
        }
    }
    stats.seen = seen.len();

    for stale in records.list::<C::Output>(scope).await? {
        let key = stale.key();
        if !seen.contains(&key) && records.delete::<C::Output>(&key).await? {
            stats.deleted += 1;
        }
    }
    Ok(stats)
}
