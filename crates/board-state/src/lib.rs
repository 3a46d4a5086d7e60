//! Board-State: record store for the devops board
//!
//! Holds the board's local model of the source-control org (projects,
//! repositories, branches, pull requests), the build metadata attached to
//! it, and the release records the orchestrator drives.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: typed records, keyed upserts, and a change feed other components
//! subscribe to.
//!
//! ## Key Components
//!
//! - `Records`: typed façade over any `RecordStore`
//! - `MemoryRecordStore`: process-local store (default, and the test double)
//! - `SurrealRecordStore`: SurrealDB-backed store that survives restarts

mod error;
pub mod memory;
mod migrations;
pub mod release;
pub mod schema;
pub mod storage_traits;
pub mod surreal_store;

use std::sync::Arc;

pub use error::StorageError;
pub use memory::MemoryRecordStore;
pub use release::{
    EventLevel, Release, ReleaseEvent, ReleaseRepoStatus, ReleaseStage, ReleaseStageId,
    ReleaseStatus, RepoSelection, StageStatus,
};
pub use schema::{
    Branch, BranchType, BuildLinks, BuildStatus, Buildable, Project, PullRequest,
    PullRequestLinks, PullRequestState, PullRequestType, PullRequestUser, Repo, RepoLinks,
    ReviewerStatus,
};
pub use storage_traits::{
    ChangeEvent, ChangeFeed, ChangeKind, Collection, Record, RecordKey, RecordStore, Records,
    StorageResult,
};
pub use surreal_store::SurrealRecordStore;

/// Result type for board-state operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Open the record store for `url`: in-memory when `None`, SurrealDB otherwise.
pub async fn open_store(url: Option<&str>) -> Result<Records> {
    let store: Arc<dyn RecordStore> = match url {
        None => Arc::new(MemoryRecordStore::new()),
        Some(url) => Arc::new(SurrealRecordStore::connect(url).await?),
    };
    Ok(Records::new(store))
}
