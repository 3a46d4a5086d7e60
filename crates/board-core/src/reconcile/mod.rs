//! Reconcilers: converge the local model onto the source-control server.
//!
//! One reconciler per collection. Each one knows the scopes it refreshes
//! on its interval (every parent record) and how to refresh a single
//! scope. Remote failures abandon the scope for this pass only.

pub mod branch;
pub mod project;
pub mod pull_request;
pub mod repo;
pub mod sync;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use board_remote::SourceControlClient;
use board_state::{RecordKey, Records};
use tracing::{debug, error};

use crate::error::BoardResult;
use crate::obs;

pub use branch::{classify_branch, latest_release, BranchReconciler};
pub use project::ProjectReconciler;
pub use pull_request::{pull_request_type, PullRequestReconciler};
pub use repo::RepoReconciler;
pub use sync::{collect_pages, converge, Convert, PageSettings, SyncStats};

/// What every reconciler shares: the store, the source-control client and
/// the pagination bounds.
#[derive(Clone)]
pub struct SyncContext {
    pub records: Records,
    pub source: Arc<dyn SourceControlClient>,
    pub pages: PageSettings,
}

impl SyncContext {
    pub fn new(records: Records, source: Arc<dyn SourceControlClient>, pages: PageSettings) -> Self {
        Self {
            records,
            source,
            pages,
        }
    }
}

#[async_trait]
pub trait Reconciler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every scope an interval pass covers.
    async fn scopes(&self) -> BoardResult<Vec<RecordKey>>;

    /// One reconciliation pass over `scope`.
    async fn refresh(&self, scope: &RecordKey) -> BoardResult<SyncStats>;

    /// Refresh every scope. A failing scope is logged and skipped.
    async fn refresh_all(&self) -> BoardResult<SyncStats> {
        let mut total = SyncStats::default();
        for scope in self.scopes().await? {
            match self.refresh(&scope).await {
                Ok(stats) => total.absorb(stats),
                Err(e) => error!(
                    reconciler = self.name(),
                    scope = %scope,
                    error = %e,
                    "Refresh failed"
                ),
            }
        }
        Ok(total)
    }
}

/// Run one pass and log its counters and duration.
pub(crate) async fn timed_pass<F>(name: &str, scope: &RecordKey, pass: F) -> BoardResult<SyncStats>
where
    F: Future<Output = BoardResult<SyncStats>>,
{
    debug!(reconciler = name, scope = %scope, "Refresh started");
    let started = Instant::now();
    let stats = pass.await?;
    obs::emit_pass_finished(name, &scope.to_string(), &stats, started.elapsed().as_millis() as u64);
    Ok(stats)
}
