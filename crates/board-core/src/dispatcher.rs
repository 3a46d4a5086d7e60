//! Change-event dispatcher
//!
//! Subscribes to the record store's change feed and turns notifications
//! into follow-up work:
//!
//! - project created: refresh its repositories
//! - repository created: refresh its branches and pull requests, then seed
//!   build ids from the build server's listing
//! - branch or pull request updated with a new build id or commit: refresh
//!   its build status
//!
//! Events are handled one at a time in arrival order. A lagging receiver
//! drops events; the interval jobs repair whatever was missed.

use std::sync::Arc;

use board_state::{Branch, ChangeEvent, ChangeKind, Collection, PullRequest};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::build_tracker::BuildTracker;
use crate::error::BoardResult;
use crate::reconcile::{BranchReconciler, PullRequestReconciler, Reconciler, RepoReconciler};

#[derive(Clone)]
pub struct Dispatcher {
    repos: Arc<RepoReconciler>,
    branches: Arc<BranchReconciler>,
    pull_requests: Arc<PullRequestReconciler>,
    tracker: BuildTracker,
}

/// True when a build-bearing record changed in a way its status depends on.
fn build_inputs_changed(before: Option<(&str, Option<u64>)>, after: (&str, Option<u64>)) -> bool {
    if after.1.is_none() {
        return false;
    }
    match before {
        None => true,
        Some(before) => before != after,
    }
}

impl Dispatcher {
    pub fn new(
        repos: Arc<RepoReconciler>,
        branches: Arc<BranchReconciler>,
        pull_requests: Arc<PullRequestReconciler>,
        tracker: BuildTracker,
    ) -> Self {
        Self {
            repos,
            branches,
            pull_requests,
            tracker,
        }
    }

    /// Consume `events` until shutdown or until the feed closes.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<ChangeEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Change dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = self.handle(&event).await {
                            error!(
                                collection = %event.collection.as_str(),
                                key = %event.key,
                                error = %e,
                                "Change handler failed"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Change feed lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!("Change dispatcher stopped");
    }

    /// Handle one change event.
    pub async fn handle(&self, event: &ChangeEvent) -> BoardResult<()> {
        match (event.collection, event.kind) {
            (Collection::Projects, ChangeKind::Created) => {
                debug!(key = %event.key, "New project, refreshing repositories");
                self.repos.refresh(&event.key).await?;
            }
            (Collection::Repos, ChangeKind::Created) => {
                debug!(key = %event.key, "New repository, refreshing branches and pull requests");
                // Each step stands alone: a failed listing never skips the others.
                if let Err(e) = self.branches.refresh(&event.key).await {
                    error!(key = %event.key, error = %e, "Branch refresh of new repository failed");
                }
                if let Err(e) = self.pull_requests.refresh(&event.key).await {
                    error!(key = %event.key, error = %e, "Pull-request refresh of new repository failed");
                }
                if let [project_id, repo_id] = event.key.parts() {
                    if let Err(e) = self.tracker.seed_repo(project_id, repo_id).await {
                        error!(key = %event.key, error = %e, "Build listing seed of new repository failed");
                    }
                }
            }
            (Collection::Branches, ChangeKind::Created | ChangeKind::Updated) => {
                let Some(after) = event.after_as::<Branch>()? else {
                    return Ok(());
                };
                let before = event.before_as::<Branch>()?;
                let changed = build_inputs_changed(
                    before.as_ref().map(|b| (b.commit.as_str(), b.build.build_id)),
                    (after.commit.as_str(), after.build.build_id),
                );
                if changed {
                    self.tracker.refresh_branch(&event.key).await?;
                }
            }
            (Collection::PullRequests, ChangeKind::Created | ChangeKind::Updated) => {
                let Some(after) = event.after_as::<PullRequest>()? else {
                    return Ok(());
                };
                let before = event.before_as::<PullRequest>()?;
                let changed = build_inputs_changed(
                    before.as_ref().map(|p| (p.commit.as_str(), p.build.build_id)),
                    (after.commit.as_str(), after.build.build_id),
                );
                if changed {
                    self.tracker.refresh_pull_request(&event.key).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
