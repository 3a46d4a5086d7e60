//! Build status tracker
//!
//! Owns the build fields (`buildId`, `buildStatus`, `buildLinks`) of
//! branches and pull requests. Status only moves when the run being looked
//! at actually built the record's current commit.

use std::sync::Arc;

use board_remote::{pull_request_job, BuildClient, BuildClients, Run, RunResult, RunState};
use board_state::{
    Branch, BuildLinks, BuildStatus, Buildable, PullRequest, RecordKey, Records, Repo,
};
use tracing::{debug, error, instrument};

use crate::error::{BoardError, BoardResult};
use crate::obs;

const PULL_REQUEST_JOB_PREFIX: &str = "PR-";

/// Board build status of a remote run.
pub fn build_status(run: &Run) -> BuildStatus {
    match run.state {
        Some(RunState::Running) => BuildStatus::Progress,
        Some(RunState::Queued) => BuildStatus::Pending,
        Some(RunState::Finished) => match run.result {
            Some(RunResult::Success) => BuildStatus::Succeed,
            _ => BuildStatus::Failed,
        },
        _ => BuildStatus::Unknown,
    }
}

/// Apply a freshly triggered run: new id, console link, mapped status.
/// The retry link is kept.
fn apply_triggered(build: &mut Buildable, run: &Run, console_url: Option<String>) {
    if let Some(id) = run.build_id() {
        build.build_id = Some(id);
    }
    build.build_status = Some(build_status(run));
    let retry = build.build_links.as_ref().and_then(|l| l.retry.clone());
    build.build_links = Some(BuildLinks {
        open: console_url,
        retry,
    });
}

#[derive(Clone)]
pub struct BuildTracker {
    records: Records,
    clients: BuildClients,
}

impl BuildTracker {
    pub fn new(records: Records, clients: BuildClients) -> Self {
        Self { records, clients }
    }

    fn client(&self, project_id: &str) -> Option<Arc<dyn BuildClient>> {
        let client = self.clients.get(project_id);
        if client.is_none() {
            debug!(project_id = %project_id, "No build server for project");
        }
        client
    }

    /// Refresh the status of one branch from its recorded run.
    ///
    /// Returns `true` when the record was written.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn refresh_branch(&self, key: &RecordKey) -> BoardResult<bool> {
        let Some(branch) = self.records.get::<Branch>(key).await? else {
            return Ok(false);
        };
        let Some(build_id) = branch.build.build_id else {
            return Ok(false);
        };
        let Some(client) = self.client(&branch.project_id) else {
            return Ok(false);
        };
        let run = client
            .branch_run(&branch.project_id, &branch.repo_id, &branch.branch_id, build_id)
            .await?;
        let status = build_status(&run);

        // Re-read: a reconciler may have moved the branch while we waited.
        let Some(mut current) = self.records.get::<Branch>(key).await? else {
            return Ok(false);
        };
        if current.build.build_id != Some(build_id)
            || run.commit_id.as_deref() != Some(current.commit.as_str())
            || current.build.build_status == Some(status)
        {
            return Ok(false);
        }
        current.build.build_status = Some(status);
        self.records.save(&current).await?;
        debug!(branch_id = %current.branch_id, status = ?status, "Branch build status updated");
        Ok(true)
    }

    /// Refresh the status of one pull request from its recorded run.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn refresh_pull_request(&self, key: &RecordKey) -> BoardResult<bool> {
        let Some(pr) = self.records.get::<PullRequest>(key).await? else {
            return Ok(false);
        };
        let Some(build_id) = pr.build.build_id else {
            return Ok(false);
        };
        let Some(client) = self.client(&pr.project_id) else {
            return Ok(false);
        };
        let run = client
            .pull_request_run(&pr.project_id, &pr.repo_id, &pr.pull_request_id, build_id)
            .await?;
        let status = build_status(&run);

        let Some(mut current) = self.records.get::<PullRequest>(key).await? else {
            return Ok(false);
        };
        if current.build.build_id != Some(build_id)
            || !run.built_commit(&current.commit)
            || current.build.build_status == Some(status)
        {
            return Ok(false);
        }
        current.build.build_status = Some(status);
        self.records.save(&current).await?;
        debug!(pull_request_id = %current.pull_request_id, status = ?status, "Pull request build status updated");
        Ok(true)
    }

    /// Refresh every branch and pull request; with `only_unfinished`, skip
    /// the ones already green. Per-record failures are logged.
    pub async fn refresh_all(&self, only_unfinished: bool) -> BoardResult<usize> {
        let mut updated = 0;
        let branches: Vec<Branch> = self.records.list(&RecordKey::root()).await?;
        for branch in branches {
            if only_unfinished && branch.build.is_succeeded() {
                continue;
            }
            let key = Branch::key_of(&branch.project_id, &branch.repo_id, &branch.branch_id);
            match self.refresh_branch(&key).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => error!(
                    project_id = %branch.project_id,
                    repo_id = %branch.repo_id,
                    branch_id = %branch.branch_id,
                    error = %e,
                    "Build status refresh failed"
                ),
            }
        }
        let pull_requests: Vec<PullRequest> = self.records.list(&RecordKey::root()).await?;
        for pr in pull_requests {
            if only_unfinished && pr.build.is_succeeded() {
                continue;
            }
            let key = PullRequest::key_of(&pr.project_id, &pr.repo_id, &pr.pull_request_id);
            match self.refresh_pull_request(&key).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => error!(
                    project_id = %pr.project_id,
                    repo_id = %pr.repo_id,
                    pull_request_id = %pr.pull_request_id,
                    error = %e,
                    "Build status refresh failed"
                ),
            }
        }
        Ok(updated)
    }

    /// Adopt the latest run of every job in the repository's build listing.
    ///
    /// Only the id and links move; the status follows through the update
    /// notification the write produces.
    #[instrument(skip(self))]
    pub async fn seed_repo(&self, project_id: &str, repo_id: &str) -> BoardResult<usize> {
        let Some(client) = self.client(project_id) else {
            return Ok(0);
        };
        let builds = client.list_repo_builds(project_id, repo_id).await?;

        let mut seeded = 0;
        for build in builds {
            let Some(build_id) = build.latest_run.as_ref().and_then(Run::build_id) else {
                continue;
            };
            let links = BuildLinks {
                open: Some(client.console_url(project_id, repo_id, &build.display_name, build_id)),
                retry: build.links.runs.as_ref().map(|l| l.href.clone()),
            };

            let branch_key = Branch::key_of(project_id, repo_id, &build.display_name.to_lowercase());
            if let Some(mut branch) = self.records.get::<Branch>(&branch_key).await? {
                if branch.build.build_id != Some(build_id) {
                    branch.build.build_id = Some(build_id);
                    branch.build.build_links = Some(links);
                    self.records.save(&branch).await?;
                    seeded += 1;
                }
                continue;
            }

            let Some(pull_request_id) = build.display_name.strip_prefix(PULL_REQUEST_JOB_PREFIX)
            else {
                continue;
            };
            let pr_key = PullRequest::key_of(project_id, repo_id, pull_request_id);
            if let Some(mut pr) = self.records.get::<PullRequest>(&pr_key).await? {
                if pr.build.build_id != Some(build_id) {
                    pr.build.build_id = Some(build_id);
                    pr.build.build_links = Some(links);
                    self.records.save(&pr).await?;
                    seeded += 1;
                }
            }
        }
        Ok(seeded)
    }

    /// Seed every stored repository of a project with a build server.
    pub async fn seed_all(&self) -> BoardResult<usize> {
        let mut seeded = 0;
        let repos: Vec<Repo> = self.records.list(&RecordKey::root()).await?;
        for repo in repos {
            match self.seed_repo(&repo.project_id, &repo.repo_id).await {
                Ok(n) => seeded += n,
                Err(e) => error!(
                    project_id = %repo.project_id,
                    repo_id = %repo.repo_id,
                    error = %e,
                    "Build listing refresh failed"
                ),
            }
        }
        Ok(seeded)
    }

    /// Trigger a new build of a branch that already has one.
    #[instrument(skip(self))]
    pub async fn retry_branch_build(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
    ) -> BoardResult<Branch> {
        let key = Branch::key_of(
            &project_id.to_lowercase(),
            &repo_id.to_lowercase(),
            &branch_id.to_lowercase(),
        );
        let branch = self
            .records
            .get::<Branch>(&key)
            .await?
            .ok_or_else(|| BoardError::NotFound("Branch not found".to_string()))?;
        if branch.build.build_id.is_none() {
            return Err(BoardError::BadRequest(
                "No Build exists for this branch".to_string(),
            ));
        }
        let client = self.clients.get(&branch.project_id).ok_or_else(|| {
            BoardError::BadRequest("No build server configured for this project".to_string())
        })?;

        let run = client
            .trigger_branch_build(&branch.project_id, &branch.repo_id, &branch.branch_id)
            .await?;
        let console = run.build_id().map(|id| {
            client.console_url(&branch.project_id, &branch.repo_id, &branch.branch_id, id)
        });

        let mut current = self.records.get::<Branch>(&key).await?.unwrap_or(branch);
        apply_triggered(&mut current.build, &run, console);
        self.records.save(&current).await?;
        obs::emit_build_retried(
            &current.project_id,
            &current.repo_id,
            &current.branch_id,
            current.build.build_id,
        );
        Ok(current)
    }

    /// Trigger a new build of a pull request that already has one.
    #[instrument(skip(self))]
    pub async fn retry_pull_request_build(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
    ) -> BoardResult<PullRequest> {
        let key = PullRequest::key_of(
            &project_id.to_lowercase(),
            &repo_id.to_lowercase(),
            pull_request_id,
        );
        let pr = self
            .records
            .get::<PullRequest>(&key)
            .await?
            .ok_or_else(|| BoardError::NotFound("Pull-request not found".to_string()))?;
        if pr.build.build_id.is_none() {
            return Err(BoardError::BadRequest(
                "No Build exists for this pull-request".to_string(),
            ));
        }
        let client = self.clients.get(&pr.project_id).ok_or_else(|| {
            BoardError::BadRequest("No build server configured for this project".to_string())
        })?;

        let run = client
            .trigger_pull_request_build(&pr.project_id, &pr.repo_id, &pr.pull_request_id)
            .await?;
        let job = pull_request_job(&pr.pull_request_id);
        let console = run
            .build_id()
            .map(|id| client.console_url(&pr.project_id, &pr.repo_id, &job, id));

        let mut current = self.records.get::<PullRequest>(&key).await?.unwrap_or(pr);
        apply_triggered(&mut current.build, &run, console);
        self.records.save(&current).await?;
        obs::emit_build_retried(&current.project_id, &current.repo_id, &job, current.build.build_id);
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_remote::fakes::finished_run;

    fn run(state: Option<RunState>, result: Option<RunResult>) -> Run {
        Run {
            id: "1".to_string(),
            state,
            result,
            commit_id: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(build_status(&run(Some(RunState::Running), None)), BuildStatus::Progress);
        assert_eq!(build_status(&run(Some(RunState::Queued), None)), BuildStatus::Pending);
        assert_eq!(build_status(&finished_run(1, "c", true)), BuildStatus::Succeed);
        assert_eq!(build_status(&finished_run(1, "c", false)), BuildStatus::Failed);
        assert_eq!(build_status(&run(Some(RunState::Unknown), None)), BuildStatus::Unknown);
        assert_eq!(build_status(&run(None, None)), BuildStatus::Unknown);
    }

    #[test]
    fn test_apply_triggered_keeps_retry_link() {
        let mut build = Buildable {
            build_id: Some(4),
            build_status: Some(BuildStatus::Failed),
            build_links: Some(BuildLinks {
                open: Some("old".to_string()),
                retry: Some("/runs/".to_string()),
            }),
        };
        let queued = Run {
            id: "5".to_string(),
            state: Some(RunState::Queued),
            result: None,
            commit_id: None,
        };
        apply_triggered(&mut build, &queued, Some("new".to_string()));
        assert_eq!(build.build_id, Some(5));
        assert_eq!(build.build_status, Some(BuildStatus::Pending));
        let links = build.build_links.unwrap();
        assert_eq!(links.open.as_deref(), Some("new"));
        assert_eq!(links.retry.as_deref(), Some("/runs/"));
    }
}
