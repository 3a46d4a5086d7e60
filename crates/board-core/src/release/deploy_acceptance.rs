//! DeployAcceptance stage
//!
//! Per tracked repository, a sub-stage machine:
//!
//! | subStage | meaning |
//! |---|---|
//! | 0 | waiting for a green develop build |
//! | 1 | develop green, release branch being created |
//! | 2 | release branch exists |
//! | 3 | release branch build green |
//!
//! Failed builds are restarted a bounded number of times and drop the
//! repository back to 0. A repository's error is recorded as a warning on
//! the release and never blocks its siblings.

use board_state::{
    Branch, BuildStatus, EventLevel, Release, ReleaseRepoStatus, ReleaseStageId,
};
use tracing::{debug, warn};

use super::stages::StageContext;
use super::{release_branch_name, DEVELOP_BRANCH};
use crate::error::{BoardError, BoardResult};

pub const SUB_STAGE_WAITING: u8 = 0;
pub const SUB_STAGE_CREATING_BRANCH: u8 = 1;
pub const SUB_STAGE_BRANCH_EXISTS: u8 = 2;
pub const SUB_STAGE_DONE: u8 = 3;

/// Restarts after which every further restart is reported.
const QUIET_RESTARTS: u32 = 2;

type Events = Vec<(EventLevel, String)>;

pub(super) async fn tick(ctx: &StageContext, release: &mut Release) -> BoardResult<()> {
    release.ensure_started();
    let release_branch = release_branch_name(&release.release_id);
    let tracked = release.tracked_repos();

    for (project_id, repo_id) in &tracked {
        let mut status = repo_status(release, project_id, repo_id)?;
        let mut events = Events::new();

        if let Err(e) = step(ctx, &release_branch, &mut status, &mut events).await {
            events.push((EventLevel::Warning, e.to_string()));
            status.retries += 1;
        }

        for (level, message) in events {
            if level == EventLevel::Warning {
                warn!(project_id = %project_id, repo_id = %repo_id, "{message}");
            }
            release.log(level, message, Some((project_id.as_str(), repo_id.as_str())));
        }
        *repo_status_mut(release, project_id, repo_id)? = status;
    }

    let done = tracked.iter().all(|(p, r)| {
        release
            .current_stage_entry()
            .and_then(|stage| {
                stage
                    .repos
                    .iter()
                    .find(|s| &s.project_id == p && &s.repo_id == r)
            })
            .is_some_and(|s| s.sub_stage == SUB_STAGE_DONE)
    });
    if done {
        release.advance_to(ReleaseStageId::ScheduleProduction);
    }
    Ok(())
}

fn repo_status_mut<'a>(
    release: &'a mut Release,
    project_id: &str,
    repo_id: &str,
) -> BoardResult<&'a mut ReleaseRepoStatus> {
    let stage = release.current_stage_entry_mut().ok_or_else(|| {
        BoardError::Validation("release has no running stage".to_string())
    })?;
    Ok(stage.repo_mut(project_id, repo_id))
}

fn repo_status(release: &mut Release, project_id: &str, repo_id: &str) -> BoardResult<ReleaseRepoStatus> {
    repo_status_mut(release, project_id, repo_id).map(|s| s.clone())
}

/// One repository, one tick.
async fn step(
    ctx: &StageContext,
    release_branch: &str,
    status: &mut ReleaseRepoStatus,
    events: &mut Events,
) -> BoardResult<()> {
    let project_id = status.project_id.clone();
    let repo_id = status.repo_id.clone();

    let existing: Option<Branch> = ctx
        .records
        .get(&Branch::key_of(&project_id, &repo_id, release_branch))
        .await?;

    let Some(branch) = existing else {
        let develop: Option<Branch> = ctx
            .records
            .get(&Branch::key_of(&project_id, &repo_id, DEVELOP_BRANCH))
            .await?;
        let Some(develop) = develop else {
            events.push((
                EventLevel::Warning,
                format!("Repository {project_id}/{repo_id} doesn't have a {DEVELOP_BRANCH} branch"),
            ));
            return Ok(());
        };
        if develop.build.build_id.is_none() {
            events.push((
                EventLevel::Warning,
                format!("No build found for the {DEVELOP_BRANCH} branch of {project_id}/{repo_id}"),
            ));
            return Ok(());
        }

        match develop.build.build_status {
            Some(BuildStatus::Succeed) => {
                status.sub_stage = SUB_STAGE_CREATING_BRANCH;
                events.push((EventLevel::Info, format!("Create branch {release_branch}")));
                if let Err(e) = ctx
                    .branches
                    .create_branch(&project_id, &repo_id, release_branch, &develop.commit)
                    .await
                {
                    events.push((
                        EventLevel::Warning,
                        format!("Failed to create branch {release_branch}: {e}"),
                    ));
                }
            }
            Some(BuildStatus::Failed) => restart_build(ctx, status, &develop, events).await?,
            other => debug!(project_id = %project_id, repo_id = %repo_id, status = ?other, "Waiting for develop build"),
        }
        return Ok(());
    };

    if !status.release_branch_seen {
        status.release_branch_seen = true;
        status.build_restarts = 0;
    }
    status.sub_stage = status.sub_stage.max(SUB_STAGE_BRANCH_EXISTS);
    match branch.build.build_status {
        Some(BuildStatus::Succeed) => status.sub_stage = SUB_STAGE_DONE,
        Some(BuildStatus::Failed) => restart_build(ctx, status, &branch, events).await?,
        _ => {}
    }
    Ok(())
}

/// Drop back to waiting and rebuild `branch` while restarts remain.
async fn restart_build(
    ctx: &StageContext,
    status: &mut ReleaseRepoStatus,
    branch: &Branch,
    events: &mut Events,
) -> BoardResult<()> {
    status.sub_stage = SUB_STAGE_WAITING;
    if status.build_restarts >= ctx.max_build_restarts {
        return Ok(());
    }
    status.build_restarts += 1;
    ctx.tracker
        .retry_branch_build(&branch.project_id, &branch.repo_id, &branch.branch_id)
        .await?;
    if status.build_restarts > QUIET_RESTARTS {
        events.push((
            EventLevel::Warning,
            format!(
                "Restart failed build for the {} branch of {}/{}",
                branch.branch_id, branch.project_id, branch.repo_id
            ),
        ));
    }
    Ok(())
}
