//! Init stage: validate the repository selection.

use std::collections::BTreeSet;

use board_state::{Branch, Project, Release, ReleaseStageId, Repo};

use super::stages::StageContext;
use super::DEVELOP_BRANCH;
use crate::error::{BoardError, BoardResult};

pub(super) async fn tick(ctx: &StageContext, release: &mut Release) -> BoardResult<()> {
    if release.name.trim().is_empty() {
        release.name = release.release_id.clone();
    }

    let tracked = release.tracked_repos();
    if tracked.is_empty() {
        return Err(BoardError::Validation("No repositories selected".to_string()));
    }

    let mut known_projects = BTreeSet::new();
    for (project_id, repo_id) in &tracked {
        if !known_projects.contains(project_id) {
            if ctx
                .records
                .get::<Project>(&Project::key_of(project_id))
                .await?
                .is_none()
            {
                return Err(BoardError::Validation(format!("Unknown project: {project_id}")));
            }
            known_projects.insert(project_id.clone());
        }

        if ctx
            .records
            .get::<Repo>(&Repo::key_of(project_id, repo_id))
            .await?
            .is_none()
        {
            return Err(BoardError::Validation(format!(
                "Unknown repository: {project_id}/{repo_id}"
            )));
        }
        if ctx
            .records
            .get::<Branch>(&Branch::key_of(project_id, repo_id, DEVELOP_BRANCH))
            .await?
            .is_none()
        {
            return Err(BoardError::Validation(format!(
                "Repository {project_id}/{repo_id} doesn't have a {DEVELOP_BRANCH} branch"
            )));
        }
    }

    release.advance_to(ReleaseStageId::CreateRelease);
    Ok(())
}
