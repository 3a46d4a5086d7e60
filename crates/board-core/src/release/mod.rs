//! Release orchestration
//!
//! A release advances through ordered stages (see [`board_state::ReleaseStageId`]).
//! The orchestrator ticks every active release on an interval, dispatches
//! to the stage registered for its current stage, counts stage failures and
//! fails the release once the retry budget is spent. The release record is
//! written after every tick that changed it, so progress survives restarts.

mod create_release;
pub mod deploy_acceptance;
mod init;
pub mod orchestrator;
pub mod stages;

use std::collections::BTreeMap;

use board_state::{Release, RepoSelection};

pub use orchestrator::{ReleaseOrchestrator, DEFAULT_MAX_STAGE_RETRIES};
pub use stages::{StageContext, StageRegistry, StageRunner};

use crate::error::{BoardError, BoardResult};

pub const DEVELOP_BRANCH: &str = "develop";

/// Branch cut for a release: `release/<release id>`, lower-cased.
pub fn release_branch_name(release_id: &str) -> String {
    format!("release/{}", release_id.to_lowercase())
}

/// A new release request.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelease {
    pub release_id: Option<String>,
    pub name: Option<String>,
    pub repos: RepoSelection,
    pub exclude_repos: Option<RepoSelection>,
}

impl NewRelease {
    /// Build the release record; a missing id is generated and the name
    /// defaults to the id.
    pub fn into_release(self) -> BoardResult<Release> {
        let release_id = match self.release_id {
            Some(id) if id.trim().is_empty() => {
                return Err(BoardError::BadRequest("releaseId must not be empty".to_string()))
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        if release_id.contains('/') {
            return Err(BoardError::BadRequest(format!(
                "releaseId must not contain '/': {release_id}"
            )));
        }
        let normalize = |selection: RepoSelection| -> RepoSelection {
            selection
                .into_iter()
                .map(|(project, repos)| {
                    (
                        project.to_lowercase(),
                        repos.into_iter().map(|r| r.to_lowercase()).collect(),
                    )
                })
                .collect::<BTreeMap<_, _>>()
        };

        let mut release = Release::new(release_id, normalize(self.repos));
        release.exclude_repos = self.exclude_repos.map(normalize);
        if let Some(name) = self.name.filter(|n| !n.trim().is_empty()) {
            release.name = name;
        }
        Ok(release)
    }
}
