//! Release record and its stage/event history
//!
//! A release moves through ordered stages. The record keeps the current
//! stage, one history entry per stage attempt (exactly one `Running` entry
//! while the release is active) and an append-only event log. The
//! transition helpers here are the only way stage history is mutated.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{Collection, Record, RecordKey};

/// Ordered release stages, serialized as their numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ReleaseStageId {
    Init,
    CreateRelease,
    DeployAcceptance,
    ScheduleProduction,
    PrepareRelease,
    DeployProduction,
    PostReleaseChecks,
    Succeed,
    Failed,
}

impl ReleaseStageId {
    pub const ALL: [ReleaseStageId; 9] = [
        ReleaseStageId::Init,
        ReleaseStageId::CreateRelease,
        ReleaseStageId::DeployAcceptance,
        ReleaseStageId::ScheduleProduction,
        ReleaseStageId::PrepareRelease,
        ReleaseStageId::DeployProduction,
        ReleaseStageId::PostReleaseChecks,
        ReleaseStageId::Succeed,
        ReleaseStageId::Failed,
    ];

    pub fn number(self) -> u16 {
        match self {
            ReleaseStageId::Init => 0,
            ReleaseStageId::CreateRelease => 10,
            ReleaseStageId::DeployAcceptance => 20,
            ReleaseStageId::ScheduleProduction => 30,
            ReleaseStageId::PrepareRelease => 40,
            ReleaseStageId::DeployProduction => 50,
            ReleaseStageId::PostReleaseChecks => 60,
            ReleaseStageId::Succeed => 100,
            ReleaseStageId::Failed => 101,
        }
    }

    /// Human readable stage name.
    pub fn display_name(self) -> &'static str {
        match self {
            ReleaseStageId::Init => "Init",
            ReleaseStageId::CreateRelease => "Create Release",
            ReleaseStageId::DeployAcceptance => "Deploy to Acceptance",
            ReleaseStageId::ScheduleProduction => "Schedule Production Release",
            ReleaseStageId::PrepareRelease => "Pre Release Checks",
            ReleaseStageId::DeployProduction => "Deploy to Production",
            ReleaseStageId::PostReleaseChecks => "Post Release",
            ReleaseStageId::Succeed => "Succeed",
            ReleaseStageId::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self >= ReleaseStageId::Succeed
    }
}

impl From<ReleaseStageId> for u16 {
    fn from(id: ReleaseStageId) -> Self {
        id.number()
    }
}

impl TryFrom<u16> for ReleaseStageId {
    type Error = String;

    fn try_from(n: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|id| id.number() == n)
            .ok_or_else(|| format!("unknown release stage id {n}"))
    }
}

impl fmt::Display for ReleaseStageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Failed,
    Succeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Info,
    Warning,
    Fatal,
}

/// Per-repository progress inside one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRepoStatus {
    pub project_id: String,
    pub repo_id: String,
    #[serde(default)]
    pub sub_stage: u8,
    /// Failures while processing this repository.
    #[serde(default)]
    pub retries: u32,
    /// Builds restarted by the stage for the current sub-stage.
    #[serde(default)]
    pub build_restarts: u32,
    /// The release branch has been observed; its restarts count from then on.
    #[serde(default)]
    pub release_branch_seen: bool,
}

impl ReleaseRepoStatus {
    pub fn new(project_id: impl Into<String>, repo_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            repo_id: repo_id.into(),
            sub_stage: 0,
            retries: 0,
            build_restarts: 0,
            release_branch_seen: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStage {
    pub stage_id: ReleaseStageId,
    pub name: String,
    pub status: StageStatus,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub repos: Vec<ReleaseRepoStatus>,
}

impl ReleaseStage {
    pub fn running(stage_id: ReleaseStageId) -> Self {
        Self {
            stage_id,
            name: stage_id.display_name().to_string(),
            status: StageStatus::Running,
            retries: 0,
            repos: Vec::new(),
        }
    }

    /// Sub-status for a repository, created on first access.
    pub fn repo_mut(&mut self, project_id: &str, repo_id: &str) -> &mut ReleaseRepoStatus {
        let idx = match self
            .repos
            .iter()
            .position(|r| r.project_id == project_id && r.repo_id == repo_id)
        {
            Some(idx) => idx,
            None => {
                self.repos.push(ReleaseRepoStatus::new(project_id, repo_id));
                self.repos.len() - 1
            }
        };
        &mut self.repos[idx]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEvent {
    pub level: EventLevel,
    pub message: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<ReleaseStageId>,
    #[serde(default)]
    pub stages: Vec<ReleaseStage>,
    #[serde(default)]
    pub events: Vec<ReleaseEvent>,
}

/// `projectId -> [repoId]`
pub type RepoSelection = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub release_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repos: RepoSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_repos: Option<RepoSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReleaseStatus>,
}

impl Release {
    pub fn new(release_id: impl Into<String>, repos: RepoSelection) -> Self {
        let release_id = release_id.into();
        Self {
            name: release_id.clone(),
            release_id,
            repos,
            exclude_repos: None,
            status: None,
        }
    }

    pub fn key_of(release_id: &str) -> RecordKey {
        RecordKey::new([release_id])
    }

    /// Current stage; an unset status means the release has not started.
    pub fn current_stage(&self) -> ReleaseStageId {
        self.status
            .as_ref()
            .and_then(|s| s.current_stage)
            .unwrap_or(ReleaseStageId::Init)
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage().is_terminal()
    }

    pub fn status_mut(&mut self) -> &mut ReleaseStatus {
        self.status.get_or_insert_with(ReleaseStatus::default)
    }

    /// Make sure the current stage has a `Running` history entry.
    ///
    /// Returns `true` when the record was changed and needs saving.
    pub fn ensure_started(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        let current = self.current_stage();
        let status = self.status_mut();
        let mut changed = false;
        if status.current_stage.is_none() {
            status.current_stage = Some(current);
            changed = true;
        }
        let has_running = status
            .stages
            .iter()
            .any(|s| s.stage_id == current && s.status == StageStatus::Running);
        if !has_running {
            status.stages.push(ReleaseStage::running(current));
            changed = true;
        }
        changed
    }

    /// The `Running` history entry of the current stage.
    pub fn current_stage_entry_mut(&mut self) -> Option<&mut ReleaseStage> {
        let current = self.current_stage();
        self.status.as_mut().and_then(|s| {
            s.stages
                .iter_mut()
                .rev()
                .find(|st| st.stage_id == current && st.status == StageStatus::Running)
        })
    }

    pub fn current_stage_entry(&self) -> Option<&ReleaseStage> {
        let current = self.current_stage();
        self.status.as_ref().and_then(|s| {
            s.stages
                .iter()
                .rev()
                .find(|st| st.stage_id == current && st.status == StageStatus::Running)
        })
    }

    /// Close the running stage as succeeded and start `next`.
    pub fn advance_to(&mut self, next: ReleaseStageId) {
        let status = self.status_mut();
        for stage in status.stages.iter_mut() {
            if stage.status == StageStatus::Running {
                stage.status = StageStatus::Succeed;
            }
        }
        status.current_stage = Some(next);
        if !next.is_terminal() {
            status.stages.push(ReleaseStage::running(next));
        }
        self.log(EventLevel::Info, format!("Stage: {}", next.display_name()), None);
    }

    /// Move to `Failed`, closing every running stage entry.
    pub fn fail(&mut self, message: impl Into<String>) {
        let status = self.status_mut();
        for stage in status.stages.iter_mut() {
            if stage.status == StageStatus::Running {
                stage.status = StageStatus::Failed;
            }
        }
        status.current_stage = Some(ReleaseStageId::Failed);
        self.log(EventLevel::Fatal, message, None);
    }

    /// Append an event, optionally scoped to `(project, repo)`.
    pub fn log(&mut self, level: EventLevel, message: impl Into<String>, scope: Option<(&str, &str)>) {
        let event = ReleaseEvent {
            level,
            message: message.into(),
            time: Utc::now(),
            project_id: scope.map(|(p, _)| p.to_string()),
            repo_id: scope.map(|(_, r)| r.to_string()),
        };
        self.status_mut().events.push(event);
    }

    pub fn is_excluded(&self, project_id: &str, repo_id: &str) -> bool {
        self.exclude_repos.as_ref().is_some_and(|ex| {
            ex.iter().any(|(p, repos)| {
                p.eq_ignore_ascii_case(project_id)
                    && repos.iter().any(|r| r.eq_ignore_ascii_case(repo_id))
            })
        })
    }

    /// Selected `(project, repo)` pairs, lower-cased, minus exclusions.
    pub fn tracked_repos(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (project, repos) in &self.repos {
            for repo in repos {
                if self.is_excluded(project, repo) {
                    continue;
                }
                out.push((project.to_lowercase(), repo.to_lowercase()));
            }
        }
        out
    }
}

impl Record for Release {
    const COLLECTION: Collection = Collection::Releases;

    fn key(&self) -> RecordKey {
        Self::key_of(&self.release_id)
    }
}
