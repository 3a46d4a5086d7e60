//! Record types for the reconciled entities
//!
//! Maps the board's data model onto serde structs:
//! - `Project`, `Repo`: org structure, owned by the project/repo reconcilers
//! - `Branch`, `PullRequest`: owned by their reconcilers for identity fields
//!   and by the build tracker for the embedded [`Buildable`] fields
//!
//! Field names serialize in camelCase; that is the shape the HTTP API serves.

use serde::{Deserialize, Serialize};

use crate::storage_traits::{Collection, Record, RecordKey};

// ---------------------------------------------------------------------------
// Project / Repo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Project {
    pub fn key_of(project_id: &str) -> RecordKey {
        RecordKey::new([project_id])
    }
}

impl Record for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn key(&self) -> RecordKey {
        Self::key_of(&self.project_id)
    }
}

/// Outbound links to the source-control UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repo {
    pub project_id: String,
    pub repo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub links: RepoLinks,
}

impl Repo {
    pub fn key_of(project_id: &str, repo_id: &str) -> RecordKey {
        RecordKey::new([project_id, repo_id])
    }
}

impl Record for Repo {
    const COLLECTION: Collection = Collection::Repos;

    fn key(&self) -> RecordKey {
        Self::key_of(&self.project_id, &self.repo_id)
    }
}

// ---------------------------------------------------------------------------
// Buildable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Unknown,
    Pending,
    Progress,
    Succeed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<String>,
}

/// Build-tracking fields shared by branches and pull requests.
///
/// Owned by the build tracker. Reconcilers must carry these across
/// identity updates instead of rebuilding them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buildable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_status: Option<BuildStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_links: Option<BuildLinks>,
}

impl Buildable {
    pub fn is_succeeded(&self) -> bool {
        self.build_status == Some(BuildStatus::Succeed)
    }
}

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchType {
    Develop,
    Master,
    Release,
    OldRelease,
    Feature,
    Bugfix,
    Hotfix,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub project_id: String,
    pub repo_id: String,
    pub branch_id: String,
    pub commit: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(rename = "type")]
    pub branch_type: BranchType,
    #[serde(default)]
    pub links: RepoLinks,
    #[serde(flatten)]
    pub build: Buildable,
}

impl Branch {
    pub fn key_of(project_id: &str, repo_id: &str, branch_id: &str) -> RecordKey {
        RecordKey::new([project_id, repo_id, branch_id])
    }

    pub fn repo_key(&self) -> RecordKey {
        Repo::key_of(&self.project_id, &self.repo_id)
    }
}

impl Record for Branch {
    const COLLECTION: Collection = Collection::Branches;

    fn key(&self) -> RecordKey {
        Self::key_of(&self.project_id, &self.repo_id, &self.branch_id)
    }
}

// ---------------------------------------------------------------------------
// PullRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullRequestState {
    Open,
    Merged,
    Superseded,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullRequestType {
    Release,
    Feature,
    Bugfix,
    Hotfix,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewerStatus {
    Approved,
    Unapproved,
    NeedsWork,
}

/// Author or reviewer of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestUser {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReviewerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub project_id: String,
    pub repo_id: String,
    pub pull_request_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PullRequestState>,
    #[serde(rename = "type")]
    pub pull_request_type: PullRequestType,
    pub commit: String,
    pub from_branch: String,
    pub to_branch: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub open_tasks: u32,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub mergable: bool,
    #[serde(default)]
    pub problems: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<PullRequestUser>,
    #[serde(default)]
    pub reviewers: Vec<PullRequestUser>,
    #[serde(default)]
    pub links: PullRequestLinks,
    #[serde(flatten)]
    pub build: Buildable,
}

impl PullRequest {
    pub fn key_of(project_id: &str, repo_id: &str, pull_request_id: &str) -> RecordKey {
        RecordKey::new([project_id, repo_id, pull_request_id])
    }
}

impl Record for PullRequest {
    const COLLECTION: Collection = Collection::PullRequests;

    fn key(&self) -> RecordKey {
        Self::key_of(&self.project_id, &self.repo_id, &self.pull_request_id)
    }
}
