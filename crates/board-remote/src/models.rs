//! Remote payload shapes
//!
//! Only the fields the board reads are declared; everything else in the
//! server responses is ignored. Optional or variant fields are `Option`
//! or enums with an `Unknown` fallback.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Which page to fetch: `start = limit * page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 25;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn start(&self) -> u32 {
        self.limit.saturating_mul(self.page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default)]
    pub start: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_start: Option<u32>,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub is_last_page: bool,
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
}

impl<T> Page<T> {
    /// A page holding `values`, flagged last when `is_last_page`.
    pub fn of(request: PageRequest, values: Vec<T>, is_last_page: bool) -> Self {
        let start = request.start();
        let size = values.len() as u32;
        Self {
            start,
            next_page_start: (!is_last_page).then(|| start + size),
            size,
            limit: request.limit,
            is_last_page,
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Source control (Bitbucket Server REST)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Href {
    pub href: String,
}

/// `links: { self: [{ href }] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLinks {
    #[serde(rename = "self", default)]
    pub self_links: Vec<Href>,
}

impl RemoteLinks {
    pub fn self_href(&self) -> Option<&str> {
        self.self_links.first().map(|h| h.href.as_str())
    }

    pub fn to(href: impl Into<String>) -> Self {
        Self {
            self_links: vec![Href { href: href.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProject {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub links: RemoteLinks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepo {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<RemoteProject>,
    #[serde(default)]
    pub links: RemoteLinks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBranch {
    pub id: String,
    pub display_id: String,
    #[serde(default)]
    pub latest_commit: String,
    #[serde(default)]
    pub is_default: bool,
}

/// `fromRef` / `toRef` of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    pub display_id: String,
    #[serde(default)]
    pub latest_commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RemoteRepo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemotePullRequestState {
    Open,
    Merged,
    Superseded,
    Declined,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeOutcome {
    Clean,
    Conflicted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteReviewerStatus {
    Approved,
    Unapproved,
    NeedsWork,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUser {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(default)]
    pub links: RemoteLinks,
}

/// Author, reviewer or participant entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParticipant {
    pub user: RemoteUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RemoteReviewerStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_result: Option<MergeResult>,
    #[serde(default)]
    pub open_task_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePullRequest {
    pub id: u64,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub title: String,
    pub state: RemotePullRequestState,
    pub from_ref: RemoteRef,
    pub to_ref: RemoteRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<RemoteParticipant>,
    #[serde(default)]
    pub reviewers: Vec<RemoteParticipant>,
    #[serde(default)]
    pub properties: PullRequestProperties,
    #[serde(default)]
    pub links: RemoteLinks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Veto {
    pub summary_message: String,
    #[serde(default)]
    pub detailed_message: String,
}

/// Response of the pull request merge-status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStatus {
    pub can_merge: bool,
    #[serde(default)]
    pub conflicted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MergeOutcome>,
    #[serde(default)]
    pub vetoes: Vec<Veto>,
}

// ---------------------------------------------------------------------------
// Build server (Jenkins Blue Ocean REST)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Queued,
    Finished,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResult {
    Success,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    /// For pull request runs this may be several commits joined with `+`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
}

impl Run {
    /// Numeric build id, if the server returned one.
    pub fn build_id(&self) -> Option<u64> {
        self.id.trim().parse().ok()
    }

    /// Whether `commit` is among the commits this run built.
    pub fn built_commit(&self, commit: &str) -> bool {
        self.commit_id
            .as_deref()
            .is_some_and(|ids| ids.split('+').any(|c| c == commit))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JenkinsLink {
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchBuildLinks {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<JenkinsLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<JenkinsLink>,
}

/// One entry of the per-repository branch build listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchBuild {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_run: Option<Run>,
    #[serde(rename = "_links", default)]
    pub links: BranchBuildLinks,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_request_start_is_limit_times_page() {
        assert_eq!(PageRequest::new(0, 25).start(), 0);
        assert_eq!(PageRequest::new(3, 25).start(), 75);
    }

    #[test]
    fn pull_request_decodes_from_server_shape() {
        let pr: RemotePullRequest = serde_json::from_value(json!({
            "id": 12,
            "version": 3,
            "title": "Add login",
            "state": "OPEN",
            "fromRef": { "displayId": "feature/login", "latestCommit": "aaa" },
            "toRef": { "displayId": "develop", "latestCommit": "bbb" },
            "author": {
                "user": { "name": "jdoe", "displayName": "J Doe", "links": { "self": [{ "href": "https://scm/users/jdoe" }] } },
                "status": "UNAPPROVED"
            },
            "reviewers": [],
            "properties": { "mergeResult": { "outcome": "CLEAN", "current": true }, "openTaskCount": 2 },
            "participants": []
        }))
        .unwrap();

        assert_eq!(pr.id, 12);
        assert_eq!(pr.state, RemotePullRequestState::Open);
        assert_eq!(pr.properties.open_task_count, 2);
        assert_eq!(
            pr.properties.merge_result.map(|m| m.outcome),
            Some(MergeOutcome::Clean)
        );
        assert_eq!(
            pr.author.unwrap().user.links.self_href(),
            Some("https://scm/users/jdoe")
        );
    }

    #[test]
    fn unknown_enum_values_fall_back() {
        let run: Run = serde_json::from_value(json!({
            "id": "7",
            "state": "PAUSED",
            "result": "ABORTED"
        }))
        .unwrap();
        assert_eq!(run.state, Some(RunState::Unknown));
        assert_eq!(run.result, Some(RunResult::Other));
        assert_eq!(run.build_id(), Some(7));
    }

    #[test]
    fn run_matches_any_of_joined_commits() {
        let run = Run {
            id: "1".to_string(),
            state: Some(RunState::Finished),
            result: Some(RunResult::Success),
            commit_id: Some("abc+def".to_string()),
        };
        assert!(run.built_commit("def"));
        assert!(!run.built_commit("de"));
    }

    #[test]
    fn branch_build_reads_underscore_links() {
        let build: BranchBuild = serde_json::from_value(json!({
            "displayName": "develop",
            "latestRun": { "id": "14", "state": "FINISHED", "result": "SUCCESS", "commitId": "abc" },
            "_links": { "runs": { "href": "/blue/rest/.../develop/runs/" } }
        }))
        .unwrap();
        assert_eq!(build.latest_run.unwrap().build_id(), Some(14));
        assert!(build.links.runs.is_some());
    }
}
