//! In-memory fakes for the remote clients (testing only)
//!
//! `FakeSourceControl` and `FakeBuildServer` serve canned data, page it the
//! way the real servers do, count calls, and fail on demand.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::build::{pull_request_job, BuildClient};
use crate::error::{RemoteError, RemoteResult};
use crate::models::*;
use crate::source_control::SourceControlClient;

/// Remote operations that can be counted and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListProjects,
    ListRepos,
    ListBranches,
    ListPullRequests,
    MergeStatus,
    CreateBranch,
    ListRepoBuilds,
    GetRun,
    TriggerBuild,
}

fn injected(op: Operation) -> RemoteError {
    RemoteError::Http {
        status: 503,
        url: format!("fake://{op:?}"),
        body: "injected failure".to_string(),
    }
}

fn page_of<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let start = (page.start() as usize).min(items.len());
    let end = (start + page.limit as usize).min(items.len());
    Page::of(page, items[start..end].to_vec(), end >= items.len())
}

type RepoKey = (String, String);

fn repo_key(project_id: &str, repo_id: &str) -> RepoKey {
    (project_id.to_lowercase(), repo_id.to_lowercase())
}

#[derive(Debug, Default)]
struct Switches {
    failing: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
}

impl Switches {
    fn enter(&mut self, op: Operation) -> RemoteResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(&op) {
            return Err(injected(op));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeSourceControl
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ScmState {
    projects: Vec<RemoteProject>,
    repos: HashMap<String, Vec<RemoteRepo>>,
    branches: HashMap<RepoKey, Vec<RemoteBranch>>,
    pull_requests: HashMap<RepoKey, Vec<RemotePullRequest>>,
    merge_status: HashMap<(String, String, String), MergeStatus>,
    created: Vec<(String, String, String, String)>,
    switches: Switches,
}

#[derive(Debug, Default)]
pub struct FakeSourceControl {
    state: Mutex<ScmState>,
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_projects(&self, projects: Vec<RemoteProject>) {
        self.state.lock().unwrap().projects = projects;
    }

    pub fn set_repos(&self, project_id: &str, repos: Vec<RemoteRepo>) {
        self.state
            .lock()
            .unwrap()
            .repos
            .insert(project_id.to_lowercase(), repos);
    }

    pub fn set_branches(&self, project_id: &str, repo_id: &str, branches: Vec<RemoteBranch>) {
        self.state
            .lock()
            .unwrap()
            .branches
            .insert(repo_key(project_id, repo_id), branches);
    }

    pub fn set_pull_requests(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_requests: Vec<RemotePullRequest>,
    ) {
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .insert(repo_key(project_id, repo_id), pull_requests);
    }

    pub fn set_merge_status(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
        status: MergeStatus,
    ) {
        let (p, r) = repo_key(project_id, repo_id);
        self.state
            .lock()
            .unwrap()
            .merge_status
            .insert((p, r, pull_request_id.to_string()), status);
    }

    pub fn fail(&self, op: Operation) {
        self.state.lock().unwrap().switches.failing.insert(op);
    }

    pub fn heal(&self, op: Operation) {
        self.state.lock().unwrap().switches.failing.remove(&op);
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.state
            .lock()
            .unwrap()
            .switches
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// `(project, repo, branch, from_ref)` of every branch created.
    pub fn created_branches(&self) -> Vec<(String, String, String, String)> {
        self.state.lock().unwrap().created.clone()
    }
}

#[async_trait]
impl SourceControlClient for FakeSourceControl {
    async fn list_projects(&self, page: PageRequest) -> RemoteResult<Page<RemoteProject>> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::ListProjects)?;
        Ok(page_of(&state.projects, page))
    }

    async fn list_repos(
        &self,
        project_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemoteRepo>> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::ListRepos)?;
        let repos = state
            .repos
            .get(&project_id.to_lowercase())
            .cloned()
            .unwrap_or_default();
        Ok(page_of(&repos, page))
    }

    async fn list_branches(
        &self,
        project_id: &str,
        repo_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemoteBranch>> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::ListBranches)?;
        let branches = state
            .branches
            .get(&repo_key(project_id, repo_id))
            .cloned()
            .unwrap_or_default();
        Ok(page_of(&branches, page))
    }

    async fn list_pull_requests(
        &self,
        project_id: &str,
        repo_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemotePullRequest>> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::ListPullRequests)?;
        let prs = state
            .pull_requests
            .get(&repo_key(project_id, repo_id))
            .cloned()
            .unwrap_or_default();
        Ok(page_of(&prs, page))
    }

    async fn pull_request_merge_status(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
    ) -> RemoteResult<MergeStatus> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::MergeStatus)?;
        let (p, r) = repo_key(project_id, repo_id);
        Ok(state
            .merge_status
            .get(&(p, r, pull_request_id.to_string()))
            .cloned()
            .unwrap_or(MergeStatus {
                can_merge: true,
                conflicted: false,
                outcome: Some(MergeOutcome::Clean),
                vetoes: Vec::new(),
            }))
    }

    async fn create_branch(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
        from_ref: &str,
    ) -> RemoteResult<RemoteBranch> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::CreateBranch)?;
        let branch = remote_branch(branch_id, from_ref);
        state
            .branches
            .entry(repo_key(project_id, repo_id))
            .or_default()
            .push(branch.clone());
        state.created.push((
            project_id.to_string(),
            repo_id.to_string(),
            branch_id.to_string(),
            from_ref.to_string(),
        ));
        Ok(branch)
    }
}

// ---------------------------------------------------------------------------
// FakeBuildServer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BuildState {
    listings: HashMap<RepoKey, Vec<BranchBuild>>,
    runs: HashMap<(String, String, String, u64), Run>,
    next_id: HashMap<(String, String, String), u64>,
    triggered: Vec<(String, String, String)>,
    switches: Switches,
}

#[derive(Debug, Default)]
pub struct FakeBuildServer {
    state: Mutex<BuildState>,
}

impl FakeBuildServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listing(&self, project_id: &str, repo_id: &str, builds: Vec<BranchBuild>) {
        self.state
            .lock()
            .unwrap()
            .listings
            .insert(repo_key(project_id, repo_id), builds);
    }

    /// Register `run` for `job` (branch id or `PR-<id>`).
    pub fn set_run(&self, project_id: &str, repo_id: &str, job: &str, run: Run) {
        let id = run.build_id().unwrap_or_default();
        let (p, r) = repo_key(project_id, repo_id);
        let mut state = self.state.lock().unwrap();
        let next = state
            .next_id
            .entry((p.clone(), r.clone(), job.to_string()))
            .or_default();
        *next = (*next).max(id);
        state.runs.insert((p, r, job.to_string(), id), run);
    }

    pub fn fail(&self, op: Operation) {
        self.state.lock().unwrap().switches.failing.insert(op);
    }

    pub fn heal(&self, op: Operation) {
        self.state.lock().unwrap().switches.failing.remove(&op);
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.state
            .lock()
            .unwrap()
            .switches
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// `(project, repo, job)` of every triggered build.
    pub fn triggered(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().triggered.clone()
    }

    fn get(&self, project_id: &str, repo_id: &str, job: &str, build_id: u64) -> RemoteResult<Run> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::GetRun)?;
        let (p, r) = repo_key(project_id, repo_id);
        state
            .runs
            .get(&(p, r, job.to_string(), build_id))
            .cloned()
            .ok_or_else(|| RemoteError::Http {
                status: 404,
                url: format!("fake://{project_id}/{repo_id}/{job}/runs/{build_id}"),
                body: "no such run".to_string(),
            })
    }

    fn trigger(&self, project_id: &str, repo_id: &str, job: &str) -> RemoteResult<Run> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::TriggerBuild)?;
        let (p, r) = repo_key(project_id, repo_id);
        let next = state
            .next_id
            .entry((p.clone(), r.clone(), job.to_string()))
            .or_default();
        *next += 1;
        let run = Run {
            id: next.to_string(),
            state: Some(RunState::Queued),
            result: None,
            commit_id: None,
        };
        let id = *next;
        state.runs.insert((p, r, job.to_string(), id), run.clone());
        state
            .triggered
            .push((project_id.to_string(), repo_id.to_string(), job.to_string()));
        Ok(run)
    }
}

#[async_trait]
impl BuildClient for FakeBuildServer {
    async fn list_repo_builds(
        &self,
        project_id: &str,
        repo_id: &str,
    ) -> RemoteResult<Vec<BranchBuild>> {
        let mut state = self.state.lock().unwrap();
        state.switches.enter(Operation::ListRepoBuilds)?;
        Ok(state
            .listings
            .get(&repo_key(project_id, repo_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn branch_run(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
        build_id: u64,
    ) -> RemoteResult<Run> {
        self.get(project_id, repo_id, branch_id, build_id)
    }

    async fn pull_request_run(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
        build_id: u64,
    ) -> RemoteResult<Run> {
        self.get(project_id, repo_id, &pull_request_job(pull_request_id), build_id)
    }

    fn console_url(&self, project_id: &str, repo_id: &str, job: &str, build_id: u64) -> String {
        format!("https://ci.fake/job/{project_id}/job/{repo_id}/job/{job}/{build_id}/console")
    }

    async fn trigger_branch_build(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
    ) -> RemoteResult<Run> {
        self.trigger(project_id, repo_id, branch_id)
    }

    async fn trigger_pull_request_build(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
    ) -> RemoteResult<Run> {
        self.trigger(project_id, repo_id, &pull_request_job(pull_request_id))
    }
}

// ---------------------------------------------------------------------------
// Builders for remote payloads
// ---------------------------------------------------------------------------

pub fn remote_project(key: &str) -> RemoteProject {
    RemoteProject {
        key: key.to_string(),
        name: Some(key.to_string()),
        description: None,
        links: RemoteLinks::to(format!("https://scm.fake/projects/{key}")),
    }
}

pub fn remote_repo(project_key: &str, slug: &str) -> RemoteRepo {
    RemoteRepo {
        slug: slug.to_string(),
        name: Some(slug.to_string()),
        project: Some(remote_project(project_key)),
        links: RemoteLinks::to(format!(
            "https://scm.fake/projects/{project_key}/repos/{slug}/browse"
        )),
    }
}

pub fn remote_branch(display_id: &str, commit: &str) -> RemoteBranch {
    RemoteBranch {
        id: format!("refs/heads/{display_id}"),
        display_id: display_id.to_string(),
        latest_commit: commit.to_string(),
        is_default: display_id == "develop",
    }
}

pub fn remote_user(name: &str) -> RemoteUser {
    RemoteUser {
        name: name.to_string(),
        display_name: Some(name.to_string()),
        email_address: Some(format!("{name}@example.com")),
        links: RemoteLinks::to(format!("https://scm.fake/users/{name}")),
    }
}

pub fn remote_pull_request(id: u64, from: &str, to: &str, commit: &str) -> RemotePullRequest {
    RemotePullRequest {
        id,
        version: 0,
        title: format!("Merge {from} into {to}"),
        state: RemotePullRequestState::Open,
        from_ref: RemoteRef {
            display_id: from.to_string(),
            latest_commit: commit.to_string(),
            repository: None,
        },
        to_ref: RemoteRef {
            display_id: to.to_string(),
            latest_commit: String::new(),
            repository: None,
        },
        author: Some(RemoteParticipant {
            user: remote_user("author"),
            status: None,
        }),
        reviewers: Vec::new(),
        properties: PullRequestProperties {
            merge_result: Some(MergeResult {
                outcome: MergeOutcome::Clean,
            }),
            open_task_count: 0,
        },
        links: RemoteLinks::to(format!("https://scm.fake/pull-requests/{id}")),
    }
}

pub fn finished_run(id: u64, commit: &str, success: bool) -> Run {
    Run {
        id: id.to_string(),
        state: Some(RunState::Finished),
        result: Some(if success {
            RunResult::Success
        } else {
            RunResult::Other
        }),
        commit_id: Some(commit.to_string()),
    }
}
