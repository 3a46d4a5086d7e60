//! Shared fixture: a board over the in-memory store and the remote fakes.

#![allow(dead_code)]

use std::sync::Arc;

use board_core::reconcile::{
    BranchReconciler, PageSettings, ProjectReconciler, PullRequestReconciler, RepoReconciler,
    SyncContext,
};
use board_core::{Board, BoardConfig};
use board_remote::fakes::*;
use board_remote::{BuildClients, SourceControlClient};
use board_state::{
    Branch, BranchType, BuildStatus, Buildable, MemoryRecordStore, Project, RecordStore, Records,
    Repo, RepoLinks,
};

pub const PROJECT: &str = "mxts";
pub const REPO: &str = "api";

pub struct Fixture {
    pub store: Arc<MemoryRecordStore>,
    pub records: Records,
    pub scm: Arc<FakeSourceControl>,
    pub ci: Arc<FakeBuildServer>,
}

impl Fixture {
    /// Empty store; the build server is configured for `mxts` only.
    pub fn new() -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let records = Records::new(store.clone() as Arc<dyn RecordStore>);
        Self {
            store,
            records,
            scm: Arc::new(FakeSourceControl::new()),
            ci: Arc::new(FakeBuildServer::new()),
        }
    }

    pub fn build_clients(&self) -> BuildClients {
        BuildClients::new().with(PROJECT, self.ci.clone())
    }

    pub fn sync_context(&self) -> SyncContext {
        SyncContext::new(
            self.records.clone(),
            self.scm.clone() as Arc<dyn SourceControlClient>,
            PageSettings::default(),
        )
    }

    pub fn projects(&self, allowlist: Option<Vec<String>>) -> ProjectReconciler {
        ProjectReconciler::new(self.sync_context(), allowlist)
    }

    pub fn repos(&self) -> RepoReconciler {
        RepoReconciler::new(self.sync_context())
    }

    pub fn branches(&self) -> BranchReconciler {
        BranchReconciler::new(self.sync_context())
    }

    pub fn pull_requests(&self) -> PullRequestReconciler {
        PullRequestReconciler::new(self.sync_context())
    }

    pub fn board(&self, config: BoardConfig) -> Board {
        Board::new(
            config,
            self.records.clone(),
            self.scm.clone() as Arc<dyn SourceControlClient>,
            self.build_clients(),
        )
    }

    /// Seed the remote with one project and one repository.
    pub fn remote_org(&self) {
        self.scm.set_projects(vec![remote_project("MXTS")]);
        self.scm.set_repos(PROJECT, vec![remote_repo("MXTS", REPO)]);
    }

    /// Store the project and repository records directly.
    pub async fn local_org(&self) {
        self.records
            .save(&Project {
                project_id: PROJECT.to_string(),
                name: Some("MXTS".to_string()),
                description: None,
            })
            .await
            .unwrap();
        self.records
            .save(&Repo {
                project_id: PROJECT.to_string(),
                repo_id: REPO.to_string(),
                name: Some(REPO.to_string()),
                links: RepoLinks::default(),
            })
            .await
            .unwrap();
    }

    pub async fn save_branch(&self, branch_id: &str, commit: &str, build: Buildable) -> Branch {
        let branch = Branch {
            project_id: PROJECT.to_string(),
            repo_id: REPO.to_string(),
            branch_id: branch_id.to_string(),
            commit: commit.to_string(),
            is_default: branch_id == "develop",
            branch_type: if branch_id == "develop" {
                BranchType::Develop
            } else {
                BranchType::Other
            },
            links: RepoLinks::default(),
            build,
        };
        self.records.save(&branch).await.unwrap();
        branch
    }

    pub async fn branch(&self, branch_id: &str) -> Option<Branch> {
        self.records
            .get(&Branch::key_of(PROJECT, REPO, branch_id))
            .await
            .unwrap()
    }
}

pub fn built(build_id: u64, status: BuildStatus) -> Buildable {
    Buildable {
        build_id: Some(build_id),
        build_status: Some(status),
        build_links: None,
    }
}
