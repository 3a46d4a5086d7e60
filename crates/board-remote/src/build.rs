//! Build-server client
//!
//! `BuildClient` is what the build tracker talks to; `JenkinsClient`
//! implements it over the Jenkins Blue Ocean REST API. Build servers are
//! configured per project, so clients are looked up through
//! [`BuildClients`]; a project without one is a normal condition.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::instrument;

use crate::error::RemoteResult;
use crate::http::{HttpClient, ServerConfig};
use crate::models::{BranchBuild, Run};

/// Job name the build server uses for a pull request.
pub fn pull_request_job(pull_request_id: &str) -> String {
    format!("PR-{pull_request_id}")
}

#[async_trait]
pub trait BuildClient: Send + Sync {
    /// Every branch/PR job of a repository with its latest run.
    async fn list_repo_builds(&self, project_id: &str, repo_id: &str)
        -> RemoteResult<Vec<BranchBuild>>;

    async fn branch_run(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
        build_id: u64,
    ) -> RemoteResult<Run>;

    async fn pull_request_run(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
        build_id: u64,
    ) -> RemoteResult<Run>;

    /// Link to the console output of a run of `job` (branch id or `PR-<id>`).
    fn console_url(&self, project_id: &str, repo_id: &str, job: &str, build_id: u64) -> String;

    async fn trigger_branch_build(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
    ) -> RemoteResult<Run>;

    async fn trigger_pull_request_build(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
    ) -> RemoteResult<Run>;
}

/// Jenkins (Blue Ocean) REST client
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    http: HttpClient,
}

impl JenkinsClient {
    pub fn new(config: &ServerConfig) -> RemoteResult<Self> {
        Ok(Self {
            http: HttpClient::new(config, concat!("board-remote/", env!("CARGO_PKG_VERSION")))?,
        })
    }

    /// `/blue/rest/organizations/jenkins/pipelines/{project}/{repo}/branches/...`
    fn pipeline(&self, project_id: &str, repo_id: &str, rest: &[&str]) -> Url {
        let mut segments = vec![
            "blue",
            "rest",
            "organizations",
            "jenkins",
            "pipelines",
            project_id,
            repo_id,
            "branches",
        ];
        segments.extend_from_slice(rest);
        segments.push("");
        self.http.url(&segments)
    }

    async fn run(&self, project_id: &str, repo_id: &str, job: &str, build_id: u64) -> RemoteResult<Run> {
        let id = build_id.to_string();
        self.http
            .get_json(self.pipeline(project_id, repo_id, &[job, "runs", id.as_str()]))
            .await
    }

    async fn trigger(&self, project_id: &str, repo_id: &str, job: &str) -> RemoteResult<Run> {
        self.http
            .post_json(
                self.pipeline(project_id, repo_id, &[job, "runs"]),
                &serde_json::json!({}),
            )
            .await
    }
}

#[async_trait]
impl BuildClient for JenkinsClient {
    #[instrument(skip(self))]
    async fn list_repo_builds(
        &self,
        project_id: &str,
        repo_id: &str,
    ) -> RemoteResult<Vec<BranchBuild>> {
        self.http
            .get_json(self.pipeline(project_id, repo_id, &[]))
            .await
    }

    #[instrument(skip(self))]
    async fn branch_run(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
        build_id: u64,
    ) -> RemoteResult<Run> {
        self.run(project_id, repo_id, branch_id, build_id).await
    }

    #[instrument(skip(self))]
    async fn pull_request_run(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
        build_id: u64,
    ) -> RemoteResult<Run> {
        self.run(project_id, repo_id, &pull_request_job(pull_request_id), build_id)
            .await
    }

    fn console_url(&self, project_id: &str, repo_id: &str, job: &str, build_id: u64) -> String {
        let id = build_id.to_string();
        self.http
            .url(&["job", project_id, "job", repo_id, "job", job, id.as_str(), "console"])
            .to_string()
    }

    #[instrument(skip(self))]
    async fn trigger_branch_build(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
    ) -> RemoteResult<Run> {
        self.trigger(project_id, repo_id, branch_id).await
    }

    #[instrument(skip(self))]
    async fn trigger_pull_request_build(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
    ) -> RemoteResult<Run> {
        self.trigger(project_id, repo_id, &pull_request_job(pull_request_id))
            .await
    }
}

/// Build clients keyed by lower-cased project id.
#[derive(Clone, Default)]
pub struct BuildClients {
    clients: HashMap<String, Arc<dyn BuildClient>>,
}

impl BuildClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// One Jenkins client per configured project.
    pub fn from_servers<'a, I>(servers: I) -> RemoteResult<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a ServerConfig)>,
    {
        let mut clients = Self::new();
        for (project_id, config) in servers {
            clients.insert(project_id, Arc::new(JenkinsClient::new(config)?));
        }
        Ok(clients)
    }

    pub fn insert(&mut self, project_id: &str, client: Arc<dyn BuildClient>) {
        self.clients.insert(project_id.to_lowercase(), client);
    }

    pub fn with(mut self, project_id: &str, client: Arc<dyn BuildClient>) -> Self {
        self.insert(project_id, client);
        self
    }

    pub fn get(&self, project_id: &str) -> Option<Arc<dyn BuildClient>> {
        self.clients.get(&project_id.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
