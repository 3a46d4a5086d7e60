//! Source-control client
//!
//! `SourceControlClient` is the seam the reconcilers depend on;
//! `BitbucketClient` implements it against the Bitbucket Server REST API
//! (`/rest/api/latest`).

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use tracing::instrument;

use crate::error::RemoteResult;
use crate::http::{HttpClient, ServerConfig};
use crate::models::*;

#[async_trait]
pub trait SourceControlClient: Send + Sync {
    async fn list_projects(&self, page: PageRequest) -> RemoteResult<Page<RemoteProject>>;

    async fn list_repos(
        &self,
        project_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemoteRepo>>;

    async fn list_branches(
        &self,
        project_id: &str,
        repo_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemoteBranch>>;

    async fn list_pull_requests(
        &self,
        project_id: &str,
        repo_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemotePullRequest>>;

    /// Merge eligibility and vetoes for one pull request.
    async fn pull_request_merge_status(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
    ) -> RemoteResult<MergeStatus>;

    /// Create `branch_id` starting at `from_ref` (branch name or commit).
    async fn create_branch(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
        from_ref: &str,
    ) -> RemoteResult<RemoteBranch>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBranchRequest<'a> {
    name: &'a str,
    start_point: &'a str,
}

/// Bitbucket Server REST client
#[derive(Debug, Clone)]
pub struct BitbucketClient {
    http: HttpClient,
}

impl BitbucketClient {
    pub fn new(config: &ServerConfig) -> RemoteResult<Self> {
        Ok(Self {
            http: HttpClient::new(config, concat!("board-remote/", env!("CARGO_PKG_VERSION")))?,
        })
    }

    pub fn base_url(&self) -> &Url {
        self.http.base_url()
    }

    fn api(&self, segments: &[&str]) -> Url {
        let mut all = vec!["rest", "api", "latest"];
        all.extend_from_slice(segments);
        self.http.url(&all)
    }

    fn paged(&self, segments: &[&str], page: PageRequest) -> Url {
        let mut url = self.api(segments);
        url.query_pairs_mut()
            .append_pair("limit", &page.limit.to_string())
            .append_pair("start", &page.start().to_string());
        url
    }
}

#[async_trait]
impl SourceControlClient for BitbucketClient {
    #[instrument(skip(self))]
    async fn list_projects(&self, page: PageRequest) -> RemoteResult<Page<RemoteProject>> {
        self.http.get_json(self.paged(&["projects"], page)).await
    }

    #[instrument(skip(self))]
    async fn list_repos(
        &self,
        project_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemoteRepo>> {
        self.http
            .get_json(self.paged(&["projects", project_id, "repos"], page))
            .await
    }

    #[instrument(skip(self))]
    async fn list_branches(
        &self,
        project_id: &str,
        repo_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemoteBranch>> {
        self.http
            .get_json(self.paged(
                &["projects", project_id, "repos", repo_id, "branches"],
                page,
            ))
            .await
    }

    #[instrument(skip(self))]
    async fn list_pull_requests(
        &self,
        project_id: &str,
        repo_id: &str,
        page: PageRequest,
    ) -> RemoteResult<Page<RemotePullRequest>> {
        self.http
            .get_json(self.paged(
                &["projects", project_id, "repos", repo_id, "pull-requests"],
                page,
            ))
            .await
    }

    #[instrument(skip(self))]
    async fn pull_request_merge_status(
        &self,
        project_id: &str,
        repo_id: &str,
        pull_request_id: &str,
    ) -> RemoteResult<MergeStatus> {
        self.http
            .get_json(self.api(&[
                "projects",
                project_id,
                "repos",
                repo_id,
                "pull-requests",
                pull_request_id,
                "merge",
            ]))
            .await
    }

    #[instrument(skip(self))]
    async fn create_branch(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
        from_ref: &str,
    ) -> RemoteResult<RemoteBranch> {
        let body = CreateBranchRequest {
            name: branch_id,
            start_point: from_ref,
        };
        self.http
            .post_json(
                self.api(&["projects", project_id, "repos", repo_id, "branches"]),
                &body,
            )
            .await
    }
}
