//! HTTP API over the board: read endpoints for the mirrored model and
//! releases, plus the action routes.
//!
//! Branch ids contain `/`; clients percent-encode them in paths
//! (`feature%2Flogin`).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use board_core::actions::{BUILD, CREATE_BRANCH};
use board_core::{Board, BoardError, NewRelease};
use board_state::{
    Branch, Collection, Project, PullRequest, RecordKey, Release, Repo, StorageError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

pub type AppState = Arc<Board>;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::NotFound(msg) => ApiError::NotFound(msg),
            BoardError::BadRequest(msg) | BoardError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => {
                error!(error = %m, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `?include=branches,pullRequests` on a repository, `?include=repos` on a project.
#[derive(Debug, Default, Deserialize)]
struct IncludeParams {
    include: Option<String>,
}

impl IncludeParams {
    fn has(&self, relation: &str) -> bool {
        self.include
            .as_deref()
            .is_some_and(|list| list.split(',').any(|r| r.trim() == relation))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectView {
    #[serde(flatten)]
    project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    repos: Option<Vec<Repo>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RepoView {
    #[serde(flatten)]
    repo: Repo,
    #[serde(skip_serializing_if = "Option::is_none")]
    branches: Option<Vec<Branch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pull_requests: Option<Vec<PullRequest>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBranchBody {
    branch_id: String,
    #[serde(rename = "ref")]
    from_ref: String,
}

/// Build the API router.
pub fn router(board: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/projects", get(list_projects))
        .route("/api/projects/{project_id}", get(get_project))
        .route("/api/projects/{project_id}/repos", get(list_repos))
        .route("/api/projects/{project_id}/repos/{repo_id}", get(get_repo))
        .route(
            "/api/projects/{project_id}/repos/{repo_id}/branches",
            get(list_branches).post(create_branch),
        )
        .route(
            "/api/projects/{project_id}/repos/{repo_id}/branches/{branch_id}",
            get(get_branch),
        )
        .route(
            "/api/projects/{project_id}/repos/{repo_id}/branches/{branch_id}/build",
            post(build_branch),
        )
        .route(
            "/api/projects/{project_id}/repos/{repo_id}/pull-requests",
            get(list_pull_requests),
        )
        .route(
            "/api/projects/{project_id}/repos/{repo_id}/pull-requests/{pull_request_id}",
            get(get_pull_request),
        )
        .route(
            "/api/projects/{project_id}/repos/{repo_id}/pull-requests/{pull_request_id}/build",
            post(build_pull_request),
        )
        .route("/api/releases", get(list_releases).post(create_release))
        .route("/api/releases/{release_id}", get(get_release))
        .with_state(board)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_projects(State(board): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(board.records().list(&RecordKey::root()).await?))
}

async fn get_project(
    State(board): State<AppState>,
    Path(project_id): Path<String>,
    Query(include): Query<IncludeParams>,
) -> ApiResult<Json<ProjectView>> {
    let key = Project::key_of(&project_id.to_lowercase());
    let project: Project = board
        .records()
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown project: {project_id}")))?;
    let repos = if include.has("repos") {
        Some(board.records().list(&key).await?)
    } else {
        None
    };
    Ok(Json(ProjectView { project, repos }))
}

async fn list_repos(
    State(board): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<Repo>>> {
    let scope = Project::key_of(&project_id.to_lowercase());
    Ok(Json(board.records().list(&scope).await?))
}

async fn get_repo(
    State(board): State<AppState>,
    Path((project_id, repo_id)): Path<(String, String)>,
    Query(include): Query<IncludeParams>,
) -> ApiResult<Json<RepoView>> {
    let key = Repo::key_of(&project_id.to_lowercase(), &repo_id.to_lowercase());
    let repo: Repo = board
        .records()
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown repository: {project_id}/{repo_id}")))?;
    let branches = if include.has("branches") {
        Some(board.records().list(&key).await?)
    } else {
        None
    };
    let pull_requests = if include.has("pullRequests") {
        Some(board.records().list(&key).await?)
    } else {
        None
    };
    Ok(Json(RepoView {
        repo,
        branches,
        pull_requests,
    }))
}

async fn list_branches(
    State(board): State<AppState>,
    Path((project_id, repo_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Branch>>> {
    let scope = Repo::key_of(&project_id.to_lowercase(), &repo_id.to_lowercase());
    Ok(Json(board.records().list(&scope).await?))
}

async fn get_branch(
    State(board): State<AppState>,
    Path((project_id, repo_id, branch_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Branch>> {
    let key = Branch::key_of(
        &project_id.to_lowercase(),
        &repo_id.to_lowercase(),
        &branch_id.to_lowercase(),
    );
    board
        .records()
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Branch not found".to_string()))
}

async fn list_pull_requests(
    State(board): State<AppState>,
    Path((project_id, repo_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<PullRequest>>> {
    let scope = Repo::key_of(&project_id.to_lowercase(), &repo_id.to_lowercase());
    Ok(Json(board.records().list(&scope).await?))
}

async fn get_pull_request(
    State(board): State<AppState>,
    Path((project_id, repo_id, pull_request_id)): Path<(String, String, String)>,
) -> ApiResult<Json<PullRequest>> {
    let key = PullRequest::key_of(
        &project_id.to_lowercase(),
        &repo_id.to_lowercase(),
        &pull_request_id,
    );
    board
        .records()
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Pull request not found".to_string()))
}

async fn create_branch(
    State(board): State<AppState>,
    Path((project_id, repo_id)): Path<(String, String)>,
    Json(body): Json<CreateBranchBody>,
) -> ApiResult<impl IntoResponse> {
    let params = json!({
        "projectId": project_id,
        "repoId": repo_id,
        "branchId": body.branch_id,
        "ref": body.from_ref,
    });
    let branch = board
        .actions()
        .invoke(Collection::Branches, CREATE_BRANCH, params)
        .await?;
    Ok((StatusCode::CREATED, Json(branch)))
}

async fn build_branch(
    State(board): State<AppState>,
    Path((project_id, repo_id, branch_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let params = json!({ "projectId": project_id, "repoId": repo_id, "branchId": branch_id });
    let branch = board
        .actions()
        .invoke(Collection::Branches, BUILD, params)
        .await?;
    Ok(Json(branch))
}

async fn build_pull_request(
    State(board): State<AppState>,
    Path((project_id, repo_id, pull_request_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let params = json!({
        "projectId": project_id,
        "repoId": repo_id,
        "pullRequestId": pull_request_id,
    });
    let pr = board
        .actions()
        .invoke(Collection::PullRequests, BUILD, params)
        .await?;
    Ok(Json(pr))
}

async fn list_releases(State(board): State<AppState>) -> ApiResult<Json<Vec<Release>>> {
    Ok(Json(board.releases().await?))
}

async fn get_release(
    State(board): State<AppState>,
    Path(release_id): Path<String>,
) -> ApiResult<Json<Release>> {
    Ok(Json(board.release(&release_id).await?))
}

async fn create_release(
    State(board): State<AppState>,
    Json(request): Json<NewRelease>,
) -> ApiResult<impl IntoResponse> {
    let release = board.create_release(request).await?;
    Ok((StatusCode::CREATED, Json(release)))
}
