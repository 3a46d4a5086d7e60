//! Repository reconciler

use async_trait::async_trait;
use board_remote::RemoteRepo;
use board_state::{Project, RecordKey, Repo, RepoLinks};
use tracing::instrument;

use super::sync::{collect_pages, converge, Convert, SyncStats};
use super::{timed_pass, Reconciler, SyncContext};
use crate::error::{BoardError, BoardResult};

struct RepoConverter<'a> {
    project_id: &'a str,
}

impl Convert for RepoConverter<'_> {
    type Remote = RemoteRepo;
    type Output = Repo;

    fn key(&self, remote: &RemoteRepo) -> RecordKey {
        Repo::key_of(self.project_id, &remote.slug.to_lowercase())
    }

    fn convert(&self, remote: RemoteRepo, _existing: Option<&Repo>) -> Repo {
        Repo {
            project_id: self.project_id.to_string(),
            repo_id: remote.slug.to_lowercase(),
            name: remote.name,
            links: RepoLinks {
                project: remote
                    .project
                    .as_ref()
                    .and_then(|p| p.links.self_href())
                    .map(str::to_string),
                repo: remote.links.self_href().map(str::to_string),
            },
        }
    }
}

/// Syncs the repositories of every known project.
pub struct RepoReconciler {
    ctx: SyncContext,
}

impl RepoReconciler {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

/// The project id of a `[project]` scope.
pub(crate) fn project_of(scope: &RecordKey) -> BoardResult<&str> {
    match scope.parts() {
        [project] => Ok(project.as_str()),
        _ => Err(BoardError::BadRequest(format!("not a project scope: {scope}"))),
    }
}

/// The `(project, repo)` ids of a `[project, repo]` scope.
pub(crate) fn repo_of(scope: &RecordKey) -> BoardResult<(&str, &str)> {
    match scope.parts() {
        [project, repo] => Ok((project.as_str(), repo.as_str())),
        _ => Err(BoardError::BadRequest(format!("not a repository scope: {scope}"))),
    }
}

/// Every stored repository key, the scope list of per-repo reconcilers.
pub(crate) async fn repo_scopes(ctx: &SyncContext) -> BoardResult<Vec<RecordKey>> {
    let mut scopes = Vec::new();
    for project in ctx.records.list::<Project>(&RecordKey::root()).await? {
        let repos: Vec<Repo> = ctx.records.list(&Project::key_of(&project.project_id)).await?;
        scopes.extend(repos.iter().map(|r| Repo::key_of(&r.project_id, &r.repo_id)));
    }
    Ok(scopes)
}

#[async_trait]
impl Reconciler for RepoReconciler {
    fn name(&self) -> &'static str {
        "repos"
    }

    async fn scopes(&self) -> BoardResult<Vec<RecordKey>> {
        let projects: Vec<Project> = self.ctx.records.list(&RecordKey::root()).await?;
        Ok(projects
            .iter()
            .map(|p| Project::key_of(&p.project_id))
            .collect())
    }

    #[instrument(skip_all, fields(scope = %scope))]
    async fn refresh(&self, scope: &RecordKey) -> BoardResult<SyncStats> {
        let project_id = project_of(scope)?;
        timed_pass(self.name(), scope, async {
            let source = &self.ctx.source;
            let repos =
                collect_pages(self.ctx.pages, |page| source.list_repos(project_id, page)).await?;
            let converter = RepoConverter { project_id };
            Ok(converge(&self.ctx.records, scope, repos, &converter).await?)
        })
        .await
    }
}
