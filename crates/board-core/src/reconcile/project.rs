//! Project reconciler

use async_trait::async_trait;
use board_remote::RemoteProject;
use board_state::{Project, RecordKey};
use tracing::instrument;

use super::sync::{collect_pages, converge, Convert, SyncStats};
use super::{timed_pass, Reconciler, SyncContext};
use crate::error::BoardResult;

struct ProjectConverter;

impl Convert for ProjectConverter {
    type Remote = RemoteProject;
    type Output = Project;

    fn key(&self, remote: &RemoteProject) -> RecordKey {
        Project::key_of(&remote.key.to_lowercase())
    }

    fn convert(&self, remote: RemoteProject, _existing: Option<&Project>) -> Project {
        Project {
            project_id: remote.key.to_lowercase(),
            name: remote.name,
            description: remote.description,
        }
    }
}

/// Syncs the organisation's projects, optionally limited to an allowlist.
pub struct ProjectReconciler {
    ctx: SyncContext,
    allowlist: Option<Vec<String>>,
}

impl ProjectReconciler {
    pub fn new(ctx: SyncContext, allowlist: Option<Vec<String>>) -> Self {
        let allowlist = allowlist.map(|keys| keys.iter().map(|k| k.to_lowercase()).collect());
        Self { ctx, allowlist }
    }

    fn allowed(&self, project: &RemoteProject) -> bool {
        match &self.allowlist {
            Some(keys) => keys.contains(&project.key.to_lowercase()),
            None => true,
        }
    }
}

#[async_trait]
impl Reconciler for ProjectReconciler {
    fn name(&self) -> &'static str {
        "projects"
    }

    async fn scopes(&self) -> BoardResult<Vec<RecordKey>> {
        Ok(vec![RecordKey::root()])
    }

    #[instrument(skip_all, fields(scope = %scope))]
    async fn refresh(&self, scope: &RecordKey) -> BoardResult<SyncStats> {
        timed_pass(self.name(), scope, async {
            let source = &self.ctx.source;
            let projects = collect_pages(self.ctx.pages, |page| source.list_projects(page)).await?;
            let allowed: Vec<RemoteProject> =
                projects.into_iter().filter(|p| self.allowed(p)).collect();
            Ok(converge(&self.ctx.records, &RecordKey::root(), allowed, &ProjectConverter).await?)
        })
        .await
    }
}
