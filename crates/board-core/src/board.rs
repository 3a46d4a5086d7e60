//! Wiring: one place that builds every component from the configuration
//! and registers the recurring jobs.

use std::sync::Arc;
use std::time::Duration;

use board_remote::{BuildClients, SourceControlClient};
use board_state::{Release, RecordKey, Records};
use tracing::info;

use crate::actions::{board_actions, ActionRegistry};
use crate::build_tracker::BuildTracker;
use crate::config::BoardConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BoardError, BoardResult};
use crate::reconcile::{
    BranchReconciler, PageSettings, ProjectReconciler, PullRequestReconciler, Reconciler,
    RepoReconciler, SyncContext,
};
use crate::release::{NewRelease, ReleaseOrchestrator, StageContext};
use crate::scheduler::{job, Job, Scheduler};

/// Delay of the one-shot project sync after startup.
pub const INITIAL_SYNC_DELAY: Duration = Duration::from_secs(1);

pub struct Board {
    config: BoardConfig,
    records: Records,
    projects: Arc<ProjectReconciler>,
    repos: Arc<RepoReconciler>,
    branches: Arc<BranchReconciler>,
    pull_requests: Arc<PullRequestReconciler>,
    tracker: BuildTracker,
    actions: Arc<ActionRegistry>,
    orchestrator: Arc<ReleaseOrchestrator>,
}

fn reconcile_job<R: Reconciler + 'static>(reconciler: Arc<R>) -> Arc<dyn Job> {
    let name = format!("reconcile.{}", reconciler.name());
    job(name, move || {
        let reconciler = reconciler.clone();
        async move {
            reconciler.refresh_all().await?;
            Ok::<_, anyhow::Error>(())
        }
    })
}

impl Board {
    pub fn new(
        config: BoardConfig,
        records: Records,
        source: Arc<dyn SourceControlClient>,
        build_clients: BuildClients,
    ) -> Self {
        let pages = PageSettings {
            max_pages: config.source_control.max_pages,
            page_limit: config.source_control.page_limit,
        };
        let ctx = SyncContext::new(records.clone(), source, pages);

        let projects = Arc::new(ProjectReconciler::new(ctx.clone(), config.project_allowlist()));
        let repos = Arc::new(RepoReconciler::new(ctx.clone()));
        let branches = Arc::new(BranchReconciler::new(ctx.clone()));
        let pull_requests = Arc::new(PullRequestReconciler::new(ctx));
        let tracker = BuildTracker::new(records.clone(), build_clients);
        let actions = Arc::new(board_actions(tracker.clone(), branches.clone()));

        let stage_ctx = StageContext {
            records: records.clone(),
            branches: branches.clone(),
            tracker: tracker.clone(),
            max_build_restarts: config.release.max_build_restarts,
        };
        let orchestrator = Arc::new(ReleaseOrchestrator::new(
            stage_ctx,
            config.release.max_stage_retries,
        ));

        Self {
            config,
            records,
            projects,
            repos,
            branches,
            pull_requests,
            tracker,
            actions,
            orchestrator,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn actions(&self) -> Arc<ActionRegistry> {
        self.actions.clone()
    }

    pub fn tracker(&self) -> &BuildTracker {
        &self.tracker
    }

    pub fn orchestrator(&self) -> Arc<ReleaseOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.repos.clone(),
            self.branches.clone(),
            self.pull_requests.clone(),
            self.tracker.clone(),
        )
    }

    /// Subscribe the dispatcher and register every recurring job.
    pub fn start(&self) -> Scheduler {
        let mut scheduler = Scheduler::new();

        let dispatcher = self.dispatcher();
        let events = self.records.watch();
        scheduler.spawn("dispatcher", move |shutdown| dispatcher.run(events, shutdown));

        let sc_interval = self.config.source_control.refresh_interval();
        scheduler.once(INITIAL_SYNC_DELAY, reconcile_job(self.projects.clone()));
        scheduler.every(sc_interval, reconcile_job(self.projects.clone()));
        scheduler.every(sc_interval, reconcile_job(self.repos.clone()));
        scheduler.every(sc_interval, reconcile_job(self.branches.clone()));
        scheduler.every(sc_interval, reconcile_job(self.pull_requests.clone()));

        let tracker = self.tracker.clone();
        scheduler.every(
            self.config.build.refresh_interval(),
            job("builds.refresh_unfinished", move || {
                let tracker = tracker.clone();
                async move {
                    tracker.seed_all().await?;
                    tracker.refresh_all(true).await?;
                    Ok::<_, anyhow::Error>(())
                }
            }),
        );

        let tracker = self.tracker.clone();
        scheduler.every(
            self.config.build.full_refresh_interval(),
            job("builds.refresh_all", move || {
                let tracker = tracker.clone();
                async move {
                    tracker.refresh_all(false).await?;
                    Ok::<_, anyhow::Error>(())
                }
            }),
        );

        let orchestrator = self.orchestrator.clone();
        scheduler.every(
            self.config.release.tick_interval(),
            job("releases.tick", move || {
                let orchestrator = orchestrator.clone();
                async move {
                    orchestrator.tick_all().await?;
                    Ok::<_, anyhow::Error>(())
                }
            }),
        );

        info!(tasks = ?scheduler.task_names(), "Board started");
        scheduler
    }

    /// Store a new release. Rejects an id that is already taken.
    pub async fn create_release(&self, request: NewRelease) -> BoardResult<Release> {
        let release = request.into_release()?;
        let key = Release::key_of(&release.release_id);
        if self.records.get::<Release>(&key).await?.is_some() {
            return Err(BoardError::BadRequest(format!(
                "Release already exists: {}",
                release.release_id
            )));
        }
        self.records.save(&release).await?;
        info!(release_id = %release.release_id, repos = release.repos.len(), "Release created");
        Ok(release)
    }

    pub async fn release(&self, release_id: &str) -> BoardResult<Release> {
        self.records
            .get::<Release>(&Release::key_of(release_id))
            .await?
            .ok_or_else(|| BoardError::NotFound(format!("Unknown release: {release_id}")))
    }

    pub async fn releases(&self) -> BoardResult<Vec<Release>> {
        Ok(self.records.list(&RecordKey::root()).await?)
    }
}
