//! Stage registry
//!
//! Stages form a closed set. Adding one means adding a `StageRunner`
//! variant and registering it under its stage id.

use std::collections::BTreeMap;
use std::sync::Arc;

use board_state::{Release, ReleaseStageId, Records};

use super::{create_release, deploy_acceptance, init};
use crate::build_tracker::BuildTracker;
use crate::error::{BoardError, BoardResult};
use crate::reconcile::BranchReconciler;

/// What stages read and act through.
#[derive(Clone)]
pub struct StageContext {
    pub records: Records,
    pub branches: Arc<BranchReconciler>,
    pub tracker: BuildTracker,
    /// Rebuilds a stage may trigger per repository before giving up.
    pub max_build_restarts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRunner {
    Init,
    CreateRelease,
    DeployAcceptance,
}

impl StageRunner {
    pub fn stage_id(self) -> ReleaseStageId {
        match self {
            StageRunner::Init => ReleaseStageId::Init,
            StageRunner::CreateRelease => ReleaseStageId::CreateRelease,
            StageRunner::DeployAcceptance => ReleaseStageId::DeployAcceptance,
        }
    }

    /// Advance `release` by one tick. Changes are made in memory; the
    /// orchestrator persists them afterwards.
    pub async fn tick(self, ctx: &StageContext, release: &mut Release) -> BoardResult<()> {
        match self {
            StageRunner::Init => init::tick(ctx, release).await,
            StageRunner::CreateRelease => create_release::tick(ctx, release).await,
            StageRunner::DeployAcceptance => deploy_acceptance::tick(ctx, release).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: BTreeMap<ReleaseStageId, StageRunner>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        let mut registry = Self {
            stages: BTreeMap::new(),
        };
        registry.register(StageRunner::Init);
        registry.register(StageRunner::CreateRelease);
        registry.register(StageRunner::DeployAcceptance);
        registry
    }
}

impl StageRegistry {
    pub fn register(&mut self, runner: StageRunner) {
        self.stages.insert(runner.stage_id(), runner);
    }

    pub fn get(&self, stage: ReleaseStageId) -> BoardResult<StageRunner> {
        self.stages
            .get(&stage)
            .copied()
            .ok_or(BoardError::StageNotImplemented(stage))
    }

    pub fn stage_ids(&self) -> Vec<ReleaseStageId> {
        self.stages.keys().copied().collect()
    }
}
