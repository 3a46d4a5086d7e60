//! Release orchestrator: drives every active release one stage tick at a time.

use board_state::{Release, RecordKey};
use tracing::{error, warn, Instrument};

use super::stages::{StageContext, StageRegistry};
use crate::error::{BoardError, BoardResult};
use crate::obs;

pub const DEFAULT_MAX_STAGE_RETRIES: u32 = 5;

pub struct ReleaseOrchestrator {
    ctx: StageContext,
    registry: StageRegistry,
    max_stage_retries: u32,
}

impl ReleaseOrchestrator {
    pub fn new(ctx: StageContext, max_stage_retries: u32) -> Self {
        Self {
            ctx,
            registry: StageRegistry::default(),
            max_stage_retries,
        }
    }

    /// Tick every release that has not reached a terminal stage.
    ///
    /// Returns the number of releases ticked. A release that cannot be
    /// persisted is logged and skipped.
    pub async fn tick_all(&self) -> BoardResult<usize> {
        let releases: Vec<Release> = self.ctx.records.list(&RecordKey::root()).await?;
        let mut ticked = 0;
        for release in releases.into_iter().filter(|r| !r.is_terminal()) {
            let release_id = release.release_id.clone();
            match self
                .tick_release(release)
                .instrument(obs::release_span(&release_id))
                .await
            {
                Ok(_) => ticked += 1,
                Err(e) => error!(release_id = %release_id, error = %e, "Release tick failed"),
            }
        }
        Ok(ticked)
    }

    /// Tick one release by id.
    pub async fn tick(&self, release_id: &str) -> BoardResult<Release> {
        let release = self
            .ctx
            .records
            .get::<Release>(&Release::key_of(release_id))
            .await?
            .ok_or_else(|| BoardError::NotFound(format!("Unknown release: {release_id}")))?;
        self.tick_release(release)
            .instrument(obs::release_span(release_id))
            .await
    }

    async fn tick_release(&self, mut release: Release) -> BoardResult<Release> {
        if release.is_terminal() {
            return Ok(release);
        }
        let before = release.clone();
        release.ensure_started();
        let from = release.current_stage();

        let outcome = match self.registry.get(from) {
            Ok(runner) => runner.tick(&self.ctx, &mut release).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                let to = release.current_stage();
                if to != from {
                    obs::emit_stage_advanced(&release.release_id, from, to);
                }
            }
            Err(e) => {
                let retries = match release.current_stage_entry_mut() {
                    Some(stage) => {
                        stage.retries += 1;
                        stage.retries
                    }
                    None => self.max_stage_retries,
                };
                warn!(stage = %from, retries = retries, error = %e, "Release stage failed");
                if retries >= self.max_stage_retries {
                    release.fail(e.to_string());
                    obs::emit_release_failed(&release.release_id, from, &e);
                }
            }
        }

        if release != before {
            self.ctx.records.save(&release).await?;
        }
        Ok(release)
    }
}
