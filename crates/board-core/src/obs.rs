//! Structured lifecycle events for reconciliation passes, builds and releases.
//!
//! Every emitter logs an `event = "..."` field so log pipelines can filter
//! on it regardless of the message text.

use tracing::{info, warn};

use board_state::ReleaseStageId;

use crate::reconcile::SyncStats;

/// Span tagging everything logged during one release tick with its id.
///
/// Attach with `tracing::Instrument::instrument` so it survives `.await`.
pub fn release_span(release_id: &str) -> tracing::Span {
    tracing::info_span!("board.release", release_id = %release_id)
}

/// Emit event: a reconciliation pass over `scope` finished.
pub fn emit_pass_finished(reconciler: &str, scope: &str, stats: &SyncStats, elapsed_ms: u64) {
    tracing::debug!(
        event = "reconcile.finished",
        reconciler = %reconciler,
        scope = %scope,
        seen = stats.seen,
        created = stats.created,
        updated = stats.updated,
        deleted = stats.deleted,
        elapsed_ms = elapsed_ms,
    );
}

/// Emit event: a release moved from one stage to the next.
pub fn emit_stage_advanced(release_id: &str, from: ReleaseStageId, to: ReleaseStageId) {
    info!(
        event = "release.stage_advanced",
        release_id = %release_id,
        from = %from,
        to = %to,
    );
}

/// Emit event: a release exhausted its retries and is now Failed.
pub fn emit_release_failed(release_id: &str, stage: ReleaseStageId, error: &dyn std::fmt::Display) {
    warn!(
        event = "release.failed",
        release_id = %release_id,
        stage = %stage,
        error = %error,
    );
}

/// Emit event: a build was (re)triggered for a branch or pull-request job.
pub fn emit_build_retried(project_id: &str, repo_id: &str, job: &str, build_id: Option<u64>) {
    info!(
        event = "build.retried",
        project_id = %project_id,
        repo_id = %repo_id,
        job = %job,
        build_id = ?build_id,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_span_create() {
        let _span = release_span("r-1").entered();
        emit_stage_advanced("r-1", ReleaseStageId::Init, ReleaseStageId::CreateRelease);
    }
}
