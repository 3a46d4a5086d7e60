//! CreateRelease stage.
//!
//! Pass-through for now.

use board_state::{Release, ReleaseStageId};
use tracing::debug;

use super::stages::StageContext;
use crate::error::BoardResult;

// TODO: create the release in the issue tracker and store its reference on
// the release before advancing.
pub(super) async fn tick(_ctx: &StageContext, release: &mut Release) -> BoardResult<()> {
    debug!(release_id = %release.release_id, "No release tracker configured, skipping");
    release.advance_to(ReleaseStageId::DeployAcceptance);
    Ok(())
}
