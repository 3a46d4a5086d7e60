//! Domain-level error taxonomy for the board.

use board_remote::RemoteError;
use board_state::{ReleaseStageId, StorageError};

/// Board domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// A referenced project, repo, branch, pull request or release is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A precondition of a caller-initiated action is not met.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Release preconditions do not hold; counted against the stage's retries.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("release stage {0} is not implemented")]
    StageNotImplemented(ReleaseStageId),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BoardError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BoardError::NotFound(_))
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, BoardError::BadRequest(_) | BoardError::Validation(_))
    }
}

impl From<serde_json::Error> for BoardError {
    fn from(err: serde_json::Error) -> Self {
        BoardError::BadRequest(format!("invalid parameters: {err}"))
    }
}

/// Result type for board domain operations.
pub type BoardResult<T> = std::result::Result<T, BoardError>;
