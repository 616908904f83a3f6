//! Engine error types.

use thiserror::Error;

use cliptrim_media::MediaError;
use cliptrim_models::ValidationError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected at submission; no task was created.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
