//! Host surface errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("surface already started")]
    AlreadyStarted,

    #[error("surface is not running")]
    NotRunning,

    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
