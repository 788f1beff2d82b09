//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid questionnaire: {0}")]
    Questionnaire(#[from] guardian_types::QuestionnaireError),

    #[error("protocol error: {0}")]
    Protocol(#[from] guardian_protocol::ProtocolError),

    #[error("surface error: {0}")]
    Surface(#[from] guardian_surface::SurfaceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
