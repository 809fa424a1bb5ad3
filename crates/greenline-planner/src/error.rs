//! Planning errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Core(#[from] greenline_core::Error),

    #[error("failed to render workflow: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
