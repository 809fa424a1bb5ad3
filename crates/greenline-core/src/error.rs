//! Error types for greenline.

use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    #[error("unit '{id}' is not {expected}")]
    KindMismatch { id: String, expected: &'static str },

    #[error("command failed: `{command}`: {message}")]
    CommandFailed { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
