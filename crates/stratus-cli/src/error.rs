//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] stratus::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("domain already declared: {path}")]
    DomainExists { path: PathBuf },

    #[error("destroy confirmation token does not match the state key")]
    DestroyNotConfirmed,

    #[error("{failed} of {total} domains failed to converge")]
    PartialFailure { failed: usize, total: usize },

    #[error("prerequisite check failed: {message}")]
    Prerequisite { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn prerequisite(message: impl Into<String>) -> Self {
        Error::Prerequisite {
            message: message.into(),
        }
    }
}
