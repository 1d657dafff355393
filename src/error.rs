// src/error.rs

//! Crate-wide error type.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not acquire an exclusive lock on '{0}'")]
    Locked(PathBuf),

    #[error("database index '{0}' does not exist")]
    Missing(PathBuf),

    #[error("the database index '{path}' already exists")]
    AlreadyExists { path: PathBuf },

    #[error("invalid database index '{path}': {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("'{command}' failed: {reason}")]
    ChildFailed { command: String, reason: String },

    /// Raised internally by the Rollback Engine for conditions it warns
    /// about and skips rather than aborting the whole rollback for.
    #[error("{0}")]
    Recoverable(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}
