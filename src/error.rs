use std::path::PathBuf;
use thiserror::Error;

/// Persisted content could not be turned into a document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document: {source}")]
    Malformed {
        #[from]
        source: serde_json::Error,
    },
}

impl ParseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ParseError::NotFound(_))
    }
}

/// A write to the backing file failed. The in-memory document is untouched.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("no file path to save to")]
    NoPath,

    #[error("a save is already in progress")]
    Busy,

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum WatchSetupError {
    #[error("cannot watch {}: path has no parent directory", .0.display())]
    NoParent(PathBuf),

    #[error("failed to start watching {}: {source}", path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to spawn coalescing thread: {0}")]
    Thread(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
