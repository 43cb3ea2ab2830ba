//! Error types for watch sessions.

use globwatch_core::AggregateError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur while opening or driving a session.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The directory to watch doesn't exist.
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// The path exists but isn't a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Resolving the directory failed for a reason other than absence.
    #[error("failed to resolve '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS notification facility refused the subscription.
    #[error("failed to watch '{path}': {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Scan, rule or evaluation failure from the tree.
    #[error(transparent)]
    Tree(#[from] globwatch_core::Error),

    /// A session that failed to start, as seen by every caller that was
    /// waiting on it.
    #[error(transparent)]
    Open(Arc<WatchError>),
}

impl WatchError {
    /// The per-entry failures behind a scan or rule pass, if that's what
    /// this is.
    pub fn causes(&self) -> Option<&AggregateError<globwatch_core::Error>> {
        match self {
            Self::Tree(inner) => inner.causes(),
            Self::Open(inner) => inner.causes(),
            _ => None,
        }
    }
}
