//! Error types for the core crate.
//!
//! Errors stay small: a bad pattern is caught before it reaches a rule set,
//! and filesystem failures carry the path that failed.

use crate::parallel::AggregateError;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience type for fallible core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Things that can go wrong while evaluating rules or walking a tree.
#[derive(Error, Debug)]
pub enum Error {
    /// The glob could not be compiled. Raised when the rule is built,
    /// so a rule set never holds a broken pattern.
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Reading an entry from disk failed.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more entries failed during a scan. The causes are the
    /// error's source.
    #[error("scan failed with {} error(s)", .0.len())]
    Scan(#[source] AggregateError<Error>),

    /// One or more nodes failed during a rule re-evaluation pass.
    #[error("rule evaluation failed with {} error(s)", .0.len())]
    Match(#[source] AggregateError<Error>),
}

impl Error {
    /// Creates an IO error with the path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the aggregated causes when this error came out of a
    /// bounded parallel run.
    pub fn causes(&self) -> Option<&AggregateError<Error>> {
        match self {
            Self::Scan(aggregate) | Self::Match(aggregate) => Some(aggregate),
            _ => None,
        }
    }
}
