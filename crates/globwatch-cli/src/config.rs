//! Optional JSON configuration.
//!
//! ```json
//! { "rules": [ { "include": "**/*.rs" }, { "exclude": "target/**" } ], "rate_limit_ms": 250 }
//! ```

use globwatch_watcher::RuleKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Looked up in the watched directory when `--config` isn't given.
pub const DEFAULT_CONFIG_FILE: &str = ".when.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One rule entry: exactly one of `include` / `exclude`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEntry {
    Include(String),
    Exclude(String),
}

impl RuleEntry {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleEntry::Include(_) => RuleKind::Include,
            RuleEntry::Exclude(_) => RuleKind::Exclude,
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            RuleEntry::Include(p) | RuleEntry::Exclude(p) => p,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub rules: Vec<RuleEntry>,

    #[serde(default)]
    pub rate_limit_ms: Option<u64>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `explicit` if given, else `.when.json` in `dir` if present,
    /// else an empty config.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            debug!("Using config {}", candidate.display());
            return Self::from_file(&candidate);
        }
        Ok(Self::default())
    }
}
