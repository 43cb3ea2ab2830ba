//! Include/exclude rules and the toggle evaluator.
//!
//! Rules are evaluated in order against a root-relative path. A rule only
//! takes effect when it would flip the current state: an include while the
//! path is excluded, or an exclude while it is included. Everything else is
//! skipped even if it matches. This makes the result depend on rule order:
//!
//! ```
//! use globwatch_core::{evaluate, Rule, RuleKind};
//!
//! let log = Rule::glob(RuleKind::Include, "**/*.log").unwrap();
//! let no_log = Rule::glob(RuleKind::Exclude, "**/*.log").unwrap();
//!
//! assert!(!evaluate(&[log.clone(), no_log.clone()], "/a/b.log").included);
//! assert!(evaluate(&[no_log, log], "/a/b.log").included);
//! ```

use crate::error::{Error, Result};
use crate::path;
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a matching rule pulls a path in or pushes it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Include,
    Exclude,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        };
        write!(f, "{}", s)
    }
}

/// Decides whether a root-relative path (`/src/main.rs`) matches.
pub trait PathMatcher: fmt::Debug + Send + Sync {
    fn is_match(&self, rel_path: &str) -> bool;

    /// Human-readable form, shown next to matched entries.
    fn pattern(&self) -> &str;
}

/// A compiled glob.
///
/// `*` and `?` stay within one path component, `**` spans directories,
/// and wildcards don't match a leading `.`. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    compiled: Pattern,
}

impl GlobPattern {
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    /// Compiles `pattern`. A leading `/` is ignored, so `/src/**` and
    /// `src/**` mean the same thing.
    pub fn new(pattern: &str) -> Result<Self> {
        let compiled =
            Pattern::new(pattern.trim_start_matches('/')).map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            raw: pattern.to_string(),
            compiled,
        })
    }
}

impl PathMatcher for GlobPattern {
    fn is_match(&self, rel_path: &str) -> bool {
        if path::is_root(rel_path) {
            return false;
        }
        self.compiled
            .matches_with(rel_path.trim_start_matches('/'), Self::OPTIONS)
    }

    fn pattern(&self) -> &str {
        &self.raw
    }
}

/// One entry in a rule set.
///
/// Cloning a rule clones the handle; equality is identity, so the same
/// pattern added twice yields two distinct rules.
#[derive(Clone)]
pub struct Rule {
    id: u64,
    kind: RuleKind,
    matcher: Arc<dyn PathMatcher>,
}

impl Rule {
    pub fn new(kind: RuleKind, matcher: impl PathMatcher + 'static) -> Self {
        Self {
            id: NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            matcher: Arc::new(matcher),
        }
    }

    /// Builds a rule from a glob, rejecting malformed patterns.
    pub fn glob(kind: RuleKind, pattern: &str) -> Result<Self> {
        Ok(Self::new(kind, GlobPattern::new(pattern)?))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.matcher.is_match(rel_path)
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Rule {}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("pattern", &self.matcher.pattern())
            .finish()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.matcher.pattern())
    }
}

/// Outcome of running the rules over one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub included: bool,
    /// The include rule that decided inclusion, if the path is included.
    pub matched: Option<Rule>,
}

/// Runs the toggle algorithm over `rules` for `rel_path`.
///
/// The root (`/`) is always excluded.
pub fn evaluate(rules: &[Rule], rel_path: &str) -> Evaluation {
    let mut result = Evaluation::default();
    if path::is_root(rel_path) {
        return result;
    }

    for rule in rules {
        let eligible = match rule.kind {
            RuleKind::Include => !result.included,
            RuleKind::Exclude => result.included,
        };

        if eligible && rule.matches(rel_path) {
            result.included = rule.kind == RuleKind::Include;
            result.matched = result.included.then(|| rule.clone());
        }
    }

    result
}
