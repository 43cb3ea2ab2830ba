//! globwatch core - rules, paths and bounded parallelism
//!
//! This crate holds the pieces every other globwatch crate builds on:
//! - The ordered include/exclude rule model and its toggle evaluator
//! - A copy-on-write rule set that readers can snapshot cheaply
//! - Root-relative path normalization
//! - A bounded-concurrency `for_each` that aggregates failures
//!
//! # Example
//!
//! ```
//! use globwatch_core::{evaluate, RuleKind, RuleSet};
//!
//! let rules = RuleSet::new();
//! rules.add(RuleKind::Include, "**/*.rs").unwrap();
//! rules.add(RuleKind::Exclude, "target/**").unwrap();
//!
//! assert!(evaluate(&rules.snapshot(), "/src/main.rs").included);
//! assert!(!evaluate(&rules.snapshot(), "/target/debug/build.rs").included);
//! ```

pub mod error;
pub mod parallel;
pub mod path;
pub mod rule;
pub mod rule_set;

pub use error::{Error, Result};
pub use parallel::{default_concurrency, for_each, for_each_with, AggregateError, TaskFailure};
pub use path::{index_key, relative_path, ROOT};
pub use rule::{evaluate, Evaluation, GlobPattern, PathMatcher, Rule, RuleKind};
pub use rule_set::RuleSet;
