//! Copy-on-write rule sequence.
//!
//! Readers take a snapshot (`Arc<[Rule]>`) and evaluate against it for as
//! long as they like. Writers build a whole new sequence and swap it in, so
//! a reader never sees a half-applied add or remove.

use crate::error::Result;
use crate::rule::{Rule, RuleKind};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct RuleSet {
    current: RwLock<Arc<[Rule]>>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// The rules as of now, in insertion order.
    pub fn snapshot(&self) -> Arc<[Rule]> {
        Arc::clone(&self.current.read())
    }

    /// Compiles `pattern` and appends it. A malformed pattern is rejected
    /// before the published sequence is touched.
    pub fn add(&self, kind: RuleKind, pattern: &str) -> Result<Rule> {
        let rule = Rule::glob(kind, pattern)?;
        self.push(rule.clone());
        Ok(rule)
    }

    /// Appends an already built rule.
    pub fn push(&self, rule: Rule) {
        let mut current = self.current.write();
        let mut next = current.to_vec();
        debug!("Adding rule {}", rule);
        next.push(rule);
        *current = Arc::from(next);
    }

    /// Removes `rule`, keeping the order of the others.
    ///
    /// Returns false if the rule wasn't in the set.
    pub fn remove(&self, rule: &Rule) -> bool {
        let mut current = self.current.write();
        if !current.contains(rule) {
            return false;
        }

        let next: Vec<Rule> = current.iter().filter(|r| *r != rule).cloned().collect();
        debug!("Removing rule {}", rule);
        *current = Arc::from(next);
        true
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_preserves_insertion_order() {
        let set = RuleSet::new();
        let a = set.add(RuleKind::Include, "**/*.rs").unwrap();
        let b = set.add(RuleKind::Exclude, "target/**").unwrap();
        let c = set.add(RuleKind::Include, "*.toml").unwrap();

        assert_eq!(&*set.snapshot(), &[a, b, c]);
    }

    #[test]
    fn test_remove_keeps_survivor_order() {
        let set = RuleSet::new();
        let a = set.add(RuleKind::Include, "a").unwrap();
        let b = set.add(RuleKind::Include, "b").unwrap();
        let c = set.add(RuleKind::Include, "c").unwrap();

        assert!(set.remove(&b));
        assert_eq!(&*set.snapshot(), &[a, c]);
        assert!(!set.remove(&b));
    }

    #[test]
    fn test_old_snapshot_is_unaffected() {
        let set = RuleSet::new();
        set.add(RuleKind::Include, "a").unwrap();
        let before = set.snapshot();

        set.add(RuleKind::Exclude, "b").unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_bad_pattern_leaves_set_untouched() {
        let set = RuleSet::new();
        set.add(RuleKind::Include, "*.md").unwrap();
        let before = set.snapshot();

        assert!(set.add(RuleKind::Include, "**x").is_err());
        assert!(Arc::ptr_eq(&before, &set.snapshot()));
    }
}
