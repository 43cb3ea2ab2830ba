//! Tracked filesystem entries.
//!
//! A Node is one file or directory under the watched root, together with
//! what the rules decided about it and whether it changed since the last
//! clean. Nodes are owned by the tree's index; the parent link is weak and
//! only used to walk upwards.

use globwatch_core::{evaluate, index_key, Rule, ROOT};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// File or directory.
///
/// Directories order before files so listings show them first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Directory,
    File,
}

impl NodeKind {
    /// Looks at the entry on disk. Anything that isn't a directory,
    /// including an entry that vanished in the meantime, counts as a file.
    pub fn of(path: &Path) -> Self {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => Self::Directory,
            _ => Self::File,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Directory => "directory",
            Self::File => "file",
        };
        write!(f, "{}", s)
    }
}

pub struct Node {
    kind: NodeKind,

    /// Last path component. Empty for the root.
    name: String,

    /// Root-relative path, e.g. `/src/main.rs`.
    rel_path: String,

    full_path: PathBuf,

    parent: Option<Weak<Node>>,

    /// Keyed by lowercased name.
    children: RwLock<HashMap<String, Arc<Node>>>,

    included: AtomicBool,
    dirty: AtomicBool,
    matched_rule: RwLock<Option<Rule>>,
}

impl Node {
    pub(crate) fn root(full_path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            kind: NodeKind::Directory,
            name: String::new(),
            rel_path: ROOT.to_string(),
            full_path,
            parent: None,
            children: RwLock::new(HashMap::new()),
            included: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            matched_rule: RwLock::new(None),
        })
    }

    pub(crate) fn new(
        kind: NodeKind,
        name: String,
        rel_path: String,
        full_path: PathBuf,
        parent: &Arc<Node>,
    ) -> Self {
        Self {
            kind,
            name,
            rel_path,
            full_path,
            parent: Some(Arc::downgrade(parent)),
            children: RwLock::new(HashMap::new()),
            included: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            matched_rule: RwLock::new(None),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The parent node, if it is still alive.
    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Children with directories first, then by name.
    pub fn children(&self) -> Vec<Arc<Node>> {
        let mut children: Vec<_> = self.children.read().values().cloned().collect();
        children.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        children
    }

    /// Looks up a direct child, ignoring case.
    pub fn child(&self, name: &str) -> Option<Arc<Node>> {
        self.children.read().get(&index_key(name)).cloned()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    pub fn is_included(&self) -> bool {
        self.included.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// The include rule that pulled this node in.
    pub fn matched_rule(&self) -> Option<Rule> {
        self.matched_rule.read().clone()
    }

    /// Re-runs the rules. Returns true if inclusion flipped.
    pub(crate) fn apply_rules(&self, rules: &[Rule]) -> bool {
        let result = evaluate(rules, &self.rel_path);
        *self.matched_rule.write() = result.matched;
        let before = self.included.swap(result.included, Ordering::AcqRel);
        before != result.included
    }

    /// Sets the dirty flag if the node is included or the mark is forced.
    /// Never clears it.
    pub(crate) fn mark_dirty(&self, force: bool) {
        if force || self.is_included() {
            self.dirty.store(true, Ordering::Release);
        }
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub(crate) fn link_child(&self, child: Arc<Node>) {
        self.children.write().insert(index_key(&child.name), child);
    }

    fn unlink_child(&self, child: &Node) {
        let mut children = self.children.write();
        let key = index_key(&child.name);
        if children
            .get(&key)
            .is_some_and(|existing| std::ptr::eq(existing.as_ref(), child))
        {
            children.remove(&key);
        }
    }

    /// True if any node below this one is included.
    pub(crate) fn has_included_descendant(&self) -> bool {
        self.children
            .read()
            .values()
            .any(|child| child.is_included() || child.has_included_descendant())
    }

    /// Tears down this subtree, children first. `on_detach` runs once per
    /// node before it is unlinked from its parent.
    pub(crate) fn detach(self: &Arc<Self>, on_detach: &mut dyn FnMut(&Node)) {
        let children: Vec<_> = self.children.write().drain().map(|(_, c)| c).collect();
        for child in children {
            child.detach(on_detach);
        }

        on_detach(self);

        if let Some(parent) = self.parent() {
            parent.unlink_child(self);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("rel_path", &self.rel_path)
            .field("included", &self.is_included())
            .field("dirty", &self.is_dirty())
            .field("children", &self.child_count())
            .finish()
    }
}
