//! The in-memory mirror of a watched directory.
//!
//! The tree owns every node through a concurrent index keyed by the
//! lowercased relative path. Structural changes (create, delete, reset) are
//! serialized by one lock so a node is never in the index without also being
//! linked into its parent. Reads go straight to the index.

use crate::event::{ChangeEvent, EVENT_BUFFER};
use crate::node::{Node, NodeKind};
use dashmap::DashMap;
use globwatch_core::path::is_root;
use globwatch_core::{
    for_each, for_each_with, index_key, relative_path, Error, Result, RuleSet, ROOT,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Re-evaluation runs one node at a time so passes never race each other
/// on the same node's fields.
const MATCH_CONCURRENCY: usize = 1;

/// Counts describing the current state of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    /// Nodes in the index, including the root.
    pub nodes: usize,

    pub included: usize,

    pub dirty: usize,

    /// Number of full scans started since the tree was created.
    pub scans: u64,
}

pub struct Tree {
    root: PathBuf,
    rules: Arc<RuleSet>,
    nodes: DashMap<String, Arc<Node>>,

    /// Nodes waiting for `clean`, keyed like the index.
    dirty: Mutex<HashMap<String, Arc<Node>>>,

    structure: Mutex<()>,
    query_version: AtomicU64,
    scans: AtomicU64,
    events: broadcast::Sender<ChangeEvent>,
}

impl Tree {
    /// Creates an empty tree for `root`. Nothing is tracked until `scan`.
    ///
    /// `root` should already be canonical; event paths are matched against
    /// it by prefix.
    pub fn new(root: impl Into<PathBuf>, rules: Arc<RuleSet>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            root: root.into(),
            rules,
            nodes: DashMap::new(),
            dirty: Mutex::new(HashMap::new()),
            structure: Mutex::new(()),
            query_version: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            events,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Rebuilds the tree from disk.
    ///
    /// Drops every node and pending dirty mark, then walks the root with
    /// bounded parallelism. If any entry can't be read the whole scan fails
    /// with every cause attached. The scan's own population is cleaned
    /// before returning, so it never shows up as dirty.
    pub async fn scan(self: &Arc<Self>) -> Result<()> {
        let start = Instant::now();
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.reset();

        info!("Scanning {}", self.root.display());

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .into_iter();

        let tree = Arc::clone(self);
        for_each(walker, move |entry: walkdir::Result<DirEntry>| {
            let entry = entry.map_err(walk_error)?;
            let kind = if entry.file_type().is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            tree.create(entry.path(), kind);
            Ok::<_, Error>(())
        })
        .await
        .map_err(Error::Scan)?;

        self.clean();

        info!(
            "Scanned {} entries under {} in {:?}",
            self.nodes.len(),
            self.root.display(),
            start.elapsed()
        );
        Ok(())
    }

    /// Starts tracking `full_path`, creating any missing ancestors.
    ///
    /// Does nothing if the path is already tracked, lies outside the root,
    /// or the tree hasn't been scanned yet.
    pub fn process_create(&self, full_path: &Path) {
        let kind = NodeKind::of(full_path);
        self.create(full_path, kind);
    }

    /// Flags a tracked entry as changed.
    ///
    /// Only included entries become dirty unless `force` is set. Untracked
    /// paths are ignored.
    pub fn mark_dirty(&self, full_path: &Path, force: bool) {
        if let Some(node) = self.get(full_path) {
            self.mark_node_dirty(&node, force);
        }
    }

    /// Stops tracking `full_path` and everything below it.
    ///
    /// If the removed subtree held anything included, the parent is marked
    /// dirty. Removed nodes leave the dirty set too. Untracked paths are
    /// ignored.
    pub fn delete(&self, full_path: &Path) {
        let Some(rel) = relative_path(&self.root, full_path) else {
            return;
        };

        let _structure = self.structure.lock();
        let Some(node) = self.lookup(&rel) else {
            return;
        };

        if node.is_included() || node.has_included_descendant() {
            if let Some(parent) = node.parent() {
                self.mark_node_dirty(&parent, true);
            }
        }

        let mut removed = 0usize;
        let mut dirty = self.dirty.lock();
        node.detach(&mut |detached: &Node| {
            let key = index_key(detached.rel_path());
            self.nodes
                .remove_if(&key, |_, indexed| std::ptr::eq(indexed.as_ref(), detached));
            if dirty
                .get(&key)
                .is_some_and(|marked| std::ptr::eq(marked.as_ref(), detached))
            {
                dirty.remove(&key);
            }
            removed += 1;
        });
        drop(dirty);

        debug!("Deleted {} ({} entries)", rel, removed);
    }

    /// Acknowledges every pending change.
    pub fn clean(&self) {
        let drained = std::mem::take(&mut *self.dirty.lock());
        for node in drained.into_values() {
            node.clear_dirty();
        }
    }

    /// Re-evaluates every tracked node against the current rules.
    ///
    /// Fires a single `FilteredEntriesChanged` afterwards if any node flipped.
    /// Starting another pass makes this one stop touching nodes; whatever it
    /// already changed stays changed.
    pub async fn update_matches(self: &Arc<Self>) -> Result<()> {
        let expect = self.query_version.fetch_add(1, Ordering::SeqCst) + 1;
        let rules = self.rules.snapshot();
        let nodes: Vec<Arc<Node>> = self.nodes.iter().map(|e| Arc::clone(e.value())).collect();
        let changed = Arc::new(AtomicBool::new(false));

        let tree = Arc::clone(self);
        let flag = Arc::clone(&changed);
        for_each_with(nodes, MATCH_CONCURRENCY, move |node: Arc<Node>| {
            if tree.query_version.load(Ordering::SeqCst) != expect {
                return Ok(());
            }
            if node.apply_rules(&rules) {
                flag.store(true, Ordering::SeqCst);
            }
            Ok::<_, Error>(())
        })
        .await
        .map_err(Error::Match)?;

        if changed.load(Ordering::SeqCst) {
            debug!("Rule pass {} changed the filtered set", expect);
            self.notify(ChangeEvent::FilteredEntriesChanged);
        }
        Ok(())
    }

    /// Drops every node and dirty mark without rescanning.
    pub fn empty(&self) {
        let _structure = self.structure.lock();
        self.nodes.clear();
        self.dirty.lock().clear();
    }

    pub fn root(&self) -> Option<Arc<Node>> {
        self.lookup(ROOT)
    }

    pub fn get(&self, full_path: &Path) -> Option<Arc<Node>> {
        let rel = relative_path(&self.root, full_path)?;
        self.lookup(&rel)
    }

    /// Looks up a node by its root-relative path, ignoring case.
    pub fn get_relative(&self, rel_path: &str) -> Option<Arc<Node>> {
        self.lookup(rel_path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dirty nodes still in the index, sorted by path.
    pub fn dirty_nodes(&self) -> Vec<Arc<Node>> {
        let mut dirty: Vec<_> = self
            .dirty
            .lock()
            .values()
            .filter(|node| node.is_dirty())
            .cloned()
            .collect();
        dirty.sort_by(|a, b| a.rel_path().cmp(b.rel_path()));
        dirty
    }

    /// Included nodes, sorted by path.
    pub fn included_nodes(&self) -> Vec<Arc<Node>> {
        let mut included: Vec<_> = self
            .nodes
            .iter()
            .filter(|e| e.value().is_included())
            .map(|e| Arc::clone(e.value()))
            .collect();
        included.sort_by(|a, b| a.rel_path().cmp(b.rel_path()));
        included
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes: self.nodes.len(),
            included: self.nodes.iter().filter(|e| e.value().is_included()).count(),
            dirty: self.dirty_nodes().len(),
            scans: self.scans.load(Ordering::SeqCst),
        }
    }

    fn lookup(&self, rel_path: &str) -> Option<Arc<Node>> {
        self.nodes
            .get(&index_key(rel_path))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn reset(&self) {
        let _structure = self.structure.lock();
        self.dirty.lock().clear();
        self.nodes.clear();
        self.nodes
            .insert(ROOT.to_string(), Node::root(self.root.clone()));
    }

    fn create(&self, full_path: &Path, kind: NodeKind) -> Option<Arc<Node>> {
        let _structure = self.structure.lock();
        self.demand(full_path, kind)
    }

    /// Returns the node for `full_path`, building it and any missing
    /// ancestors. Caller holds the structure lock.
    fn demand(&self, full_path: &Path, kind: NodeKind) -> Option<Arc<Node>> {
        let rel = relative_path(&self.root, full_path)?;
        if let Some(existing) = self.lookup(&rel) {
            return Some(existing);
        }
        // Only a scan creates the root.
        if is_root(&rel) {
            return None;
        }

        let parent = self.demand(full_path.parent()?, NodeKind::Directory)?;
        let name = full_path.file_name()?.to_string_lossy().into_owned();
        let key = index_key(&rel);
        let node = Arc::new(Node::new(
            kind,
            name,
            rel,
            full_path.to_path_buf(),
            &parent,
        ));

        let changed = node.apply_rules(&self.rules.snapshot());
        parent.link_child(Arc::clone(&node));
        self.nodes.insert(key, Arc::clone(&node));
        debug!("Tracking {} {}", node.kind(), node.rel_path());

        if changed {
            self.notify(ChangeEvent::FilteredEntriesChanged);
        }
        if node.is_included() {
            self.mark_node_dirty(&parent, true);
        }

        Some(node)
    }

    fn mark_node_dirty(&self, node: &Arc<Node>, force: bool) {
        node.mark_dirty(force);
        self.dirty
            .lock()
            .insert(index_key(node.rel_path()), Arc::clone(node));
        self.notify(ChangeEvent::Dirty);
    }

    fn notify(&self, event: ChangeEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn walk_error(err: walkdir::Error) -> Error {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    Error::io(path, err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use globwatch_core::{PathMatcher, Rule, RuleKind};
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Builds `{root}/a/b.txt`, `{root}/a/c.log`, `{root}/readme.md`.
    fn fixture() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("a").join("b.txt"), "b").unwrap();
        fs::write(root.join("a").join("c.log"), "c").unwrap();
        fs::write(root.join("readme.md"), "hi").unwrap();
        (dir, root)
    }

    async fn scanned(root: &Path, rules: &[(RuleKind, &str)]) -> Arc<Tree> {
        let set = Arc::new(RuleSet::new());
        for (kind, pattern) in rules {
            set.add(*kind, pattern).unwrap();
        }
        let tree = Arc::new(Tree::new(root, set));
        tree.scan().await.unwrap();
        tree
    }

    fn drain(rx: &mut broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_scan_builds_linked_tree() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**/*.txt")]).await;

        assert_eq!(tree.len(), 5);
        let top = tree.root().unwrap();
        assert_eq!(top.child_count(), 2);

        let a = top.child("a").unwrap();
        assert_eq!(a.kind(), NodeKind::Directory);
        assert_eq!(a.child_count(), 2);

        let b = tree.get(&root.join("a").join("b.txt")).unwrap();
        assert!(b.is_included());
        assert_eq!(b.parent().unwrap().rel_path(), "/a");
        assert!(!tree.get_relative("/readme.md").unwrap().is_included());
    }

    #[tokio::test]
    async fn test_scan_leaves_nothing_dirty() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**")]).await;

        assert!(tree.dirty_nodes().is_empty());
        assert_eq!(tree.stats().dirty, 0);
        assert!(tree.root().unwrap().children().iter().all(|n| !n.is_dirty()));
    }

    #[tokio::test]
    async fn test_rescan_discards_previous_state() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[]).await;
        tree.process_create(&root.join("ghost.txt"));
        assert_eq!(tree.len(), 6);

        tree.scan().await.unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.stats().scans, 2);
    }

    #[tokio::test]
    async fn test_scan_of_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let tree = Arc::new(Tree::new(missing, Arc::new(RuleSet::new())));

        let err = tree.scan().await.unwrap_err();
        assert!(matches!(err, Error::Scan(ref agg) if agg.len() == 1));
    }

    #[tokio::test]
    async fn test_process_create_is_idempotent() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[]).await;
        let path = root.join("new.txt");
        fs::write(&path, "x").unwrap();

        tree.process_create(&path);
        tree.process_create(&path);

        assert_eq!(tree.len(), 6);
        assert_eq!(tree.root().unwrap().child_count(), 3);
    }

    #[tokio::test]
    async fn test_process_create_materializes_ancestors() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[]).await;

        tree.process_create(&root.join("x").join("y").join("z.txt"));

        let x = tree.get_relative("/x").unwrap();
        assert_eq!(x.kind(), NodeKind::Directory);
        let y = x.child("y").unwrap();
        assert_eq!(y.kind(), NodeKind::Directory);
        assert_eq!(y.child("z.txt").unwrap().kind(), NodeKind::File);
        assert_eq!(tree.len(), 8);
    }

    #[tokio::test]
    async fn test_create_outside_root_or_before_scan_is_ignored() {
        let (_dir, root) = fixture();
        let tree = Arc::new(Tree::new(&root, Arc::new(RuleSet::new())));
        tree.process_create(&root.join("a").join("b.txt"));
        assert!(tree.is_empty());

        tree.scan().await.unwrap();
        tree.process_create(Path::new("/definitely/elsewhere.txt"));
        assert_eq!(tree.len(), 5);
    }

    #[tokio::test]
    async fn test_included_create_dirties_parent() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**/*.txt")]).await;
        let mut rx = tree.subscribe();

        tree.process_create(&root.join("a").join("new.txt"));

        let a = tree.get_relative("/a").unwrap();
        assert!(!a.is_included());
        assert!(a.is_dirty());
        let events = drain(&mut rx);
        assert!(events.contains(&ChangeEvent::FilteredEntriesChanged));
        assert!(events.contains(&ChangeEvent::Dirty));
    }

    #[tokio::test]
    async fn test_excluded_create_is_quiet() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**/*.txt")]).await;
        let mut rx = tree.subscribe();

        tree.process_create(&root.join("a").join("new.bin"));

        assert!(!tree.get_relative("/a").unwrap().is_dirty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("a").join("b.txt"), "b").unwrap();

        let tree = scanned(&root, &[(RuleKind::Include, "**/*.txt")]).await;
        assert!(tree.get_relative("/a/b.txt").unwrap().is_included());

        tree.delete(&root.join("a"));

        assert!(tree.get_relative("/a").is_none());
        assert!(tree.get_relative("/a/b.txt").is_none());
        assert_eq!(tree.len(), 1);
        let top = tree.root().unwrap();
        assert!(top.is_dirty());
        assert_eq!(top.child_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_drops_dirty_marks() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "*.md")]).await;
        let readme = root.join("readme.md");

        tree.mark_dirty(&readme, false);
        tree.delete(&readme);

        let dirty: Vec<_> = tree
            .dirty_nodes()
            .iter()
            .map(|node| node.rel_path().to_string())
            .collect();
        assert_eq!(dirty, vec!["/"]);
        assert_eq!(tree.stats().dirty, 1);
    }

    #[tokio::test]
    async fn test_cascade_delete_drops_nested_dirty_marks() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**/*.txt")]).await;
        tree.mark_dirty(&root.join("a").join("b.txt"), false);
        tree.mark_dirty(&root.join("a"), true);

        tree.delete(&root.join("a"));

        let dirty = tree.dirty_nodes();
        assert_eq!(dirty.len(), 1);
        assert!(dirty[0].is_root());
    }

    #[tokio::test]
    async fn test_delete_of_excluded_subtree_is_quiet() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "*.md")]).await;

        tree.delete(&root.join("a"));

        assert_eq!(tree.len(), 2);
        assert!(!tree.root().unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_mark_dirty_guard() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**/*.txt")]).await;
        let log = root.join("a").join("c.log");

        tree.mark_dirty(&log, false);
        assert!(!tree.get(&log).unwrap().is_dirty());

        tree.mark_dirty(&log, true);
        assert!(tree.get(&log).unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_untracked_paths_are_noops() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**")]).await;
        let mut rx = tree.subscribe();

        tree.mark_dirty(&root.join("missing.txt"), true);
        tree.delete(&root.join("missing.txt"));
        tree.delete(&root.join("missing.txt"));

        assert!(drain(&mut rx).is_empty());
        assert_eq!(tree.len(), 5);
    }

    #[tokio::test]
    async fn test_clean_is_exhaustive() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[(RuleKind::Include, "**")]).await;
        let b = root.join("a").join("b.txt");
        let md = root.join("readme.md");

        tree.mark_dirty(&b, false);
        tree.mark_dirty(&md, false);
        assert_eq!(tree.dirty_nodes().len(), 2);

        tree.clean();

        assert!(tree.dirty_nodes().is_empty());
        assert!(!tree.get(&b).unwrap().is_dirty());
        assert!(!tree.get(&md).unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_update_matches_signals_once() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[]).await;
        let mut rx = tree.subscribe();

        tree.rules().add(RuleKind::Include, "**/*").unwrap();
        tree.update_matches().await.unwrap();

        assert_eq!(drain(&mut rx), vec![ChangeEvent::FilteredEntriesChanged]);
        assert_eq!(tree.included_nodes().len(), 4);

        // Nothing flips on a second pass.
        tree.update_matches().await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_update_matches_keeps_dirty_marks() {
        let (_dir, root) = fixture();
        let rules = [(RuleKind::Include, "**/*.txt")];
        let tree = scanned(&root, &rules).await;
        let b = root.join("a").join("b.txt");
        tree.mark_dirty(&b, false);

        let rule = tree.rules().snapshot()[0].clone();
        tree.rules().remove(&rule);
        tree.update_matches().await.unwrap();

        let node = tree.get(&b).unwrap();
        assert!(!node.is_included());
        assert!(node.is_dirty());
    }

    #[tokio::test]
    async fn test_scan_with_rules_reports_filtered_changes() {
        let (_dir, root) = fixture();
        let set = Arc::new(RuleSet::new());
        set.add(RuleKind::Include, "*.md").unwrap();
        let tree = Arc::new(Tree::new(&root, set));
        let mut rx = tree.subscribe();

        tree.scan().await.unwrap();

        assert!(drain(&mut rx).contains(&ChangeEvent::FilteredEntriesChanged));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_stay_reachable() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let tree = scanned(&root, &[(RuleKind::Include, "**/*.txt")]).await;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tree = Arc::clone(&tree);
                let root = root.clone();
                std::thread::spawn(move || {
                    for j in 0..20 {
                        let path = root.join(format!("d{}", j % 4)).join(format!("f{i}_{j}.txt"));
                        tree.process_create(&path);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        fn count(node: &Arc<Node>) -> usize {
            1 + node.children().iter().map(count).sum::<usize>()
        }
        assert_eq!(tree.len(), 1 + 4 + 160);
        assert_eq!(count(&tree.root().unwrap()), tree.len());
    }

    /// Matches everything, and on its first call moves the tree's query
    /// version forward as if a newer pass had just started.
    struct Supersede {
        tree: Arc<OnceLock<Weak<Tree>>>,
        calls: Arc<AtomicUsize>,
    }

    impl std::fmt::Debug for Supersede {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("Supersede")
        }
    }

    impl PathMatcher for Supersede {
        fn is_match(&self, _rel_path: &str) -> bool {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(tree) = self.tree.get().and_then(Weak::upgrade) {
                    tree.query_version.fetch_add(1, Ordering::SeqCst);
                }
            }
            true
        }

        fn pattern(&self) -> &str {
            "supersede"
        }
    }

    #[tokio::test]
    async fn test_superseded_pass_stops_touching_nodes() {
        let (_dir, root) = fixture();
        let tree = scanned(&root, &[]).await;

        let handle = Arc::new(OnceLock::new());
        handle.set(Arc::downgrade(&tree)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let stale = Rule::new(
            RuleKind::Include,
            Supersede {
                tree: Arc::clone(&handle),
                calls: Arc::clone(&calls),
            },
        );

        tree.rules().push(stale.clone());
        tree.update_matches().await.unwrap();

        // Only the node that saw the newer version start was touched.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tree.included_nodes().len(), 1);

        tree.rules().remove(&stale);
        tree.rules().add(RuleKind::Include, "**/*.txt").unwrap();
        tree.update_matches().await.unwrap();

        let included: Vec<_> = tree
            .included_nodes()
            .iter()
            .map(|node| node.rel_path().to_string())
            .collect();
        assert_eq!(included, vec!["/a/b.txt"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
