//! Watch sessions.
//!
//! A Session binds one directory to its tree, its rules and its OS
//! subscription. There is at most one per directory in the process:
//! `Session::open` hands every caller the same instance, and the first
//! caller's scan is the only scan.

use crate::error::{Result, WatchError};
use crate::watcher::{FsEvent, FsSubscription};
use globwatch_core::{Rule, RuleKind, RuleSet};
use globwatch_tree::{ChangeEvent, Node, Tree};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info};

/// What a slot settles to. A failure is kept so that callers already
/// waiting on the slot see it instead of starting again.
type Opened = std::result::Result<Arc<Session>, Arc<WatchError>>;

type Slot = Arc<OnceCell<Opened>>;

/// Open or opening sessions, keyed by normalized root.
static SESSIONS: Lazy<Mutex<HashMap<String, Slot>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub struct Session {
    root: PathBuf,
    key: String,
    rules: Arc<RuleSet>,
    tree: Arc<Tree>,
    subscription: Mutex<Option<FsSubscription>>,
    disposed: AtomicBool,
}

impl Session {
    /// Returns the session for `dir`, creating it if needed.
    ///
    /// The first caller subscribes to OS events and scans the directory;
    /// everyone else, concurrent or later, waits for and shares that
    /// instance. Fails with `DirectoryNotFound` if `dir` doesn't exist, or
    /// with the scan's aggregated causes if the scan fails. A failed open
    /// leaves nothing behind, so the next call starts over.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Arc<Session>> {
        let root = normalize(dir.as_ref())?;
        let key = registry_key(&root);

        open_slot(&key, || Session::start(root.clone(), key.clone())).await
    }

    async fn start(root: PathBuf, key: String) -> Result<Arc<Session>> {
        let rules = Arc::new(RuleSet::new());
        let tree = Arc::new(Tree::new(root.clone(), Arc::clone(&rules)));

        let events = Arc::clone(&tree);
        let subscription = FsSubscription::start(&root, move |event| apply(&events, event))
            .map_err(|source| WatchError::Watch {
                path: root.clone(),
                source,
            })?;

        let session = Arc::new(Session {
            root,
            key,
            rules,
            tree,
            subscription: Mutex::new(Some(subscription)),
            disposed: AtomicBool::new(false),
        });

        session.tree.scan().await?;

        info!(
            "Session ready for {} ({} entries)",
            session.root.display(),
            session.tree.len()
        );
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    /// The node for the watched directory itself.
    pub fn root_node(&self) -> Option<Arc<Node>> {
        self.tree.root()
    }

    /// Current rules, in evaluation order.
    pub fn rules(&self) -> Arc<[Rule]> {
        self.rules.snapshot()
    }

    /// Appends a glob rule and re-evaluates the tree.
    ///
    /// A malformed pattern is rejected before the rule list changes.
    pub async fn add_rule(&self, kind: RuleKind, pattern: &str) -> Result<Rule> {
        let rule = self.rules.add(kind, pattern)?;
        self.tree.update_matches().await?;
        Ok(rule)
    }

    /// Appends a prebuilt rule (e.g. one with a custom matcher) and
    /// re-evaluates the tree.
    pub async fn push_rule(&self, rule: Rule) -> Result<()> {
        self.rules.push(rule);
        self.tree.update_matches().await?;
        Ok(())
    }

    /// Removes `rule` and re-evaluates the tree. Returns false, without
    /// re-evaluating, if the rule wasn't registered.
    pub async fn remove_rule(&self, rule: &Rule) -> Result<bool> {
        if !self.rules.remove(rule) {
            return Ok(false);
        }
        self.tree.update_matches().await?;
        Ok(true)
    }

    /// Acknowledges all pending dirty state.
    pub fn clean(&self) {
        self.tree.clean();
    }

    /// Receives `Dirty` and `FilteredEntriesChanged` signals.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tree.subscribe()
    }

    /// Feeds one filesystem event into the tree, exactly as the OS
    /// subscription does.
    pub fn apply_event(&self, event: FsEvent) {
        apply(&self.tree, event);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Releases the OS subscription, forgets every node and removes the
    /// session from the registry so the directory can be opened afresh.
    /// Safe to call more than once; also runs on drop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Take our registry entry out under the lock, drop it after.
        let removed = {
            let mut sessions = SESSIONS.lock();
            let ours = sessions.get(&self.key).is_some_and(|slot| {
                matches!(slot.get(), Some(Ok(session)) if std::ptr::eq(session.as_ref(), self))
            });
            if ours {
                sessions.remove(&self.key)
            } else {
                None
            }
        };

        drop(self.subscription.lock().take());
        self.tree.empty();
        drop(removed);

        info!("Session for {} disposed", self.root.display());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("rules", &self.rules.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Settles the registry slot for `key`, running `start` only if no caller
/// has yet. Everyone waiting on the same slot gets the same outcome; a
/// failed or disposed slot is then dropped so the next call starts over.
async fn open_slot<F, Fut>(key: &str, start: F) -> Result<Arc<Session>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Arc<Session>>>,
{
    loop {
        let slot = Arc::clone(SESSIONS.lock().entry(key.to_string()).or_default());

        let opened = slot
            .get_or_init(|| async { start().await.map_err(Arc::new) })
            .await;

        match opened {
            Ok(session) if !session.is_disposed() => return Ok(Arc::clone(session)),
            Ok(_) => {
                // Disposed between init and now; drop the stale slot.
                forget(key, &slot);
            }
            Err(err) => {
                let err = WatchError::Open(Arc::clone(err));
                forget(key, &slot);
                return Err(err);
            }
        }
    }
}

fn apply(tree: &Tree, event: FsEvent) {
    match event {
        FsEvent::Created(path) => tree.process_create(&path),
        FsEvent::Changed(path) => tree.mark_dirty(&path, false),
        FsEvent::Deleted(path) => tree.delete(&path),
        FsEvent::Renamed { from, to } => {
            tree.delete(&from);
            tree.process_create(&to);
        }
    }
}

/// Drops `slot` from the registry if it is still the one for `key`.
fn forget(key: &str, slot: &Slot) {
    let removed = {
        let mut sessions = SESSIONS.lock();
        if sessions
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            sessions.remove(key)
        } else {
            None
        }
    };
    if removed.is_some() {
        debug!("Forgot session slot for {}", key);
    }
}

fn normalize(dir: &Path) -> Result<PathBuf> {
    let root = dir.canonicalize().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            WatchError::DirectoryNotFound(dir.to_path_buf())
        } else {
            WatchError::Io {
                path: dir.to_path_buf(),
                source,
            }
        }
    })?;

    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root));
    }
    Ok(root)
}

/// Registry key for a canonical root. Case-folded where the filesystem
/// usually is case-insensitive.
fn registry_key(root: &Path) -> String {
    let key = root.to_string_lossy().into_owned();
    if cfg!(any(windows, target_os = "macos")) {
        key.to_lowercase()
    } else {
        key
    }
}
