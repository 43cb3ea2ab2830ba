//! globwatch watcher - live sessions over a directory
//!
//! [`Session::open`] scans a directory into a [`globwatch_tree::Tree`],
//! subscribes to OS notifications and keeps the tree current. Sessions are
//! shared: opening the same directory twice yields the same instance.
//!
//! ```no_run
//! use globwatch_watcher::{RuleKind, Session};
//!
//! # async fn run() -> globwatch_watcher::Result<()> {
//! let session = Session::open(".").await?;
//! session.add_rule(RuleKind::Include, "src/**/*.rs").await?;
//!
//! let mut changes = session.subscribe();
//! while changes.recv().await.is_ok() {
//!     for node in session.tree().dirty_nodes() {
//!         println!("changed: {}", node.rel_path());
//!     }
//!     session.clean();
//! }
//! session.dispose();
//! # Ok(())
//! # }
//! ```

mod error;
mod session;
mod watcher;

pub use error::{Result, WatchError};
pub use session::Session;
pub use watcher::{translate, FsEvent, FsSubscription};

pub use globwatch_core::{Rule, RuleKind};
pub use globwatch_tree::{ChangeEvent, Node, NodeKind, TreeStats};
