//! globwatch tree - the live mirror of a watched directory
//!
//! A [`Tree`] tracks every file and directory under one root, classifies
//! each against the current rules, and remembers which included entries
//! changed since the consumer last called [`Tree::clean`]. It is fed by a
//! parallel scan and then by individual create/change/delete calls, and it
//! broadcasts a [`ChangeEvent`] whenever something worth reacting to
//! happens.

mod event;
mod node;
mod tree;

pub use event::ChangeEvent;
pub use node::{Node, NodeKind};
pub use tree::{Tree, TreeStats};
