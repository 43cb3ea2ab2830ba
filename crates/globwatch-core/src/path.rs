//! Root-relative path handling.
//!
//! Every tracked entry is addressed by a forward-slash path relative to the
//! watched root, starting with `/`. The root itself is `/`. Lookups are
//! case-insensitive, so index keys are the lowercased relative path.

use std::path::{Component, Path};

/// The relative path of the watched root.
pub const ROOT: &str = "/";

/// Converts `full` into a path relative to `root`.
///
/// Returns `None` when `full` isn't inside `root`.
pub fn relative_path(root: &Path, full: &Path) -> Option<String> {
    let rest = full.strip_prefix(root).ok()?;

    let mut rel = String::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => {
                rel.push('/');
                rel.push_str(&part.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    if rel.is_empty() {
        rel.push_str(ROOT);
    }
    Some(rel)
}

/// Case-folded key used for index and child lookups.
pub fn index_key(rel_path: &str) -> String {
    rel_path.to_lowercase()
}

/// Returns true for the root's relative path.
pub fn is_root(rel_path: &str) -> bool {
    rel_path == ROOT
}
