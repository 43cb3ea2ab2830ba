//! Change notifications broadcast by a tree.

/// A payload-free signal. Consumers re-query the tree for details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    /// Something was marked dirty.
    Dirty,

    /// The set of included entries changed.
    FilteredEntriesChanged,
}

/// Capacity of the broadcast channel. A lagging receiver only loses
/// duplicate signals, which carry no data anyway.
pub(crate) const EVENT_BUFFER: usize = 256;
