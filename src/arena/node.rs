//! Value nodes and their bump allocator
//!
//! Nodes live in one fixed array and are addressed by index. Index 0 is
//! the nil index: it terminates lists, marks empty head slots and is never
//! handed out, so a node arena of capacity N yields at most N - 1 nodes.
//! Nodes are never freed; a node, once linked, belongs to one site's list
//! for the rest of the run.
//!
//! Memory ordering:
//! - `value`/`count`: Relaxed; they are statistics, torn pairs are tolerated
//! - `next` (and head slots): Release on link, Acquire on walk, so a walker
//!   that reaches a node also sees the value and count it was linked with
//! - `current`: Relaxed; only moved while the profile lock is held

use crate::lock::ProfLockGuard;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use tracing::warn;

/// Index of a live value node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(NonZeroU32);

impl NodeIndex {
    /// Decode a raw link; 0 is nil
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(NodeIndex)
    }

    /// Encode as a raw link
    pub fn to_raw(self) -> u32 {
        self.0.get()
    }

    fn slot(self) -> usize {
        self.0.get() as usize
    }
}

/// One tracked value at a value site
#[derive(Debug, Default)]
pub struct ValueNode {
    value: AtomicU64,
    count: AtomicU64,
    next: AtomicU32,
}

impl ValueNode {
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Successor in the site's list
    pub fn next(&self) -> Option<NodeIndex> {
        NodeIndex::from_raw(self.next.load(Ordering::Acquire))
    }

    /// Count one more occurrence of this node's value
    pub fn hit(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the tracked value, restarting its count at one
    pub(crate) fn replace(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
        self.count.store(1, Ordering::Relaxed);
    }

    pub(crate) fn set_count(&self, count: u64) {
        self.count.store(count, Ordering::Relaxed);
    }

    /// Publish `node` as this node's successor, unless it already has one
    pub(crate) fn link_next(&self, node: NodeIndex) -> bool {
        self.next
            .compare_exchange(0, node.to_raw(), Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }
}

/// Fixed-capacity node storage with a bump pointer
#[derive(Debug)]
pub struct NodeArena {
    nodes: Box<[ValueNode]>,
    /// Last index handed out (0 = none yet)
    current: AtomicUsize,
    /// Exhaustion is reported once
    exhausted: AtomicBool,
}

impl NodeArena {
    /// Create an arena of `capacity` node slots
    pub fn new(capacity: usize) -> Self {
        let nodes = (0..capacity).map(|_| ValueNode::default()).collect();
        Self {
            nodes,
            current: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Number of node slots, the nil slot included
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes handed out so far
    pub fn allocated(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Access a node
    pub fn get(&self, index: NodeIndex) -> &ValueNode {
        &self.nodes[index.slot()]
    }

    /// Hand out the next free node, or `None` once the arena is used up.
    ///
    /// The node comes back zeroed and unlinked. Callers treat `None` as
    /// "drop this observation".
    pub(crate) fn allocate(&self, _guard: &ProfLockGuard<'_>) -> Option<NodeIndex> {
        let end = self.nodes.len();
        let current = self.current.load(Ordering::Relaxed);

        if current + 1 >= end {
            self.report_exhausted();
            return None;
        }

        let current = current + 1;
        self.current.store(current, Ordering::Relaxed);

        // The node must lie entirely within the arena
        if current >= end || current + 1 > end {
            self.report_exhausted();
            return None;
        }

        u32::try_from(current).ok().and_then(NodeIndex::from_raw)
    }

    fn report_exhausted(&self) {
        if !self.exhausted.swap(true, Ordering::Relaxed) {
            warn!(
                capacity = self.nodes.len(),
                "value node arena exhausted; further new values are dropped"
            );
        }
    }

    /// Iterate a list starting at `head`, in link order
    pub fn iter(&self, head: Option<NodeIndex>) -> ListIter<'_> {
        ListIter { arena: self, next: head }
    }
}

/// Walks one site's list
pub struct ListIter<'a> {
    arena: &'a NodeArena,
    next: Option<NodeIndex>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = (NodeIndex, &'a ValueNode);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let node = self.arena.get(index);
        self.next = node.next();
        Some((index, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::ProfLock;

    #[test]
    fn test_allocate_skips_nil_slot() {
        let arena = NodeArena::new(4);
        let lock = ProfLock::new();
        let guard = lock.lock();

        let a = arena.allocate(&guard).unwrap();
        let b = arena.allocate(&guard).unwrap();
        let c = arena.allocate(&guard).unwrap();
        assert_eq!((a.to_raw(), b.to_raw(), c.to_raw()), (1, 2, 3));
        assert_eq!(arena.allocated(), 3);
    }

    #[test]
    fn test_allocate_exhaustion() {
        let arena = NodeArena::new(3);
        let lock = ProfLock::new();
        let guard = lock.lock();

        assert!(arena.allocate(&guard).is_some());
        assert!(arena.allocate(&guard).is_some());
        assert!(arena.allocate(&guard).is_none());
        assert!(arena.allocate(&guard).is_none());
        // Failed attempts do not move the bump pointer
        assert_eq!(arena.allocated(), 2);
    }

    #[test]
    fn test_tiny_arenas_hand_out_nothing() {
        let lock = ProfLock::new();
        let guard = lock.lock();
        assert!(NodeArena::new(0).allocate(&guard).is_none());
        assert!(NodeArena::new(1).allocate(&guard).is_none());
    }

    #[test]
    fn test_link_and_iterate() {
        let arena = NodeArena::new(8);
        let lock = ProfLock::new();
        let guard = lock.lock();

        let a = arena.allocate(&guard).unwrap();
        let b = arena.allocate(&guard).unwrap();
        arena.get(a).replace(10);
        arena.get(b).replace(20);
        assert!(arena.get(a).link_next(b));
        // Already linked
        assert!(!arena.get(a).link_next(b));

        let values: Vec<_> = arena.iter(Some(a)).map(|(_, n)| n.value()).collect();
        assert_eq!(values, vec![10, 20]);
        assert_eq!(arena.iter(None).count(), 0);
    }

    #[test]
    fn test_node_counts() {
        let node = ValueNode::default();
        node.replace(42);
        node.hit();
        node.hit();
        assert_eq!(node.value(), 42);
        assert_eq!(node.count(), 3);
        node.set_count(0);
        assert_eq!(node.count(), 0);
        assert_eq!(node.value(), 42);
    }
}
