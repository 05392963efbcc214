//! Concurrent B+ tree with linked leaves.
//!
//! An order-`ORDER` B+ tree mapping each key to a value set. Leaves
//! are chained left-to-right for range scans; internal nodes route by
//! half-open separator intervals.
//!
//! # Concurrency protocol
//!
//! - **Insertion** is two-phase. The optimistic phase (`optimistic.rs`)
//!   lock-couples shared guards to the leaf's parent, takes the leaf
//!   exclusively, and commits only if the leaf cannot overflow.
//!   Otherwise it backs out without mutating and the pessimistic phase
//!   (`locked.rs`) re-descends under the tree-wide latch with exclusive
//!   guards, releasing held ancestors as soon as a descendant is
//!   split-safe — classical top-down crabbing.
//! - **Search and range scans** (`scan.rs`) lock-couple shared guards;
//!   a range scan then walks the leaf chain the same way. Scans are
//!   snapshot-free under concurrency.
//! - **Deletion** (`remove.rs`) runs entirely under the tree latch with
//!   exclusive locks down the descent path, reusing the classical
//!   borrow-then-merge rebalancing.
//!
//! Root replacement (height growth on a root split, collapse on
//! drain) is published through a root cell; every descent validates by
//! pointer identity right after locking its first node and retries on
//! mismatch. Locks are always taken root-to-leaf and siblings
//! left-to-right, and the latch strictly before any node lock, so no
//! acquisition cycle exists.
//!
//! # Example
//!
//! ```rust
//! use triplex::BPlusTree;
//!
//! let tree: BPlusTree<String, u32> = BPlusTree::new();
//! tree.insert("b".into(), 1);
//! tree.insert("a".into(), 2);
//! tree.insert("a".into(), 3);
//!
//! let range = tree.range_search(&"a".to_string(), &"z".to_string());
//! assert_eq!(range.len(), 2);
//! assert_eq!(range[&"a".to_string()].len(), 2);
//! ```

mod locked;
mod node;
mod optimistic;
mod remove;
mod scan;
mod validate;

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::index::{Index, OrderedIndex, RangeMap, ValueSet};
use crate::tracing_helpers::debug_log;

use node::{NodeInner, NodeRef};

pub use validate::TreeStats;

/// Default branching factor; see [`BPlusTree`].
pub const DEFAULT_ORDER: usize = 64;

// ============================================================================
//  BPlusTree
// ============================================================================

/// A concurrent, ordered, multi-valued index backed by a B+ tree.
///
/// `ORDER` is the branching factor: leaves hold up to `ORDER` keys,
/// internal nodes up to `ORDER` children, and every non-root node
/// stays at or above half full. Larger orders mean flatter trees and
/// coarser lock granularity; the default of 64 suits string keys.
pub struct BPlusTree<K, V, const ORDER: usize = DEFAULT_ORDER> {
    /// The root cell. Replaced only on root split (under the tree
    /// latch) and root collapse; readers validate by pointer identity
    /// after locking the node it pointed to.
    root: RwLock<NodeRef<K, V>>,

    /// Tree-wide write latch. Serializes pessimistic inserts and
    /// removals until their descent proves the root cannot change.
    tree_latch: Mutex<()>,
}

impl<K, V, const ORDER: usize> BPlusTree<K, V, ORDER>
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    /// Leaves hold at most `ORDER` keys.
    pub(crate) const MAX_KEYS_LEAF: usize = ORDER;
    /// Non-root leaves hold at least `⌈ORDER/2⌉` keys.
    pub(crate) const MIN_KEYS_LEAF: usize = ORDER.div_ceil(2);
    /// Internal nodes hold at most `ORDER` children, so one key fewer.
    pub(crate) const MAX_KEYS_INTERNAL: usize = ORDER - 1;
    /// Non-root internal nodes hold at least `⌈ORDER/2⌉` children.
    pub(crate) const MIN_KEYS_INTERNAL: usize = ORDER.div_ceil(2) - 1;

    /// Create an empty tree (a single empty leaf as root).
    ///
    /// # Panics
    /// Panics if `ORDER` is less than 3.
    #[must_use]
    pub fn new() -> Self {
        assert!(ORDER >= 3, "BPlusTree requires order >= 3");

        Self {
            root: RwLock::new(NodeInner::empty_leaf().into_ref()),
            tree_latch: Mutex::new(()),
        }
    }

    /// Snapshot the current root handle.
    #[inline]
    pub(crate) fn load_root(&self) -> NodeRef<K, V> {
        Arc::clone(&self.root.read())
    }

    /// Publish a new root. Caller must hold whatever locks make the
    /// replacement safe (the latch for splits; the old root's
    /// exclusive lock for collapse).
    #[inline]
    pub(crate) fn store_root(&self, new_root: NodeRef<K, V>) {
        *self.root.write() = new_root;
    }

    /// Associate `value` with `key`. Returns `true` if the pair was new.
    ///
    /// Tries the optimistic single-leaf path first; a leaf at capacity
    /// forces the pessimistic crabbing descent, which never fails.
    pub fn insert(&self, key: K, value: V) -> bool {
        match self.optimistic_insert(&key, &value) {
            Some(added) => added,
            None => {
                debug_log!("optimistic insert failed; falling back to pessimistic");
                self.pessimistic_insert(&key, &value)
            }
        }
    }
}

impl<K, V, const ORDER: usize> Default for BPlusTree<K, V, ORDER>
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, const ORDER: usize> Index<K, V> for BPlusTree<K, V, ORDER>
where
    K: Ord + Clone + Send + Sync,
    V: Hash + Eq + Clone + Send + Sync,
{
    fn insert(&self, key: K, value: V) -> bool {
        Self::insert(self, key, value)
    }

    fn search(&self, key: &K) -> ValueSet<V> {
        Self::search(self, key)
    }

    fn remove(&self, key: &K) -> bool {
        Self::remove(self, key)
    }
}

impl<K, V, const ORDER: usize> OrderedIndex<K, V> for BPlusTree<K, V, ORDER>
where
    K: Ord + Clone + Send + Sync,
    V: Hash + Eq + Clone + Send + Sync,
{
    fn range_search(&self, lo: &K, hi: &K) -> RangeMap<K, V> {
        Self::range_search(self, lo, hi)
    }
}

// ============================================================================
//  Tests
// ============================================================================
