//! B+ tree node representation.
//!
//! Nodes are `Arc<RwLock<NodeInner>>`. The `Arc` makes hand-over-hand
//! locking safe without lifetime gymnastics: descents take *owned*
//! guards (`read_arc` / `write_arc`), so a crabbing path can keep its
//! ancestors' guards in a `Vec` and a merged-away node simply dies when
//! the last `Arc` drops.
//!
//! A node's kind (leaf vs internal) is fixed at construction and never
//! changes; splits create new nodes of the same kind and root collapse
//! only re-points the root cell. Internal nodes additionally record
//! whether their children are leaves — constant for the node's
//! lifetime, since every leaf sits at the same depth — which lets the
//! optimistic descent pick a shared or exclusive child lock without
//! peeking through the child's own lock first.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

/// Shared handle to a node.
pub(crate) type NodeRef<K, V> = Arc<RwLock<NodeInner<K, V>>>;

/// Owned shared guard; safe to stash in collections.
pub(crate) type ReadGuard<K, V> = ArcRwLockReadGuard<RawRwLock, NodeInner<K, V>>;

/// Owned exclusive guard; safe to stash in collections.
pub(crate) type WriteGuard<K, V> = ArcRwLockWriteGuard<RawRwLock, NodeInner<K, V>>;

// ============================================================================
//  NodeInner / NodeKind
// ============================================================================

/// Per-kind node payload.
///
/// Routing rule for internal nodes: with separators `k0 < k1 < … <
/// k(m-1)` and children `c0 … cm`, child `ci` covers `[k(i-1), ki)`
/// with the outer bounds open. A leaf's `keys[i]` owns `values[i]`;
/// `next` threads the leaf chain left to right.
pub(crate) enum NodeKind<K, V> {
    Leaf {
        values: Vec<HashSet<V>>,
        next: Option<NodeRef<K, V>>,
    },
    Internal {
        children: Vec<NodeRef<K, V>>,
        /// Whether the children are leaves. Fixed at construction.
        leaf_children: bool,
    },
}

/// The lock-guarded body of a node: sorted keys plus kind payload.
pub(crate) struct NodeInner<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) kind: NodeKind<K, V>,
}

impl<K, V> NodeInner<K, V> {
    /// A fresh empty leaf (the initial root).
    pub(crate) fn empty_leaf() -> Self {
        Self {
            keys: Vec::new(),
            kind: NodeKind::Leaf {
                values: Vec::new(),
                next: None,
            },
        }
    }

    /// A leaf from already-sorted parts (split construction).
    pub(crate) fn leaf(
        keys: Vec<K>,
        values: Vec<HashSet<V>>,
        next: Option<NodeRef<K, V>>,
    ) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self {
            keys,
            kind: NodeKind::Leaf { values, next },
        }
    }

    /// An internal node from already-sorted parts.
    pub(crate) fn internal(
        keys: Vec<K>,
        children: Vec<NodeRef<K, V>>,
        leaf_children: bool,
    ) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self {
            keys,
            kind: NodeKind::Internal {
                children,
                leaf_children,
            },
        }
    }

    /// Wrap into the shared, lockable handle.
    pub(crate) fn into_ref(self) -> NodeRef<K, V> {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// First index whose key is strictly greater than `key`; the child
    /// slot to descend into (keys equal to a separator route right).
    #[inline]
    pub(crate) fn upper_bound(&self, key: &K) -> usize
    where
        K: Ord,
    {
        self.keys.partition_point(|k| k <= key)
    }

    /// First index whose key is `>= key`; the candidate slot in a leaf.
    #[inline]
    pub(crate) fn lower_bound(&self, key: &K) -> usize
    where
        K: Ord,
    {
        self.keys.partition_point(|k| k < key)
    }

    /// Whether one more key can land here without overflowing.
    ///
    /// Strict: a node at capacity is unsafe, because the insertion
    /// about to happen below may push one key up into it.
    #[inline]
    pub(crate) fn is_safe_for_insert(&self, max_keys_leaf: usize, max_keys_internal: usize) -> bool {
        match self.kind {
            NodeKind::Leaf { .. } => self.keys.len() < max_keys_leaf,
            NodeKind::Internal { .. } => self.keys.len() < max_keys_internal,
        }
    }

    /// Whether the node has fallen below its fill bound and needs
    /// rebalancing (never true for the root, which is exempt — the
    /// caller checks parentage).
    #[inline]
    pub(crate) fn is_deficient(&self, min_keys_leaf: usize, min_keys_internal: usize) -> bool {
        match self.kind {
            NodeKind::Leaf { .. } => self.keys.len() < min_keys_leaf,
            NodeKind::Internal { .. } => self.keys.len() < min_keys_internal,
        }
    }
}

/// Insert `value` under `key` in a leaf, coalescing duplicates.
///
/// Returns `true` if the pair was newly added. The caller holds the
/// leaf's exclusive lock.
pub(crate) fn leaf_insert<K, V>(leaf: &mut NodeInner<K, V>, key: &K, value: &V) -> bool
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    let pos = leaf.lower_bound(key);
    let NodeInner { keys, kind } = leaf;
    let NodeKind::Leaf { values, .. } = kind else {
        unreachable!("leaf_insert called on an internal node")
    };

    if pos < keys.len() && keys[pos] == *key {
        values[pos].insert(value.clone())
    } else {
        keys.insert(pos, key.clone());
        let mut set = HashSet::with_capacity(1);
        set.insert(value.clone());
        values.insert(pos, set);
        true
    }
}
