//! Structural validation. A testing/debugging hook.
//!
//! Walks the whole tree with shared locks, asserting the structural
//! invariants:
//!
//! - every leaf sits at the same depth;
//! - every non-root node respects its fill bounds;
//! - separators strictly increase and every key routes into the
//!   half-open interval its position promises;
//! - the leaf chain visits every leaf exactly once, in ascending key
//!   order;
//! - each internal node's `leaf_children` flag matches reality.
//!
//! Intended for quiescent trees (unit tests, post-join assertions in
//! stress tests); it takes no global lock, so validating a tree under
//! active mutation can report spurious bounds violations.

use std::hash::Hash;
use std::sync::Arc;

use super::node::{NodeKind, NodeRef};
use super::BPlusTree;

/// Aggregate counts reported by [`BPlusTree::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels, counting the root and the leaves (1 for a
    /// single-leaf tree).
    pub depth: usize,
    /// Number of leaves on the leaf chain.
    pub leaf_count: usize,
    /// Number of distinct keys.
    pub key_count: usize,
}

impl<K, V, const ORDER: usize> BPlusTree<K, V, ORDER>
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    /// Check every structural invariant, panicking with a description
    /// on the first violation. Returns aggregate stats.
    pub fn validate(&self) -> TreeStats {
        let root = self.load_root();
        let mut leaves: Vec<NodeRef<K, V>> = Vec::new();
        let mut key_count = 0usize;

        let depth = self.validate_node(&root, None, None, true, &mut leaves, &mut key_count);

        // Leaf chain (T3): visits every leaf exactly once, in order.
        for window in leaves.windows(2) {
            let guard = window[0].read_arc();
            let NodeKind::Leaf { next, .. } = &guard.kind else {
                unreachable!("collected a non-leaf as a leaf")
            };
            let linked = next
                .as_ref()
                .is_some_and(|n| Arc::ptr_eq(n, &window[1]));
            assert!(linked, "leaf chain skips or reorders a leaf");
        }
        if let Some(last) = leaves.last() {
            let guard = last.read_arc();
            let NodeKind::Leaf { next, .. } = &guard.kind else {
                unreachable!("collected a non-leaf as a leaf")
            };
            assert!(next.is_none(), "leaf chain continues past the last leaf");
        }

        TreeStats {
            depth,
            leaf_count: leaves.len(),
            key_count,
        }
    }

    /// Recursive check of one subtree; returns its height.
    ///
    /// `lo`/`hi` bound every key in the subtree to `[lo, hi)`.
    fn validate_node(
        &self,
        node: &NodeRef<K, V>,
        lo: Option<&K>,
        hi: Option<&K>,
        is_root: bool,
        leaves: &mut Vec<NodeRef<K, V>>,
        key_count: &mut usize,
    ) -> usize {
        let guard = node.read_arc();

        for window in guard.keys.windows(2) {
            assert!(window[0] < window[1], "keys not strictly increasing");
        }
        if let (Some(lo), Some(first)) = (lo, guard.keys.first()) {
            assert!(lo <= first, "key below the subtree's lower bound");
        }
        if let (Some(hi), Some(last)) = (hi, guard.keys.last()) {
            assert!(last < hi, "key at or above the subtree's upper bound");
        }

        match &guard.kind {
            NodeKind::Leaf { values, .. } => {
                assert_eq!(
                    guard.keys.len(),
                    values.len(),
                    "leaf keys/values out of step"
                );
                assert!(guard.keys.len() <= Self::MAX_KEYS_LEAF, "leaf overfull");
                if !is_root {
                    assert!(
                        guard.keys.len() >= Self::MIN_KEYS_LEAF,
                        "non-root leaf underfull"
                    );
                }
                for set in values {
                    assert!(!set.is_empty(), "leaf slot with an empty value set");
                }

                *key_count += guard.keys.len();
                leaves.push(Arc::clone(node));
                1
            }
            NodeKind::Internal {
                children,
                leaf_children,
            } => {
                assert_eq!(
                    children.len(),
                    guard.keys.len() + 1,
                    "internal node with {} children for {} keys",
                    children.len(),
                    guard.keys.len()
                );
                assert!(children.len() <= ORDER, "internal node overfull");
                if is_root {
                    assert!(children.len() >= 2, "internal root with a single child");
                } else {
                    assert!(
                        children.len() >= ORDER.div_ceil(2),
                        "non-root internal node underfull"
                    );
                }

                let mut depth = None;
                for (i, child) in children.iter().enumerate() {
                    let child_lo = if i == 0 { lo } else { Some(&guard.keys[i - 1]) };
                    let child_hi = if i == guard.keys.len() {
                        hi
                    } else {
                        Some(&guard.keys[i])
                    };

                    assert_eq!(
                        child.read_arc().is_leaf(),
                        *leaf_children,
                        "leaf_children flag disagrees with child kind"
                    );

                    let d = self.validate_node(child, child_lo, child_hi, false, leaves, key_count);
                    match depth {
                        None => depth = Some(d),
                        Some(expected) => {
                            assert_eq!(d, expected, "leaves at differing depths");
                        }
                    }
                }

                depth.map_or(1, |d| d + 1)
            }
        }
    }

    /// The root's key list (separators for an internal root, live keys
    /// for a leaf root). Test hook.
    #[cfg(test)]
    pub(crate) fn root_keys(&self) -> Vec<K> {
        self.load_root().read_arc().keys.clone()
    }

    /// Key lists of every leaf, left to right along the chain. Test hook.
    #[cfg(test)]
    pub(crate) fn leaf_shapes(&self) -> Vec<Vec<K>> {
        let mut shapes = Vec::new();

        let mut current = self.load_root();
        loop {
            let next = {
                let guard = current.read_arc();
                match &guard.kind {
                    NodeKind::Leaf { .. } => break,
                    NodeKind::Internal { children, .. } => Arc::clone(&children[0]),
                }
            };
            current = next;
        }

        let mut leaf = Some(current);
        while let Some(node) = leaf {
            let guard = node.read_arc();
            shapes.push(guard.keys.clone());
            let NodeKind::Leaf { next, .. } = &guard.kind else {
                unreachable!("leaf chain reached an internal node")
            };
            leaf = next.as_ref().map(Arc::clone);
        }

        shapes
    }
}
