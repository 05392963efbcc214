//! Pessimistic insertion: latch crabbing with an explicit guard stack.
//!
//! Reached only when the optimistic phase found the target leaf at
//! capacity. The descent takes the tree-wide latch, then exclusive
//! guards top-down, releasing every held ancestor (and the latch) the
//! moment a newly locked child is split-safe: once some node on the
//! path has room, nothing above it can be touched by this insertion.
//!
//! Split propagation is iterative rather than recursive: the descent
//! records the child index chosen at each held node, and the insertion
//! then bubbles `(separator, sibling)` pairs back up that recorded
//! path. If the propagation consumes the entire held path, the path's
//! top was the root and it was never safe — which is precisely the
//! case in which the latch is still held — so a new root of height+1
//! is published before any path lock is released.

use std::hash::Hash;
use std::sync::Arc;

use crate::tracing_helpers::{debug_log, trace_log};

use super::node::{leaf_insert, NodeInner, NodeKind, NodeRef, WriteGuard};
use super::BPlusTree;

impl<K, V, const ORDER: usize> BPlusTree<K, V, ORDER>
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    /// Insert with full crabbing. Never fails.
    pub(super) fn pessimistic_insert(&self, key: &K, value: &V) -> bool {
        let mut latch = Some(self.tree_latch.lock());

        // With the latch held, no other writer can republish the root.
        let root = self.load_root();

        // The locked path, top to bottom. `path[i]` is the node behind
        // `held[i]`; `child_idx[i]` the child slot taken out of it.
        let mut held: Vec<WriteGuard<K, V>> = Vec::new();
        let mut path: Vec<NodeRef<K, V>> = Vec::new();
        let mut child_idx: Vec<usize> = Vec::new();

        let root_guard = root.write_arc();
        let root_safe =
            root_guard.is_safe_for_insert(Self::MAX_KEYS_LEAF, Self::MAX_KEYS_INTERNAL);
        held.push(root_guard);
        path.push(Arc::clone(&root));
        if root_safe {
            // The root cannot split; no new root can be needed.
            latch = None;
        }

        // Descend, crabbing: keep ancestors locked only while a split
        // below could still reach them.
        loop {
            let last = held.len() - 1;
            if held[last].is_leaf() {
                break;
            }

            let (idx, child) = {
                let current = &held[last];
                let idx = current.upper_bound(key);
                let NodeKind::Internal { children, .. } = &current.kind else {
                    unreachable!("non-leaf node without children")
                };
                (idx, Arc::clone(&children[idx]))
            };

            let child_guard = child.write_arc();
            if child_guard.is_safe_for_insert(Self::MAX_KEYS_LEAF, Self::MAX_KEYS_INTERNAL) {
                // Everything above is now unreachable by this insert.
                trace_log!(depth = held.len(), "safe child; releasing held ancestors");
                held.clear();
                path.clear();
                child_idx.clear();
                latch = None;
            } else {
                child_idx.push(idx);
            }
            held.push(child_guard);
            path.push(child);
        }

        // Insert at the leaf, then bubble splits up the recorded path.
        let last = held.len() - 1;
        let added = leaf_insert(&mut held[last], key, value);

        let mut carry: Option<(K, NodeRef<K, V>)> = None;
        if held[last].keys.len() > Self::MAX_KEYS_LEAF {
            carry = Some(Self::split_leaf(&mut held[last]));
        }

        let mut level = last;
        while let Some((separator, sibling)) = carry.take() {
            if level == 0 {
                // The top of the held path overflowed. Only an unsafe
                // root keeps the latch held this long, so this is a
                // root split: grow the tree by one level and publish
                // while the whole path is still locked.
                debug_assert!(latch.is_some(), "root split without the tree latch");
                debug_log!("root split; tree height grows");

                let old_root = Arc::clone(&path[0]);
                let leaf_children = held[0].is_leaf();
                let new_root =
                    NodeInner::internal(vec![separator], vec![old_root, sibling], leaf_children)
                        .into_ref();
                self.store_root(new_root);
            } else {
                level -= 1;
                let idx = child_idx[level];
                let parent = &mut held[level];
                parent.keys.insert(idx, separator);
                let NodeKind::Internal { children, .. } = &mut parent.kind else {
                    unreachable!("split propagated into a leaf")
                };
                children.insert(idx + 1, sibling);

                if parent.keys.len() > Self::MAX_KEYS_INTERNAL {
                    carry = Some(Self::split_internal(parent));
                }
            }
        }

        drop(held);
        drop(latch);
        added
    }

    /// Split an overflowed leaf in place; returns the copy-up separator
    /// (the right sibling's first key) and the new sibling, already
    /// linked into the leaf chain.
    fn split_leaf(leaf: &mut NodeInner<K, V>) -> (K, NodeRef<K, V>) {
        let mid = leaf.keys.len() / 2;
        let right_keys = leaf.keys.split_off(mid);

        let NodeKind::Leaf { values, next } = &mut leaf.kind else {
            unreachable!("split_leaf on an internal node")
        };
        let right_values = values.split_off(mid);

        let separator = right_keys[0].clone();
        let sibling = NodeInner::leaf(right_keys, right_values, next.take()).into_ref();
        *next = Some(Arc::clone(&sibling));

        trace_log!("leaf split");
        (separator, sibling)
    }

    /// Split an overflowed internal node in place; the middle key moves
    /// up, the right half moves to the new sibling.
    fn split_internal(node: &mut NodeInner<K, V>) -> (K, NodeRef<K, V>) {
        let mid = node.keys.len() / 2;
        let right_keys = node.keys.split_off(mid + 1);
        let separator = match node.keys.pop() {
            Some(k) => k,
            None => unreachable!("overflowed internal node has a middle key"),
        };

        let NodeKind::Internal {
            children,
            leaf_children,
        } = &mut node.kind
        else {
            unreachable!("split_internal on a leaf")
        };
        let right_children = children.split_off(mid + 1);

        let sibling = NodeInner::internal(right_keys, right_children, *leaf_children).into_ref();

        trace_log!("internal split");
        (separator, sibling)
    }
}
