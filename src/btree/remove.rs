//! Deletion under the tree latch.
//!
//! Removal is the rare operation in the intended workloads, so it
//! takes the simple, provably safe route: the tree-wide latch is held
//! end-to-end, which excludes every other writer; concurrent readers
//! are excluded node-by-node with exclusive locks along the descent
//! path.
//!
//! Rebalancing follows the classical order — borrow from the left
//! sibling, borrow from the right, merge with the left, merge with the
//! right. Borrows refresh the parent separator from the right node's
//! first key; merges drop the separator (leaves) or pull it down
//! (internals). Underflow cascades upward through the recursion, and
//! an internal root that drains to a single child is collapsed,
//! shrinking the tree by one level.
//!
//! Sibling locks are always taken left-to-right — the same direction
//! range scans walk the leaf chain — so no lock-order cycle exists.
//! A merged-away node is dropped by the last `Arc` once its guard and
//! its parent slot are gone.

use std::hash::Hash;
use std::sync::Arc;

use crate::tracing_helpers::{debug_log, trace_log};

use super::node::{NodeInner, NodeKind, NodeRef, WriteGuard};
use super::BPlusTree;

impl<K, V, const ORDER: usize> BPlusTree<K, V, ORDER>
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    /// Remove `key` and its entire value set. Returns `true` if the key
    /// was present.
    pub fn remove(&self, key: &K) -> bool {
        let _latch = self.tree_latch.lock();

        let root = self.load_root();
        let mut root_guard = root.write_arc();

        let removed = self.remove_rec(&mut root_guard, key);

        // Collapse an internal root that lost its last separator: its
        // single child becomes the root, shrinking the tree one level.
        if removed && !root_guard.is_leaf() && root_guard.keys.is_empty() {
            let NodeKind::Internal { children, .. } = &root_guard.kind else {
                unreachable!("non-leaf node without children")
            };
            if children.len() == 1 {
                debug_log!("root collapse; tree height shrinks");
                self.store_root(Arc::clone(&children[0]));
            }
        }

        removed
    }

    /// Recursive removal. The caller holds `node`'s exclusive guard;
    /// the callee locks the child, removes beneath it, and rebalances
    /// the child if the removal left it under-full.
    fn remove_rec(&self, node: &mut WriteGuard<K, V>, key: &K) -> bool {
        if node.is_leaf() {
            let pos = node.lower_bound(key);
            if pos >= node.keys.len() || node.keys[pos] != *key {
                return false;
            }

            node.keys.remove(pos);
            let NodeKind::Leaf { values, .. } = &mut node.kind else {
                unreachable!("leaf guard on an internal node")
            };
            values.remove(pos);
            return true;
        }

        let idx = node.upper_bound(key);
        let child = {
            let NodeKind::Internal { children, .. } = &node.kind else {
                unreachable!("non-leaf node without children")
            };
            Arc::clone(&children[idx])
        };

        let mut child_guard = child.write_arc();
        let removed = self.remove_rec(&mut child_guard, key);
        if !removed {
            return false;
        }

        let deficient = child_guard.is_deficient(Self::MIN_KEYS_LEAF, Self::MIN_KEYS_INTERNAL);
        drop(child_guard);

        if deficient {
            self.rebalance_child(node, idx);
        }
        true
    }

    /// Restore the fill bound of `parent`'s child at `idx`.
    fn rebalance_child(&self, parent: &mut WriteGuard<K, V>, idx: usize) {
        if self.borrow_from_left(parent, idx) {
            return;
        }
        if self.borrow_from_right(parent, idx) {
            return;
        }

        let child_count = {
            let NodeKind::Internal { children, .. } = &parent.kind else {
                unreachable!("rebalance below a leaf")
            };
            children.len()
        };

        if idx > 0 {
            self.merge_with_left(parent, idx);
        } else if idx + 1 < child_count {
            self.merge_with_right(parent, idx);
        }
    }

    /// Shift one entry from the left sibling; `false` if the donor
    /// cannot spare one.
    fn borrow_from_left(&self, parent: &mut WriteGuard<K, V>, idx: usize) -> bool {
        if idx == 0 {
            return false;
        }
        let (left_ref, child_ref) = Self::sibling_pair(parent, idx - 1, idx);

        let mut left = left_ref.write_arc();
        let mut child = child_ref.write_arc();
        let NodeInner {
            keys: left_keys,
            kind: left_kind,
        } = &mut *left;
        let NodeInner {
            keys: child_keys,
            kind: child_kind,
        } = &mut *child;

        match (left_kind, child_kind) {
            (
                NodeKind::Leaf {
                    values: left_values,
                    ..
                },
                NodeKind::Leaf {
                    values: child_values,
                    ..
                },
            ) => {
                if left_keys.len() <= Self::MIN_KEYS_LEAF {
                    return false;
                }
                let (Some(k), Some(v)) = (left_keys.pop(), left_values.pop()) else {
                    unreachable!("donor leaf verified non-empty")
                };
                child_keys.insert(0, k);
                child_values.insert(0, v);
                // New separator: the first key of the right node.
                parent.keys[idx - 1] = child_keys[0].clone();
            }
            (
                NodeKind::Internal {
                    children: left_children,
                    ..
                },
                NodeKind::Internal {
                    children: child_children,
                    ..
                },
            ) => {
                if left_keys.len() <= Self::MIN_KEYS_INTERNAL {
                    return false;
                }
                let (Some(k), Some(c)) = (left_keys.pop(), left_children.pop()) else {
                    unreachable!("donor internal verified non-empty")
                };
                // Rotate: separator comes down, donor's last key goes up.
                let separator = std::mem::replace(&mut parent.keys[idx - 1], k);
                child_keys.insert(0, separator);
                child_children.insert(0, c);
            }
            _ => unreachable!("siblings differ in kind"),
        }

        trace_log!(idx, "borrowed from left sibling");
        true
    }

    /// Shift one entry from the right sibling; `false` if the donor
    /// cannot spare one.
    fn borrow_from_right(&self, parent: &mut WriteGuard<K, V>, idx: usize) -> bool {
        let child_count = {
            let NodeKind::Internal { children, .. } = &parent.kind else {
                unreachable!("rebalance below a leaf")
            };
            children.len()
        };
        if idx + 1 >= child_count {
            return false;
        }
        let (child_ref, right_ref) = Self::sibling_pair(parent, idx, idx + 1);

        let mut child = child_ref.write_arc();
        let mut right = right_ref.write_arc();
        let NodeInner {
            keys: child_keys,
            kind: child_kind,
        } = &mut *child;
        let NodeInner {
            keys: right_keys,
            kind: right_kind,
        } = &mut *right;

        match (child_kind, right_kind) {
            (
                NodeKind::Leaf {
                    values: child_values,
                    ..
                },
                NodeKind::Leaf {
                    values: right_values,
                    ..
                },
            ) => {
                if right_keys.len() <= Self::MIN_KEYS_LEAF {
                    return false;
                }
                child_keys.push(right_keys.remove(0));
                child_values.push(right_values.remove(0));
                parent.keys[idx] = right_keys[0].clone();
            }
            (
                NodeKind::Internal {
                    children: child_children,
                    ..
                },
                NodeKind::Internal {
                    children: right_children,
                    ..
                },
            ) => {
                if right_keys.len() <= Self::MIN_KEYS_INTERNAL {
                    return false;
                }
                let separator = std::mem::replace(&mut parent.keys[idx], right_keys.remove(0));
                child_keys.push(separator);
                child_children.push(right_children.remove(0));
            }
            _ => unreachable!("siblings differ in kind"),
        }

        trace_log!(idx, "borrowed from right sibling");
        true
    }

    /// Fold the child at `idx` into its left sibling and drop it from
    /// the parent.
    fn merge_with_left(&self, parent: &mut WriteGuard<K, V>, idx: usize) {
        let (left_ref, child_ref) = Self::sibling_pair(parent, idx - 1, idx);

        {
            let mut left = left_ref.write_arc();
            let mut child = child_ref.write_arc();
            let NodeInner {
                keys: left_keys,
                kind: left_kind,
            } = &mut *left;
            let NodeInner {
                keys: child_keys,
                kind: child_kind,
            } = &mut *child;

            match (left_kind, child_kind) {
                (
                    NodeKind::Leaf {
                        values: left_values,
                        next: left_next,
                    },
                    NodeKind::Leaf {
                        values: child_values,
                        next: child_next,
                    },
                ) => {
                    left_keys.append(child_keys);
                    left_values.append(child_values);
                    *left_next = child_next.take();
                    parent.keys.remove(idx - 1);
                }
                (
                    NodeKind::Internal {
                        children: left_children,
                        ..
                    },
                    NodeKind::Internal {
                        children: child_children,
                        ..
                    },
                ) => {
                    // The separator comes down into the merged node.
                    left_keys.push(parent.keys.remove(idx - 1));
                    left_keys.append(child_keys);
                    left_children.append(child_children);
                }
                _ => unreachable!("siblings differ in kind"),
            }
        }

        let NodeKind::Internal { children, .. } = &mut parent.kind else {
            unreachable!("rebalance below a leaf")
        };
        children.remove(idx);
        trace_log!(idx, "merged with left sibling");
    }

    /// Fold the right sibling into the child at `idx` and drop the
    /// sibling from the parent.
    fn merge_with_right(&self, parent: &mut WriteGuard<K, V>, idx: usize) {
        let (child_ref, right_ref) = Self::sibling_pair(parent, idx, idx + 1);

        {
            let mut child = child_ref.write_arc();
            let mut right = right_ref.write_arc();
            let NodeInner {
                keys: child_keys,
                kind: child_kind,
            } = &mut *child;
            let NodeInner {
                keys: right_keys,
                kind: right_kind,
            } = &mut *right;

            match (child_kind, right_kind) {
                (
                    NodeKind::Leaf {
                        values: child_values,
                        next: child_next,
                    },
                    NodeKind::Leaf {
                        values: right_values,
                        next: right_next,
                    },
                ) => {
                    child_keys.append(right_keys);
                    child_values.append(right_values);
                    *child_next = right_next.take();
                    parent.keys.remove(idx);
                }
                (
                    NodeKind::Internal {
                        children: child_children,
                        ..
                    },
                    NodeKind::Internal {
                        children: right_children,
                        ..
                    },
                ) => {
                    child_keys.push(parent.keys.remove(idx));
                    child_keys.append(right_keys);
                    child_children.append(right_children);
                }
                _ => unreachable!("siblings differ in kind"),
            }
        }

        let NodeKind::Internal { children, .. } = &mut parent.kind else {
            unreachable!("rebalance below a leaf")
        };
        children.remove(idx + 1);
        trace_log!(idx, "merged with right sibling");
    }

    /// Clone two child handles out of `parent`, left index first.
    fn sibling_pair(
        parent: &WriteGuard<K, V>,
        left: usize,
        right: usize,
    ) -> (NodeRef<K, V>, NodeRef<K, V>) {
        let NodeKind::Internal { children, .. } = &parent.kind else {
            unreachable!("rebalance below a leaf")
        };
        (Arc::clone(&children[left]), Arc::clone(&children[right]))
    }
}
