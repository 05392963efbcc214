//! Optimistic single-leaf insertion.
//!
//! The fast path for the common case: the target leaf has room, so no
//! ancestor can be affected and no latch is needed.
//!
//! # Protocol
//!
//! ```text
//! 1. root = load root cell; lock it (shared if internal, exclusive if
//!    the root is itself the leaf)
//! 2. validate: reload the root cell, compare by pointer identity,
//!    retry on mismatch (a split or collapse republished the root
//!    between the load and the lock)
//! 3. lock-couple shared guards downward; at the parent of the leaf,
//!    take the leaf exclusively *before* releasing the parent
//! 4. leaf safe (strictly under capacity) -> insert, done
//!    leaf at capacity -> release everything, mutate nothing, report
//!    failure so the caller falls back to the pessimistic descent
//! ```
//!
//! Which lock to take for a child is decided by the parent's
//! `leaf_children` flag, so the descent never has to lock a child just
//! to learn its kind.

use std::hash::Hash;
use std::sync::Arc;

use crate::tracing_helpers::trace_log;

use super::node::{leaf_insert, NodeKind};
use super::BPlusTree;

impl<K, V, const ORDER: usize> BPlusTree<K, V, ORDER>
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    /// Attempt the single-leaf insert.
    ///
    /// `Some(added)` on commit; `None` if the leaf was at capacity, in
    /// which case nothing was mutated and no locks remain held.
    pub(super) fn optimistic_insert(&self, key: &K, value: &V) -> Option<bool> {
        loop {
            let initial_root = self.load_root();

            // A node's kind never changes, so a transient probe is
            // enough to pick the right lock mode for the root.
            let root_is_leaf = initial_root.read_arc().is_leaf();

            if root_is_leaf {
                let mut leaf = initial_root.write_arc();
                if !Arc::ptr_eq(&self.load_root(), &initial_root) {
                    trace_log!("root changed under optimistic insert; retrying");
                    continue;
                }

                if !leaf.is_safe_for_insert(Self::MAX_KEYS_LEAF, Self::MAX_KEYS_INTERNAL) {
                    return None;
                }
                return Some(leaf_insert(&mut leaf, key, value));
            }

            let mut parent = initial_root.read_arc();
            if !Arc::ptr_eq(&self.load_root(), &initial_root) {
                trace_log!("root changed under optimistic insert; retrying");
                continue;
            }

            loop {
                let (child, child_is_leaf) = {
                    let NodeKind::Internal {
                        children,
                        leaf_children,
                    } = &parent.kind
                    else {
                        unreachable!("descent reached a leaf while coupling internals")
                    };
                    let idx = parent.upper_bound(key);
                    (Arc::clone(&children[idx]), *leaf_children)
                };

                if child_is_leaf {
                    // Exclusive on the leaf before the parent goes: a
                    // concurrent rebalance cannot slip in between and
                    // merge the leaf away.
                    let mut leaf = child.write_arc();
                    drop(parent);

                    if !leaf.is_safe_for_insert(Self::MAX_KEYS_LEAF, Self::MAX_KEYS_INTERNAL) {
                        return None;
                    }
                    return Some(leaf_insert(&mut leaf, key, value));
                }

                let next = child.read_arc();
                drop(parent);
                parent = next;
            }
        }
    }
}
