//! Point search and range scans.
//!
//! Both descend with shared lock coupling: the child's guard is taken
//! before the parent's is released, and the root is validated by
//! pointer identity right after its lock lands. A range scan continues
//! along the leaf chain with the same coupling.
//!
//! Scans are snapshot-free: a scan concurrent with writers reflects
//! each leaf as of the moment the scan locked it, so an insert racing
//! the scan may appear at one leaf and not another.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::index::{RangeMap, ValueSet};
use crate::tracing_helpers::trace_log;

use super::node::{NodeKind, ReadGuard};
use super::BPlusTree;

impl<K, V, const ORDER: usize> BPlusTree<K, V, ORDER>
where
    K: Ord + Clone,
    V: Hash + Eq + Clone,
{
    /// Copy out the value set for `key`, or `∅` if absent.
    #[must_use]
    pub fn search(&self, key: &K) -> ValueSet<V> {
        loop {
            let initial_root = self.load_root();
            let mut current: ReadGuard<K, V> = initial_root.read_arc();
            if !Arc::ptr_eq(&self.load_root(), &initial_root) {
                trace_log!("root changed under search; retrying");
                continue;
            }

            while !current.is_leaf() {
                let child = {
                    let NodeKind::Internal { children, .. } = &current.kind else {
                        unreachable!("non-leaf node without children")
                    };
                    Arc::clone(&children[current.upper_bound(key)])
                };
                let next = child.read_arc();
                drop(current);
                current = next;
            }

            let pos = current.lower_bound(key);
            if pos < current.keys.len() && current.keys[pos] == *key {
                let NodeKind::Leaf { values, .. } = &current.kind else {
                    unreachable!("leaf guard on an internal node")
                };
                return values[pos].clone();
            }
            return HashSet::new();
        }
    }

    /// Collect every entry with `lo <= key < hi`, ascending.
    ///
    /// Returns the empty map when `lo >= hi`. Descends by
    /// `upper_bound(lo)` — keys equal to a separator live in the right
    /// subtree — then walks the leaf chain until a key reaches `hi` or
    /// the chain ends.
    #[must_use]
    pub fn range_search(&self, lo: &K, hi: &K) -> RangeMap<K, V> {
        let mut result = BTreeMap::new();
        if lo >= hi {
            return result;
        }

        'retry: loop {
            let initial_root = self.load_root();
            let mut current = initial_root.read_arc();
            if !Arc::ptr_eq(&self.load_root(), &initial_root) {
                trace_log!("root changed under range scan; retrying");
                continue 'retry;
            }

            while !current.is_leaf() {
                let child = {
                    let NodeKind::Internal { children, .. } = &current.kind else {
                        unreachable!("non-leaf node without children")
                    };
                    Arc::clone(&children[current.upper_bound(lo)])
                };
                let next = child.read_arc();
                drop(current);
                current = next;
            }

            loop {
                let start = current.lower_bound(lo);
                let NodeKind::Leaf { values, next } = &current.kind else {
                    unreachable!("leaf guard on an internal node")
                };

                for i in start..current.keys.len() {
                    if current.keys[i] >= *hi {
                        return result;
                    }
                    result.insert(current.keys[i].clone(), values[i].clone());
                }

                let Some(successor) = next.as_ref().map(Arc::clone) else {
                    return result;
                };
                let successor_guard = successor.read_arc();
                drop(current);
                current = successor_guard;
            }
        }
    }
}
