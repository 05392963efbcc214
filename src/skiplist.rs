//! Lock-free skip list with multi-valued entries.
//!
//! An ordered index whose *structure* is lock-free: horizontal
//! navigation, insertion, and deletion of nodes go through atomic
//! forward pointers and CAS, never a structural lock. Only each node's
//! value set is guarded by a conventional reader/writer lock, held for
//! `O(|values|)` work per call.
//!
//! # Protocol
//!
//! Deletion is logical-then-physical, Harris/Michael style:
//!
//! 1. `remove` tags the low bit of every forward pointer of the target
//!    node, top level first. A node whose level-0 pointer is tagged is
//!    logically deleted; readers treat the key as absent.
//! 2. Any later traversal that encounters a tagged successor *helps*:
//!    it swings the predecessor's pointer past the dead node with a
//!    CAS, restarting from the top of the tower if the CAS loses.
//!
//! Linearization points: insertion at the level-0 publishing CAS,
//! removal at the CAS that tags level 0, lookup at the level-0 load
//! that decides liveness. Level 0 is the ground truth; higher levels
//! only accelerate search, and their links are best-effort.
//!
//! Detached nodes are not freed while the list is alive — the node
//! arena owns every published node until the list drops.
//!
//! # Example
//!
//! ```rust
//! use triplex::SkipList;
//!
//! let list: SkipList<String, String> = SkipList::new();
//! list.insert("k".into(), "a".into());
//! list.insert("k".into(), "b".into());
//! assert_eq!(list.search(&"k".to_string()).len(), 2);
//!
//! assert!(list.remove(&"k".to_string()));
//! assert!(list.search(&"k".to_string()).is_empty());
//! ```

mod node;

#[cfg(all(test, loom))]
mod loom_tests;

use std::cell::RefCell;
use std::collections::HashSet;
use std::ptr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::index::{Index, ValueSet};
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, RELAXED};
use crate::tracing_helpers::trace_log;

use node::{is_marked, marked, unmarked, Node, NodeArena};

/// Default ceiling on tower height; see [`SkipList`].
pub const DEFAULT_MAX_LEVEL: usize = 16;

/// Geometric tower height: level `L` with probability `2^-L`, capped.
fn random_level(max_level: usize) -> usize {
    thread_local! {
        static RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
    }

    RNG.with(|cell| {
        let mut rng = cell.borrow_mut();
        let mut level = 1;
        while level < max_level && rng.gen_bool(0.5) {
            level += 1;
        }
        level
    })
}

// ============================================================================
//  SkipList
// ============================================================================

/// A concurrent, ordered, multi-valued index backed by a lock-free
/// skip list.
///
/// `MAX_LEVEL` caps node tower height (default 16, good for millions
/// of keys). Point operations are linearizable per key. Range scans
/// are not offered on this variant.
pub struct SkipList<K, V, const MAX_LEVEL: usize = DEFAULT_MAX_LEVEL> {
    head: *mut Node<K, V>,
    tail: *mut Node<K, V>,
    arena: NodeArena<K, V>,
}

// SAFETY: the raw pointers refer to nodes owned by the arena (or the
// two sentinels), which live as long as the list. All shared mutation
// goes through atomics or the per-node value lock.
unsafe impl<K: Send + Sync, V: Send + Sync, const MAX_LEVEL: usize> Send
    for SkipList<K, V, MAX_LEVEL>
{
}
unsafe impl<K: Send + Sync, V: Send + Sync, const MAX_LEVEL: usize> Sync
    for SkipList<K, V, MAX_LEVEL>
{
}

impl<K, V, const MAX_LEVEL: usize> SkipList<K, V, MAX_LEVEL>
where
    K: Ord,
    V: std::hash::Hash + Eq,
{
    /// Create an empty list.
    ///
    /// # Panics
    /// Panics if `MAX_LEVEL` is zero.
    #[must_use]
    pub fn new() -> Self {
        assert!(MAX_LEVEL >= 1, "SkipList requires at least one level");

        let tail = Box::into_raw(Node::sentinel(MAX_LEVEL));
        let head = Box::into_raw(Node::sentinel(MAX_LEVEL));
        for level in 0..MAX_LEVEL {
            // Not yet shared; plain stores suffice.
            unsafe { (*head).forward[level].store(tail, RELAXED) };
        }

        Self {
            head,
            tail,
            arena: NodeArena::new(),
        }
    }

    /// Locate `key`, filling `preds`/`succs` for every level.
    ///
    /// On return, `preds[i]` is the last node with key < `key` at level
    /// `i` and `succs[i]` the first node with key ≥ `key` (or `tail`).
    /// Returns whether a node with the exact key is linked at level 0.
    ///
    /// Traversal helps unlink logically deleted nodes: a tagged
    /// successor pointer triggers a CAS that swings the predecessor
    /// past the dead node. A lost unlinking CAS restarts the whole
    /// descent, so the filled arrays always describe a consistent cut.
    fn find(
        &self,
        key: &K,
        preds: &mut [*mut Node<K, V>; MAX_LEVEL],
        succs: &mut [*mut Node<K, V>; MAX_LEVEL],
    ) -> bool {
        'restart: loop {
            let mut pred = self.head;

            for level in (0..MAX_LEVEL).rev() {
                let mut curr = unmarked(unsafe { (*pred).forward[level].load(READ_ORD) });

                loop {
                    let mut succ = if curr == self.tail {
                        self.tail
                    } else {
                        unsafe { (*curr).forward[level].load(READ_ORD) }
                    };

                    // curr is logically deleted: help unlink it.
                    while is_marked(succ) {
                        let pred_slot = unsafe { &(*pred).forward[level] };
                        if pred_slot
                            .compare_exchange(curr, unmarked(succ), CAS_SUCCESS, CAS_FAILURE)
                            .is_err()
                        {
                            trace_log!(level = level, "unlink CAS lost; restarting traversal");
                            continue 'restart;
                        }

                        curr = unmarked(pred_slot.load(READ_ORD));
                        succ = if curr == self.tail {
                            self.tail
                        } else {
                            unsafe { (*curr).forward[level].load(READ_ORD) }
                        };
                    }

                    if curr != self.tail && unsafe { (*curr).key_ref() } < key {
                        pred = curr;
                        curr = unmarked(succ);
                    } else {
                        break;
                    }
                }

                preds[level] = pred;
                succs[level] = curr;
            }

            return succs[0] != self.tail && unsafe { (*succs[0]).key_ref() } == key;
        }
    }

    /// Associate `value` with `key`. Returns `true` if the pair was new.
    ///
    /// If a live node for the key exists, the value goes into its set
    /// under the node's write lock. If the node is logically deleted,
    /// the insert retries until a traversal has unlinked it and a fresh
    /// node can be published. Publication is a CAS at level 0; higher
    /// levels are linked best-effort and abandoned on the first lost
    /// CAS.
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut preds = [ptr::null_mut(); MAX_LEVEL];
        let mut succs = [ptr::null_mut(); MAX_LEVEL];

        // The spare node owns key and value across retries; it is only
        // shared once its publishing CAS succeeds.
        let mut spare = Node::with_value(key, value, random_level(MAX_LEVEL));

        loop {
            if self.find(spare.key_ref(), &mut preds, &mut succs) {
                let existing = succs[0];
                if is_marked(unsafe { (*existing).forward[0].load(READ_ORD) }) {
                    // Concurrently deleted; wait for it to be unlinked.
                    continue;
                }

                let value = spare.into_value();
                return unsafe { (*existing).values.write().insert(value) };
            }

            let level = spare.level;
            spare.forward[0].store(succs[0], RELAXED);
            let raw = Box::into_raw(spare);

            let pred_slot = unsafe { &(*preds[0]).forward[0] };
            match pred_slot.compare_exchange(succs[0], raw, CAS_SUCCESS, CAS_FAILURE) {
                Ok(_) => {
                    // Published: level 0 is the linearization point.
                    self.arena.track(raw);

                    for lvl in 1..level {
                        unsafe { (*raw).forward[lvl].store(succs[lvl], RELAXED) };
                        let slot = unsafe { &(*preds[lvl]).forward[lvl] };
                        if slot
                            .compare_exchange(succs[lvl], raw, CAS_SUCCESS, CAS_FAILURE)
                            .is_err()
                        {
                            // Best-effort: a later traversal will route
                            // around the missing express link.
                            trace_log!(level = lvl, "tower link CAS lost; leaving lower tower");
                            break;
                        }
                    }

                    return true;
                }
                Err(_) => {
                    // Never published; regain ownership and retry.
                    spare = unsafe { Box::from_raw(raw) };
                }
            }
        }
    }

    /// Copy out the value set for `key`, or `∅` if absent or logically
    /// deleted.
    #[must_use]
    pub fn search(&self, key: &K) -> ValueSet<V>
    where
        V: Clone,
    {
        let mut preds = [ptr::null_mut(); MAX_LEVEL];
        let mut succs = [ptr::null_mut(); MAX_LEVEL];

        if self.find(key, &mut preds, &mut succs) {
            let found = succs[0];
            // Level-0 tag decides liveness.
            if !is_marked(unsafe { (*found).forward[0].load(READ_ORD) }) {
                return unsafe { (*found).values.read().clone() };
            }
        }

        HashSet::new()
    }

    /// Logically delete `key`.
    ///
    /// Tags every forward pointer of the node, top level down to 0,
    /// looping per level until the tag is in place. Returns `false`
    /// only when no live node for the key exists; if two threads race
    /// to delete the same node, both observe the marked post-condition
    /// and both report `true`. Physical unlinking is left to future
    /// traversals.
    pub fn remove(&self, key: &K) -> bool {
        let mut preds = [ptr::null_mut(); MAX_LEVEL];
        let mut succs = [ptr::null_mut(); MAX_LEVEL];

        if !self.find(key, &mut preds, &mut succs) {
            return false;
        }

        let victim = succs[0];
        let level = unsafe { (*victim).level };

        for lvl in (0..level).rev() {
            let slot = unsafe { &(*victim).forward[lvl] };
            let mut succ = slot.load(READ_ORD);
            while !is_marked(succ) {
                match slot.compare_exchange(succ, marked(succ), CAS_SUCCESS, CAS_FAILURE) {
                    Ok(_) => break,
                    Err(current) => succ = current,
                }
            }
        }

        true
    }
}

impl<K, V, const MAX_LEVEL: usize> Default for SkipList<K, V, MAX_LEVEL>
where
    K: Ord,
    V: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, const MAX_LEVEL: usize> Drop for SkipList<K, V, MAX_LEVEL> {
    fn drop(&mut self) {
        // The arena frees every published data node; the sentinels are
        // owned directly.
        unsafe {
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail));
        }
    }
}

impl<K, V, const MAX_LEVEL: usize> Index<K, V> for SkipList<K, V, MAX_LEVEL>
where
    K: Ord + Send + Sync,
    V: std::hash::Hash + Eq + Clone + Send + Sync,
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

// ============================================================================
//  Tests
// ============================================================================
