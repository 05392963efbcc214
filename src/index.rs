//! The common index contract.
//!
//! An index associates each key with a *set* of values. Absence of a
//! key is indistinguishable from an entry with an empty value set:
//! [`Index::search`] on an unknown key returns `∅`.
//!
//! All operations are safe to call concurrently from any number of
//! threads. The contract is total: no operation returns an error or
//! panics on any input; internal retry loops (CAS loss, optimistic
//! fallback) are invisible to the caller.

use std::collections::{BTreeMap, HashSet};

/// The value set returned by point lookups.
pub type ValueSet<V> = HashSet<V>;

/// The ordered result of a range scan: key → value set, ascending.
pub type RangeMap<K, V> = BTreeMap<K, ValueSet<V>>;

/// A concurrent multi-valued key index.
///
/// Implemented by all three variants: [`InvertedIndex`](crate::InvertedIndex),
/// [`SkipList`](crate::SkipList), and [`BPlusTree`](crate::BPlusTree).
pub trait Index<K, V>: Send + Sync {
    /// Associate `value` with `key`.
    ///
    /// Returns `true` if the pair was newly added — either the key was
    /// absent, or it was present but did not yet contain `value`. The
    /// value set is a set, not a bag: re-inserting an existing pair
    /// returns `false` and changes nothing.
    fn insert(&self, key: K, value: V) -> bool;

    /// Look up the value set for `key`.
    ///
    /// Returns a clone of the current set, or the empty set if the key
    /// is absent. The clone is a point-in-time copy; concurrent writers
    /// may change the entry immediately afterwards.
    fn search(&self, key: &K) -> ValueSet<V>;

    /// Remove `key` and its entire value set.
    ///
    /// Returns `true` if anything was removed.
    fn remove(&self, key: &K) -> bool;
}

/// An [`Index`] whose keys are totally ordered and which supports
/// range scans over the half-open interval `[lo, hi)`.
pub trait OrderedIndex<K, V>: Index<K, V> {
    /// Collect every entry with `lo <= key < hi` into an ordered map.
    ///
    /// Returns the empty map when `lo >= hi`. The scan is snapshot-free
    /// under concurrency: entries inserted while the scan is in flight
    /// may or may not appear, depending on where the scan has reached.
    fn range_search(&self, lo: &K, hi: &K) -> RangeMap<K, V>;
}
