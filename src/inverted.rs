//! Sharded inverted hash index.
//!
//! A hash map from key to value set, split into `NUM_SHARDS`
//! independent shards so that writers contend only within a shard. Each
//! shard is a reader/writer-locked `HashMap<K, Arc<Bucket>>`; each
//! bucket holds its own reader/writer-locked `HashSet<V>`.
//!
//! # Locking protocol
//!
//! Buckets are `Arc`-shared so an operation can drop the shard lock
//! before touching the value set:
//!
//! 1. Lookups read-lock the shard just long enough to clone the bucket
//!    handle, then read-lock the bucket to copy its set. The strong
//!    count keeps the bucket alive after the shard lock is gone.
//! 2. Inserts get-or-create the bucket with a double-checked probe
//!    (read-locked fast path, write-locked re-check on miss), then
//!    write-lock only the bucket.
//! 3. Removals hold the shard write lock, so a bucket reachable from a
//!    shard map is never left empty at the moment a shard write lock is
//!    released. A reader that still holds a handle to a just-drained
//!    bucket observes `∅`, which is exactly what `search` on an absent
//!    key reports.

use std::collections::hash_map::RandomState;
use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::index::{Index, ValueSet};

/// Default shard count; see [`InvertedIndex`].
pub const DEFAULT_SHARDS: usize = 256;

// ============================================================================
//  Bucket / Shard
// ============================================================================

/// The value set of one key, with its own lock.
///
/// Shared by `Arc` so readers may hold it after releasing the shard.
struct Bucket<V> {
    values: RwLock<HashSet<V>>,
}

impl<V> Bucket<V> {
    fn new() -> Self {
        Self {
            values: RwLock::new(HashSet::new()),
        }
    }
}

/// One shard: a locked slice of the key space.
struct Shard<K, V> {
    map: RwLock<HashMap<K, Arc<Bucket<V>>>>,
}

impl<K, V> Shard<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }
}

// ============================================================================
//  InvertedIndex
// ============================================================================

/// A sharded, concurrent hash index from keys to value sets.
///
/// Unordered: point operations only. `NUM_SHARDS` trades contention for
/// memory footprint and has no correctness impact.
///
/// # Example
///
/// ```rust
/// use triplex::InvertedIndex;
///
/// let index: InvertedIndex<String, String> = InvertedIndex::new();
/// assert!(index.insert("k".into(), "a".into()));
/// assert!(index.insert("k".into(), "b".into()));
/// assert!(!index.insert("k".into(), "a".into())); // coalesced
/// assert_eq!(index.search(&"k".to_string()).len(), 2);
/// ```
pub struct InvertedIndex<K, V, const NUM_SHARDS: usize = DEFAULT_SHARDS> {
    shards: Box<[Shard<K, V>]>,
    hasher: RandomState,
}

impl<K, V, const NUM_SHARDS: usize> InvertedIndex<K, V, NUM_SHARDS>
where
    K: Hash + Eq,
    V: Hash + Eq,
{
    /// Create an empty index with no per-shard capacity reservation.
    ///
    /// # Panics
    /// Panics if `NUM_SHARDS` is zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_expected_keys(0)
    }

    /// Create an empty index sized for roughly `expected_keys` distinct
    /// keys, reserving `expected_keys / NUM_SHARDS` slots per shard to
    /// reduce rehashing under load.
    ///
    /// # Panics
    /// Panics if `NUM_SHARDS` is zero.
    #[must_use]
    pub fn with_expected_keys(expected_keys: usize) -> Self {
        assert!(NUM_SHARDS > 0, "InvertedIndex requires at least one shard");

        let per_shard = expected_keys / NUM_SHARDS;
        let shards = (0..NUM_SHARDS)
            .map(|_| Shard::with_capacity(per_shard))
            .collect();

        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Pick the shard owning `key`.
    #[inline]
    fn shard(&self, key: &K) -> &Shard<K, V> {
        let idx = (self.hasher.hash_one(key) as usize) % NUM_SHARDS;
        &self.shards[idx]
    }

    /// Return the bucket for `key`, creating it if absent.
    ///
    /// Hot path: a read-locked probe. On miss, upgrade to a write lock
    /// and re-check before inserting (another thread may have created
    /// the bucket between the two lock acquisitions).
    fn get_or_create_bucket(&self, key: K) -> Arc<Bucket<V>> {
        let shard = self.shard(&key);

        {
            let map = shard.map.read();
            if let Some(bucket) = map.get(&key) {
                return Arc::clone(bucket);
            }
        }

        let mut map = shard.map.write();
        // double check
        Arc::clone(
            map.entry(key)
                .or_insert_with(|| Arc::new(Bucket::new())),
        )
    }

    /// Associate `value` with `key`. Returns `true` if the pair was new.
    pub fn insert(&self, key: K, value: V) -> bool {
        let bucket = self.get_or_create_bucket(key);
        let inserted = bucket.values.write().insert(value);
        inserted
    }

    /// Copy out the value set for `key`, or `∅` if absent.
    #[must_use]
    pub fn search(&self, key: &K) -> ValueSet<V>
    where
        V: Clone,
    {
        let bucket = {
            let map = self.shard(key).map.read();
            match map.get(key) {
                Some(bucket) => Arc::clone(bucket),
                None => return HashSet::new(),
            }
        };

        // Shard lock released; the bucket lock is still required because
        // a concurrent writer may be mutating the set.
        let values = bucket.values.read().clone();
        values
    }

    /// Remove `key` and its entire value set. Returns `true` if the key
    /// was present.
    pub fn remove(&self, key: &K) -> bool {
        self.shard(key).map.write().remove(key).is_some()
    }

    /// Remove a single `value` from `key`'s set. Returns `true` iff the
    /// value was present.
    ///
    /// When the last value drains, the entry itself is erased so the
    /// shard map never retains an empty bucket.
    pub fn remove_value(&self, key: &K, value: &V) -> bool {
        let shard = self.shard(key);
        let mut map = shard.map.write();

        let Some(bucket) = map.get(key).map(Arc::clone) else {
            return false;
        };

        let mut values = bucket.values.write();
        let removed = values.remove(value);

        if removed && values.is_empty() {
            drop(values);
            map.remove(key);
        }

        removed
    }

    /// Number of distinct keys currently indexed.
    ///
    /// Takes each shard's read lock in turn; the total is approximate
    /// under concurrent mutation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    /// Whether the index holds no keys at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.map.read().is_empty())
    }

    /// Number of shards holding at least one key. Diagnostics only.
    #[must_use]
    pub fn occupied_shards(&self) -> usize {
        self.shards
            .iter()
            .filter(|s| !s.map.read().is_empty())
            .count()
    }
}

impl<K, V, const NUM_SHARDS: usize> Default for InvertedIndex<K, V, NUM_SHARDS>
where
    K: Hash + Eq,
    V: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, const NUM_SHARDS: usize> Index<K, V> for InvertedIndex<K, V, NUM_SHARDS>
where
    K: Hash + Eq + Send + Sync,
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

// ============================================================================
//  Tests
// ============================================================================
