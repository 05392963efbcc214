//! # Triplex
//!
//! Concurrent, in-memory, multi-valued key indices.
//!
//! An index maps a key to a *set* of values: the same key may be
//! associated with any number of distinct values, and duplicate
//! insertions of the same `(key, value)` pair coalesce. Three
//! interchangeable structures implement the [`Index`] contract, each
//! built around a different concurrency protocol:
//!
//! - [`InvertedIndex`]: a hash map sharded to bound lock contention,
//!   with per-shard and per-bucket reader/writer locks. Unordered;
//!   point operations only.
//! - [`SkipList`]: an ordered skip list whose structure is lock-free.
//!   Logical deletion marks the low bit of forward pointers
//!   (Harris/Michael style); traversals help unlink marked nodes.
//! - [`BPlusTree`]: an order-M B+ tree with linked leaves. Insertions
//!   run optimistically against a single leaf and fall back to a
//!   pessimistic latch-crabbing descent; range scans walk the leaf
//!   chain with lock coupling. Implements [`OrderedIndex`].
//!
//! ## Concurrency model
//!
//! Plain OS threads; no background work, no scheduler, no async. Every
//! operation runs to completion, and every wait is a blocking lock
//! acquisition or a CAS retry. Point operations on the hash and skip
//! list variants are linearizable per key. B+ tree range scans are
//! snapshot-free: a scan concurrent with writers may observe an insert
//! at one leaf and miss it at another.
//!
//! ## Example
//!
//! ```rust
//! use triplex::BPlusTree;
//!
//! let tree: BPlusTree<String, String> = BPlusTree::new();
//! tree.insert("a".into(), "1".into());
//! tree.insert("a".into(), "2".into());
//! tree.insert("b".into(), "3".into());
//!
//! assert_eq!(tree.search(&"a".to_string()).len(), 2);
//!
//! let range = tree.range_search(&"a".to_string(), &"b".to_string());
//! assert_eq!(range.len(), 1); // half-open: "b" excluded
//! ```

pub mod btree;
pub mod index;
pub mod inverted;
pub mod ordering;
pub mod skiplist;

pub(crate) mod tracing_helpers;

pub use btree::{BPlusTree, TreeStats};
pub use index::{Index, OrderedIndex, RangeMap, ValueSet};
pub use inverted::InvertedIndex;
pub use skiplist::SkipList;
