//! Standard memory orderings for concurrent index access.
//!
//! These constants ensure consistent ordering usage across the codebase
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading forward pointers during skip list traversal.
/// Pairs with writers' Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing pointer fields.
/// Pairs with readers' Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for CAS success (compare-and-swap).
/// Used for skip list linking, marking, and physical unlinking.
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Ordering for CAS failure.
/// Only needs to observe the current value.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for stores to fields not yet shared with other threads
/// (e.g. initializing a node before its publishing CAS).
pub const RELAXED: Ordering = Ordering::Relaxed;
