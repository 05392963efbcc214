//! Loom model of the mark/unlink CAS protocol.
//!
//! Loom explores every interleaving of a small model, catching races
//! that stress tests hit only probabilistically. Rather than loom-ify
//! the whole list, this models the protocol on a single-level chain:
//! the same tag-bit encoding, the same linearization rules.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib skiplist::loom_tests`
//!
//! Keep the models tiny: loom's state space grows exponentially.

use loom::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

/// A one-level chain node: `HEAD -> A -> TAIL`, tag bit in the low bit
/// of `next`, as in the real list.
struct ChainNode {
    next: AtomicPtr<ChainNode>,
}

fn is_marked(ptr: *mut ChainNode) -> bool {
    ptr as usize & 1 != 0
}

fn marked(ptr: *mut ChainNode) -> *mut ChainNode {
    (ptr as usize | 1) as *mut ChainNode
}

fn unmarked(ptr: *mut ChainNode) -> *mut ChainNode {
    (ptr as usize & !1) as *mut ChainNode
}

struct Chain {
    head: *mut ChainNode,
    node: *mut ChainNode,
    tail: *mut ChainNode,
}

unsafe impl Send for Chain {}
unsafe impl Sync for Chain {}

impl Chain {
    fn new() -> Self {
        let tail = Box::into_raw(Box::new(ChainNode {
            next: AtomicPtr::new(std::ptr::null_mut()),
        }));
        let node = Box::into_raw(Box::new(ChainNode {
            next: AtomicPtr::new(tail),
        }));
        let head = Box::into_raw(Box::new(ChainNode {
            next: AtomicPtr::new(node),
        }));
        Self { head, node, tail }
    }

    /// The remover: tag the node's next pointer (logical deletion).
    fn mark(&self) -> bool {
        let slot = unsafe { &(*self.node).next };
        let mut succ = slot.load(Ordering::Acquire);
        while !is_marked(succ) {
            match slot.compare_exchange(succ, marked(succ), Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(current) => succ = current,
            }
        }
        false
    }

    /// The helper: swing `head.next` past the node if it is tagged.
    /// Returns whether the node is observed live at the end.
    fn traverse_and_help(&self) -> bool {
        let head_slot = unsafe { &(*self.head).next };
        let curr = unmarked(head_slot.load(Ordering::Acquire));
        if curr == self.tail {
            return false;
        }
        let succ = unsafe { &(*curr).next }.load(Ordering::Acquire);
        if is_marked(succ) {
            // Physical unlink; losing the CAS is fine, someone else did it.
            let _ = head_slot.compare_exchange(
                curr,
                unmarked(succ),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return false;
        }
        true
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.node));
            drop(Box::from_raw(self.tail));
        }
    }
}

#[test]
fn mark_vs_helper_never_resurrects() {
    loom::model(|| {
        let chain = Arc::new(Chain::new());

        let remover = {
            let chain = Arc::clone(&chain);
            thread::spawn(move || chain.mark())
        };
        let reader = {
            let chain = Arc::clone(&chain);
            thread::spawn(move || chain.traverse_and_help())
        };

        let marked_now = remover.join().unwrap();
        let seen_live = reader.join().unwrap();
        assert!(marked_now, "sole remover must install the tag");

        // After the mark, no traversal may see the node live again.
        let chain2 = Arc::clone(&chain);
        assert!(!chain2.traverse_and_help());
        let _ = seen_live; // pre-mark observation is allowed either way
    });
}

#[test]
fn concurrent_removers_tag_exactly_once() {
    loom::model(|| {
        let chain = Arc::new(Chain::new());
        let tags = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let chain = Arc::clone(&chain);
                let tags = Arc::clone(&tags);
                thread::spawn(move || {
                    if chain.mark() {
                        tags.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Exactly one CAS installs the tag bit.
        assert_eq!(tags.load(Ordering::Relaxed), 1);
    });
}
