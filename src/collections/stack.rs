//! Lock-free stack (Treiber) with epoch-based reclamation.
//!
//! Push and pop are compare-and-swap retry loops on the head pointer.
//! Nodes retired by `pop` are handed to the epoch collector and freed
//! only after every concurrent reader has moved on, so traversing threads
//! never observe freed memory.
//!
//! Values are cloned out on `pop`/`peek` rather than moved: a node's
//! payload stays intact until the node is reclaimed, which is what makes
//! concurrent `peek` sound against a racing `pop`.

#![allow(unsafe_code)]

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Node<T> {
    value: T,
    next: Atomic<Node<T>>,
}

/// A concurrent stack safe for arbitrary producer/consumer counts.
///
/// `len` is approximate under concurrency: it reflects a recent state,
/// not a strict snapshot.
pub struct LockFreeStack<T> {
    head: Atomic<Node<T>>,
    len: AtomicUsize,
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> LockFreeStack<T> {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
            len: AtomicUsize::new(0),
        }
    }

    /// Pushes a value on top of the stack.
    pub fn push(&self, value: T) {
        let mut node = Owned::new(Node {
            value,
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange(
                head,
                node,
                Ordering::Release,
                Ordering::Relaxed,
                &guard,
            ) {
                Ok(_) => {
                    self.len.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(err) => node = err.new,
            }
        }
    }

    /// Returns true if the stack was empty at the moment of the check.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Approximate number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl<T: Clone> LockFreeStack<T> {
    /// Pops the top value, or returns `None` when empty.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let node = unsafe { head.as_ref() }?;
            let next = node.next.load(Ordering::Relaxed, &guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::Acquire, Ordering::Relaxed, &guard)
                .is_ok()
            {
                self.len.fetch_sub(1, Ordering::Relaxed);
                let value = node.value.clone();
                // The node is unlinked; free it once concurrent readers
                // have unpinned.
                unsafe { guard.defer_destroy(head) };
                return Some(value);
            }
        }
    }

    /// Returns a copy of the top value without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        unsafe { head.as_ref() }.map(|node| node.value.clone())
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        // &mut self: no concurrent accessors remain.
        let guard = unsafe { epoch::unprotected() };
        let mut current = self.head.load(Ordering::Relaxed, guard);
        while let Some(node) = unsafe { current.as_ref() } {
            let next = node.next.load(Ordering::Relaxed, guard);
            drop(unsafe { current.into_owned() });
            current = next;
        }
    }
}
