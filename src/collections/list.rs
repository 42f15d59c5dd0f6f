//! Lock-free singly-linked list with epoch-based reclamation.
//!
//! Head insertion and removal are the same compare-and-swap discipline as
//! the stack; what the list adds is forward traversal. Traversal pins the
//! epoch, so nodes removed mid-walk stay readable until the walker is
//! done — no double free, no lost node.

#![allow(unsafe_code)]

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Node<T> {
    value: T,
    next: Atomic<Node<T>>,
}

/// A concurrent singly-linked list with head insertion.
///
/// `len` is approximate under concurrency. Traversal observes a
/// best-effort snapshot: nodes removed or inserted during the walk may or
/// may not be visited, but every visited node is intact.
pub struct LockFreeList<T> {
    head: Atomic<Node<T>>,
    len: AtomicUsize,
}

impl<T> Default for LockFreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for LockFreeList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFreeList")
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> LockFreeList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
            len: AtomicUsize::new(0),
        }
    }

    /// Inserts a value at the front.
    pub fn push_front(&self, value: T) {
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

    /// Visits every value in front-to-back order.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&T),
    {
        let guard = epoch::pin();
        let mut current = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { current.as_ref() } {
            visitor(&node.value);
            current = node.next.load(Ordering::Acquire, &guard);
        }
    }

    /// Returns true if the list was empty at the moment of the check.
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

impl<T: Clone> LockFreeList<T> {
    /// Removes and returns the front value, or `None` when empty.
    pub fn pop_front(&self) -> Option<T> {
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
                unsafe { guard.defer_destroy(head) };
                return Some(value);
            }
        }
    }

    /// Returns the front value without removing it.
    #[must_use]
    pub fn front(&self) -> Option<T> {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        unsafe { head.as_ref() }.map(|node| node.value.clone())
    }

    /// Collects the values in front-to-back order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len());
        self.for_each(|value| values.push(value.clone()));
        values
    }
}

impl<T> Drop for LockFreeList<T> {
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
