//! Concurrent growable vector.
//!
//! A read-write lock guards the buffer: element access and snapshots take
//! the read side, growth and shrink take the write side. Push and pop are
//! amortized O(1) on top of the underlying `Vec`.

use parking_lot::RwLock;

/// A growable vector safe for concurrent push/pop and indexed reads.
///
/// Bounds are always checked: [`get`](Self::get) returns `None` out of
/// range rather than panicking. `len` observed between operations is
/// approximate while writers are active.
pub struct ConcurrentVec<T> {
    inner: RwLock<Vec<T>>,
}

impl<T> Default for ConcurrentVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ConcurrentVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentVec")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> ConcurrentVec<T> {
    /// Creates an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    /// Creates an empty vector with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Vec::with_capacity(capacity)),
        }
    }

    /// Appends a value.
    pub fn push_back(&self, value: T) {
        self.inner.write().push(value);
    }

    /// Removes and returns the last value, or `None` when empty.
    pub fn pop_back(&self) -> Option<T> {
        self.inner.write().pop()
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the vector holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Releases excess capacity.
    pub fn shrink_to_fit(&self) {
        self.inner.write().shrink_to_fit();
    }

    /// Current capacity of the underlying buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    /// Applies `f` to the element at `index`, if in range.
    pub fn with<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.read().get(index).map(f)
    }
}

impl<T: Clone> ConcurrentVec<T> {
    /// Returns a copy of the element at `index`, or `None` out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.read().get(index).cloned()
    }

    /// Copies the contents into a plain `Vec`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_round() {
        let vec = ConcurrentVec::new();
        vec.push_back(1);
        vec.push_back(2);

        assert_eq!(vec.len(), 2);
        assert_eq!(vec.pop_back(), Some(2));
        assert_eq!(vec.pop_back(), Some(1));
        assert_eq!(vec.pop_back(), None);
        assert!(vec.is_empty());
    }

    #[test]
    fn get_is_bounds_checked() {
        let vec = ConcurrentVec::new();
        vec.push_back(5);

        assert_eq!(vec.get(0), Some(5));
        assert_eq!(vec.get(1), None);
        assert_eq!(vec.get(usize::MAX), None);
    }

    #[test]
    fn with_reads_in_place() {
        let vec = ConcurrentVec::new();
        vec.push_back(String::from("hello"));

        assert_eq!(vec.with(0, |value| value.len()), Some(5));
        assert_eq!(vec.with(1, |value| value.len()), None);
    }

    #[test]
    fn shrink_to_fit_releases_capacity() {
        let vec = ConcurrentVec::with_capacity(1024);
        vec.push_back(1);
        assert!(vec.capacity() >= 1024);

        vec.shrink_to_fit();
        assert!(vec.capacity() < 1024);
        assert_eq!(vec.get(0), Some(1));
    }

    #[test]
    fn snapshot_copies_contents() {
        let vec = ConcurrentVec::new();
        for i in 0..10 {
            vec.push_back(i);
        }
        assert_eq!(vec.snapshot(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_push_pop_conserves_items() {
        const THREADS: usize = 4;
        const OPS: usize = 500;

        let vec = Arc::new(ConcurrentVec::new());
        let mut handles = Vec::new();

        for t in 0..THREADS {
            let vec_clone = Arc::clone(&vec);
            handles.push(thread::spawn(move || {
                let mut pushed: u64 = 0;
                let mut popped: u64 = 0;
                for i in 0..OPS {
                    let value = (t * OPS + i) as u64;
                    vec_clone.push_back(value);
                    pushed += value;
                    if let Some(v) = vec_clone.pop_back() {
                        popped += v;
                    }
                }
                (pushed, popped)
            }));
        }

        let (mut pushed_total, mut popped_total) = (0u64, 0u64);
        for handle in handles {
            let (pushed, popped) = handle.join().expect("worker panicked");
            pushed_total += pushed;
            popped_total += popped;
        }
        while let Some(v) = vec.pop_back() {
            popped_total += v;
        }

        assert_eq!(pushed_total, popped_total);
        assert!(vec.is_empty());
    }
}
