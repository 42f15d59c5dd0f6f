//! Per-thread lazily-initialized value holder.
//!
//! Unlike `std::thread_local!`, this holder is a value you can construct
//! per instance, hand around, and inspect across threads: `for_each`
//! visits every thread's current value, and `clear` resets them all.
//!
//! Each thread's value lives in its own slot behind its own lock, so a
//! write in one thread never perturbs another thread's slot. The registry
//! keyed by thread id is only touched on first access per thread and on
//! cross-thread operations.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

type Slot<T> = Arc<RwLock<Option<T>>>;

/// A per-thread value with lazy initialization and cross-thread
/// enumeration.
///
/// Constructed bare, `get_cloned`/`with` report no value until the thread
/// calls [`set`](Self::set). Constructed with an initializer, the first
/// access on each thread runs it.
pub struct ThreadLocal<T> {
    slots: RwLock<HashMap<ThreadId, Slot<T>>>,
    init: Option<Arc<dyn Fn() -> T + Send + Sync>>,
}

impl<T: Send + 'static> Default for ThreadLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ThreadLocal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadLocal")
            .field("threads", &self.slots.read().len())
            .field("has_initializer", &self.init.is_some())
            .finish()
    }
}

impl<T: Send + 'static> ThreadLocal<T> {
    /// Creates a holder with no initializer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            init: None,
        }
    }

    /// Creates a holder whose first access per thread runs `init`.
    #[must_use]
    pub fn with_initializer<F>(init: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            slots: RwLock::new(HashMap::new()),
            init: Some(Arc::new(init)),
        }
    }

    /// Returns the calling thread's slot, creating it if needed.
    fn slot(&self) -> Slot<T> {
        let id = thread::current().id();
        if let Some(slot) = self.slots.read().get(&id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(id).or_default())
    }

    /// Lazily initializes the calling thread's value if an initializer
    /// exists and the slot is empty.
    fn ensure_initialized(&self, slot: &Slot<T>) {
        if let Some(init) = &self.init {
            let mut value = slot.write();
            if value.is_none() {
                *value = Some(init());
            }
        }
    }

    /// Sets the calling thread's value explicitly.
    pub fn set(&self, value: T) {
        *self.slot().write() = Some(value);
    }

    /// Applies `f` to the calling thread's value.
    ///
    /// Runs the initializer first if one was configured. Returns `None`
    /// when the holder has no initializer and the thread never called
    /// [`set`](Self::set).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.slot();
        self.ensure_initialized(&slot);
        let guard = slot.read();
        guard.as_ref().map(f)
    }

    /// Returns true if the calling thread currently holds a value.
    ///
    /// Does not trigger lazy initialization.
    #[must_use]
    pub fn has_value(&self) -> bool {
        let id = thread::current().id();
        self.slots
            .read()
            .get(&id)
            .is_some_and(|slot| slot.read().is_some())
    }

    /// Removes and returns the calling thread's value.
    pub fn remove(&self) -> Option<T> {
        let id = thread::current().id();
        let slot = self.slots.read().get(&id).map(Arc::clone)?;
        let value = slot.write().take();
        value
    }

    /// Clears every thread's value.
    ///
    /// Slots are cleared one at a time; a thread re-initializing
    /// concurrently may repopulate its own slot afterwards.
    pub fn clear(&self) {
        let slots: Vec<Slot<T>> = self.slots.read().values().map(Arc::clone).collect();
        for slot in slots {
            slot.write().take();
        }
    }

    /// Visits the currently live per-thread values.
    ///
    /// Each slot is read independently; threads that never accessed the
    /// holder are not represented, and visit order is unspecified.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&T),
    {
        let slots: Vec<Slot<T>> = self.slots.read().values().map(Arc::clone).collect();
        for slot in slots {
            let guard = slot.read();
            if let Some(value) = guard.as_ref() {
                visitor(value);
            }
        }
    }
}

impl<T: Clone + Send + 'static> ThreadLocal<T> {
    /// Returns a copy of the calling thread's value.
    ///
    /// Runs the initializer first if one was configured.
    #[must_use]
    pub fn get_cloned(&self) -> Option<T> {
        self.with(Clone::clone)
    }
}
