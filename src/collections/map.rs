//! Sharded concurrent hash map.
//!
//! The map replaces a single-lock table with independently locked shards,
//! so operations on disjoint keys proceed without blocking each other.
//!
//! # Lock Order
//!
//! Snapshot operations (`len` at a consistent instant, `for_each`,
//! `keys`, `clear`) acquire shard locks in ascending index order. Any
//! future operation needing multiple shards must do the same to prevent
//! deadlocks.

use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// The number of shards. Power of two so the shard index is a mask.
const SHARD_COUNT: usize = 16;

/// Bitmask for fast shard index calculation.
const SHARD_MASK: usize = SHARD_COUNT - 1;

/// A concurrent hash map sharded across independently locked tables.
///
/// Reads on one shard never block reads on another; writes contend only
/// within their shard. Iteration (`for_each`, `keys`) locks all shards in
/// fixed order and therefore observes a consistent snapshot instant.
pub struct ShardedMap<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K, V> Default for ShardedMap<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ShardedMap<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedMap")
            .field("shards", &SHARD_COUNT)
            .field("len", &self.len())
            .finish()
    }
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & SHARD_MASK]
    }

    /// Inserts a key/value pair, returning the previous value if any.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.shard_for(&key).write().insert(key, value)
    }

    /// Removes a key, returning its value if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard_for(key).write().remove(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.shard_for(key).read().contains_key(key)
    }

    /// Applies `f` to the value for `key`, if present.
    pub fn with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.shard_for(key).read().get(key).map(f)
    }

    /// Number of entries across all shards.
    ///
    /// Shards are summed without a global lock, so the count is
    /// approximate while writers are active.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns true if no shard holds an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Removes every entry.
    ///
    /// Locks all shards in ascending order, so the map is observably
    /// empty at one instant.
    pub fn clear(&self) {
        let mut guards: Vec<_> = self.shards.iter().map(RwLock::write).collect();
        for guard in &mut guards {
            guard.clear();
        }
    }

    /// Visits every entry at a consistent snapshot instant.
    ///
    /// All shard locks are held (in ascending order) for the duration of
    /// the visit; keep visitors short.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        let guards: Vec<_> = self.shards.iter().map(RwLock::read).collect();
        for guard in &guards {
            for (key, value) in guard.iter() {
                visitor(key, value);
            }
        }
    }
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Returns a copy of the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.shard_for(key).read().get(key).cloned()
    }
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Collects every key at a consistent snapshot instant.
    ///
    /// Iteration order is unspecified.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        self.for_each(|key, _| keys.push(key.clone()));
        keys
    }
}
