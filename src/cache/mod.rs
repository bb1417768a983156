//! # Sharded LRU Block Cache
//!
//! A write-through cache mapping shardable keys to decoded block buffers.
//! Keys route themselves to a shard (lock striping, so readers on
//! different shards never contend), and each shard runs an independent
//! LRU over its slice of the byte budget.
//!
//! ## Design Invariants
//!
//! - Each shard owns ⌊capacity / shards⌋ bytes; eviction runs while a
//!   shard's resident size *strictly exceeds* its budget, so a shard may
//!   sit exactly at capacity but never above it.
//! - A miss invokes the caller's provider under no lock; two concurrent
//!   misses on the same key may both call it. Providers are idempotent
//!   (re-reading an immutable file block), and the last writer wins.
//! - Buffers are handed out as [`Bytes`], so hits clone a refcount, not
//!   the block.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::RwLock;

use bytes::Bytes;

use crate::error::StoreError;

// ------------------------------------------------------------------------------------------------
// Shardable
// ------------------------------------------------------------------------------------------------

/// A key that can route itself to one of `shard_count` shards.
///
/// The returned index must lie in `0..shard_count`; anything else is
/// reported as [`StoreError::ShardOutOfRange`].
pub trait Shardable {
    fn shard(&self, shard_count: usize) -> usize;
}

// ------------------------------------------------------------------------------------------------
// Shard internals
// ------------------------------------------------------------------------------------------------

struct CacheEntry {
    value: Bytes,
    size: i64,
    stamp: u64,
}

/// One lock-striped segment: a key map plus a recency index keyed by a
/// monotonic stamp (smallest stamp = least recently used).
struct Shard<K> {
    size: i64,
    tick: u64,
    entries: HashMap<K, CacheEntry>,
    recency: BTreeMap<u64, K>,
}

impl<K: Eq + Hash + Clone> Shard<K> {
    fn new() -> Self {
        Self {
            size: 0,
            tick: 0,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
        }
    }

    /// Moves an existing entry to the most-recently-used position.
    fn touch(&mut self, key: &K) {
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.stamp);
            self.tick += 1;
            entry.stamp = self.tick;
            self.recency.insert(self.tick, key.clone());
        }
    }

    /// Inserts at the most-recently-used position, replacing any entry a
    /// concurrent miss raced in.
    fn insert(&mut self, key: K, value: Bytes) {
        let size = value.len() as i64;
        self.tick += 1;
        let entry = CacheEntry {
            value,
            size,
            stamp: self.tick,
        };
        if let Some(old) = self.entries.insert(key.clone(), entry) {
            self.size -= old.size;
            self.recency.remove(&old.stamp);
        }
        self.size += size;
        self.recency.insert(self.tick, key);
    }

    /// Drops the least-recently-used entry. Returns `false` when empty.
    fn evict_lru(&mut self) -> bool {
        match self.recency.pop_first() {
            Some((_, key)) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.size -= entry.size;
                }
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, key: &K) {
        if let Some(entry) = self.entries.remove(key) {
            self.size -= entry.size;
            self.recency.remove(&entry.stamp);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ShardedLruCache
// ------------------------------------------------------------------------------------------------

/// A bounded, sharded, write-through LRU cache of byte buffers.
pub struct ShardedLruCache<K> {
    shard_max_size: i64,
    shards: Vec<RwLock<Shard<K>>>,
}

impl<K: Shardable + Eq + Hash + Clone> ShardedLruCache<K> {
    /// Creates a cache with `shard_count` shards splitting `size` bytes of
    /// total capacity evenly.
    pub fn new(shard_count: usize, size: i64) -> Self {
        let shards = (0..shard_count)
            .map(|_| RwLock::new(Shard::new()))
            .collect();
        Self {
            shard_max_size: size / shard_count as i64,
            shards,
        }
    }

    fn shard_for(&self, key: &K) -> Result<&RwLock<Shard<K>>, StoreError> {
        let shard = key.shard(self.shards.len());
        self.shards.get(shard).ok_or(StoreError::ShardOutOfRange {
            shard,
            shards: self.shards.len(),
        })
    }

    /// Returns the cached buffer for `key`, falling back to `provider` on
    /// a miss. Provider failures surface unchanged; a provided buffer is
    /// inserted at the MRU position and LRU entries are dropped while the
    /// shard exceeds its budget.
    pub fn get(
        &self,
        key: K,
        provider: impl FnOnce(&K) -> Result<Bytes, StoreError>,
    ) -> Result<Bytes, StoreError> {
        let shard = self.shard_for(&key)?;

        let hit = {
            let guard = shard
                .read()
                .map_err(|_| StoreError::Internal("cache shard lock poisoned".into()))?;
            guard.entries.get(&key).map(|entry| entry.value.clone())
        };

        if let Some(value) = hit {
            let mut guard = shard
                .write()
                .map_err(|_| StoreError::Internal("cache shard lock poisoned".into()))?;
            guard.touch(&key);
            return Ok(value);
        }

        let value = provider(&key)?;
        let mut guard = shard
            .write()
            .map_err(|_| StoreError::Internal("cache shard lock poisoned".into()))?;
        guard.insert(key, value.clone());
        while guard.size > self.shard_max_size {
            if !guard.evict_lru() {
                break;
            }
        }
        Ok(value)
    }

    /// Removes the entry for `key` if present; no-op otherwise.
    pub fn evict(&self, key: &K) -> Result<(), StoreError> {
        let shard = self.shard_for(key)?;
        let mut guard = shard
            .write()
            .map_err(|_| StoreError::Internal("cache shard lock poisoned".into()))?;
        guard.remove(key);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &K) -> bool {
        let shard = key.shard(self.shards.len());
        self.shards[shard]
            .read()
            .map(|guard| guard.entries.contains_key(key))
            .unwrap_or(false)
    }
}
