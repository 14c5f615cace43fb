//! CommitCache - read-through cache over committed state
//!
//! - `get` serves hits under a shared section
//! - a miss drops the shared section, takes the exclusive one, re-checks,
//!   reads the store and populates; population never happens under a
//!   shared section
//! - `set`/`delete`/`apply_batch` update the store and the cached entry
//!   inside the same exclusive section
//! - absent keys are cached as negative entries
//!
//! Capacity policy: once a shard is full, misses are still served from the
//! store but no longer inserted (counted as evictions).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::backend::Store;
use super::batch::CommitBatch;
use super::errors::StoreResult;
use super::range::{Direction, KeyRange};
use super::shard::Shards;
use super::{Key, Value};

type CachedEntry = Option<Value>;

/// Cache statistics. Passive only; never influence caching.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Read-through cache in front of a [`Store`].
pub struct CommitCache {
    store: Arc<dyn Store>,
    shards: Shards<HashMap<Key, CachedEntry>>,
    shard_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CommitCache {
    /// `capacity` is the total entry budget, spread evenly over `shard_count`.
    pub fn new(store: Arc<dyn Store>, shard_count: usize, capacity: usize) -> Self {
        let shards = Shards::new(shard_count);
        let shard_capacity = capacity.div_ceil(shards.len());
        Self {
            store,
            shards,
            shard_capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// The backing committed store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Committed value of `key`.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Value>> {
        {
            let shard = self.shards.read(key);
            if let Some(entry) = shard.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.clone());
            }
        }

        let mut shard = self.shards.write(key);
        // another worker may have populated between the two sections
        if let Some(entry) = shard.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = self.store.get(key)?;
        if shard.len() < self.shard_capacity {
            shard.insert(key.to_vec(), value.clone());
        } else {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut shard = self.shards.write(key);
        match self.store.set(key, value) {
            Ok(()) => {
                Self::refresh(&mut shard, key, Some(value.to_vec()));
                Ok(())
            }
            Err(err) => {
                shard.remove(key);
                Err(err)
            }
        }
    }

    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut shard = self.shards.write(key);
        match self.store.delete(key) {
            Ok(()) => {
                Self::refresh(&mut shard, key, None);
                Ok(())
            }
            Err(err) => {
                shard.remove(key);
                Err(err)
            }
        }
    }

    /// Committed entries in `range`, materialized.
    pub fn iterate(&self, range: &KeyRange, direction: Direction) -> StoreResult<Vec<(Key, Value)>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        match direction {
            Direction::Forward => self.store.iterate(range.start(), range.end()),
            Direction::Reverse => self.store.reverse_iterate(range.start(), range.end()),
        }
    }

    /// Apply one block's writes.
    ///
    /// Every shard is held exclusively for the duration so no reader sees
    /// the store and cache disagree. On failure cached entries for the
    /// batch's keys are dropped, so later reads go back to the store.
    pub fn apply_batch(&self, batch: &CommitBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut shards: Vec<_> = self.shards.write_each().collect();
        let result = self.store.write_batch(batch);
        for entry in batch.iter() {
            let shard = &mut shards[self.shards.index_of(&entry.key)];
            match &result {
                Ok(()) => Self::refresh(shard, &entry.key, entry.value.clone()),
                Err(_) => {
                    shard.remove(&entry.key);
                }
            }
        }
        result
    }

    /// Drop every cached entry. Committed state is untouched.
    pub fn clear(&self) {
        for mut shard in self.shards.write_each() {
            shard.clear();
        }
    }

    /// Number of cached entries, including negative ones.
    pub fn len(&self) -> usize {
        self.shards.read_each().map(|shard| shard.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    // Only keys already cached are refreshed; writes do not warm the cache.
    fn refresh(shard: &mut HashMap<Key, CachedEntry>, key: &[u8], value: CachedEntry) {
        if let Some(entry) = shard.get_mut(key) {
            *entry = value;
        }
    }
}
