//! Fixed-count lock sharding keyed by a hash of the storage key.
//!
//! Readers get a `RwLockReadGuard`, which only derefs to `&T`; every
//! mutation has to go through [`Shards::write`]. Nothing here hands out
//! mutable access from a read section.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) struct Shards<T> {
    shards: Box<[RwLock<T>]>,
}

impl<T: Default> Shards<T> {
    /// Create `count` empty shards. A count of zero is treated as one.
    pub(crate) fn new(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| RwLock::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }
}

impl<T> Shards<T> {
    pub(crate) fn len(&self) -> usize {
        self.shards.len()
    }

    pub(crate) fn index_of(&self, key: &[u8]) -> usize {
        // DefaultHasher::new() uses fixed keys, so placement is stable
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Shared section over the shard owning `key`.
    pub(crate) fn read(&self, key: &[u8]) -> RwLockReadGuard<'_, T> {
        read_section(&self.shards[self.index_of(key)])
    }

    /// Exclusive section over the shard owning `key`.
    pub(crate) fn write(&self, key: &[u8]) -> RwLockWriteGuard<'_, T> {
        write_section(&self.shards[self.index_of(key)])
    }

    /// Shared sections over every shard, taken one at a time.
    pub(crate) fn read_each(&self) -> impl Iterator<Item = RwLockReadGuard<'_, T>> {
        self.shards.iter().map(read_section)
    }

    /// Exclusive sections over every shard, taken one at a time.
    pub(crate) fn write_each(&self) -> impl Iterator<Item = RwLockWriteGuard<'_, T>> {
        self.shards.iter().map(write_section)
    }
}

// A worker that panicked inside the application callback never holds one of
// these locks, so a poisoned guard still protects consistent data.
fn read_section<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_section<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_zero_count_becomes_one() {
        let shards: Shards<HashMap<Vec<u8>, u32>> = Shards::new(0);
        assert_eq!(shards.len(), 1);
    }

    #[test]
    fn test_same_key_same_shard() {
        let shards: Shards<HashMap<Vec<u8>, u32>> = Shards::new(16);
        assert_eq!(shards.index_of(b"balance:A"), shards.index_of(b"balance:A"));
    }

    #[test]
    fn test_write_then_read() {
        let shards: Shards<HashMap<Vec<u8>, u32>> = Shards::new(8);
        shards.write(b"k").insert(b"k".to_vec(), 7);
        assert_eq!(shards.read(b"k").get(b"k".as_slice()), Some(&7));

        let total: usize = shards.read_each().map(|s| s.len()).sum();
        assert_eq!(total, 1);
    }
}
