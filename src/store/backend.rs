//! Committed-state backend capability.
//!
//! The durable, Merkle-backed store lives outside this crate. The engine
//! reaches it only through [`Store`]; [`MemoryStore`] is the reference
//! implementation used by tests and by embedders that keep state in memory.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use super::batch::CommitBatch;
use super::errors::StoreResult;
use super::{Key, Value};

/// Committed key-value state.
///
/// Ranges are half-open `[start, end)`; `None` is unbounded. Iteration
/// results are owned copies, never live cursors.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Value>>;

    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Entries in `[start, end)` in ascending key order.
    fn iterate(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<Vec<(Key, Value)>>;

    /// Entries in `[start, end)` in descending key order.
    fn reverse_iterate(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<Vec<(Key, Value)>>;

    /// Apply a whole block's writes, all or nothing.
    ///
    /// The default reads each key's prior value before overwriting it. On
    /// the first failure the entries already applied are restored in reverse
    /// order and the original error is returned. Backends with a native
    /// atomic batch should override it.
    fn write_batch(&self, batch: &CommitBatch) -> StoreResult<()> {
        let mut undo: Vec<(&[u8], Option<Value>)> = Vec::with_capacity(batch.len());
        for entry in batch.iter() {
            let applied = self.get(&entry.key).and_then(|prior| {
                apply_entry(self, &entry.key, entry.value.as_deref())?;
                Ok(prior)
            });
            match applied {
                Ok(prior) => undo.push((&entry.key, prior)),
                Err(err) => {
                    for (key, prior) in undo.into_iter().rev() {
                        // best effort; the first error is the one reported
                        let _ = apply_entry(self, key, prior.as_deref());
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

fn apply_entry<S: Store + ?Sized>(store: &S, key: &[u8], value: Option<&[u8]>) -> StoreResult<()> {
    match value {
        Some(value) => store.set(key, value),
        None => store.delete(key),
    }
}

/// In-memory ordered store with an atomic `write_batch`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Key, Value>>,
    reads: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: RwLock::new(data),
            reads: AtomicU64::new(0),
        }
    }

    /// Owned copy of the whole state.
    pub fn snapshot(&self) -> BTreeMap<Key, Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of point reads served, for cache accounting.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Vec<(Key, Value)> {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Vec::new();
            }
        }
        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.range::<[u8], _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(key);
        Ok(())
    }

    fn iterate(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<Vec<(Key, Value)>> {
        Ok(self.range(start, end))
    }

    fn reverse_iterate(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<Vec<(Key, Value)>> {
        let mut entries = self.range(start, end);
        entries.reverse();
        Ok(entries)
    }

    fn write_batch(&self, batch: &CommitBatch) -> StoreResult<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        for entry in batch.iter() {
            match &entry.value {
                Some(value) => {
                    data.insert(entry.key.clone(), value.clone());
                }
                None => {
                    data.remove(&entry.key);
                }
            }
        }
        Ok(())
    }
}
