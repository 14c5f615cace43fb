//! CommitBatch - the ordered writeset of one block.
//!
//! A batch is produced once per block by the multi-version store and applied
//! to committed state in a single step. Its digest is a pure function of the
//! ordered entries, so two nodes that executed the same block compare equal
//! byte-for-byte.

use sha2::{Digest, Sha256};

use super::{Key, Value};

const TAG_SET: u8 = 1;
const TAG_DELETE: u8 = 0;

/// One committed key: `Some(value)` sets it, `None` deletes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub key: Key,
    pub value: Option<Value>,
}

/// Key-ordered set of committed writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitBatch {
    entries: Vec<BatchEntry>,
}

impl CommitBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from arbitrary entries. Entries are sorted by key; the
    /// last entry for a duplicated key wins.
    pub fn from_entries(entries: impl IntoIterator<Item = BatchEntry>) -> Self {
        let mut entries: Vec<BatchEntry> = entries.into_iter().collect();
        // stable sort keeps insertion order among equal keys
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let mut deduped: Vec<BatchEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.key == entry.key => *last = entry,
                _ => deduped.push(entry),
            }
        }
        Self { entries: deduped }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    /// SHA-256 over `len(key) ‖ key ‖ tag ‖ [len(value) ‖ value]` per entry.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.entries.len() as u64).to_be_bytes());
        for entry in &self.entries {
            hasher.update((entry.key.len() as u64).to_be_bytes());
            hasher.update(&entry.key);
            match &entry.value {
                Some(value) => {
                    hasher.update([TAG_SET]);
                    hasher.update((value.len() as u64).to_be_bytes());
                    hasher.update(value);
                }
                None => hasher.update([TAG_DELETE]),
            }
        }
        hasher.finalize().into()
    }

    /// Lowercase hex form of [`digest`](Self::digest).
    pub fn digest_hex(&self) -> String {
        self.digest().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl IntoIterator for CommitBatch {
    type Item = BatchEntry;
    type IntoIter = std::vec::IntoIter<BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
