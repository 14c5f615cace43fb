//! MultiVersionStore - per-block versioned state shared by all workers
//!
//! - Authoritative answer to "what is visible to transaction i"
//! - Arbiter of read and range-scan validity
//! - Every mutation (versions, estimates, reader registrations) runs in an
//!   exclusive shard section; pure lookups use shared sections
//! - Never returns a version whose index is >= the reader's index
//!
//! Readers register what they observed while validating, inside the same
//! exclusive section that checks it. A publisher therefore either changes a
//! key before a reader checks it (the check fails) or after the reader
//! registered (the publisher reports the reader for re-validation). Ranges
//! are registered before they are replayed, for the same reason.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Mutex, PoisonError};

use super::errors::{MvccError, MvccResult};
use super::read_set::{IterationLog, LayerEntry, ReadLog};
use super::{TxnIndex, TxnVersion, Version, VersionChain, VersionPayload};
use crate::store::shard::Shards;
use crate::store::{
    display_key, BatchEntry, CommitBatch, CommitCache, Key, KeyRange, StoreResult, Value,
};

/// Result of [`MultiVersionStore::get_latest_before`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisibleRead {
    /// Published by a lower index. `value` is `None` for a tombstone.
    Version {
        version: TxnVersion,
        value: Option<Value>,
    },
    /// A lower index will overwrite this key; the reader must wait for it.
    Estimate { index: TxnIndex },
    /// No lower index wrote the key; committed state answered.
    Committed { value: Option<Value> },
}

impl VisibleRead {
    pub fn value(&self) -> Option<&Value> {
        match self {
            VisibleRead::Version { value, .. } | VisibleRead::Committed { value } => value.as_ref(),
            VisibleRead::Estimate { .. } => None,
        }
    }

    /// Index of the transaction that produced this read, if any.
    pub fn source_index(&self) -> Option<TxnIndex> {
        match self {
            VisibleRead::Version { version, .. } => Some(version.index),
            VisibleRead::Estimate { index } => Some(*index),
            VisibleRead::Committed { .. } => None,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self, VisibleRead::Estimate { .. })
    }
}

/// Outcome of publishing one writeset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Higher indices whose registered reads or scans this publication changed.
    pub affected: BTreeSet<TxnIndex>,
    /// Versions installed.
    pub written: usize,
    /// Versions of an earlier incarnation removed.
    pub removed: usize,
}

pub struct MultiVersionStore {
    shards: Shards<BTreeMap<Key, VersionChain>>,
    ranges: Mutex<BTreeMap<TxnIndex, Vec<KeyRange>>>,
}

impl MultiVersionStore {
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: Shards::new(shard_count),
            ranges: Mutex::new(BTreeMap::new()),
        }
    }

    // ==================== Writes ====================

    /// Insert or replace the version of `key` written by `version.index`.
    /// `None` writes a tombstone. Returns the higher indices this changes.
    pub fn set(&self, key: &[u8], version: TxnVersion, value: Option<Value>) -> BTreeSet<TxnIndex> {
        let mut affected = BTreeSet::new();
        let payload = VersionPayload::from_write(value);
        self.install(key, version.index, Some(Version::new(version, payload)), &mut affected);
        affected.extend(self.range_readers_hit(version.index, &[key]));
        affected
    }

    /// Install a placeholder for `key` so higher readers park on `index`
    /// instead of reading state it is about to replace.
    pub fn set_estimate(&self, key: &[u8], index: TxnIndex, incarnation: u32) {
        let mut ignored = BTreeSet::new();
        let version = Version::estimate(TxnVersion::new(index, incarnation));
        self.install(key, index, Some(version), &mut ignored);
    }

    /// Publish one attempt's writeset.
    ///
    /// Every buffered write becomes a version tagged `(index, incarnation)`;
    /// keys in `previous` (versions or estimates left by an earlier
    /// incarnation) that this writeset no longer touches are removed.
    pub fn publish(
        &self,
        index: TxnIndex,
        incarnation: u32,
        writes: &BTreeMap<Key, Option<Value>>,
        previous: &[Key],
    ) -> Publication {
        let version = TxnVersion::new(index, incarnation);
        let mut publication = Publication::default();
        let mut touched: Vec<&[u8]> = Vec::with_capacity(writes.len() + previous.len());

        for (key, write) in writes {
            let payload = VersionPayload::from_write(write.clone());
            self.install(
                key,
                index,
                Some(Version::new(version, payload)),
                &mut publication.affected,
            );
            publication.written += 1;
            touched.push(key);
        }

        for key in previous {
            if writes.contains_key(key) {
                continue;
            }
            if self.install(key, index, None, &mut publication.affected) {
                publication.removed += 1;
                touched.push(key);
            }
        }

        // shard sections are all released; see module docs for the ordering
        let ranged = self.range_readers_hit(index, &touched);
        publication.affected.extend(ranged);
        publication
    }

    /// Turn every version `index` holds at `keys` into an estimate.
    /// Returns how many versions were marked.
    pub fn invalidate(&self, index: TxnIndex, keys: &[Key]) -> usize {
        keys.iter()
            .filter(|key| {
                let mut shard = self.shards.write(key);
                shard
                    .get_mut(key.as_slice())
                    .map_or(false, |chain| chain.mark_estimate(index))
            })
            .count()
    }

    /// Install (`Some`) or remove (`None`) the version of `index` at `key`,
    /// collecting the registered readers the change affects. Returns false
    /// if a removal found nothing to remove.
    fn install(
        &self,
        key: &[u8],
        index: TxnIndex,
        version: Option<Version>,
        affected: &mut BTreeSet<TxnIndex>,
    ) -> bool {
        let mut shard = self.shards.write(key);
        match version {
            Some(version) => {
                let chain = shard.entry(key.to_vec()).or_default();
                chain.insert(version);
                affected.extend(chain.readers_invalidated_by(index));
                true
            }
            None => {
                let Some(chain) = shard.get_mut(key) else {
                    return false;
                };
                let removed = chain.remove(index).is_some();
                if removed {
                    affected.extend(chain.readers_invalidated_by(index));
                }
                if chain.is_empty() {
                    shard.remove(key);
                }
                removed
            }
        }
    }

    fn range_readers_hit(&self, writer: TxnIndex, keys: &[&[u8]]) -> Vec<TxnIndex> {
        if keys.is_empty() {
            return Vec::new();
        }
        let ranges = self.ranges.lock().unwrap_or_else(PoisonError::into_inner);
        ranges
            .range((Bound::Excluded(writer), Bound::Unbounded))
            .filter(|(_, scanned)| {
                scanned
                    .iter()
                    .any(|range| keys.iter().any(|k| range.contains(k)))
            })
            .map(|(reader, _)| *reader)
            .collect()
    }

    // ==================== Reads ====================

    /// The value visible to `index`: the version with the greatest index
    /// strictly below it, else committed state.
    pub fn get_latest_before(
        &self,
        key: &[u8],
        index: TxnIndex,
        committed: &CommitCache,
    ) -> StoreResult<VisibleRead> {
        {
            let shard = self.shards.read(key);
            if let Some(version) = shard.get(key).and_then(|chain| chain.latest_before(index)) {
                let txn_version = version.txn_version();
                return Ok(match version.payload() {
                    VersionPayload::Value(value) => VisibleRead::Version {
                        version: txn_version,
                        value: Some(value.clone()),
                    },
                    VersionPayload::Tombstone => VisibleRead::Version {
                        version: txn_version,
                        value: None,
                    },
                    VersionPayload::Estimate => VisibleRead::Estimate {
                        index: txn_version.index,
                    },
                });
            }
        }
        // the shard section is released before the cache takes its own
        Ok(VisibleRead::Committed {
            value: committed.get(key)?,
        })
    }

    /// In-flight entries visible to `index` inside `range`, ascending by
    /// key, as an owned snapshot. `Err` carries the index of the first
    /// estimate found.
    pub fn scan_before(&self, index: TxnIndex, range: &KeyRange) -> Result<Vec<LayerEntry>, TxnIndex> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let lower = range.start().map_or(Bound::Unbounded, Bound::Included);
        let upper = range.end().map_or(Bound::Unbounded, Bound::Excluded);

        let mut layer = Vec::new();
        for shard in self.shards.read_each() {
            for (key, chain) in shard.range::<[u8], _>((lower, upper)) {
                let Some(version) = chain.latest_before(index) else {
                    continue;
                };
                let value = match version.payload() {
                    VersionPayload::Estimate => return Err(version.index()),
                    VersionPayload::Value(value) => Some(value.clone()),
                    VersionPayload::Tombstone => None,
                };
                layer.push(LayerEntry {
                    key: key.clone(),
                    version: version.txn_version(),
                    value,
                });
            }
        }
        layer.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(layer)
    }

    // ==================== Validation ====================

    /// Re-check every logged point read against current state, registering
    /// `index` as a reader of each key. Repeating the call on unchanged
    /// state returns the same answer.
    pub fn validate_reads(&self, index: TxnIndex, log: &ReadLog) -> bool {
        if log.is_inconsistent() {
            return false;
        }
        log.iter().all(|(key, observed)| {
            let mut shard = self.shards.write(key);
            let chain = shard.entry(key.clone()).or_default();
            chain.register_reader(index, *observed);
            chain.origin_before(index) == Some(*observed)
        })
    }

    /// Replay every logged range scan, registering each range first.
    pub fn validate_iterations(&self, index: TxnIndex, log: &IterationLog) -> bool {
        log.iter().all(|scan| {
            self.register_range(index, &scan.range);
            match self.scan_before(index, &scan.range) {
                Ok(layer) => {
                    layer.len() == scan.observed.len()
                        && layer
                            .iter()
                            .zip(&scan.observed)
                            .all(|(now, (key, version))| now.key == *key && now.version == *version)
                }
                Err(_) => false,
            }
        })
    }

    fn register_range(&self, index: TxnIndex, range: &KeyRange) {
        let mut ranges = self.ranges.lock().unwrap_or_else(PoisonError::into_inner);
        let scanned = ranges.entry(index).or_default();
        if !scanned.contains(range) {
            scanned.push(range.clone());
        }
    }

    /// Drop every reader and range registration `index` made at `keys`.
    /// Called before `index` re-executes; the next incarnation registers
    /// afresh when it validates. Returns how many reader entries went away.
    pub fn unregister<'k>(
        &self,
        index: TxnIndex,
        keys: impl IntoIterator<Item = &'k Key>,
    ) -> usize {
        let mut removed = 0;
        for key in keys {
            let mut shard = self.shards.write(key);
            let Some(chain) = shard.get_mut(key.as_slice()) else {
                continue;
            };
            if chain.unregister_reader(index) {
                removed += 1;
            }
            if chain.is_empty() {
                shard.remove(key.as_slice());
            }
        }
        self.ranges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index);
        removed
    }

    // ==================== Commit ====================

    /// The ordered writeset of the block: for every key, the version of the
    /// highest index that wrote it.
    pub fn commit_batch(&self) -> MvccResult<CommitBatch> {
        let mut entries = Vec::new();
        for shard in self.shards.read_each() {
            for (key, chain) in shard.iter() {
                let Some(latest) = chain.latest() else {
                    continue;
                };
                let value = match latest.payload() {
                    VersionPayload::Value(value) => Some(value.clone()),
                    VersionPayload::Tombstone => None,
                    VersionPayload::Estimate => {
                        return Err(MvccError::UnresolvedEstimate {
                            index: latest.index(),
                            key: display_key(key),
                        })
                    }
                };
                entries.push(BatchEntry {
                    key: key.clone(),
                    value,
                });
            }
        }
        Ok(CommitBatch::from_entries(entries))
    }

    /// Single-threaded end-of-block commit into `destination`, then clear.
    ///
    /// Nothing reaches `destination` unless the whole batch could be built;
    /// on a store failure the table is left intact for the caller to discard.
    pub fn flush(&self, destination: &CommitCache) -> MvccResult<CommitBatch> {
        let batch = self.commit_batch()?;
        destination.apply_batch(&batch)?;
        self.discard();
        Ok(batch)
    }

    /// Drop every version and registration.
    pub fn discard(&self) {
        for mut shard in self.shards.write_each() {
            shard.clear();
        }
        self.ranges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of keys holding at least one version.
    pub fn key_count(&self) -> usize {
        self.shards
            .read_each()
            .map(|shard| shard.values().filter(|chain| chain.len() > 0).count())
            .sum()
    }

    /// True when no versions, readers or ranges are held.
    pub fn is_empty(&self) -> bool {
        self.shards.read_each().all(|shard| shard.is_empty())
            && self
                .ranges
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::ReadOrigin;
    use crate::store::{Direction, MemoryStore, Store};
    use std::sync::Arc;

    fn committed(entries: Vec<(&str, &str)>) -> CommitCache {
        let store = MemoryStore::with_entries(
            entries
                .into_iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec())),
        );
        CommitCache::new(Arc::new(store), 4, 1024)
    }

    fn v(index: TxnIndex, incarnation: u32) -> TxnVersion {
        TxnVersion::new(index, incarnation)
    }

    fn writes(entries: &[(&str, Option<&str>)]) -> BTreeMap<Key, Option<Value>> {
        entries
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.map(|v| v.as_bytes().to_vec())))
            .collect()
    }

    // ==================== Visibility ====================

    #[test]
    fn test_falls_through_to_committed() {
        let mv = MultiVersionStore::new(4);
        let cache = committed(vec![("k", "base")]);

        let read = mv.get_latest_before(b"k", 3, &cache).unwrap();
        assert_eq!(
            read,
            VisibleRead::Committed {
                value: Some(b"base".to_vec())
            }
        );
        assert_eq!(read.source_index(), None);
    }

    #[test]
    fn test_never_returns_own_or_higher_index() {
        let mv = MultiVersionStore::new(4);
        let cache = committed(vec![]);
        mv.set(b"k", v(2, 0), Some(b"two".to_vec()));
        mv.set(b"k", v(5, 0), Some(b"five".to_vec()));

        let at_two = mv.get_latest_before(b"k", 2, &cache).unwrap();
        assert_eq!(at_two, VisibleRead::Committed { value: None });

        let at_five = mv.get_latest_before(b"k", 5, &cache).unwrap();
        assert_eq!(at_five.source_index(), Some(2));

        let at_nine = mv.get_latest_before(b"k", 9, &cache).unwrap();
        assert_eq!(at_nine.value(), Some(&b"five".to_vec()));
    }

    #[test]
    fn test_tombstone_visible_as_version() {
        let mv = MultiVersionStore::new(4);
        let cache = committed(vec![("k", "base")]);
        mv.set(b"k", v(1, 0), None);

        let read = mv.get_latest_before(b"k", 2, &cache).unwrap();
        assert_eq!(
            read,
            VisibleRead::Version {
                version: v(1, 0),
                value: None
            }
        );
    }

    #[test]
    fn test_estimate_reported() {
        let mv = MultiVersionStore::new(4);
        let cache = committed(vec![]);
        mv.set_estimate(b"k", 1, 0);

        let read = mv.get_latest_before(b"k", 4, &cache).unwrap();
        assert!(read.is_estimate());
        assert_eq!(read.source_index(), Some(1));
    }

    // ==================== Validation ====================

    #[test]
    fn test_validate_reads_detects_lower_write() {
        let mv = MultiVersionStore::new(4);
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Committed);

        assert!(mv.validate_reads(3, &log));
        mv.set(b"k", v(1, 0), Some(b"x".to_vec()));
        assert!(!mv.validate_reads(3, &log));
    }

    #[test]
    fn test_validate_reads_ignores_higher_write() {
        let mv = MultiVersionStore::new(4);
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Committed);

        mv.set(b"k", v(7, 0), Some(b"x".to_vec()));
        assert!(mv.validate_reads(3, &log));
    }

    #[test]
    fn test_validate_reads_is_idempotent() {
        let mv = MultiVersionStore::new(4);
        mv.set(b"k", v(0, 0), Some(b"x".to_vec()));
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Version(v(0, 0)));

        let first = mv.validate_reads(2, &log);
        let second = mv.validate_reads(2, &log);
        assert!(first);
        assert_eq!(first, second);
    }

    #[test]
    fn test_validate_reads_fails_on_new_incarnation() {
        let mv = MultiVersionStore::new(4);
        mv.set(b"k", v(0, 0), Some(b"x".to_vec()));
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Version(v(0, 0)));

        mv.set(b"k", v(0, 1), Some(b"x".to_vec()));
        assert!(!mv.validate_reads(2, &log));
    }

    #[test]
    fn test_validate_reads_fails_on_estimate() {
        let mv = MultiVersionStore::new(4);
        mv.set(b"k", v(0, 0), Some(b"x".to_vec()));
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Version(v(0, 0)));

        assert_eq!(mv.invalidate(0, &[b"k".to_vec()]), 1);
        assert!(!mv.validate_reads(2, &log));
    }

    #[test]
    fn test_validate_iterations_detects_write_in_range() {
        let mv = MultiVersionStore::new(4);
        let layer = mv.scan_before(3, &KeyRange::all()).unwrap();
        let mut log = IterationLog::new();
        log.record(KeyRange::new(Some(b"a"), Some(b"m")), Direction::Forward, &layer);

        mv.set(b"z", v(1, 0), Some(b"outside".to_vec()));
        assert!(mv.validate_iterations(3, &log));

        mv.set(b"c", v(1, 0), None);
        assert!(!mv.validate_iterations(3, &log));
    }

    // ==================== Publication ====================

    #[test]
    fn test_publish_reports_registered_readers() {
        let mv = MultiVersionStore::new(4);
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Committed);
        assert!(mv.validate_reads(5, &log));

        let publication = mv.publish(2, 0, &writes(&[("k", Some("v"))]), &[]);
        assert_eq!(publication.affected, BTreeSet::from([5]));
        assert_eq!(publication.written, 1);
    }

    #[test]
    fn test_publish_reports_range_readers() {
        let mv = MultiVersionStore::new(4);
        let mut log = IterationLog::new();
        log.record(KeyRange::prefix(b"acct:"), Direction::Forward, &[]);
        assert!(mv.validate_iterations(4, &log));

        let miss = mv.publish(1, 0, &writes(&[("other", Some("v"))]), &[]);
        assert!(miss.affected.is_empty());

        let hit = mv.publish(2, 0, &writes(&[("acct:9", None)]), &[]);
        assert_eq!(hit.affected, BTreeSet::from([4]));
    }

    #[test]
    fn test_unregistered_reader_is_not_reported() {
        let mv = MultiVersionStore::new(4);
        let mut reads = ReadLog::new();
        reads.record(b"k", ReadOrigin::Committed);
        assert!(mv.validate_reads(5, &reads));
        let mut scans = IterationLog::new();
        scans.record(KeyRange::prefix(b"acct:"), Direction::Forward, &[]);
        assert!(mv.validate_iterations(5, &scans));

        let keys: Vec<Key> = reads.iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(mv.unregister(5, &keys), 1);

        let both = writes(&[("k", Some("v")), ("acct:1", Some("1"))]);
        let publication = mv.publish(2, 0, &both, &[]);
        assert!(publication.affected.is_empty());
    }

    #[test]
    fn test_unregister_leaves_other_readers() {
        let mv = MultiVersionStore::new(4);
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Committed);
        assert!(mv.validate_reads(5, &log));
        assert!(mv.validate_reads(6, &log));

        mv.unregister(5, &[b"k".to_vec()]);
        let publication = mv.publish(2, 0, &writes(&[("k", Some("v"))]), &[]);
        assert_eq!(publication.affected, BTreeSet::from([6]));
    }

    #[test]
    fn test_unregister_drops_empty_chains() {
        let mv = MultiVersionStore::new(4);
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Committed);
        assert!(mv.validate_reads(5, &log));
        assert!(!mv.is_empty());

        mv.unregister(5, &[b"k".to_vec()]);
        assert!(mv.is_empty());
    }

    #[test]
    fn test_range_readers_below_writer_ignored() {
        let mv = MultiVersionStore::new(4);
        let mut log = IterationLog::new();
        log.record(KeyRange::all(), Direction::Forward, &[]);
        assert!(mv.validate_iterations(1, &log));
        assert!(mv.validate_iterations(1, &log));
        assert!(mv.validate_iterations(7, &log));

        let publication = mv.publish(3, 0, &writes(&[("x", Some("v"))]), &[]);
        assert_eq!(publication.affected, BTreeSet::from([7]));
    }

    #[test]
    fn test_publish_removes_stale_keys() {
        let mv = MultiVersionStore::new(4);
        mv.publish(1, 0, &writes(&[("a", Some("1")), ("b", Some("2"))]), &[]);

        let previous = vec![b"a".to_vec(), b"b".to_vec()];
        let publication = mv.publish(1, 1, &writes(&[("a", Some("3"))]), &previous);

        assert_eq!(publication.removed, 1);
        assert_eq!(mv.key_count(), 1);
    }

    // ==================== Flush ====================

    #[test]
    fn test_flush_commits_highest_index() {
        let store = Arc::new(MemoryStore::with_entries(vec![(b"gone".to_vec(), b"x".to_vec())]));
        let cache = CommitCache::new(Arc::clone(&store) as Arc<dyn Store>, 2, 64);
        let mv = MultiVersionStore::new(4);

        mv.set(b"k", v(1, 0), Some(b"low".to_vec()));
        mv.set(b"k", v(4, 2), Some(b"high".to_vec()));
        mv.set(b"gone", v(2, 0), None);

        let batch = mv.flush(&cache).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(store.get(b"k").unwrap(), Some(b"high".to_vec()));
        assert_eq!(store.get(b"gone").unwrap(), None);
        assert!(mv.is_empty());
    }

    #[test]
    fn test_flush_refuses_estimates() {
        let store = Arc::new(MemoryStore::new());
        let cache = CommitCache::new(Arc::clone(&store) as Arc<dyn Store>, 2, 64);
        let mv = MultiVersionStore::new(4);
        mv.set(b"a", v(0, 0), Some(b"1".to_vec()));
        mv.set_estimate(b"b", 1, 0);

        let err = mv.flush(&cache).unwrap_err();
        assert!(matches!(err, MvccError::UnresolvedEstimate { index: 1, .. }));
        assert!(store.is_empty());
        assert!(!mv.is_empty());
    }

    #[test]
    fn test_registrations_alone_are_not_committed() {
        let mv = MultiVersionStore::new(4);
        let mut log = ReadLog::new();
        log.record(b"read-only", ReadOrigin::Committed);
        mv.validate_reads(1, &log);

        assert_eq!(mv.key_count(), 0);
        assert!(mv.commit_batch().unwrap().is_empty());
    }
}
