//! VersionChain - every in-flight version of one key
//!
//! - Versions are ordered by transaction index, at most one per index
//! - Readers that validated against this key are registered with what they
//!   observed, so a later write can find exactly who it invalidates

use std::collections::BTreeMap;
use std::ops::Bound;

use super::read_set::ReadOrigin;
use super::{TxnIndex, Version};

#[derive(Clone, Debug, Default)]
pub struct VersionChain {
    versions: BTreeMap<TxnIndex, Version>,
    readers: BTreeMap<TxnIndex, ReadOrigin>,
}

impl VersionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of versions in this chain.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True when the chain holds neither versions nor readers.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.readers.is_empty()
    }

    /// The version with the greatest index strictly below `index`.
    pub fn latest_before(&self, index: TxnIndex) -> Option<&Version> {
        self.versions
            .range((Bound::Unbounded, Bound::Excluded(index)))
            .next_back()
            .map(|(_, version)| version)
    }

    /// The version with the greatest index.
    pub fn latest(&self) -> Option<&Version> {
        self.versions.values().next_back()
    }

    /// What a reader at `index` would observe now.
    pub fn origin_before(&self, index: TxnIndex) -> Option<ReadOrigin> {
        match self.latest_before(index) {
            Some(version) if version.is_estimate() => None,
            Some(version) => Some(ReadOrigin::Version(version.txn_version())),
            None => Some(ReadOrigin::Committed),
        }
    }

    /// Insert or replace the version for its index.
    pub fn insert(&mut self, version: Version) {
        debug_assert!(self
            .versions
            .get(&version.index())
            .map_or(true, |v| v.txn_version().incarnation <= version.txn_version().incarnation));
        self.versions.insert(version.index(), version);
    }

    pub fn remove(&mut self, index: TxnIndex) -> Option<Version> {
        self.versions.remove(&index)
    }

    /// Mark the version of `index` as an estimate. Returns false if absent.
    pub fn mark_estimate(&mut self, index: TxnIndex) -> bool {
        match self.versions.get_mut(&index) {
            Some(version) => {
                version.mark_estimate();
                true
            }
            None => false,
        }
    }

    pub fn register_reader(&mut self, reader: TxnIndex, origin: ReadOrigin) {
        self.readers.insert(reader, origin);
    }

    /// Forget `reader`. Returns false if it was not registered.
    pub fn unregister_reader(&mut self, reader: TxnIndex) -> bool {
        self.readers.remove(&reader).is_some()
    }

    /// Readers above `writer` whose observation a write by `writer` changes:
    /// those that saw committed state or a version from `writer` or below.
    pub fn readers_invalidated_by(&self, writer: TxnIndex) -> impl Iterator<Item = TxnIndex> + '_ {
        self.readers
            .range((Bound::Excluded(writer), Bound::Unbounded))
            .filter(move |(_, origin)| match origin {
                ReadOrigin::Committed => true,
                ReadOrigin::Version(seen) => seen.index <= writer,
            })
            .map(|(reader, _)| *reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::{TxnVersion, VersionPayload};

    fn value(index: TxnIndex, incarnation: u32, data: &[u8]) -> Version {
        Version::new(
            TxnVersion::new(index, incarnation),
            VersionPayload::Value(data.to_vec()),
        )
    }

    #[test]
    fn test_latest_before_is_strict() {
        let mut chain = VersionChain::new();
        chain.insert(value(2, 0, b"a"));
        chain.insert(value(5, 0, b"b"));

        assert!(chain.latest_before(2).is_none());
        assert_eq!(chain.latest_before(3).unwrap().index(), 2);
        assert_eq!(chain.latest_before(5).unwrap().index(), 2);
        assert_eq!(chain.latest_before(6).unwrap().index(), 5);
        assert_eq!(chain.latest().unwrap().index(), 5);
    }

    #[test]
    fn test_insert_replaces_same_index() {
        let mut chain = VersionChain::new();
        chain.insert(value(1, 0, b"a"));
        chain.insert(value(1, 1, b"b"));

        assert_eq!(chain.len(), 1);
        assert_eq!(
            chain.latest().unwrap().txn_version(),
            TxnVersion::new(1, 1)
        );
    }

    #[test]
    fn test_origin_before() {
        let mut chain = VersionChain::new();
        assert_eq!(chain.origin_before(4), Some(ReadOrigin::Committed));

        chain.insert(value(1, 0, b"a"));
        assert_eq!(
            chain.origin_before(4),
            Some(ReadOrigin::Version(TxnVersion::new(1, 0)))
        );

        chain.mark_estimate(1);
        assert_eq!(chain.origin_before(4), None);
    }

    #[test]
    fn test_readers_invalidated_by() {
        let mut chain = VersionChain::new();
        chain.register_reader(1, ReadOrigin::Committed);
        chain.register_reader(4, ReadOrigin::Committed);
        chain.register_reader(5, ReadOrigin::Version(TxnVersion::new(2, 0)));
        chain.register_reader(6, ReadOrigin::Version(TxnVersion::new(3, 0)));

        let hit: Vec<_> = chain.readers_invalidated_by(2).collect();
        assert_eq!(hit, vec![4, 5]);
    }

    #[test]
    fn test_unregister_reader() {
        let mut chain = VersionChain::new();
        chain.register_reader(3, ReadOrigin::Committed);
        assert!(chain.unregister_reader(3));
        assert!(!chain.unregister_reader(3));
        assert_eq!(chain.readers_invalidated_by(1).count(), 0);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_is_empty_counts_readers() {
        let mut chain = VersionChain::new();
        assert!(chain.is_empty());
        chain.register_reader(1, ReadOrigin::Committed);
        assert!(!chain.is_empty());
        assert_eq!(chain.len(), 0);
    }
}
