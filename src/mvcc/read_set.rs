//! Read observations of one execution attempt.
//!
//! - `ReadLog` - which version each point read observed
//! - `IterationLog` - which in-flight versions each range scan observed
//!
//! Both are owned by a single attempt and only ever read after it finishes.

use std::collections::BTreeMap;

use super::TxnVersion;
use crate::store::{Direction, Key, KeyRange};

/// Where a read was served from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadOrigin {
    /// A published in-flight version (value or tombstone).
    Version(TxnVersion),
    /// No in-flight version; committed state answered.
    Committed,
}

/// Point reads of one attempt, keyed by storage key.
#[derive(Clone, Debug, Default)]
pub struct ReadLog {
    reads: BTreeMap<Key, ReadOrigin>,
    inconsistent: bool,
}

impl ReadLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. The first observation of a key is kept; a
    /// later read of the same key that saw something else poisons the log,
    /// since the attempt ran on two different views of that key.
    pub fn record(&mut self, key: &[u8], origin: ReadOrigin) {
        match self.reads.get(key) {
            Some(existing) if *existing != origin => self.inconsistent = true,
            Some(_) => {}
            None => {
                self.reads.insert(key.to_vec(), origin);
            }
        }
    }

    /// True when the attempt observed one key twice with different results.
    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent
    }

    pub fn get(&self, key: &[u8]) -> Option<&ReadOrigin> {
        self.reads.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &ReadOrigin)> {
        self.reads.iter()
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

/// In-flight entry seen by a range scan. Committed state is immutable for
/// the life of a block, so the in-flight layer is all a replay needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerEntry {
    pub key: Key,
    pub version: TxnVersion,
    /// `None` for a tombstone.
    pub value: Option<Vec<u8>>,
}

/// One logged range scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeRead {
    pub range: KeyRange,
    pub direction: Direction,
    /// In-flight entries in ascending key order.
    pub observed: Vec<(Key, TxnVersion)>,
}

/// Range scans of one attempt, in the order they were issued.
#[derive(Clone, Debug, Default)]
pub struct IterationLog {
    scans: Vec<RangeRead>,
}

impl IterationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, range: KeyRange, direction: Direction, layer: &[LayerEntry]) {
        self.scans.push(RangeRead {
            range,
            direction,
            observed: layer.iter().map(|e| (e.key.clone(), e.version)).collect(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RangeRead> {
        self.scans.iter()
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_kept() {
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Committed);
        log.record(b"k", ReadOrigin::Committed);

        assert_eq!(log.len(), 1);
        assert!(!log.is_inconsistent());
    }

    #[test]
    fn test_conflicting_reread_poisons_log() {
        let mut log = ReadLog::new();
        log.record(b"k", ReadOrigin::Committed);
        log.record(b"k", ReadOrigin::Version(TxnVersion::new(0, 0)));

        assert!(log.is_inconsistent());
        assert_eq!(log.get(b"k"), Some(&ReadOrigin::Committed));
    }

    #[test]
    fn test_iteration_log_keeps_versions_only() {
        let mut log = IterationLog::new();
        let layer = vec![LayerEntry {
            key: b"a".to_vec(),
            version: TxnVersion::new(1, 0),
            value: Some(b"x".to_vec()),
        }];
        log.record(KeyRange::all(), Direction::Reverse, &layer);

        let scan = log.iter().next().unwrap();
        assert_eq!(scan.direction, Direction::Reverse);
        assert_eq!(scan.observed, vec![(b"a".to_vec(), TxnVersion::new(1, 0))]);
    }
}
