//! TransactionView - the state one incarnation executes against
//!
//! Lookup order for a point read:
//! 1. the attempt's own buffered writes (not logged)
//! 2. the latest in-flight version below this index (logged)
//! 3. committed state (logged)
//!
//! An estimate at step 2 fails the read with `ViewError::Dependency` and
//! pins the view as blocked, even if the application swallows the error.
//! Store failures are pinned the same way.

use crate::mvcc::{
    Incarnation, IterationLog, MultiVersionStore, ReadLog, ReadOrigin, TxnIndex, TxnVersion,
    VisibleRead,
};
use crate::store::{CommitCache, Direction, Key, KeyRange, StoreError, Value};

use super::attempt::Attempt;
use super::errors::{ViewError, ViewResult};
use super::merge::merge_range;
use super::WriteBuffer;

pub struct TransactionView<'a> {
    version: TxnVersion,
    mv: &'a MultiVersionStore,
    committed: &'a CommitCache,
    writes: WriteBuffer,
    reads: ReadLog,
    iterations: IterationLog,
    blocked_on: Option<TxnIndex>,
    store_error: Option<StoreError>,
}

impl<'a> TransactionView<'a> {
    pub fn new(version: TxnVersion, mv: &'a MultiVersionStore, committed: &'a CommitCache) -> Self {
        Self {
            version,
            mv,
            committed,
            writes: WriteBuffer::new(),
            reads: ReadLog::new(),
            iterations: IterationLog::new(),
            blocked_on: None,
            store_error: None,
        }
    }

    pub fn index(&self) -> TxnIndex {
        self.version.index
    }

    pub fn incarnation(&self) -> Incarnation {
        self.version.incarnation
    }

    pub fn version(&self) -> TxnVersion {
        self.version
    }

    /// Lower index this attempt waits on, if any read hit an estimate.
    pub fn blocked_on(&self) -> Option<TxnIndex> {
        self.blocked_on
    }

    /// First committed-store failure this attempt ran into.
    pub fn store_error(&self) -> Option<&StoreError> {
        self.store_error.as_ref()
    }

    // ==================== Point access ====================

    pub fn get(&mut self, key: &[u8]) -> ViewResult<Option<Value>> {
        if let Some(write) = self.writes.get(key) {
            return Ok(write.clone());
        }
        let visible = self
            .mv
            .get_latest_before(key, self.index(), self.committed)
            .map_err(|err| self.store_failed(err))?;
        match visible {
            VisibleRead::Estimate { index } => Err(self.block(index)),
            VisibleRead::Version { version, value } => {
                self.reads.record(key, ReadOrigin::Version(version));
                Ok(value)
            }
            VisibleRead::Committed { value } => {
                self.reads.record(key, ReadOrigin::Committed);
                Ok(value)
            }
        }
    }

    pub fn has(&mut self, key: &[u8]) -> ViewResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.set(key, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.writes.delete(key);
    }

    // ==================== Range access ====================

    /// Entries in `[start, end)` as an owned snapshot, ordered by
    /// `direction`. `None` leaves a side unbounded.
    pub fn iterate(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        direction: Direction,
    ) -> ViewResult<Vec<(Key, Value)>> {
        let range = KeyRange::new(start, end);
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let layer = match self.mv.scan_before(self.index(), &range) {
            Ok(layer) => layer,
            Err(index) => return Err(self.block(index)),
        };
        let committed = self
            .committed
            .iterate(&range, direction)
            .map_err(|err| self.store_failed(err))?;
        let mut entries = merge_range(committed, &layer, self.writes.range(&range));
        if direction == Direction::Reverse {
            entries.reverse();
        }

        self.iterations.record(range, direction, &layer);
        Ok(entries)
    }

    pub fn reverse_iterate(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> ViewResult<Vec<(Key, Value)>> {
        self.iterate(start, end, Direction::Reverse)
    }

    // ==================== Lifecycle ====================

    /// Hand the finished attempt over for validation and publication.
    pub fn into_attempt(self) -> Attempt {
        Attempt::new(self.version, self.reads, self.iterations, self.writes)
    }

    /// Drop every log and buffered write.
    pub fn discard(self) {}

    fn block(&mut self, index: TxnIndex) -> ViewError {
        let blocking = *self.blocked_on.get_or_insert(index);
        ViewError::Dependency { blocking }
    }

    fn store_failed(&mut self, err: StoreError) -> ViewError {
        self.store_error.get_or_insert_with(|| err.clone());
        ViewError::Store(err)
    }
}
