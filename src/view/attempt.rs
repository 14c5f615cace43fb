//! Attempt - everything one finished incarnation observed and wrote.

use crate::mvcc::{
    Incarnation, IterationLog, MultiVersionStore, Publication, ReadLog, TxnIndex, TxnVersion,
};
use crate::store::Key;

use super::WriteBuffer;

/// Owned record of one execution attempt, produced by
/// [`TransactionView::into_attempt`](super::TransactionView::into_attempt).
#[derive(Clone, Debug)]
pub struct Attempt {
    version: TxnVersion,
    reads: ReadLog,
    iterations: IterationLog,
    writes: WriteBuffer,
}

impl Attempt {
    pub(crate) fn new(
        version: TxnVersion,
        reads: ReadLog,
        iterations: IterationLog,
        writes: WriteBuffer,
    ) -> Self {
        Self {
            version,
            reads,
            iterations,
            writes,
        }
    }

    pub fn version(&self) -> TxnVersion {
        self.version
    }

    pub fn index(&self) -> TxnIndex {
        self.version.index
    }

    pub fn incarnation(&self) -> Incarnation {
        self.version.incarnation
    }

    pub fn reads(&self) -> &ReadLog {
        &self.reads
    }

    pub fn iterations(&self) -> &IterationLog {
        &self.iterations
    }

    pub fn writes(&self) -> &WriteBuffer {
        &self.writes
    }

    /// Re-check every point read and range scan against current state.
    pub fn validate(&self, mv: &MultiVersionStore) -> bool {
        mv.validate_reads(self.index(), &self.reads)
            && mv.validate_iterations(self.index(), &self.iterations)
    }

    /// Publish the buffered writes, replacing whatever the index left at
    /// `previous` in an earlier incarnation.
    pub fn publish(&self, mv: &MultiVersionStore, previous: &[Key]) -> Publication {
        mv.publish(
            self.index(),
            self.incarnation(),
            self.writes.entries(),
            previous,
        )
    }

    pub fn written_keys(&self) -> Vec<Key> {
        self.writes.keys().cloned().collect()
    }

    /// Drop buffered writes; reads stay for validation.
    pub fn discard_writes(&mut self) {
        self.writes.clear();
    }
}
