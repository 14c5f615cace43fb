//! Application-facing transaction contract and per-transaction results.

use crate::mvcc::{Incarnation, TxnIndex};
use crate::store::Key;
use crate::view::{TransactionView, TxError};

/// Application logic run once per incarnation.
///
/// `execute` may run several times for the same transaction and must be a
/// pure function of what it reads through the view. Errors from the view
/// should be propagated with `?`.
pub trait TransactionExecutor<T>: Sync {
    fn execute(&self, view: &mut TransactionView<'_>, tx: &T) -> Result<TxOutput, TxError>;

    /// Keys `tx` is expected to write. Each gets an estimate before the
    /// first incarnation runs, so higher readers wait instead of retrying.
    fn write_hints(&self, _tx: &T) -> Vec<Key> {
        Vec::new()
    }
}

impl<T, F> TransactionExecutor<T> for F
where
    F: Fn(&mut TransactionView<'_>, &T) -> Result<TxOutput, TxError> + Sync,
{
    fn execute(&self, view: &mut TransactionView<'_>, tx: &T) -> Result<TxOutput, TxError> {
        self(view, tx)
    }
}

/// Event emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl TxEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }
}

/// Successful outcome of `execute`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOutput {
    pub events: Vec<TxEvent>,
}

impl TxOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event: TxEvent) -> Self {
        self.events.push(event);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Applied,
    /// Rejected by application logic; its writes were discarded.
    Failed { code: u32, message: String },
}

/// Final result of one transaction, from its last valid incarnation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub index: TxnIndex,
    pub incarnation: Incarnation,
    pub status: TxStatus,
    pub events: Vec<TxEvent>,
}

impl TxResult {
    pub fn is_applied(&self) -> bool {
        self.status == TxStatus::Applied
    }
}
