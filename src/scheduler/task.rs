//! Per-index task state machine
//!
//! ```text
//! Pending -> Executing -> Aborted(dep) -> Pending          (dep became valid)
//!                      -> Executed -> Validating -> Valid
//!                                                -> Pending (incarnation + 1)
//! Valid -> Executed                                         (cascade)
//! ```
//!
//! Each state lives behind its own mutex. No code path holds two task
//! locks at once.

use std::sync::Arc;

use crate::mvcc::{Incarnation, TxnIndex};
use crate::store::Key;
use crate::view::Attempt;

use super::transaction::{TxEvent, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskStatus {
    Pending,
    Executing,
    Aborted { blocking: TxnIndex },
    Executed,
    Validating,
    Valid,
}

/// What the application returned for an attempt.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Applied(Vec<TxEvent>),
    Failed { code: u32, message: String },
}

impl Outcome {
    pub(crate) fn status(&self) -> TxStatus {
        match self {
            Outcome::Applied(_) => TxStatus::Applied,
            Outcome::Failed { code, message } => TxStatus::Failed {
                code: *code,
                message: message.clone(),
            },
        }
    }

    pub(crate) fn events(&self) -> Vec<TxEvent> {
        match self {
            Outcome::Applied(events) => events.clone(),
            Outcome::Failed { .. } => Vec::new(),
        }
    }
}

/// A finished attempt together with its outcome. Retained read-only after
/// execution so cascades can re-validate it without re-running it.
#[derive(Debug)]
pub(crate) struct ExecutedAttempt {
    pub(crate) attempt: Attempt,
    pub(crate) outcome: Outcome,
}

#[derive(Debug)]
pub(crate) struct TaskState {
    pub(crate) incarnation: Incarnation,
    pub(crate) status: TaskStatus,
    /// Bumped when a cascade hits the task mid-validation.
    pub(crate) epoch: u64,
    /// Indices parked on this one.
    pub(crate) waiters: Vec<TxnIndex>,
    /// Keys holding this index's versions or estimates.
    pub(crate) published_keys: Vec<Key>,
    pub(crate) published_incarnation: Option<Incarnation>,
    pub(crate) attempt: Option<Arc<ExecutedAttempt>>,
}

impl TaskState {
    pub(crate) fn new(hinted_keys: Vec<Key>) -> Self {
        Self {
            incarnation: 0,
            status: TaskStatus::Pending,
            epoch: 0,
            waiters: Vec::new(),
            published_keys: hinted_keys,
            published_incarnation: None,
            attempt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum TaskKind {
    Validate,
    Execute,
}

/// Unit of queued work. Ordered by index first, so the lowest index is
/// always served next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Task {
    pub(crate) index: TxnIndex,
    pub(crate) kind: TaskKind,
}

impl Task {
    pub(crate) fn execute(index: TxnIndex) -> Self {
        Self {
            index,
            kind: TaskKind::Execute,
        }
    }

    pub(crate) fn validate(index: TxnIndex) -> Self {
        Self {
            index,
            kind: TaskKind::Validate,
        }
    }
}
