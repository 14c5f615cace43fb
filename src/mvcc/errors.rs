//! Multi-version store error types
//!
//! Error codes:
//! - AERO_MVCC_UNRESOLVED_ESTIMATE (FATAL severity)
//! - AERO_MVCC_FLUSH_FAILED (FATAL severity)

use thiserror::Error;

use super::TxnIndex;
use crate::store::{Severity, StoreError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MvccError {
    /// An estimate reached the end-of-block flush. Every valid index
    /// replaces its estimates on publication, so this is a scheduler bug.
    #[error("estimate written by transaction {index} at key {key} reached commit")]
    UnresolvedEstimate { index: TxnIndex, key: String },

    #[error("flush rejected by committed store: {0}")]
    Flush(#[from] StoreError),
}

impl MvccError {
    pub fn code(&self) -> &'static str {
        match self {
            MvccError::UnresolvedEstimate { .. } => "AERO_MVCC_UNRESOLVED_ESTIMATE",
            MvccError::Flush(_) => "AERO_MVCC_FLUSH_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

pub type MvccResult<T> = Result<T, MvccError>;
