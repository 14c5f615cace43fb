//! Transaction view error types
//!
//! Error codes:
//! - AERO_VIEW_DEPENDENCY (ERROR severity, recoverable: the index is parked)
//! - AERO_VIEW_STORE_FAILED (FATAL severity)
//! - AERO_TX_APPLICATION (ERROR severity, recorded as the transaction result)

use thiserror::Error;

use crate::mvcc::TxnIndex;
use crate::store::{Severity, StoreError};

/// Failure of a single view operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewError {
    /// A read hit an estimate left by a lower index that has not finished.
    #[error("read depends on unfinished transaction {blocking}")]
    Dependency { blocking: TxnIndex },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ViewError {
    pub fn code(&self) -> &'static str {
        match self {
            ViewError::Dependency { .. } => "AERO_VIEW_DEPENDENCY",
            ViewError::Store(_) => "AERO_VIEW_STORE_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ViewError::Dependency { .. } => Severity::Error,
            ViewError::Store(_) => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Error returned by application logic.
///
/// View errors propagate with `?`; everything else the application decides
/// to reject is `Application`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error("application error {code}: {message}")]
    Application { code: u32, message: String },
}

impl TxError {
    pub fn application(code: u32, message: impl Into<String>) -> Self {
        TxError::Application {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TxError::View(err) => err.code(),
            TxError::Application { .. } => "AERO_TX_APPLICATION",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TxError::View(err) => err.severity(),
            TxError::Application { .. } => Severity::Error,
        }
    }
}

impl From<StoreError> for TxError {
    fn from(err: StoreError) -> Self {
        TxError::View(ViewError::Store(err))
    }
}

pub type ViewResult<T> = Result<T, ViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_is_recoverable() {
        let err = ViewError::Dependency { blocking: 2 };
        assert_eq!(err.code(), "AERO_VIEW_DEPENDENCY");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_store_failure_is_fatal() {
        let err: TxError = StoreError::read_failed(b"k", "io").into();
        assert_eq!(err.code(), "AERO_VIEW_STORE_FAILED");
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn test_application_error() {
        let err = TxError::application(7, "insufficient funds");
        assert_eq!(err.code(), "AERO_TX_APPLICATION");
        assert_eq!(err.to_string(), "application error 7: insufficient funds");
    }
}
