//! Committed-store error types
//!
//! Error codes:
//! - AERO_STORE_READ_FAILED (FATAL severity)
//! - AERO_STORE_WRITE_FAILED (FATAL severity)
//! - AERO_STORE_ITERATE_FAILED (FATAL severity)
//!
//! The engine cannot make progress without committed state, so every store
//! failure aborts the block it occurs in.

use std::fmt;

use thiserror::Error;

/// Severity levels shared by all aeroexec error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, engine continues
    Error,
    /// Block must be abandoned
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Failure reported by a [`Store`](super::Store) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("read of key {key} failed: {message}")]
    ReadFailed { key: String, message: String },

    #[error("write failed: {message}")]
    WriteFailed { message: String },

    #[error("iteration failed: {message}")]
    IterateFailed { message: String },
}

impl StoreError {
    /// Read failure for `key`.
    pub fn read_failed(key: &[u8], message: impl Into<String>) -> Self {
        StoreError::ReadFailed {
            key: super::display_key(key),
            message: message.into(),
        }
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        StoreError::WriteFailed {
            message: message.into(),
        }
    }

    pub fn iterate_failed(message: impl Into<String>) -> Self {
        StoreError::IterateFailed {
            message: message.into(),
        }
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::ReadFailed { .. } => "AERO_STORE_READ_FAILED",
            StoreError::WriteFailed { .. } => "AERO_STORE_WRITE_FAILED",
            StoreError::IterateFailed { .. } => "AERO_STORE_ITERATE_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type for committed-store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::read_failed(b"k", "io").code(),
            "AERO_STORE_READ_FAILED"
        );
        assert_eq!(
            StoreError::write_failed("disk full").code(),
            "AERO_STORE_WRITE_FAILED"
        );
        assert_eq!(
            StoreError::iterate_failed("closed").code(),
            "AERO_STORE_ITERATE_FAILED"
        );
    }

    #[test]
    fn test_store_errors_are_fatal() {
        assert!(StoreError::write_failed("x").is_fatal());
        assert_eq!(StoreError::iterate_failed("x").severity(), Severity::Fatal);
    }

    #[test]
    fn test_display_names_key() {
        let err = StoreError::read_failed(b"balance:A", "timeout");
        let display = err.to_string();
        assert!(display.contains("balance:A"));
        assert!(display.contains("timeout"));
    }
}
