//! Block execution error types
//!
//! Error codes:
//! - AERO_EXEC_STORE_FAILED (FATAL severity)
//! - AERO_EXEC_CANCELLED (ERROR severity)
//! - AERO_EXEC_PANICKED (FATAL severity)
//! - AERO_EXEC_BLOCK_TOO_LARGE (ERROR severity)
//! - AERO_EXEC_INTERNAL (FATAL severity)
//! - AERO_CONFIG_PARSE / AERO_CONFIG_INVALID (ERROR severity)
//! - multi-version store codes pass through unchanged
//!
//! Any error returned from a block means nothing of that block reached
//! committed state.

use thiserror::Error;

use crate::mvcc::{MvccError, TxnIndex};
use crate::store::{Severity, StoreError};

/// Rejected engine configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration parse error: {0}")]
    Parse(String),

    #[error("invalid configuration field {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "AERO_CONFIG_PARSE",
            ConfigError::Invalid { .. } => "AERO_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("committed store failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mvcc(#[from] MvccError),

    #[error("block execution cancelled")]
    Cancelled,

    #[error("transaction {index} panicked: {message}")]
    ExecutorPanicked { index: TxnIndex, message: String },

    #[error("block of {len} transactions exceeds the index space")]
    BlockTooLarge { len: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal scheduler error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Store(_) => "AERO_EXEC_STORE_FAILED",
            ExecutionError::Mvcc(err) => err.code(),
            ExecutionError::Cancelled => "AERO_EXEC_CANCELLED",
            ExecutionError::ExecutorPanicked { .. } => "AERO_EXEC_PANICKED",
            ExecutionError::BlockTooLarge { .. } => "AERO_EXEC_BLOCK_TOO_LARGE",
            ExecutionError::Config(err) => err.code(),
            ExecutionError::Internal(_) => "AERO_EXEC_INTERNAL",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ExecutionError::Cancelled
            | ExecutionError::BlockTooLarge { .. }
            | ExecutionError::Config(_) => Severity::Error,
            ExecutionError::Store(_)
            | ExecutionError::Mvcc(_)
            | ExecutionError::ExecutorPanicked { .. }
            | ExecutionError::Internal(_) => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
