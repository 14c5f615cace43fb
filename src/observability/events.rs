//! Observable events emitted by the execution engine.
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events in aeroexec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Engine configuration accepted
    ConfigLoaded,

    // Block lifecycle
    /// Block accepted with zero transactions
    BlockEmpty,
    /// Block cancelled before the flush
    BlockCancelled,
    /// Block aborted by an unrecoverable error
    BlockAborted,
    /// Per-block structures cleared
    EngineReset,

    // Transaction lifecycle
    /// Incarnation started executing
    TxnExecute,
    /// Read observed an estimate, index parked
    TxnDependencyAbort,
    /// Read or iteration log no longer matches
    TxnValidationFailed,
    /// Writeset published and index marked valid
    TxnValidated,
    /// Valid index re-queued by a lower publication
    TxnRevalidate,
    /// Application logic rejected the transaction
    TxnApplicationFailed,

    // Commit
    /// Final flush begins
    FlushBegin,
    /// Final flush applied to committed state
    FlushComplete,
    /// Committed store rejected the flush
    FlushFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::BlockEmpty => "BLOCK_EMPTY",
            Event::BlockCancelled => "BLOCK_CANCELLED",
            Event::BlockAborted => "BLOCK_ABORTED",
            Event::EngineReset => "ENGINE_RESET",

            Event::TxnExecute => "TXN_EXECUTE",
            Event::TxnDependencyAbort => "TXN_DEPENDENCY_ABORT",
            Event::TxnValidationFailed => "TXN_VALIDATION_FAILED",
            Event::TxnValidated => "TXN_VALIDATED",
            Event::TxnRevalidate => "TXN_REVALIDATE",
            Event::TxnApplicationFailed => "TXN_APPLICATION_FAILED",

            Event::FlushBegin => "FLUSH_BEGIN",
            Event::FlushComplete => "FLUSH_COMPLETE",
            Event::FlushFailed => "FLUSH_FAILED",
        }
    }

    /// Severity this event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::BlockAborted | Event::FlushFailed => Severity::Fatal,
            Event::BlockCancelled => Severity::Warn,
            Event::ConfigLoaded
            | Event::BlockEmpty
            | Event::EngineReset
            | Event::FlushBegin
            | Event::FlushComplete => Severity::Info,
            _ => Severity::Trace,
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
