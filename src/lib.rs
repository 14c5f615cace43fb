//! aeroexec - A deterministic, optimistic parallel block execution engine
//!
//! Executes an ordered block of transactions on a worker pool and commits
//! exactly the state sequential execution in block order would produce.
//!
//! Leaf to root:
//! - `store` - committed state and its read-through cache
//! - `mvcc` - in-flight versions, validation and the final flush
//! - `view` - what one execution attempt reads and writes through
//! - `scheduler` - task state machine, workers and the block executor
//! - `observability` - structured logs and counters

pub mod mvcc;
pub mod observability;
pub mod scheduler;
pub mod store;
pub mod view;

pub use scheduler::{
    BlockExecutor, CancellationToken, CommitSummary, EngineConfig, ExecutionError,
    ExecutionResult, RevalidationPolicy, TransactionExecutor, TxEvent, TxOutput, TxResult,
    TxStatus,
};
pub use store::{MemoryStore, Store};
pub use view::{TransactionView, TxError, ViewError};
