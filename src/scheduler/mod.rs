//! Parallel block scheduling
//!
//! This module provides:
//! - `BlockExecutor` - executes a block and commits it atomically
//! - `TransactionExecutor` - the application callback
//! - `EngineConfig` / `RevalidationPolicy` - tuning
//! - `CancellationToken` - cooperative cancellation
//! - `ExecutionError` - block-level failures
//!
//! Per index: `Pending -> Executing -> {Aborted(dep) | Executed}`,
//! `Executed -> Validating -> {Pending(incarnation + 1) | Valid}`. The block
//! commits once every index is valid.

mod block_run;
mod cancel;
mod config;
mod errors;
mod executor;
mod queue;
mod task;
mod transaction;

pub use cancel::CancellationToken;
pub use config::{EngineConfig, RevalidationPolicy};
pub use errors::{ConfigError, ExecutionError, ExecutionResult};
pub use executor::{BlockExecutor, CommitSummary};
pub use transaction::{TransactionExecutor, TxEvent, TxOutput, TxResult, TxStatus};
