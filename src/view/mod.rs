//! Per-attempt transaction state
//!
//! This module provides:
//! - `TransactionView` - what application logic reads and writes through
//! - `WriteBuffer` - private writes, invisible until published
//! - `Attempt` - the owned result of one finished incarnation
//! - `ViewError` / `TxError` - view and application failures

mod attempt;
mod errors;
mod merge;
mod transaction_view;
mod write_buffer;

pub use attempt::Attempt;
pub use errors::{TxError, ViewError, ViewResult};
pub use transaction_view::TransactionView;
pub use write_buffer::WriteBuffer;
