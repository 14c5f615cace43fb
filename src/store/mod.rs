//! Committed state
//!
//! This module provides:
//! - `Store` - capability over durable committed state (external)
//! - `MemoryStore` - in-memory reference `Store`
//! - `CommitCache` - sharded read-through cache, the single source of truth
//!   for "already committed"
//! - `CommitBatch` - one block's ordered writeset and its digest
//! - `KeyRange` / `Direction` - range scan bounds

mod backend;
mod batch;
mod cache;
mod errors;
mod range;
pub(crate) mod shard;

pub use backend::{MemoryStore, Store};
pub use batch::{BatchEntry, CommitBatch};
pub use cache::{CacheStats, CommitCache};
pub use errors::{Severity, StoreError, StoreResult};
pub use range::{Direction, KeyRange};

/// Storage key
pub type Key = Vec<u8>;
/// Stored value
pub type Value = Vec<u8>;

/// Render a key for logs and error messages: printable ASCII verbatim,
/// anything else as `0x`-prefixed hex.
pub fn display_key(key: &[u8]) -> String {
    if !key.is_empty() && key.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(key).into_owned()
    } else {
        let hex: String = key.iter().map(|b| format!("{:02x}", b)).collect();
        format!("0x{}", hex)
    }
}
