//! In-flight block state
//!
//! Versions written by transactions that have executed but whose block has
//! not committed yet:
//! - Visibility is by transaction index, never by wall-clock order
//! - A reader at index i only ever sees versions written by indices below i
//! - Estimates mark keys a lower index is about to rewrite
//!
//! This module provides:
//! - `TxnVersion` - `(index, incarnation)` identity of one attempt
//! - `Version` / `VersionPayload` - value, tombstone or estimate
//! - `VersionChain` - all versions of one key plus registered readers
//! - `ReadLog` / `IterationLog` - observations of one attempt
//! - `MultiVersionStore` - sharded table of chains, validation and flush

mod errors;
mod multi_version;
mod read_set;
mod version;
mod version_chain;

pub use errors::{MvccError, MvccResult};
pub use multi_version::{MultiVersionStore, Publication, VisibleRead};
pub use read_set::{IterationLog, LayerEntry, RangeRead, ReadLog, ReadOrigin};
pub use version::{Incarnation, TxnIndex, TxnVersion, Version, VersionPayload};
pub use version_chain::VersionChain;
