//! Shared ledger workload for integration tests
//!
//! - `Op` - one transaction over a handful of `k*` keys
//! - `Ledger` - the application logic executing it
//! - `sequential` - reference result: one block per transaction
//! - `random_block` - seeded high-contention blocks

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aeroexec::{
    BlockExecutor, EngineConfig, MemoryStore, Store, TransactionExecutor, TransactionView, TxError,
    TxEvent, TxOutput, TxResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Application error code for an overdrawn transfer
pub const INSUFFICIENT_FUNDS: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Overwrite `key`, sleeping `delay_ms` first.
    Set { key: String, value: i64, delay_ms: u64 },
    /// Read-modify-write.
    Add { key: String, amount: i64 },
    /// Move `amount`; fails without writing if `from` holds less.
    Transfer { from: String, to: String, amount: i64 },
    /// Copy `from` to `to`, deleting `to` if `from` is absent.
    Copy { from: String, to: String },
    /// Delete `key`, sleeping `delay_ms` first.
    Delete { key: String, delay_ms: u64 },
    /// Sum every `k*` entry into `into`.
    Sum { into: String, reverse: bool },
}

pub fn key(n: usize) -> String {
    format!("k{}", n)
}

pub fn encode(value: i64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode(bytes: &[u8]) -> i64 {
    bytes.try_into().map(i64::from_be_bytes).unwrap_or(0)
}

/// Executes `Op`s. With `hints` set it declares every key it writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ledger {
    pub hints: bool,
}

impl Ledger {
    fn read(view: &mut TransactionView<'_>, key: &str) -> Result<i64, TxError> {
        Ok(view.get(key.as_bytes())?.map(|v| decode(&v)).unwrap_or(0))
    }
}

impl TransactionExecutor<Op> for Ledger {
    fn execute(&self, view: &mut TransactionView<'_>, op: &Op) -> Result<TxOutput, TxError> {
        match op {
            Op::Set {
                key,
                value,
                delay_ms,
            } => {
                thread::sleep(Duration::from_millis(*delay_ms));
                view.set(key.as_bytes(), &encode(*value));
            }
            Op::Add { key, amount } => {
                let current = Self::read(view, key)?;
                view.set(key.as_bytes(), &encode(current + amount));
            }
            Op::Transfer { from, to, amount } => {
                let balance = Self::read(view, from)?;
                if balance < *amount {
                    return Err(TxError::application(INSUFFICIENT_FUNDS, "insufficient funds"));
                }
                view.set(from.as_bytes(), &encode(balance - amount));
                let credited = Self::read(view, to)?;
                view.set(to.as_bytes(), &encode(credited + amount));
                return Ok(TxOutput::new().with_event(
                    TxEvent::new("transfer")
                        .with_attribute("from", from.as_str())
                        .with_attribute("amount", amount.to_string()),
                ));
            }
            Op::Copy { from, to } => match view.get(from.as_bytes())? {
                Some(value) => view.set(to.as_bytes(), &value),
                None => view.delete(to.as_bytes()),
            },
            Op::Delete { key, delay_ms } => {
                thread::sleep(Duration::from_millis(*delay_ms));
                view.delete(key.as_bytes());
            }
            Op::Sum { into, reverse } => {
                let entries = if *reverse {
                    view.reverse_iterate(Some(b"k"), Some(b"l"))?
                } else {
                    view.iterate(Some(b"k"), Some(b"l"), aeroexec::store::Direction::Forward)?
                };
                let total: i64 = entries.iter().map(|(_, v)| decode(v)).sum();
                view.set(into.as_bytes(), &encode(total % 1_000));
            }
        }
        Ok(TxOutput::new())
    }

    fn write_hints(&self, op: &Op) -> Vec<Vec<u8>> {
        if !self.hints {
            return Vec::new();
        }
        let keys: Vec<&String> = match op {
            Op::Set { key, .. } | Op::Add { key, .. } | Op::Delete { key, .. } => vec![key],
            Op::Transfer { from, to, .. } => vec![from, to],
            Op::Copy { to, .. } => vec![to],
            Op::Sum { into, .. } => vec![into],
        };
        keys.into_iter().map(|k| k.as_bytes().to_vec()).collect()
    }
}

/// A store preloaded with `entries` (values encoded as i64).
pub fn store_with(entries: &[(&str, i64)]) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_entries(
        entries
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), encode(*v))),
    ))
}

pub fn engine(
    store: &Arc<MemoryStore>,
    ledger: Ledger,
    config: EngineConfig,
) -> BlockExecutor<Ledger> {
    let store: Arc<dyn Store> = Arc::clone(store) as Arc<dyn Store>;
    BlockExecutor::new(store, ledger, config).expect("valid config")
}

/// Run `ops` one transaction per block on a fresh copy of `initial`.
pub fn sequential(initial: &[(&str, i64)], ops: &[Op]) -> (BTreeMap<Vec<u8>, Vec<u8>>, Vec<TxResult>) {
    let store = store_with(initial);
    let mut engine = engine(&store, Ledger::default(), EngineConfig::with_concurrency(1));
    let mut results = Vec::with_capacity(ops.len());
    for (position, op) in ops.iter().enumerate() {
        let block = engine
            .execute_block(std::slice::from_ref(op))
            .expect("sequential block");
        // every single-transaction block reports index 0
        results.extend(block.into_iter().map(|mut result| {
            result.index = position as u32;
            result
        }));
    }
    (store.snapshot(), results)
}

/// `len` ops over at most `keys` keys, deterministic for `seed`.
pub fn random_block(seed: u64, len: usize, keys: usize) -> Vec<Op> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let a = key(rng.gen_range(0..keys));
            let b = key(rng.gen_range(0..keys));
            match rng.gen_range(0..10) {
                0..=3 => Op::Add {
                    key: a,
                    amount: rng.gen_range(-5..=20),
                },
                4..=5 => Op::Transfer {
                    from: a,
                    to: b,
                    amount: rng.gen_range(1..=30),
                },
                6 => Op::Copy { from: a, to: b },
                7 => Op::Delete {
                    key: a,
                    delay_ms: 0,
                },
                8 => Op::Sum {
                    into: a,
                    reverse: rng.gen_bool(0.5),
                },
                _ => Op::Set {
                    key: a,
                    value: rng.gen_range(0..100),
                    delay_ms: 0,
                },
            }
        })
        .collect()
}

/// Results compared without incarnation numbers, which depend on timing.
pub fn outcomes(results: &[TxResult]) -> Vec<(u32, aeroexec::TxStatus, Vec<TxEvent>)> {
    results
        .iter()
        .map(|r| (r.index, r.status.clone(), r.events.clone()))
        .collect()
}
