//! BlockExecutor - the public entry point
//!
//! Owns committed state (through the commit cache) and the per-block
//! multi-version store. One block at a time: `execute_block` takes
//! `&mut self`.
//!
//! Commit discipline:
//! - workers never write committed state
//! - the flush runs on the calling thread after every worker has joined
//! - any error, or cancellation observed before the flush, discards the
//!   block's versions and leaves committed state untouched

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::block_run::BlockRun;
use super::cancel::CancellationToken;
use super::config::EngineConfig;
use super::errors::{ExecutionError, ExecutionResult};
use super::transaction::{TransactionExecutor, TxResult};
use crate::mvcc::{MultiVersionStore, TxnIndex};
use crate::observability::{
    log_event, log_event_with_fields, Event, ExecutionMetrics, Logger, ObservationScope, Severity,
};
use crate::store::{CommitBatch, CommitCache, Store};

/// Record of the last committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub run_id: Uuid,
    pub transactions: usize,
    pub keys_written: usize,
    /// Incarnations executed across the whole block.
    pub incarnations: u64,
    /// Hex SHA-256 of the committed batch; equal on every node that
    /// executed the same block over the same state.
    pub digest: String,
    pub committed_at: DateTime<Utc>,
}

impl CommitSummary {
    fn new(run_id: Uuid, transactions: usize, incarnations: u64, batch: &CommitBatch) -> Self {
        Self {
            run_id,
            transactions,
            keys_written: batch.len(),
            incarnations,
            digest: batch.digest_hex(),
            committed_at: Utc::now(),
        }
    }
}

pub struct BlockExecutor<E> {
    executor: E,
    config: EngineConfig,
    committed: CommitCache,
    mv: MultiVersionStore,
    metrics: ExecutionMetrics,
    last_commit: Option<CommitSummary>,
}

impl<E> BlockExecutor<E> {
    /// Validate `config` and build an executor over `store`.
    ///
    /// A `log_level` in `config` sets the process-wide logger level, which
    /// other engines in the same process share.
    pub fn new(store: Arc<dyn Store>, executor: E, config: EngineConfig) -> ExecutionResult<Self> {
        config.validate()?;
        if let Some(level) = config.log_level {
            Logger::set_min_severity(level);
        }

        let concurrency = config.concurrency.to_string();
        let version_shards = config.version_shards.to_string();
        let cache_capacity = config.cache_capacity.to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("concurrency", &concurrency),
                ("version_shards", &version_shards),
                ("cache_capacity", &cache_capacity),
            ],
        );

        Ok(Self {
            committed: CommitCache::new(store, config.cache_shards, config.cache_capacity),
            mv: MultiVersionStore::new(config.version_shards),
            executor,
            config,
            metrics: ExecutionMetrics::new(),
            last_commit: None,
        })
    }

    /// Execute `txs` in parallel and commit the result.
    ///
    /// The committed state afterwards equals running `txs` one by one in
    /// slice order. Results are returned in slice order.
    pub fn execute_block<T>(&mut self, txs: &[T]) -> ExecutionResult<Vec<TxResult>>
    where
        T: Sync,
        E: TransactionExecutor<T>,
    {
        self.execute_block_with_cancel(txs, &CancellationToken::new())
    }

    pub fn execute_block_with_cancel<T>(
        &mut self,
        txs: &[T],
        cancel: &CancellationToken,
    ) -> ExecutionResult<Vec<TxResult>>
    where
        T: Sync,
        E: TransactionExecutor<T>,
    {
        if txs.len() > TxnIndex::MAX as usize {
            return Err(ExecutionError::BlockTooLarge { len: txs.len() });
        }
        let run_id = Uuid::new_v4();
        if txs.is_empty() {
            let run_id_s = run_id.to_string();
            log_event_with_fields(Event::BlockEmpty, &[("run_id", &run_id_s)]);
            self.metrics.record_block(0, 0);
            self.last_commit = Some(CommitSummary::new(run_id, 0, 0, &CommitBatch::new()));
            return Ok(Vec::new());
        }

        let run_id_s = run_id.to_string();
        let txns_s = txs.len().to_string();
        let scope =
            ObservationScope::with_fields("BLOCK_EXECUTE", &[("run_id", &run_id_s), ("txns", &txns_s)]);

        let run = BlockRun::prepare(
            txs,
            &self.executor,
            &self.mv,
            &self.committed,
            &self.metrics,
            cancel,
            self.config.revalidation,
        );
        run.run(self.config.concurrency.min(txs.len()));

        if let Some(err) = run.take_failure() {
            self.mv.discard();
            self.metrics.increment_blocks_aborted();
            log_event_with_fields(
                Event::BlockAborted,
                &[("run_id", &run_id_s), ("code", err.code())],
            );
            scope.fail(Severity::Fatal, err.code());
            return Err(err);
        }
        if cancel.is_cancelled() {
            self.mv.discard();
            self.metrics.increment_blocks_cancelled();
            log_event_with_fields(Event::BlockCancelled, &[("run_id", &run_id_s)]);
            scope.fail(Severity::Warn, ExecutionError::Cancelled.code());
            return Err(ExecutionError::Cancelled);
        }

        let results = match run.results() {
            Ok(results) => results,
            Err(err) => {
                self.mv.discard();
                self.metrics.increment_blocks_aborted();
                scope.fail(Severity::Fatal, err.code());
                return Err(err);
            }
        };
        let incarnations = run.executions();
        drop(run);

        log_event_with_fields(Event::FlushBegin, &[("run_id", &run_id_s)]);
        let batch = match self.mv.flush(&self.committed) {
            Ok(batch) => batch,
            Err(err) => {
                self.mv.discard();
                self.metrics.increment_blocks_aborted();
                log_event_with_fields(
                    Event::FlushFailed,
                    &[("run_id", &run_id_s), ("code", err.code())],
                );
                scope.fail(Severity::Fatal, err.code());
                return Err(err.into());
            }
        };

        let summary = CommitSummary::new(run_id, txs.len(), incarnations, &batch);
        let keys_s = summary.keys_written.to_string();
        log_event_with_fields(
            Event::FlushComplete,
            &[
                ("run_id", &run_id_s),
                ("keys", &keys_s),
                ("digest", &summary.digest),
            ],
        );
        self.metrics
            .record_block(txs.len() as u64, summary.keys_written as u64);
        let incarnations_s = incarnations.to_string();
        scope.complete_with_fields(&[("incarnations", &incarnations_s), ("keys", &keys_s)]);

        self.last_commit = Some(summary);
        Ok(results)
    }

    /// Drop every per-block structure and cached committed entry.
    pub fn reset(&mut self) {
        self.mv.discard();
        self.committed.clear();
        self.last_commit = None;
        log_event(Event::EngineReset);
    }

    /// Committed state, through the cache.
    pub fn committed(&self) -> &CommitCache {
        &self.committed
    }

    pub fn metrics(&self) -> &ExecutionMetrics {
        &self.metrics
    }

    pub fn last_commit(&self) -> Option<&CommitSummary> {
        self.last_commit.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
