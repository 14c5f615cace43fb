//! BlockRun - the shared state of one block while workers run it
//!
//! Workers pull tasks lowest index first:
//! - `Execute(i)` runs the application against a fresh view. A read that
//!   hits an estimate parks `i` on the blocking index; otherwise the
//!   attempt is stored and validated by the same worker right away.
//! - `Validate(i)` re-validates an already executed attempt, queued by a
//!   cascade from a lower publication.
//!
//! A successful validation publishes the writeset (once per incarnation),
//! re-queues the higher readers it invalidated, and marks `i` valid unless
//! a cascade hit `i` while it was validating, in which case it validates
//! again. The run ends when every index is valid, on the first fatal error,
//! or on cancellation.

use std::any::Any;
use std::collections::BTreeSet;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use super::cancel::CancellationToken;
use super::config::RevalidationPolicy;
use super::errors::{ExecutionError, ExecutionResult};
use super::queue::WorkQueue;
use super::task::{ExecutedAttempt, Outcome, Task, TaskKind, TaskState, TaskStatus};
use super::transaction::{TransactionExecutor, TxResult};
use crate::mvcc::{Incarnation, MultiVersionStore, TxnIndex, TxnVersion};
use crate::observability::{log_event_with_fields, Event, ExecutionMetrics, Logger};
use crate::store::CommitCache;
use crate::view::{TransactionView, TxError};

pub(crate) struct BlockRun<'a, T, E> {
    txs: &'a [T],
    executor: &'a E,
    mv: &'a MultiVersionStore,
    committed: &'a CommitCache,
    metrics: &'a ExecutionMetrics,
    cancel: &'a CancellationToken,
    policy: RevalidationPolicy,
    tasks: Vec<Mutex<TaskState>>,
    queue: Arc<WorkQueue>,
    valid: AtomicUsize,
    executions: AtomicU64,
    failure: Mutex<Option<ExecutionError>>,
}

impl<'a, T, E> BlockRun<'a, T, E>
where
    T: Sync,
    E: TransactionExecutor<T>,
{
    /// Install write-hint estimates and queue every index for execution.
    /// `txs.len()` must fit in a `TxnIndex`.
    pub(crate) fn prepare(
        txs: &'a [T],
        executor: &'a E,
        mv: &'a MultiVersionStore,
        committed: &'a CommitCache,
        metrics: &'a ExecutionMetrics,
        cancel: &'a CancellationToken,
        policy: RevalidationPolicy,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new());
        let tasks = txs
            .iter()
            .zip(0..)
            .map(|(tx, index)| {
                let mut hints = executor.write_hints(tx);
                hints.sort();
                hints.dedup();
                for key in &hints {
                    mv.set_estimate(key, index, 0);
                }
                queue.push(Task::execute(index));
                Mutex::new(TaskState::new(hints))
            })
            .collect();

        Self {
            txs,
            executor,
            mv,
            committed,
            metrics,
            cancel,
            policy,
            tasks,
            queue,
            valid: AtomicUsize::new(0),
            executions: AtomicU64::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Run the block on `workers` scoped threads and wait for all of them.
    pub(crate) fn run(&self, workers: usize) {
        let _wake = {
            let queue = Arc::clone(&self.queue);
            self.cancel.on_cancel(move || queue.shutdown())
        };
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.work());
            }
        });
    }

    fn work(&self) {
        while let Some(task) = self.queue.pop(self.cancel) {
            match task.kind {
                TaskKind::Execute => self.execute(task.index),
                TaskKind::Validate => self.validate(task.index),
            }
        }
        if self.cancel.is_cancelled() {
            self.queue.shutdown();
        }
    }

    // ==================== Execution ====================

    fn execute(&self, index: TxnIndex) {
        let incarnation = {
            let mut state = self.task(index);
            if state.status != TaskStatus::Pending {
                return;
            }
            state.status = TaskStatus::Executing;
            state.incarnation
        };
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.metrics.increment_incarnations();
        trace_txn(Event::TxnExecute, index, incarnation);

        let tx = &self.txs[index as usize];
        let mut view = TransactionView::new(
            TxnVersion::new(index, incarnation),
            self.mv,
            self.committed,
        );
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.executor.execute(&mut view, tx)));
        let result = match result {
            Ok(result) => result,
            Err(payload) => {
                self.fail(ExecutionError::ExecutorPanicked {
                    index,
                    message: panic_message(payload.as_ref()),
                });
                return;
            }
        };

        if let Some(err) = view.store_error() {
            self.fail(ExecutionError::Store(err.clone()));
            return;
        }
        if let Some(blocking) = view.blocked_on() {
            view.discard();
            self.park(index, incarnation, blocking);
            return;
        }

        let mut attempt = view.into_attempt();
        let outcome = match result {
            Ok(output) => Outcome::Applied(output.events),
            Err(TxError::Application { code, message }) => {
                self.metrics.increment_application_failures();
                trace_txn(Event::TxnApplicationFailed, index, incarnation);
                attempt.discard_writes();
                Outcome::Failed { code, message }
            }
            Err(TxError::View(err)) => {
                self.fail(ExecutionError::Internal(format!(
                    "transaction {} returned a view error its view never raised: {}",
                    index, err
                )));
                return;
            }
        };

        if self.cancel.is_cancelled() {
            return;
        }
        {
            let mut state = self.task(index);
            state.attempt = Some(Arc::new(ExecutedAttempt { attempt, outcome }));
            state.status = TaskStatus::Executed;
        }
        self.validate(index);
    }

    /// Park `index` until `blocking` is valid. Never holds both locks.
    fn park(&self, index: TxnIndex, incarnation: Incarnation, blocking: TxnIndex) {
        self.metrics.increment_dependency_aborts();
        if Logger::enabled(Event::TxnDependencyAbort.severity()) {
            let (index_s, incarnation_s, blocking_s) =
                (index.to_string(), incarnation.to_string(), blocking.to_string());
            log_event_with_fields(
                Event::TxnDependencyAbort,
                &[
                    ("txn_index", &index_s),
                    ("incarnation", &incarnation_s),
                    ("blocking", &blocking_s),
                ],
            );
        }

        self.task(index).status = TaskStatus::Aborted { blocking };
        let ready = {
            let mut dependency = self.task(blocking);
            if dependency.status == TaskStatus::Valid {
                true
            } else {
                dependency.waiters.push(index);
                false
            }
        };
        if ready {
            self.resume(index);
        }
    }

    fn resume(&self, index: TxnIndex) {
        let mut state = self.task(index);
        if matches!(state.status, TaskStatus::Aborted { .. }) {
            state.status = TaskStatus::Pending;
            drop(state);
            self.queue.push(Task::execute(index));
        }
    }

    // ==================== Validation ====================

    fn validate(&self, index: TxnIndex) {
        let (executed, mut epoch) = {
            let mut state = self.task(index);
            if state.status != TaskStatus::Executed {
                return;
            }
            let Some(executed) = state.attempt.clone() else {
                drop(state);
                self.fail(ExecutionError::Internal(format!(
                    "transaction {} executed without an attempt",
                    index
                )));
                return;
            };
            state.status = TaskStatus::Validating;
            (executed, state.epoch)
        };

        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            if !executed.attempt.validate(self.mv) {
                self.retry(index, &executed);
                return;
            }
            self.publish(index, &executed);

            let (waiters, all_valid) = {
                let mut state = self.task(index);
                if state.epoch != epoch {
                    // a lower publication landed mid-validation
                    epoch = state.epoch;
                    continue;
                }
                state.status = TaskStatus::Valid;
                let valid = self.valid.fetch_add(1, Ordering::SeqCst) + 1;
                (mem::take(&mut state.waiters), valid == self.txs.len())
            };
            trace_txn(Event::TxnValidated, index, executed.attempt.incarnation());

            for waiter in waiters {
                self.resume(waiter);
            }
            if all_valid {
                self.queue.shutdown();
            }
            return;
        }
    }

    /// Publish the attempt's writes unless this incarnation already did.
    fn publish(&self, index: TxnIndex, executed: &ExecutedAttempt) {
        let attempt = &executed.attempt;
        let previous = {
            let state = self.task(index);
            if state.published_incarnation == Some(attempt.incarnation()) {
                return;
            }
            state.published_keys.clone()
        };

        let publication = attempt.publish(self.mv, &previous);
        self.metrics
            .record_publication(publication.written as u64, publication.removed as u64);
        {
            let mut state = self.task(index);
            state.published_keys = attempt.written_keys();
            state.published_incarnation = Some(attempt.incarnation());
        }
        self.cascade(index, &publication.affected);
    }

    /// Estimate-mark what the failed incarnation left behind, drop its
    /// reader and range registrations, then re-queue the next incarnation.
    /// Marking happens first so the next incarnation can never have its own
    /// versions marked.
    fn retry(&self, index: TxnIndex, executed: &ExecutedAttempt) {
        self.metrics.increment_validation_failures();
        trace_txn(
            Event::TxnValidationFailed,
            index,
            executed.attempt.incarnation(),
        );

        let keys = self.task(index).published_keys.clone();
        self.mv.invalidate(index, &keys);
        self.mv.unregister(index, executed.attempt.reads().iter().map(|(key, _)| key));
        {
            let mut state = self.task(index);
            state.incarnation += 1;
            state.status = TaskStatus::Pending;
            state.attempt = None;
        }
        self.queue.push(Task::execute(index));
    }

    /// Send higher indices back to validation after `publisher` published.
    fn cascade(&self, publisher: TxnIndex, affected: &BTreeSet<TxnIndex>) {
        let end = self.tasks.len() as TxnIndex;
        let targets: Vec<TxnIndex> = match self.policy {
            RevalidationPolicy::Targeted => affected
                .iter()
                .copied()
                .filter(|target| *target > publisher && *target < end)
                .collect(),
            RevalidationPolicy::Eager => (publisher + 1..end).collect(),
        };

        let mut requeued = 0;
        for target in targets {
            let mut state = self.task(target);
            match state.status {
                TaskStatus::Valid => {
                    state.status = TaskStatus::Executed;
                    self.valid.fetch_sub(1, Ordering::SeqCst);
                    let incarnation = state.incarnation;
                    drop(state);
                    self.queue.push(Task::validate(target));
                    trace_txn(Event::TxnRevalidate, target, incarnation);
                    requeued += 1;
                }
                TaskStatus::Validating => {
                    state.epoch += 1;
                    requeued += 1;
                }
                // validation has not started yet and will see this write
                _ => {}
            }
        }
        self.metrics.add_revalidations(requeued);
    }

    // ==================== Outcome ====================

    fn fail(&self, err: ExecutionError) {
        {
            let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            if failure.is_none() {
                *failure = Some(err);
            }
        }
        self.queue.shutdown();
    }

    /// First fatal error raised by any worker.
    pub(crate) fn take_failure(&self) -> Option<ExecutionError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Number of incarnations executed, including parked ones.
    pub(crate) fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Per-transaction results in index order. Fails unless every index
    /// finished valid.
    pub(crate) fn results(&self) -> ExecutionResult<Vec<TxResult>> {
        (0..self.tasks.len() as TxnIndex)
            .map(|index| {
                let state = self.task(index);
                match (&state.status, &state.attempt) {
                    (TaskStatus::Valid, Some(executed)) => Ok(TxResult {
                        index,
                        incarnation: executed.attempt.incarnation(),
                        status: executed.outcome.status(),
                        events: executed.outcome.events(),
                    }),
                    (status, _) => Err(ExecutionError::Internal(format!(
                        "transaction {} finished in state {:?}",
                        index, status
                    ))),
                }
            })
            .collect()
    }

    fn task(&self, index: TxnIndex) -> MutexGuard<'_, TaskState> {
        self.tasks[index as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn trace_txn(event: Event, index: TxnIndex, incarnation: Incarnation) {
    if !Logger::enabled(event.severity()) {
        return;
    }
    let index = index.to_string();
    let incarnation = incarnation.to_string();
    log_event_with_fields(
        event,
        &[("txn_index", &index), ("incarnation", &incarnation)],
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
