//! Shared work queue.
//!
//! A `BTreeSet` behind a mutex, so duplicate tasks collapse and the lowest
//! index is popped first. Idle workers sleep on a condvar until a push or a
//! shutdown; cancellation reaches them through a shutdown hook registered
//! on the token.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use super::cancel::CancellationToken;
use super::task::Task;

#[derive(Default)]
struct QueueState {
    tasks: BTreeSet<Task>,
    shutdown: bool,
}

#[derive(Default)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, task: Task) {
        let mut state = self.lock();
        if state.shutdown {
            return;
        }
        state.tasks.insert(task);
        drop(state);
        self.ready.notify_one();
    }

    /// Block until a task is available. `None` once the queue is shut down
    /// or `cancel` fires.
    pub(crate) fn pop(&self, cancel: &CancellationToken) -> Option<Task> {
        let mut state = self.lock();
        loop {
            if state.shutdown || cancel.is_cancelled() {
                return None;
            }
            if let Some(task) = state.tasks.pop_first() {
                return Some(task);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wake every worker and refuse further tasks.
    pub(crate) fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        state.tasks.clear();
        drop(state);
        self.ready.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
