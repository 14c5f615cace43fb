//! Cooperative block cancellation.
//!
//! Besides the flag, a token carries wake hooks. A running block registers
//! one that shuts its work queue down, so idle workers blocked on the queue
//! condvar return as soon as `cancel` is called.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type WakeHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    next_hook: AtomicU64,
    hooks: Mutex<BTreeMap<u64, WakeHook>>,
}

/// Shared flag checked by workers between task transitions.
///
/// Clones observe the same flag. Cancelling after the flush began has no
/// effect on that block.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag, then run every registered wake hook.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        // hooks run outside the lock; they may take locks of their own
        let hooks: Vec<WakeHook> = self.hooks().values().cloned().collect();
        for hook in hooks {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Run `hook` on cancellation until the returned guard is dropped. If
    /// the token is already cancelled the hook runs immediately.
    pub(crate) fn on_cancel(&self, hook: impl Fn() + Send + Sync + 'static) -> CancelHookGuard {
        let id = self.state.next_hook.fetch_add(1, Ordering::Relaxed);
        let hook: WakeHook = Arc::new(hook);
        self.hooks().insert(id, Arc::clone(&hook));
        if self.is_cancelled() {
            hook();
        }
        CancelHookGuard {
            state: Arc::clone(&self.state),
            id,
        }
    }

    fn hooks(&self) -> MutexGuard<'_, BTreeMap<u64, WakeHook>> {
        self.state.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Unregisters its wake hook on drop.
pub(crate) struct CancelHookGuard {
    state: Arc<TokenState>,
    id: u64,
}

impl Drop for CancelHookGuard {
    fn drop(&mut self) {
        self.state
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_hook_runs_on_cancel() {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _guard = token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        token.clone().cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_runs_at_once_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _guard = token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_guard_unregisters() {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        drop(token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        token.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(token.hooks().is_empty());
    }
}
