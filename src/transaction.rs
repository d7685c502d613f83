//! Reentrant writer-lock discipline shared by every mutating entry point.
//!
//! A single thread may open as many nested transactions as it likes;
//! only the outermost `enter`/`exit` pair is significant for the
//! leading/trailing notification edge. A second thread calling `enter`
//! blocks until the first thread's outermost transaction exits — writes
//! are never interleaved, matching the single-writer model described for
//! [`crate::mutable_graph::MutableGraph`].

use std::cell::RefCell;
use std::time::{Duration, Instant};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

const DEFAULT_SLOW_LOCK_THRESHOLD: Duration = Duration::from_millis(100);

/// Implemented by the data a [`TransactionController`] guards, so the
/// controller can track nesting depth and the sticky "did anything
/// change" flag without knowing anything else about `T`.
pub(crate) trait TransactionState {
    fn tx_depth_mut(&mut self) -> &mut usize;
    fn tx_changed_mut(&mut self) -> &mut bool;
}

/// Wraps `T` in a [`parking_lot::ReentrantMutex`] and layers transaction
/// nesting bookkeeping on top of it.
pub(crate) struct TransactionController<T> {
    inner: ReentrantMutex<RefCell<T>>,
    slow_lock_threshold: Duration,
}

impl<T: TransactionState> TransactionController<T> {
    pub fn new(initial: T) -> Self {
        Self::with_threshold(initial, DEFAULT_SLOW_LOCK_THRESHOLD)
    }

    pub fn with_threshold(initial: T, slow_lock_threshold: Duration) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(initial)),
            slow_lock_threshold,
        }
    }

    /// Acquires the writer lock (reentrant for the current thread) and
    /// bumps the nesting depth. Returns the guard (hold it for the
    /// duration of the transaction) and whether this call is the
    /// outermost one (depth went 0 -> 1).
    pub fn enter(&self) -> (ReentrantMutexGuard<'_, RefCell<T>>, bool) {
        let start = Instant::now();
        let guard = self.inner.lock();
        let waited = start.elapsed();
        if waited > self.slow_lock_threshold {
            log::warn!(
                "acquiring the graph writer lock took {:?} (threshold {:?})",
                waited,
                self.slow_lock_threshold
            );
        }
        let is_outer = {
            let mut state = guard.borrow_mut();
            *state.tx_depth_mut() += 1;
            *state.tx_depth_mut() == 1
        };
        (guard, is_outer)
    }

    /// Closes one nesting level. Returns `Some(changed)` if this was the
    /// outermost level closing (depth 1 -> 0), carrying whether any
    /// mutation occurred anywhere in the nested call tree; `None` if a
    /// surrounding transaction is still open.
    pub fn exit(&self, guard: &ReentrantMutexGuard<'_, RefCell<T>>) -> Option<bool> {
        let mut state = guard.borrow_mut();
        *state.tx_depth_mut() -= 1;
        if *state.tx_depth_mut() == 0 {
            let changed = *state.tx_changed_mut();
            *state.tx_changed_mut() = false;
            Some(changed)
        } else {
            None
        }
    }

    pub fn depth(&self, guard: &ReentrantMutexGuard<'_, RefCell<T>>) -> usize {
        *guard.borrow_mut().tx_depth_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: i32,
        tx_depth: usize,
        tx_changed: bool,
    }

    impl TransactionState for Counter {
        fn tx_depth_mut(&mut self) -> &mut usize {
            &mut self.tx_depth
        }
        fn tx_changed_mut(&mut self) -> &mut bool {
            &mut self.tx_changed
        }
    }

    #[test]
    fn outermost_enter_and_exit_report_correctly() {
        let ctl = TransactionController::new(Counter {
            value: 0,
            tx_depth: 0,
            tx_changed: false,
        });
        let (guard, is_outer) = ctl.enter();
        assert!(is_outer);
        guard.borrow_mut().value += 1;
        *guard.borrow_mut().tx_changed_mut() = true;
        let result = ctl.exit(&guard);
        assert_eq!(result, Some(true));
    }

    #[test]
    fn nested_enter_does_not_reopen_leading_edge() {
        let ctl = TransactionController::new(Counter {
            value: 0,
            tx_depth: 0,
            tx_changed: false,
        });
        let (outer_guard, outer_is_outer) = ctl.enter();
        assert!(outer_is_outer);
        let (inner_guard, inner_is_outer) = ctl.enter();
        assert!(!inner_is_outer);
        assert_eq!(ctl.exit(&inner_guard), None);
        assert_eq!(ctl.exit(&outer_guard), Some(false));
    }

    #[test]
    fn changed_flag_accumulates_across_nesting() {
        let ctl = TransactionController::new(Counter {
            value: 0,
            tx_depth: 0,
            tx_changed: false,
        });
        let (outer_guard, _) = ctl.enter();
        let (inner_guard, _) = ctl.enter();
        inner_guard.borrow_mut().tx_changed = true;
        assert_eq!(ctl.exit(&inner_guard), None);
        // The flag set by the nested level survives to the outer exit.
        assert_eq!(ctl.exit(&outer_guard), Some(true));
    }

    #[test]
    fn same_thread_reentry_does_not_deadlock() {
        let ctl = TransactionController::new(Counter {
            value: 0,
            tx_depth: 0,
            tx_changed: false,
        });
        let (g1, _) = ctl.enter();
        let (g2, _) = ctl.enter();
        let (g3, _) = ctl.enter();
        assert_eq!(ctl.exit(&g3), None);
        assert_eq!(ctl.exit(&g2), None);
        assert_eq!(ctl.exit(&g1), Some(false));
    }
}
