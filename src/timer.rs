//! Delayed-task scheduling behind an injectable seam.
//!
//! Production code schedules onto the tokio runtime via [`TokioScheduler`];
//! tests drive a [`ManualScheduler`] whose clock only moves when
//! [`advance`](ManualScheduler::advance) is called.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::warn;

/// Callback run when a scheduled delay elapses.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled task; cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<tokio::task::AbortHandle>,
}

impl TimerHandle {
    fn new(abort: Option<tokio::task::AbortHandle>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            abort,
        }
    }

    /// Prevent the task from running if it has not run yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs a callback once after a delay.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to run after `delay`.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Scheduler backed by `tokio::time::sleep` on a captured runtime handle.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    handle: Option<Handle>,
}

impl TokioScheduler {
    /// Capture the current runtime, if any.
    ///
    /// Without a runtime the scheduler falls back to the runtime current at
    /// the time of each [`schedule`](Scheduler::schedule) call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: Handle::try_current().ok(),
        }
    }

    /// Schedule onto an explicit runtime.
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let Some(runtime) = self.handle.clone().or_else(|| Handle::try_current().ok()) else {
            warn!(?delay, "no tokio runtime available; delayed task dropped");
            let handle = TimerHandle::new(None);
            handle.cancel();
            return handle;
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                task();
            }
        });

        TimerHandle {
            cancelled,
            abort: Some(join.abort_handle()),
        }
    }
}

struct PendingTask {
    handle: TimerHandle,
    task: TimerTask,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    /// Keyed by (due time, insertion order) so equal deadlines fire FIFO.
    pending: BTreeMap<(Duration, u64), PendingTask>,
}

/// Deterministic scheduler for tests.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    /// Scheduler with its clock at zero and nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward, running every task that becomes due in
    /// deadline order. Tasks scheduled while advancing run too if they fall
    /// inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        loop {
            let next = {
                let mut state = self.lock();
                let due_key = state
                    .pending
                    .keys()
                    .next()
                    .copied()
                    .filter(|(due, _)| *due <= target);
                match due_key {
                    Some(key) => {
                        state.now = key.0;
                        state.pending.remove(&key)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            let Some(pending) = next else { break };
            // Run outside the lock; tasks may schedule more work.
            if !pending.handle.is_cancelled() {
                (pending.task)();
            }
        }
    }

    /// Number of scheduled tasks not yet run or cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock()
            .pending
            .values()
            .filter(|p| !p.handle.is_cancelled())
            .count()
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle::new(None);
        let mut state = self.lock();
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.insert(
            (due, seq),
            PendingTask {
                handle: handle.clone(),
                task,
            },
        );
        handle
    }
}
