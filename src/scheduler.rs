//! Delayed tasks and the queue back to the UI thread.
//!
//! A [`Scheduler`] runs a task after a delay, off the UI thread. Scheduled tasks never touch
//! bridge state directly: they post a [`MainThreadTask`] into an unbounded channel that the
//! node drains at the start of every tick.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Work posted back to the UI thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainThreadTask {
    /// Mark the scene dirty (follow-up redraw requested by the render pass).
    Redraw,
    /// The view-stop delay elapsed for the view change with the given generation.
    ViewStopped { generation: u64 },
}

pub type MainThreadSender = mpsc::UnboundedSender<MainThreadTask>;
pub type MainThreadReceiver = mpsc::UnboundedReceiver<MainThreadTask>;

pub fn main_thread_channel() -> (MainThreadSender, MainThreadReceiver) {
    mpsc::unbounded_channel()
}

/// Handle to a scheduled task.
#[derive(Clone, Debug, Default)]
pub struct ScheduledTask {
    cancel: CancellationToken,
}

impl ScheduledTask {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Prevents the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after a delay.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Scheduler backed by a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the calling context.
    pub fn current() -> anyhow::Result<Self> {
        Ok(Self::new(tokio::runtime::Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let cancel = CancellationToken::new();
        let child = cancel.child_token();

        self.handle.spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if child.is_cancelled() {
                        return;
                    }
                    if AssertUnwindSafe(async move { task() }).catch_unwind().await.is_err() {
                        log::error!("scheduled task panicked");
                    }
                }
            }
        });

        ScheduledTask::new(cancel)
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    cancel: CancellationToken,
    task: Task,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// Scheduler with a virtual clock that only moves when [`ManualScheduler::advance`] is
/// called. Due tasks run on the caller's thread, in due order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn clock(&self) -> MutexGuard<'_, ManualClock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock().now
    }

    /// Number of tasks that are neither run nor canceled.
    pub fn pending(&self) -> usize {
        self.clock().pending.iter().filter(|p| !p.cancel.is_cancelled()).count()
    }

    /// Moves the clock forward by `by`, running every task that becomes due. Returns the
    /// number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock().now + by;
        let mut ran = 0;

        loop {
            // Pop the next due task before running it, so a task may schedule new ones.
            let next = {
                let mut clock = self.clock();
                clock.pending.retain(|p| !p.cancel.is_cancelled());
                let idx = clock
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(i, _)| i);
                match idx {
                    Some(i) => {
                        let p = clock.pending.swap_remove(i);
                        clock.now = p.due;
                        Some(p.task)
                    }
                    None => None,
                }
            };

            let Some(task) = next else { break };
            task();
            ran += 1;
        }

        self.clock().now = target;
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let cancel = CancellationToken::new();
        let mut clock = self.clock();
        let due = clock.now + delay;
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.pending.push(Pending { due, seq, cancel: cancel.clone(), task });
        ScheduledTask::new(cancel)
    }
}
