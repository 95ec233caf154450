use crate::scheduler::{MainThreadSender, MainThreadTask, ScheduledTask, Scheduler};
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    /// `deadline` is the wall-clock estimate of when the notification fires.
    Pending { deadline: Instant, generation: u64 },
}

struct PendingStop {
    generation: u64,
    deadline: Instant,
    task: ScheduledTask,
}

/// Tells the model the view stopped once the view-state id stayed the same for `delay`.
///
/// Every view change cancels the pending notification and schedules a new one. A fire that
/// raced with a cancel still arrives on the UI thread queue, so each notification carries
/// the generation it was scheduled for and only the newest generation is delivered.
pub struct ViewSettleDebouncer {
    delay: Duration,
    scheduler: Rc<dyn Scheduler>,
    tx: MainThreadSender,
    generation: u64,
    pending: Option<PendingStop>,
    shut_down: bool,
}

impl ViewSettleDebouncer {
    pub fn new(delay: Duration, scheduler: Rc<dyn Scheduler>, tx: MainThreadSender) -> Self {
        Self {
            delay,
            scheduler,
            tx,
            generation: 0,
            pending: None,
            shut_down: false,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> DebounceState {
        match &self.pending {
            Some(p) => DebounceState::Pending { deadline: p.deadline, generation: p.generation },
            None => DebounceState::Idle,
        }
    }

    /// The view changed: restart the quiet period.
    pub fn view_changed(&mut self) {
        if self.shut_down {
            return;
        }
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let task = self.scheduler.schedule(
            self.delay,
            Box::new(move || {
                // The receiver is gone once the node is dropped.
                let _ = tx.send(MainThreadTask::ViewStopped { generation });
            }),
        );
        log::trace!("view changed, view-stop #{generation} scheduled in {:?}", self.delay);
        self.pending = Some(PendingStop {
            generation,
            deadline: Instant::now() + self.delay,
            task,
        });
    }

    /// Accepts a fired notification. Returns true when `generation` is the pending one and
    /// the model should be told.
    pub fn settle(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(p) if p.generation == generation && !self.shut_down => {
                self.pending = None;
                true
            }
            _ => {
                log::trace!("stale view-stop #{generation} dropped");
                false
            }
        }
    }

    pub fn cancel(&mut self) {
        if let Some(p) = self.pending.take() {
            p.task.cancel();
        }
    }

    /// Cancels the pending notification for good.
    pub fn shutdown(&mut self) {
        self.cancel();
        self.shut_down = true;
    }
}
