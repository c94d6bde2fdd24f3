//! Cancellable repeating tasks.
//!
//! The reveal loop never touches ambient timers.  It asks a [`Scheduler`] to
//! run a closure every `period` until the closure returns [`Tick::Stop`] or the
//! returned [`TaskHandle`] is cancelled.  [`TokioScheduler`] drives tasks from
//! the tokio runtime; [`ManualScheduler`] keeps a virtual clock that callers
//! advance explicitly, which makes reveal timing deterministic in tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Periods shorter than this are rounded up.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What a repeating task wants after one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Run again after another period.
    Continue,
    /// Never run again.
    Stop,
}

/// A closure invoked once per period.
pub type RepeatingTask = Box<dyn FnMut() -> Tick + Send + 'static>;

/// Handle to a scheduled repeating task.
///
/// Cancelling is idempotent.  A cancelled task is not invoked again, though an
/// invocation already in progress on another thread runs to completion.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Stops all future invocations of the task.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once [`TaskHandle::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Something that can run a closure on a fixed period.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run every `period`, starting one period from now.
    fn repeat(&self, period: Duration, task: RepeatingTask) -> TaskHandle;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

///////////////////////////////////////// Tokio /////////////////////////////////////////

/// Runs repeating tasks as tokio tasks driven by `tokio::time::interval`.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler bound to the runtime of the calling context.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|err| {
            Error::validation(
                format!("no tokio runtime available: {err}"),
                Some("scheduler".to_string()),
            )
        })?;
        Ok(Self { handle })
    }

    /// Creates a scheduler that spawns onto the given runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn repeat(&self, period: Duration, mut task: RepeatingTask) -> TaskHandle {
        let period = period.max(MIN_PERIOD);
        let handle = TaskHandle::new();
        let token = handle.token.clone();
        self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if token.is_cancelled() || task() == Tick::Stop {
                            break;
                        }
                    }
                }
            }
        });
        handle
    }
}

///////////////////////////////////////// Manual /////////////////////////////////////////

struct ManualTask {
    seq: u64,
    due: Duration,
    period: Duration,
    handle: TaskHandle,
    // None while the task is being invoked.
    task: Option<RepeatingTask>,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    tasks: Vec<ManualTask>,
}

/// A scheduler with a virtual clock.
///
/// Nothing runs until [`ManualScheduler::advance`] or
/// [`ManualScheduler::run_next`] is called.  Tasks fire in order of their due
/// time, ties broken by scheduling order.  Clones share the same clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock reads zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        lock(&self.clock).now
    }

    /// Number of tasks that are neither stopped nor cancelled.
    pub fn pending(&self) -> usize {
        lock(&self.clock)
            .tasks
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Advances the clock by `by`, firing every task that comes due on the way.
    ///
    /// Returns the number of task invocations.
    pub fn advance(&self, by: Duration) -> usize {
        let target = lock(&self.clock).now + by;
        let mut fired = 0;
        while self.fire_next(Some(target)) {
            fired += 1;
        }
        let mut clock = lock(&self.clock);
        if clock.now < target {
            clock.now = target;
        }
        fired
    }

    /// Jumps to the next due task and fires it.  Returns false if nothing is
    /// scheduled.
    pub fn run_next(&self) -> bool {
        self.fire_next(None)
    }

    /// Fires until no tasks remain, returning the number of invocations.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while self.fire_next(None) {
            fired += 1;
        }
        fired
    }

    fn fire_next(&self, limit: Option<Duration>) -> bool {
        let (seq, mut task) = {
            let mut clock = lock(&self.clock);
            clock.tasks.retain(|t| !t.handle.is_cancelled());
            let next = clock
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, t)| t.task.is_some() && limit.is_none_or(|limit| t.due <= limit))
                .min_by_key(|(_, t)| (t.due, t.seq))
                .map(|(idx, _)| idx);
            let Some(idx) = next else {
                return false;
            };
            let due = clock.tasks[idx].due;
            if clock.now < due {
                clock.now = due;
            }
            let entry = &mut clock.tasks[idx];
            match entry.task.take() {
                Some(task) => (entry.seq, task),
                None => return false,
            }
        };
        // The clock lock is released while the task runs so it may schedule more work.
        let control = task();
        let mut clock = lock(&self.clock);
        if let Some(idx) = clock.tasks.iter().position(|t| t.seq == seq) {
            if control == Tick::Stop || clock.tasks[idx].handle.is_cancelled() {
                clock.tasks.remove(idx);
            } else {
                let entry = &mut clock.tasks[idx];
                entry.due += entry.period;
                entry.task = Some(task);
            }
        }
        true
    }
}

impl Scheduler for ManualScheduler {
    fn repeat(&self, period: Duration, task: RepeatingTask) -> TaskHandle {
        let period = period.max(MIN_PERIOD);
        let handle = TaskHandle::new();
        let mut clock = lock(&self.clock);
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let due = clock.now + period;
        clock.tasks.push(ManualTask {
            seq,
            due,
            period,
            handle: handle.clone(),
            task: Some(task),
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(limit: usize, counter: Arc<AtomicUsize>) -> RepeatingTask {
        Box::new(move || {
            let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if seen >= limit {
                Tick::Stop
            } else {
                Tick::Continue
            }
        })
    }

    #[test]
    fn manual_fires_on_period() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.repeat(Duration::from_millis(20), counting(10, counter.clone()));

        assert_eq!(scheduler.advance(Duration::from_millis(19)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(1)), 1);
        assert_eq!(scheduler.advance(Duration::from_millis(45)), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.now(), Duration::from_millis(65));
    }

    #[test]
    fn manual_stop_removes_task() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.repeat(Duration::from_millis(5), counting(3, counter.clone()));
        assert_eq!(scheduler.run_until_idle(), 3);
        assert_eq!(scheduler.pending(), 0);
        assert!(!scheduler.run_next());
    }

    #[test]
    fn manual_cancel_prevents_invocation() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.repeat(Duration::from_millis(5), counting(100, counter.clone()));
        assert!(scheduler.run_next());
        handle.cancel();
        handle.cancel();
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn manual_orders_by_due_time() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, ms) in [("slow", 30u64), ("fast", 10u64)] {
            let order = order.clone();
            scheduler.repeat(
                Duration::from_millis(ms),
                Box::new(move || {
                    order.lock().unwrap().push(label);
                    Tick::Stop
                }),
            );
        }
        scheduler.run_until_idle();
        assert_eq!(*order.lock().unwrap(), vec!["fast", "slow"]);
    }

    #[test]
    fn current_requires_runtime() {
        assert!(TokioScheduler::current().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_runs_until_stop() {
        let scheduler = TokioScheduler::current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.repeat(Duration::from_millis(20), counting(4, counter.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_cancel_stops_task() {
        let scheduler = TokioScheduler::current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.repeat(Duration::from_millis(20), counting(100, counter.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = counter.load(Ordering::SeqCst);
        assert_eq!(seen, 2);
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }
}
