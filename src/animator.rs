//! Word-by-word reveal of a complete reply.
//!
//! The provider hands back the whole reply at once.  [`ResponseAnimator`]
//! splits it into chunks with [`tokenize`] and releases one chunk per period,
//! calling `on_update` with the growing prefix and `on_done` after the last
//! chunk.  At most one run is active per animator: starting a run cancels the
//! previous one before the new one is scheduled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::observability::{
    ANIMATOR_CHUNKS, ANIMATOR_RUNS_CANCELLED, ANIMATOR_RUNS_COMPLETED, ANIMATOR_RUNS_STARTED,
};
use crate::scheduler::{Scheduler, TaskHandle, Tick};

/// Time between two chunks unless configured otherwise.
pub const DEFAULT_REVEAL_PERIOD: Duration = Duration::from_millis(20);

/// Splits `text` into alternating maximal runs of whitespace and
/// non-whitespace.
///
/// Every character lands in exactly one chunk, so concatenating the chunks
/// gives back `text`.  The empty string yields a single empty chunk.
///
/// ```
/// # use trickle::tokenize;
/// assert_eq!(tokenize("go  get\tit"), vec!["go", "  ", "get", "\t", "it"]);
/// assert_eq!(tokenize(""), vec![""]);
/// ```
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut previous: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        let whitespace = ch.is_whitespace();
        if previous.is_some_and(|prev| prev != whitespace) {
            chunks.push(&text[start..idx]);
            start = idx;
        }
        previous = Some(whitespace);
    }
    chunks.push(&text[start..]);
    chunks
}

type UpdateFn = Box<dyn FnMut(&str) + Send + 'static>;
type DoneFn = Box<dyn FnOnce() + Send + 'static>;

struct Run {
    full_text: String,
    // Byte offset at which each chunk ends.
    ends: Vec<usize>,
    cursor: usize,
    on_update: UpdateFn,
    on_done: Option<DoneFn>,
}

impl Run {
    fn new(full_text: String, on_update: UpdateFn, on_done: DoneFn) -> Self {
        let mut end = 0;
        let ends = tokenize(&full_text)
            .into_iter()
            .map(|chunk| {
                end += chunk.len();
                end
            })
            .collect();
        Self {
            full_text,
            ends,
            cursor: 0,
            on_update,
            on_done: Some(on_done),
        }
    }

    fn accumulated(&self) -> &str {
        match self.cursor {
            0 => "",
            n => &self.full_text[..self.ends[n - 1]],
        }
    }

    fn emit(&mut self) -> Tick {
        if let Some(&end) = self.ends.get(self.cursor) {
            self.cursor += 1;
            ANIMATOR_CHUNKS.click();
            (self.on_update)(&self.full_text[..end]);
        }
        if self.cursor < self.ends.len() {
            return Tick::Continue;
        }
        if let Some(on_done) = self.on_done.take() {
            on_done();
        }
        Tick::Stop
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one reveal run.
///
/// Callbacks execute while the run's lock is held, so once
/// [`RunHandle::cancel`] returns neither callback will be invoked again.
#[derive(Clone)]
pub struct RunHandle {
    id: u64,
    run: Arc<Mutex<Option<Run>>>,
    task: TaskHandle,
}

impl RunHandle {
    /// Identifier unique within the animator that started the run.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the run.  Cancelling a finished or cancelled run does nothing.
    pub fn cancel(&self) {
        self.task.cancel();
        let run = lock(&self.run).take();
        if run.is_some() {
            ANIMATOR_RUNS_CANCELLED.click();
        }
        drop(run);
    }

    /// True while the run still has chunks to emit.
    pub fn is_active(&self) -> bool {
        lock(&self.run).is_some()
    }

    /// The text revealed so far, if the run is still active.
    pub fn revealed(&self) -> Option<String> {
        lock(&self.run).as_ref().map(|run| run.accumulated().to_string())
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Releases a complete reply one chunk at a time.
pub struct ResponseAnimator {
    scheduler: Arc<dyn Scheduler>,
    period: Duration,
    active: Mutex<Option<RunHandle>>,
    next_id: AtomicU64,
}

impl ResponseAnimator {
    /// Creates an animator that emits a chunk every [`DEFAULT_REVEAL_PERIOD`].
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            period: DEFAULT_REVEAL_PERIOD,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Sets the time between chunks.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Returns the time between chunks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts revealing `full_text`.
    ///
    /// Any active run is cancelled first.  The first chunk is emitted one
    /// period from now.  Callbacks run on the scheduler and must not start or
    /// cancel runs on this animator.
    pub fn start<U, D>(&self, full_text: impl Into<String>, on_update: U, on_done: D) -> RunHandle
    where
        U: FnMut(&str) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            previous.cancel();
        }

        let run = Run::new(full_text.into(), Box::new(on_update), Box::new(on_done));
        let run = Arc::new(Mutex::new(Some(run)));
        let ticking = Arc::clone(&run);
        let task = self.scheduler.repeat(
            self.period,
            Box::new(move || {
                let mut guard = lock(&ticking);
                let Some(run) = guard.as_mut() else {
                    return Tick::Stop;
                };
                let control = run.emit();
                if control == Tick::Stop {
                    *guard = None;
                    ANIMATOR_RUNS_COMPLETED.click();
                }
                control
            }),
        );
        ANIMATOR_RUNS_STARTED.click();

        let handle = RunHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            run,
            task,
        };
        *active = Some(handle.clone());
        handle
    }

    /// Cancels `handle`; see [`RunHandle::cancel`].
    pub fn cancel(&self, handle: &RunHandle) {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|a| a.id == handle.id) {
            *active = None;
        }
        drop(active);
        handle.cancel();
    }

    /// Cancels the active run, if any.  Returns true if a run was stopped.
    pub fn cancel_active(&self) -> bool {
        let Some(handle) = lock(&self.active).take() else {
            return false;
        };
        let was_active = handle.is_active();
        handle.cancel();
        was_active
    }

    /// True if `handle` still has chunks to emit.
    pub fn is_active(&self, handle: &RunHandle) -> bool {
        handle.is_active()
    }
}
