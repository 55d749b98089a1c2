#![allow(clippy::multiple_crate_versions)]

//! Cooperative priority scheduler for undertow.
//!
//! [`CooperativeScheduler`] keeps a single queue ordered by expiration time:
//! a task's expiration is the moment it was queued plus the timeout of its
//! priority, so urgent work runs first and long-waiting work eventually
//! overtakes newer urgent work. Tasks run one at a time on the calling
//! thread and cooperate through [`Scheduler::should_yield`].

mod clock;
mod config;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SchedulerConfig, Timeout};

use core::cell::{Cell, RefCell};
use core::cmp::Reverse;
use core::fmt;
use core::time::Duration;
use std::collections::{BinaryHeap, HashMap};

use undertow_core::{Priority, Scheduler, Task, TaskHandle, TaskStatus};

/// Microseconds since the clock origin; signed so `Expired` sits before it.
type Expiration = i128;

struct Slot {
    priority: Priority,
    expiration: Expiration,
    seq: u64,
    /// `None` while the task is running.
    task: Option<Task>,
}

/// A single-threaded scheduler driven by explicit calls to
/// [`run_next_task`](Self::run_next_task) or
/// [`run_until_idle`](Self::run_until_idle).
pub struct CooperativeScheduler<C: Clock = SystemClock> {
    clock: C,
    config: SchedulerConfig,
    queue: RefCell<BinaryHeap<Reverse<(Expiration, u64, TaskHandle)>>>,
    tasks: RefCell<HashMap<TaskHandle, Slot>>,
    next_id: Cell<u64>,
    next_seq: Cell<u64>,
    running: Cell<Option<TaskHandle>>,
    running_cancelled: Cell<bool>,
    current_priority: Cell<Priority>,
    slice_start: Cell<Option<Duration>>,
}

impl CooperativeScheduler<SystemClock> {
    /// Creates a scheduler on the system clock with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for CooperativeScheduler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> CooperativeScheduler<C> {
    /// Creates a scheduler on `clock` with the default configuration.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    /// Creates a scheduler on `clock` with `config`.
    #[must_use]
    pub fn with_config(clock: C, config: SchedulerConfig) -> Self {
        Self {
            clock,
            config,
            queue: RefCell::new(BinaryHeap::new()),
            tasks: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            next_seq: Cell::new(0),
            running: Cell::new(None),
            running_cancelled: Cell::new(false),
            current_priority: Cell::new(Priority::Normal),
            slice_start: Cell::new(None),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The clock in use.
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Whether any task is queued.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.tasks.borrow().values().any(|slot| slot.task.is_some())
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().values().filter(|slot| slot.task.is_some()).count()
    }

    /// Runs the most urgent task once. Returns `false` when the queue is
    /// empty or a task is already running.
    ///
    /// A task that returns [`TaskStatus::Continue`] keeps its place and is
    /// run again by a later call, unless it was cancelled meanwhile.
    pub fn run_next_task(&self) -> bool {
        if self.running.get().is_some() {
            tracing::warn!("run_next_task called from inside a task");
            return false;
        }
        let Some((expiration, seq, handle)) = self.pop_live() else {
            return false;
        };
        let Some((priority, mut task)) = self.take_task(handle) else {
            return false;
        };

        let now = self.now_micros();
        let did_timeout = expiration <= now;
        tracing::trace!(handle = handle.raw(), ?priority, did_timeout, "running task");

        let previous = self.current_priority.replace(priority);
        self.running.set(Some(handle));
        self.running_cancelled.set(false);
        self.slice_start.set(Some(self.clock.now()));

        let status = task(did_timeout);

        self.slice_start.set(None);
        self.running.set(None);
        self.current_priority.set(previous);

        let cancelled = self.running_cancelled.replace(false);
        match status {
            TaskStatus::Continue if !cancelled => {
                if let Some(slot) = self.tasks.borrow_mut().get_mut(&handle) {
                    slot.task = Some(task);
                }
                self.queue.borrow_mut().push(Reverse((expiration, seq, handle)));
            }
            _ => {
                self.tasks.borrow_mut().remove(&handle);
            }
        }
        true
    }

    /// Runs tasks until the queue is empty and returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next_task() {
            ran += 1;
        }
        ran
    }

    fn pop_live(&self) -> Option<(Expiration, u64, TaskHandle)> {
        let tasks = self.tasks.borrow();
        let mut queue = self.queue.borrow_mut();
        while let Some(Reverse(entry)) = queue.pop() {
            if tasks.get(&entry.2).is_some_and(|slot| slot.seq == entry.1) {
                return Some(entry);
            }
        }
        None
    }

    fn take_task(&self, handle: TaskHandle) -> Option<(Priority, Task)> {
        let mut tasks = self.tasks.borrow_mut();
        let slot = tasks.get_mut(&handle)?;
        let task = slot.task.take()?;
        Some((slot.priority, task))
    }

    fn now_micros(&self) -> Expiration {
        Expiration::try_from(self.clock.now().as_micros()).unwrap_or(Expiration::MAX)
    }

    fn expiration(&self, priority: Priority) -> Expiration {
        match self.config.timeout(priority) {
            Timeout::Expired => self.now_micros() - 1,
            Timeout::After(delay) => {
                let delay = Expiration::try_from(delay.as_micros()).unwrap_or(Expiration::MAX);
                self.now_micros().saturating_add(delay)
            }
            Timeout::Never => Expiration::MAX,
        }
    }
}

impl<C: Clock> Scheduler for CooperativeScheduler<C> {
    fn schedule(&self, priority: Priority, task: Task) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.get());
        self.next_id.set(handle.raw() + 1);
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let expiration = self.expiration(priority);

        self.tasks.borrow_mut().insert(
            handle,
            Slot {
                priority,
                expiration,
                seq,
                task: Some(task),
            },
        );
        self.queue.borrow_mut().push(Reverse((expiration, seq, handle)));
        tracing::trace!(handle = handle.raw(), ?priority, expiration, "task scheduled");
        handle
    }

    fn cancel(&self, handle: TaskHandle) {
        if self.tasks.borrow_mut().remove(&handle).is_some() {
            tracing::trace!(handle = handle.raw(), "task cancelled");
        }
        if self.running.get() == Some(handle) {
            self.running_cancelled.set(true);
        }
    }

    fn current_priority(&self) -> Priority {
        self.current_priority.get()
    }

    fn should_yield(&self) -> bool {
        self.slice_start
            .get()
            .is_some_and(|start| self.clock.now().saturating_sub(start) >= self.config.time_slice())
    }

    fn run_with_priority(&self, priority: Priority, f: &mut dyn FnMut()) {
        let previous = self.current_priority.replace(priority);
        f();
        self.current_priority.set(previous);
    }
}

impl<C: Clock + fmt::Debug> fmt::Debug for CooperativeScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooperativeScheduler")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .field("pending", &self.pending_count())
            .field("running", &self.running.get())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("priority", &self.priority)
            .field("expiration", &self.expiration)
            .field("seq", &self.seq)
            .field("running", &self.task.is_none())
            .finish()
    }
}
