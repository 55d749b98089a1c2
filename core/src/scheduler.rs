//! The scheduler interface the work loop runs on.

/// Task priority, from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    /// Must run now.
    Immediate,
    /// Direct user interaction.
    UserBlocking,
    /// Ordinary work.
    #[default]
    Normal,
    /// Work that can wait.
    Low,
    /// Work that runs only when nothing else is queued.
    Idle,
}

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// What a task asks for after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task is done.
    Complete,
    /// Run the task again, keeping its place in the queue.
    Continue,
}

/// A schedulable task. The argument reports whether the task ran past its
/// expiration.
pub type Task = Box<dyn FnMut(bool) -> TaskStatus>;

/// Cooperative priority scheduler.
pub trait Scheduler {
    /// Queues `task` at `priority`.
    fn schedule(&self, priority: Priority, task: Task) -> TaskHandle;

    /// Drops a queued task. Cancelling the running task prevents it from
    /// continuing.
    fn cancel(&self, handle: TaskHandle);

    /// Priority of the running task, or of the innermost
    /// [`run_with_priority`](Self::run_with_priority) call.
    fn current_priority(&self) -> Priority;

    /// Whether the running task has used up its time slice.
    fn should_yield(&self) -> bool;

    /// Runs `f` with [`current_priority`](Self::current_priority) set to `priority`.
    fn run_with_priority(&self, priority: Priority, f: &mut dyn FnMut());
}

/// Runs `f` at `priority` and returns its result.
pub fn with_priority<R>(scheduler: &dyn Scheduler, priority: Priority, f: impl FnOnce() -> R) -> R {
    let mut f = Some(f);
    let mut result = None;
    scheduler.run_with_priority(priority, &mut || {
        if let Some(f) = f.take() {
            result = Some(f());
        }
    });
    match result {
        Some(result) => result,
        None => unreachable!("run_with_priority must invoke its callback"),
    }
}
