//! Deterministic harness for exercising components.
//!
//! A [`Harness`] owns a [`MemoryHost`], a [`CooperativeScheduler`] on a
//! [`ManualClock`] and a [`Root`] rendering into the host's container.
//! Nothing runs until the test asks for it: [`Harness::flush`] drains
//! microtasks and scheduler tasks until both are empty, while
//! [`Harness::run_slice`] runs one scheduler task so interrupted renders can
//! be observed.

use core::time::Duration;
use std::rc::Rc;

use undertow_core::{Node, Root, RootMode};
use undertow_memory::{HostOp, MemoryHost, NodeId};
use undertow_scheduler::{CooperativeScheduler, ManualClock, SchedulerConfig};

/// A root on an in-memory host, driven by hand.
#[derive(Debug)]
pub struct Harness {
    host: MemoryHost,
    clock: ManualClock,
    scheduler: Rc<CooperativeScheduler<ManualClock>>,
    root: Root<MemoryHost>,
}

impl Harness {
    /// Creates a concurrent root with the default scheduler configuration.
    #[must_use]
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    /// Starts configuring a harness.
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Renders `node` into the container. Call [`flush`](Self::flush) or
    /// [`flush_microtasks`](Self::flush_microtasks) to see the result.
    pub fn render(&self, node: impl Into<Node>) {
        self.root.render(node);
    }

    /// Runs `f`, then everything it scheduled.
    pub fn act<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = f();
        self.flush();
        result
    }

    /// Runs `f` as a discrete event, then only the microtasks it queued.
    /// Synchronous updates are committed; lower lanes stay pending.
    pub fn discrete<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = self.root.discrete_updates(f);
        self.host.flush_microtasks();
        result
    }

    /// Fires the `event` handler of `node` as a discrete event. Returns
    /// `false` when the node has no such handler.
    pub fn dispatch(&self, node: NodeId, event: &str) -> bool {
        self.discrete(|| self.host.dispatch(node, event))
    }

    /// Drains microtasks and scheduler tasks until neither has work left.
    /// Returns how many scheduler tasks ran.
    pub fn flush(&self) -> usize {
        let mut tasks = 0;
        loop {
            let microtasks = self.host.flush_microtasks();
            if self.scheduler.run_next_task() {
                tasks += 1;
            } else if microtasks == 0 {
                return tasks;
            }
        }
    }

    /// Runs pending microtasks, then at most one scheduler task. Returns
    /// whether a task ran.
    pub fn run_slice(&self) -> bool {
        self.host.flush_microtasks();
        self.scheduler.run_next_task()
    }

    /// Runs pending microtasks only.
    pub fn flush_microtasks(&self) -> usize {
        self.host.flush_microtasks()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Makes every clock reading cost `step`, so concurrent renders yield
    /// after a few units of work.
    pub fn set_work_duration(&self, step: Duration) {
        self.clock.set_auto_advance(step);
    }

    /// Visible content of the container.
    #[must_use]
    pub fn html(&self) -> String {
        self.host.render_to_string()
    }

    /// Host operations recorded since the last call.
    #[must_use]
    pub fn take_ops(&self) -> Vec<HostOp> {
        self.host.take_ops()
    }

    /// The root under test.
    #[must_use]
    pub const fn root(&self) -> &Root<MemoryHost> {
        &self.root
    }

    /// The host tree.
    #[must_use]
    pub const fn host(&self) -> &MemoryHost {
        &self.host
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &CooperativeScheduler<ManualClock> {
        &self.scheduler
    }

    /// The clock the scheduler reads.
    #[must_use]
    pub const fn clock(&self) -> &ManualClock {
        &self.clock
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Harness`].
#[derive(Debug, Default)]
pub struct HarnessBuilder {
    mode: RootMode,
    config: SchedulerConfig,
    label: Option<Rc<str>>,
}

impl HarnessBuilder {
    /// Creates a builder for a concurrent root with default scheduling.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root mode.
    #[must_use]
    pub const fn mode(mut self, mode: RootMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replaces the scheduler configuration.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Names the root in log output.
    #[must_use]
    pub fn label(mut self, label: impl Into<Rc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Creates the harness.
    #[must_use]
    pub fn build(self) -> Harness {
        let host = MemoryHost::new();
        let clock = ManualClock::new();
        let scheduler = Rc::new(CooperativeScheduler::with_config(clock.clone(), self.config));
        let mut builder = Root::builder(host.clone(), host.container(), scheduler.clone()).mode(self.mode);
        if let Some(label) = self.label {
            builder = builder.label(label);
        }
        Harness {
            host,
            clock,
            scheduler,
            root: builder.build(),
        }
    }
}
