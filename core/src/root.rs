//! Roots: the entry point that owns a fiber tree, drives it through the
//! scheduler and hands the results to the host.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::commit::CommitStats;
use crate::element::Node;
use crate::error::Error;
use crate::fiber::{FiberId, RootQueue};
use crate::hooks::RootLink;
use crate::host::HostConfig;
use crate::lane::Lanes;
use crate::resource::WakeableId;
use crate::ring::Ring;
use crate::scheduler::{Priority, Scheduler, TaskStatus, with_priority};
use crate::sync_queue::SyncQueue;
use crate::update_queue::{Action, SharedQueue, Update};
use crate::work_loop::{CallbackNode, FiberRoot, RootExitStatus};

/// How a root assigns lanes to updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootMode {
    /// Updates take the lane of the ambient scheduler priority and
    /// non-sync renders yield between units of work.
    #[default]
    Concurrent,
    /// Every update is synchronous.
    Legacy,
}

type ErrorHandler = Rc<dyn Fn(&Error)>;

struct RootOptions {
    mode: RootMode,
    label: Option<Rc<str>>,
    on_error: Option<ErrorHandler>,
}

/// Calls that arrived while the root was borrowed.
#[derive(Debug, Clone, Copy)]
enum Deferred {
    Update { fiber: FiberId, lane: Lanes },
    Ping(WakeableId),
    Reschedule,
}

struct RootShared<H: HostConfig> {
    root: RefCell<FiberRoot<H>>,
    host: H,
    scheduler: Rc<dyn Scheduler>,
    options: RootOptions,
    this: Weak<Self>,
    inbox: RefCell<VecDeque<Deferred>>,
    sync_queue: SyncQueue,
    transition_depth: Cell<u32>,
    passive_scheduled: Cell<bool>,
    passive_flushing: Cell<bool>,
    mounted: Cell<bool>,
    errors: RefCell<VecDeque<Error>>,
    last_commit: Cell<Option<CommitStats>>,
    root_queue: Rc<SharedQueue<Node>>,
    host_root: FiberId,
}

impl<H: HostConfig> RootShared<H> {
    fn label(&self) -> &str {
        self.options.label.as_deref().unwrap_or("root")
    }

    /// Makes sure exactly one task is registered for the highest pending
    /// lane. An equal lane keeps the existing task.
    fn ensure_root_is_scheduled(&self) {
        let Ok(mut root) = self.root.try_borrow_mut() else {
            self.inbox.borrow_mut().push_back(Deferred::Reschedule);
            return;
        };

        let next = root.root_lanes.next_lane();
        if next.is_empty() {
            if let Some(CallbackNode::Task(handle)) = root.callback_node.take() {
                self.scheduler.cancel(handle);
            }
            root.callback_lane = Lanes::empty();
            return;
        }
        if root.callback_node.is_some() && root.callback_lane == next {
            return;
        }
        if let Some(CallbackNode::Task(handle)) = root.callback_node.take() {
            tracing::debug!(root = self.label(), previous = ?root.callback_lane, ?next, "cancelling scheduled render");
            self.scheduler.cancel(handle);
        }

        root.callback_generation += 1;
        let generation = root.callback_generation;
        root.callback_lane = next;
        tracing::debug!(root = self.label(), lane = ?next, "render scheduled");

        if next == Lanes::SYNC {
            root.callback_node = Some(CallbackNode::Sync);
            drop(root);
            let this = self.this.clone();
            self.sync_queue.push(Box::new(move || {
                if let Some(shared) = this.upgrade() {
                    shared.perform_sync_work_on_root();
                }
            }));
            if self.sync_queue.claim_microtask() {
                let this = self.this.clone();
                self.host.schedule_microtask(Box::new(move || {
                    if let Some(shared) = this.upgrade() {
                        shared.sync_queue.flush();
                    }
                }));
            }
        } else {
            let this = self.this.clone();
            let handle = self.scheduler.schedule(
                next.to_priority(),
                Box::new(move |did_timeout| match this.upgrade() {
                    Some(shared) => shared.perform_concurrent_work_on_root(generation, did_timeout),
                    None => TaskStatus::Complete,
                }),
            );
            root.callback_node = Some(CallbackNode::Task(handle));
        }
    }

    fn perform_sync_work_on_root(&self) {
        self.flush_passive_effects();
        let status = {
            let Ok(mut root) = self.root.try_borrow_mut() else {
                return;
            };
            let lane = root.root_lanes.next_lane();
            if lane != Lanes::SYNC {
                if root.callback_node == Some(CallbackNode::Sync) {
                    root.callback_node = None;
                }
                drop(root);
                self.ensure_root_is_scheduled();
                return;
            }
            root.render_root(&self.host, lane, None)
        };
        self.finish_render(Lanes::SYNC, status);
    }

    fn perform_concurrent_work_on_root(&self, generation: u64, did_timeout: bool) -> TaskStatus {
        self.flush_passive_effects();
        let (lane, status) = {
            let Ok(mut root) = self.root.try_borrow_mut() else {
                return TaskStatus::Complete;
            };
            if root.callback_generation != generation {
                return TaskStatus::Complete;
            }
            let lane = root.root_lanes.next_lane();
            if lane.is_empty() {
                root.callback_node = None;
                return TaskStatus::Complete;
            }
            let status = if lane == Lanes::SYNC || did_timeout {
                if did_timeout {
                    tracing::debug!(root = self.label(), ?lane, "task expired, rendering synchronously");
                }
                root.render_root(&self.host, lane, None)
            } else {
                let scheduler = self.scheduler.clone();
                let should_yield = move || scheduler.should_yield();
                root.render_root(&self.host, lane, Some(&should_yield))
            };
            (lane, status)
        };

        if matches!(status, RootExitStatus::Incomplete) {
            self.drain_inbox();
            let root = self.root.borrow();
            if root.callback_generation == generation && root.callback_node.is_some() {
                return TaskStatus::Continue;
            }
            return TaskStatus::Complete;
        }
        self.finish_render(lane, status);
        TaskStatus::Complete
    }

    fn finish_render(&self, lane: Lanes, status: RootExitStatus) {
        let mut passive = false;
        let mut failure = None;
        {
            let mut root = self.root.borrow_mut();
            match status {
                RootExitStatus::Completed => {
                    if let Some(outcome) = root.commit_root(&self.host) {
                        self.last_commit.set(Some(outcome.stats));
                        passive = outcome.has_passive;
                    }
                }
                RootExitStatus::DidNotComplete => {
                    tracing::debug!(root = self.label(), ?lane, "render suspended without a boundary");
                    root.root_lanes.mark_suspended(lane);
                }
                RootExitStatus::Errored(error) => {
                    root.root_lanes.pending.remove(lane);
                    failure = Some(error);
                }
                RootExitStatus::InProgress | RootExitStatus::Incomplete => {}
            }
            root.callback_node = None;
            root.callback_lane = Lanes::empty();
        }

        if let Some(error) = failure {
            self.report_error(error);
        }
        if passive {
            self.schedule_passive_flush();
        }
        self.drain_inbox();
        self.ensure_root_is_scheduled();
    }

    fn report_error(&self, error: Error) {
        tracing::error!(root = self.label(), %error, "render failed");
        if let Some(on_error) = &self.options.on_error {
            on_error(&error);
        }
        self.errors.borrow_mut().push_back(error);
    }

    fn schedule_passive_flush(&self) {
        if self.passive_scheduled.replace(true) {
            return;
        }
        let this = self.this.clone();
        self.scheduler.schedule(
            Priority::Normal,
            Box::new(move |_| {
                if let Some(shared) = this.upgrade() {
                    shared.flush_passive_effects();
                }
                TaskStatus::Complete
            }),
        );
    }

    /// Runs pending passive effects with the root released: every unmount
    /// cleanup, then the cleanups and creates of effects whose deps changed.
    /// Work raised by the effects is drained before returning.
    fn flush_passive_effects(&self) -> bool {
        if self.passive_flushing.get() {
            return false;
        }
        let pending = {
            let Ok(mut root) = self.root.try_borrow_mut() else {
                return false;
            };
            core::mem::take(&mut root.pending_passive)
        };
        self.passive_scheduled.set(false);
        if pending.is_empty() {
            return false;
        }

        tracing::debug!(
            root = self.label(),
            unmounted = pending.unmount.len(),
            updated = pending.update.len(),
            "flushing passive effects"
        );
        self.passive_flushing.set(true);
        for effect in pending.unmount.iter().flatten() {
            effect.run_destroy();
        }
        for effect in pending.update.iter().flatten().filter(|effect| effect.fires()) {
            effect.run_destroy();
        }
        for effect in pending.update.iter().flatten().filter(|effect| effect.fires()) {
            effect.run_create();
        }
        self.passive_flushing.set(false);

        self.drain_inbox();
        self.sync_queue.flush();
        true
    }

    fn drain_inbox(&self) {
        if self.root.try_borrow_mut().is_err() {
            return;
        }
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(deferred) = next else {
                break;
            };
            match deferred {
                Deferred::Update { fiber, lane } => self.schedule_update(fiber, lane),
                Deferred::Ping(wakeable) => self.ping(wakeable),
                Deferred::Reschedule => self.ensure_root_is_scheduled(),
            }
        }
    }

    fn enqueue_root_update(&self, children: Node, lane: Lanes) {
        self.root_queue.enqueue(Update::new(Action::Replace(children), lane));
        self.schedule_update(self.host_root, lane);
    }
}

impl<H: HostConfig> RootLink for RootShared<H> {
    fn request_update_lane(&self) -> Lanes {
        if self.options.mode == RootMode::Legacy {
            return Lanes::SYNC;
        }
        if self.transition_depth.get() > 0 {
            return Lanes::TRANSITION;
        }
        Lanes::from_priority(self.scheduler.current_priority())
    }

    fn schedule_update(&self, fiber: FiberId, lane: Lanes) {
        let Ok(mut root) = self.root.try_borrow_mut() else {
            self.inbox.borrow_mut().push_back(Deferred::Update { fiber, lane });
            return;
        };
        if !root.mark_update_lane_from_fiber_to_root(fiber, lane) {
            tracing::trace!(?fiber, "update on an unmounted fiber dropped");
            return;
        }
        root.root_lanes.mark_updated(lane);
        if root.is_rendering() {
            root.interleaved_lanes |= lane;
        }
        tracing::debug!(root = self.label(), ?lane, "update scheduled");
        drop(root);
        self.ensure_root_is_scheduled();
    }

    fn ping(&self, wakeable: WakeableId) {
        let Ok(mut root) = self.root.try_borrow_mut() else {
            self.inbox.borrow_mut().push_back(Deferred::Ping(wakeable));
            return;
        };
        let Some(entry) = root.ping_cache.remove(&wakeable) else {
            return;
        };
        tracing::debug!(root = self.label(), ?wakeable, lanes = ?entry.lanes, "pinged");
        root.root_lanes.ping(entry.lanes);
        for boundary in entry.boundaries {
            root.mark_update_lane_from_fiber_to_root(boundary, entry.lanes);
        }
        drop(root);
        self.ensure_root_is_scheduled();
    }

    fn enter_transition(&self) {
        self.transition_depth.set(self.transition_depth.get() + 1);
    }

    fn exit_transition(&self) {
        self.transition_depth.set(self.transition_depth.get().saturating_sub(1));
    }
}

/// A rendering root bound to a host container.
///
/// ```ignore
/// let root = Root::builder(host, container, scheduler).label("app").build();
/// root.render(host("div").child("hello"));
/// ```
pub struct Root<H: HostConfig> {
    shared: Rc<RootShared<H>>,
}

impl<H: HostConfig> Root<H> {
    /// Starts building a root that renders into `container`.
    pub fn builder(host: H, container: H::Instance, scheduler: Rc<dyn Scheduler>) -> RootBuilder<H> {
        RootBuilder {
            host,
            container,
            scheduler,
            options: RootOptions {
                mode: RootMode::default(),
                label: None,
                on_error: None,
            },
        }
    }

    /// Replaces the rendered children. The first render is synchronous;
    /// later ones take the lane of the ambient priority.
    pub fn render(&self, children: impl Into<Node>) {
        let lane = if self.shared.mounted.replace(true) {
            self.shared.request_update_lane()
        } else {
            Lanes::SYNC
        };
        self.shared.enqueue_root_update(children.into(), lane);
    }

    /// Removes every rendered node and runs every effect cleanup.
    pub fn unmount(&self) {
        self.shared.enqueue_root_update(Node::Empty, Lanes::SYNC);
        self.flush_sync_work();
        self.flush_passive_effects();
    }

    /// Runs queued synchronous renders now instead of in the next host
    /// microtask. Returns how many callbacks ran.
    pub fn flush_sync_work(&self) -> usize {
        self.shared.sync_queue.flush()
    }

    /// Runs pending passive effects now. Returns `false` when none were
    /// pending.
    pub fn flush_passive_effects(&self) -> bool {
        self.shared.flush_passive_effects()
    }

    /// Runs `f` at [`Priority::Immediate`], so updates it issues are
    /// synchronous.
    pub fn discrete_updates<R>(&self, f: impl FnOnce() -> R) -> R {
        with_priority(&*self.shared.scheduler, Priority::Immediate, f)
    }

    /// Runs `f` so that the updates it issues use the transition lane.
    pub fn start_transition(&self, f: impl FnOnce()) {
        self.shared.enter_transition();
        f();
        self.shared.exit_transition();
    }

    /// Takes the oldest unreported render error.
    pub fn take_error(&self) -> Option<Error> {
        self.shared.errors.borrow_mut().pop_front()
    }

    /// Statistics of the most recent commit.
    pub fn last_commit(&self) -> Option<CommitStats> {
        self.shared.last_commit.get()
    }

    /// Lanes with outstanding work.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a component render.
    pub fn pending_lanes(&self) -> Lanes {
        self.shared.root.borrow().root_lanes.pending
    }

    /// Number of live fibers, both trees included.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a component render.
    pub fn fiber_count(&self) -> usize {
        self.shared.root.borrow().fiber_count()
    }

    /// The host this root renders into.
    pub fn host(&self) -> &H {
        &self.shared.host
    }

    /// The mode this root was built with.
    pub fn mode(&self) -> RootMode {
        self.shared.options.mode
    }
}

impl<H: HostConfig> fmt::Debug for Root<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("label", &self.shared.label())
            .field("mode", &self.shared.options.mode)
            .field("root", &self.shared.root)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Root`].
pub struct RootBuilder<H: HostConfig> {
    host: H,
    container: H::Instance,
    scheduler: Rc<dyn Scheduler>,
    options: RootOptions,
}

impl<H: HostConfig> RootBuilder<H> {
    /// Sets how updates are assigned lanes.
    #[must_use]
    pub fn mode(mut self, mode: RootMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Names the root in log output.
    #[must_use]
    pub fn label(mut self, label: impl Into<Rc<str>>) -> Self {
        self.options.label = Some(label.into());
        self
    }

    /// Called with every fatal render error, before it is queued for
    /// [`Root::take_error`].
    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&Error) + 'static) -> Self {
        self.options.on_error = Some(Rc::new(handler));
        self
    }

    /// Creates the root. Nothing is rendered until [`Root::render`].
    pub fn build(self) -> Root<H> {
        let Self {
            host,
            container,
            scheduler,
            options,
        } = self;
        let root_queue = Rc::new(SharedQueue::new());
        let shared = Rc::new_cyclic(|this: &Weak<RootShared<H>>| {
            let link: Weak<dyn RootLink> = this.clone();
            let fiber_root = FiberRoot::new(
                container,
                RootQueue {
                    shared: root_queue.clone(),
                    base_state: Node::Empty,
                    base_queue: Rc::new(RefCell::new(Ring::new())),
                },
                link,
            );
            let host_root = fiber_root.current;
            RootShared {
                root: RefCell::new(fiber_root),
                host,
                scheduler,
                options,
                this: this.clone(),
                inbox: RefCell::new(VecDeque::new()),
                sync_queue: SyncQueue::default(),
                transition_depth: Cell::new(0),
                passive_scheduled: Cell::new(false),
                passive_flushing: Cell::new(false),
                mounted: Cell::new(false),
                errors: RefCell::new(VecDeque::new()),
                last_commit: Cell::new(None),
                root_queue,
                host_root,
            }
        });
        tracing::debug!(root = shared.label(), mode = ?shared.options.mode, "root created");
        Root { shared }
    }
}

impl<H: HostConfig> fmt::Debug for RootBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootBuilder")
            .field("mode", &self.options.mode)
            .field("label", &self.options.label)
            .finish_non_exhaustive()
    }
}
