//! The per-root render state and the unit-of-work loop.

use core::fmt;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::context::ProviderStack;
use crate::error::{Error, HostError, Interrupt};
use crate::fiber::{FiberId, FiberKind, FiberTree, RootQueue};
use crate::hooks::{Effect, RootLink};
use crate::host::HostConfig;
use crate::lane::{Lanes, RootLanes};
use crate::resource::WakeableId;
use crate::ring::Ring;
use crate::scheduler::TaskHandle;
use crate::unwind::PingEntry;

/// Effect lists waiting for the passive flush.
#[derive(Default)]
pub(crate) struct PendingPassive {
    /// Effects of deleted components; only their cleanups run.
    pub(crate) unmount: Vec<Ring<Rc<Effect>>>,
    /// Effects of committed components.
    pub(crate) update: Vec<Ring<Rc<Effect>>>,
}

impl PendingPassive {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }
}

/// The work currently registered for a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackNode {
    Sync,
    Task(TaskHandle),
}

/// How a call to [`FiberRoot::render_root`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RootExitStatus {
    /// Units of work remain and nothing stopped the walk.
    InProgress,
    /// The walk yielded with work left.
    Incomplete,
    /// A finished tree is ready to commit.
    Completed,
    /// A suspension escaped every boundary.
    DidNotComplete,
    /// A fatal error aborted the render.
    Errored(Error),
}

pub(crate) struct FiberRoot<H: HostConfig> {
    pub(crate) tree: FiberTree<H>,
    pub(crate) container: H::Instance,
    pub(crate) current: FiberId,
    pub(crate) finished_work: Option<FiberId>,
    pub(crate) finished_lane: Lanes,
    pub(crate) root_lanes: RootLanes,
    pub(crate) ping_cache: HashMap<WakeableId, PingEntry>,
    pub(crate) pending_passive: PendingPassive,
    pub(crate) callback_node: Option<CallbackNode>,
    pub(crate) callback_lane: Lanes,
    pub(crate) callback_generation: u64,
    /// Lanes updated while a render was in progress.
    pub(crate) interleaved_lanes: Lanes,
    pub(crate) render_lane: Lanes,
    pub(crate) suspense_handlers: Vec<Option<FiberId>>,
    pub(crate) providers: ProviderStack,
    pub(crate) link: Weak<dyn RootLink>,
    wip: Option<FiberId>,
    wip_root: Option<FiberId>,
}

impl<H: HostConfig> FiberRoot<H> {
    pub(crate) fn new(container: H::Instance, queue: RootQueue, link: Weak<dyn RootLink>) -> Self {
        let mut tree = FiberTree::new();
        let current = tree.create_host_root(queue);
        Self {
            tree,
            container,
            current,
            finished_work: None,
            finished_lane: Lanes::empty(),
            root_lanes: RootLanes::default(),
            ping_cache: HashMap::new(),
            pending_passive: PendingPassive::default(),
            callback_node: None,
            callback_lane: Lanes::empty(),
            callback_generation: 0,
            interleaved_lanes: Lanes::empty(),
            render_lane: Lanes::empty(),
            suspense_handlers: Vec::new(),
            providers: ProviderStack::default(),
            link,
            wip: None,
            wip_root: None,
        }
    }

    /// Whether a render has started and not yet finished or been abandoned.
    pub(crate) const fn is_rendering(&self) -> bool {
        self.wip_root.is_some()
    }

    /// Renders at `lane`, resuming the in-progress render when it is for
    /// the same lane. With `should_yield`, the walk stops between units
    /// once it returns `true`.
    pub(crate) fn render_root(
        &mut self,
        host: &H,
        lane: Lanes,
        should_yield: Option<&dyn Fn() -> bool>,
    ) -> RootExitStatus {
        if self.wip_root.is_none() || self.render_lane != lane {
            self.prepare_fresh_stack(lane);
        } else {
            tracing::debug!(?lane, "resuming render");
        }

        let mut status = RootExitStatus::InProgress;
        while matches!(status, RootExitStatus::InProgress) {
            let Some(unit) = self.wip else {
                self.finished_work = self.wip_root.take();
                self.finished_lane = lane;
                status = RootExitStatus::Completed;
                break;
            };
            if let Some(should_yield) = should_yield {
                if should_yield() {
                    tracing::debug!(?lane, "render yielded");
                    status = RootExitStatus::Incomplete;
                    break;
                }
            }
            match self.perform_unit_of_work(host, unit) {
                Ok(()) => {}
                Err(Interrupt::Suspend(wakeable)) => {
                    self.throw_exception(wakeable);
                    match self.unwind_unit_of_work(unit) {
                        Some(boundary) => self.wip = Some(boundary),
                        None => {
                            self.abandon();
                            status = RootExitStatus::DidNotComplete;
                        }
                    }
                }
                Err(Interrupt::Error(error)) => {
                    self.abandon();
                    status = RootExitStatus::Errored(error);
                }
            }
        }
        status
    }

    fn prepare_fresh_stack(&mut self, lane: Lanes) {
        if self.wip_root.is_some() {
            tracing::debug!(previous = ?self.render_lane, ?lane, "discarding interrupted render");
            self.abandon();
        }
        tracing::debug!(?lane, "render started");
        let root = self.tree.create_work_in_progress(self.current, Default::default());
        self.wip_root = Some(root);
        self.wip = Some(root);
        self.render_lane = lane;
        self.finished_work = None;
        self.interleaved_lanes = Lanes::empty();
        self.suspense_handlers.clear();
        self.providers.clear();
    }

    /// Drops the in-progress render and the fibers only it referenced.
    pub(crate) fn abandon(&mut self) {
        self.wip = None;
        self.wip_root = None;
        self.suspense_handlers.clear();
        self.providers.clear();
        self.tree.sweep(self.current);
    }

    fn perform_unit_of_work(&mut self, host: &H, unit: FiberId) -> Result<(), Interrupt> {
        let next = self.begin_work(unit)?;
        let fiber = &mut self.tree[unit];
        fiber.memoized_props = fiber.pending_props.clone();
        match next {
            Some(next) => self.wip = Some(next),
            None => self.complete_unit_of_work(host, unit),
        }
        Ok(())
    }

    /// Completes `unit` and its ancestors until one has a sibling to begin.
    fn complete_unit_of_work(&mut self, host: &H, unit: FiberId) {
        let mut fiber = unit;
        loop {
            self.complete_work(host, fiber);
            if let Some(sibling) = self.tree[fiber].sibling {
                self.wip = Some(sibling);
                return;
            }
            match self.tree[fiber].parent {
                Some(parent) if Some(fiber) != self.wip_root => fiber = parent,
                _ => {
                    self.wip = None;
                    return;
                }
            }
        }
    }

    /// Marks `lane` on `fiber` and child lanes on its ancestors, on both
    /// trees. Returns `false` when the fiber is gone or detached.
    pub(crate) fn mark_update_lane_from_fiber_to_root(&mut self, fiber: FiberId, lane: Lanes) -> bool {
        if !self.tree.contains(fiber) {
            return false;
        }
        self.mark_lane(fiber, lane);
        let mut node = fiber;
        loop {
            let Some(parent) = self.tree[node].parent.filter(|parent| self.tree.contains(*parent)) else {
                return matches!(self.tree[node].kind, FiberKind::HostRoot);
            };
            self.mark_child_lane(parent, lane);
            node = parent;
        }
    }

    pub(crate) fn fiber_count(&self) -> usize {
        self.tree.len()
    }
}

impl<H: HostConfig> fmt::Debug for FiberRoot<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberRoot")
            .field("tree", &self.tree)
            .field("lanes", &self.root_lanes)
            .field("callback_node", &self.callback_node)
            .field("rendering", &self.is_rendering())
            .finish_non_exhaustive()
    }
}

/// Host errors are reported in debug builds and otherwise ignored.
pub(crate) fn report_host_error(operation: &str, result: Result<(), HostError>) {
    if let Err(error) = result {
        if cfg!(debug_assertions) {
            tracing::warn!(operation, %error, "host operation failed");
        }
    }
}
