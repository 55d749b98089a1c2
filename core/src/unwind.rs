//! Suspension handling: locating the boundary, wiring the ping and
//! unwinding the walk back to it.

use std::rc::Rc;

use crate::fiber::{FiberId, FiberKind};
use crate::flags::Flags;
use crate::host::HostConfig;
use crate::lane::Lanes;
use crate::resource::{Wakeable, WakeableId};
use crate::work_loop::FiberRoot;

/// Listeners attached to one pending wakeable.
#[derive(Debug, Default)]
pub(crate) struct PingEntry {
    pub(crate) lanes: Lanes,
    pub(crate) boundaries: Vec<FiberId>,
}

impl<H: HostConfig> FiberRoot<H> {
    /// Records a suspension of the fiber being rendered on `wakeable`.
    /// Returns the boundary that will show its fallback, if any.
    pub(crate) fn throw_exception(&mut self, wakeable: Rc<dyn Wakeable>) -> Option<FiberId> {
        let lane = self.render_lane;
        let boundary = self.enclosing_handler();
        if let Some(boundary) = boundary {
            self.tree[boundary].flags |= Flags::SHOULD_CAPTURE;
        }
        tracing::debug!(wakeable = ?wakeable.id(), ?boundary, ?lane, "render suspended");
        self.attach_ping_listener(&wakeable, lane, boundary);
        boundary
    }

    /// Subscribes once per wakeable and lane; the ping re-queues the
    /// suspended lane and marks the boundaries for retry.
    fn attach_ping_listener(&mut self, wakeable: &Rc<dyn Wakeable>, lane: Lanes, boundary: Option<FiberId>) {
        let id: WakeableId = wakeable.id();
        let subscribe = {
            let entry = self.ping_cache.entry(id).or_default();
            if let Some(boundary) = boundary {
                if !entry.boundaries.contains(&boundary) {
                    entry.boundaries.push(boundary);
                }
            }
            let fresh = !entry.lanes.includes(lane);
            entry.lanes |= lane;
            fresh
        };
        if !subscribe {
            return;
        }
        let link = self.link.clone();
        wakeable.subscribe(Box::new(move || {
            if let Some(link) = link.upgrade() {
                link.ping(id);
            }
        }));
    }

    /// Walks from the suspended fiber up to the capturing boundary.
    ///
    /// Returns the boundary to re-begin, or `None` when the suspension
    /// escaped every boundary.
    pub(crate) fn unwind_unit_of_work(&mut self, from: FiberId) -> Option<FiberId> {
        let mut fiber = Some(from);
        while let Some(id) = fiber {
            if self.unwind_work(id) {
                return Some(id);
            }
            let parent = self.tree[id].parent;
            if let Some(parent) = parent {
                let node = &mut self.tree[parent];
                node.subtree_flags = Flags::empty();
                node.deletions.clear();
                node.flags.remove(Flags::CHILD_DELETION);
            }
            fiber = parent;
        }
        None
    }

    /// Pops the context `id` pushed in begin. A boundary marked
    /// `SHOULD_CAPTURE` flips to `DID_CAPTURE` and stops the unwind.
    fn unwind_work(&mut self, id: FiberId) -> bool {
        match self.tree[id].kind {
            FiberKind::Suspense => {
                self.suspense_handlers.pop();
                let node = &mut self.tree[id];
                if node.flags.contains(Flags::SHOULD_CAPTURE) {
                    node.flags.remove(Flags::SHOULD_CAPTURE);
                    node.flags |= Flags::DID_CAPTURE;
                    return true;
                }
                false
            }
            FiberKind::Provider(_) => {
                self.providers.pop();
                false
            }
            _ => false,
        }
    }
}
