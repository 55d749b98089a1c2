//! Begin phase: per-kind rendering and the bail-out paths.

use core::cell::RefCell;
use std::rc::Rc;

use crate::context::ContextId;
use crate::element::{Component, MemoComponent, Node, NodeRef, Props};
use crate::error::Render;
use crate::fiber::{FiberId, FiberKind, FiberProps, FiberQueue, FiberState, OffscreenMode, OffscreenProps, RootQueue, is_hidden_offscreen};
use crate::flags::Flags;
use crate::hooks::{RenderArgs, render_with_hooks};
use crate::host::HostConfig;
use crate::lane::Lanes;
use crate::update_queue::process_update_queue;
use crate::work_loop::FiberRoot;

impl<H: HostConfig> FiberRoot<H> {
    /// Renders `wip` and returns the next fiber to begin, if any.
    pub(crate) fn begin_work(&mut self, wip: FiberId) -> Render<Option<FiberId>> {
        let lane = self.render_lane;

        // Hidden subtrees keep their committed children untouched.
        if is_hidden_offscreen(&self.tree[wip].pending_props) {
            return Ok(None);
        }

        let current = self.tree.alternate(wip);
        if let Some(current) = current {
            let old = &self.tree[current];
            let new = &self.tree[wip];
            if old.memoized_props.same(&new.pending_props)
                && !old.lanes.intersects(lane)
                && !new.flags.contains(Flags::DID_CAPTURE)
            {
                tracing::trace!(fiber = ?wip, kind = ?new.kind, "bail out");
                self.push_context_on_bailout(current, wip);
                return Ok(self.bailout_on_already_finished_work(wip));
            }
        }

        let props_changed = current.is_none_or(|current| {
            !self.tree[current]
                .memoized_props
                .same(&self.tree[wip].pending_props)
        });
        self.tree[wip].lanes = Lanes::empty();

        let kind = self.tree[wip].kind.clone();
        match kind {
            FiberKind::HostRoot => Ok(current.and_then(|current| self.update_host_root(current, wip))),
            FiberKind::Host(_) => {
                self.mark_ref(current, wip);
                let children = self.tree[wip].element_props().children().clone();
                Ok(self.reconcile_children(current, wip, &children))
            }
            FiberKind::Text => Ok(None),
            FiberKind::Function(component) => self.update_function(current, wip, &component, props_changed),
            FiberKind::Fragment => {
                let children = match &self.tree[wip].pending_props {
                    FiberProps::Children(children) => children.clone(),
                    _ => Node::Empty,
                };
                Ok(self.reconcile_children(current, wip, &children))
            }
            FiberKind::Provider(context) => Ok(self.update_provider(current, wip, context)),
            FiberKind::Suspense => Ok(self.update_suspense(current, wip)),
            FiberKind::Offscreen => {
                let children = match &self.tree[wip].pending_props {
                    FiberProps::Offscreen(offscreen) => offscreen.children.clone(),
                    _ => Node::Empty,
                };
                Ok(self.reconcile_children(current, wip, &children))
            }
            FiberKind::Memo(memo) => self.update_memo(current, wip, &memo),
        }
    }

    /// Skips `wip`'s own render. Returns `None` when nothing below it has
    /// work at the render lane; otherwise clones its children and continues.
    pub(crate) fn bailout_on_already_finished_work(&mut self, wip: FiberId) -> Option<FiberId> {
        if !self.tree[wip].child_lanes.intersects(self.render_lane) {
            return None;
        }
        self.tree.clone_child_fibers(wip);
        self.tree[wip].child
    }

    /// Stacks popped in the complete phase must be pushed on every path.
    fn push_context_on_bailout(&mut self, current: FiberId, wip: FiberId) {
        match self.tree[wip].kind {
            FiberKind::Provider(context) => {
                let value = self.tree[wip].element_props().data_any();
                self.providers.push(context, value);
            }
            FiberKind::Suspense => {
                let handler = if self.tree[current].memoized_state.is_showing_fallback() {
                    self.enclosing_handler()
                } else {
                    Some(wip)
                };
                self.suspense_handlers.push(handler);
            }
            _ => {}
        }
    }

    pub(crate) fn enclosing_handler(&self) -> Option<FiberId> {
        self.suspense_handlers.last().copied().flatten()
    }

    fn reconcile_children(&mut self, current: Option<FiberId>, wip: FiberId, children: &Node) -> Option<FiberId> {
        let current_child = current.and_then(|current| self.tree[current].child);
        let first = self.tree.reconcile_child_fibers(
            wip,
            current_child,
            children,
            self.render_lane,
            current.is_some(),
        );
        self.tree[wip].child = first;
        first
    }

    fn mark_ref(&mut self, current: Option<FiberId>, wip: FiberId) {
        let changed = {
            let next = self.tree[wip].node_ref.as_ref();
            match current {
                None => next.is_some(),
                Some(current) => !NodeRef::same(self.tree[current].node_ref.as_ref(), next),
            }
        };
        if changed {
            self.tree[wip].flags |= Flags::REF;
        }
    }

    fn update_host_root(&mut self, current: FiberId, wip: FiberId) -> Option<FiberId> {
        let FiberQueue::Root(queue) = self.tree[current].update_queue.clone() else {
            return None;
        };
        let pending = queue.shared.take_pending();
        queue.base_queue.borrow_mut().append(pending);
        let processed = process_update_queue(&queue.base_state, &queue.base_queue.borrow(), self.render_lane);

        let previous = match &self.tree[current].memoized_state {
            FiberState::Root(children) => children.clone(),
            _ => Node::Empty,
        };
        let children = processed.memoized_state;
        {
            let fiber = &mut self.tree[wip];
            fiber.update_queue = FiberQueue::Root(RootQueue {
                shared: queue.shared.clone(),
                base_state: processed.base_state,
                base_queue: Rc::new(RefCell::new(processed.base_queue)),
            });
            fiber.memoized_state = FiberState::Root(children.clone());
            fiber.lanes |= processed.skipped_lanes;
        }

        if previous.same(&children) {
            tracing::trace!("root children unchanged");
            return self.bailout_on_already_finished_work(wip);
        }
        self.reconcile_children(Some(current), wip, &children)
    }

    fn update_function(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        component: &Component,
        props_changed: bool,
    ) -> Render<Option<FiberId>> {
        let context_changed = current.is_some() && self.context_changed(wip);
        let props = self.tree[wip].element_props();
        let previous = current.and_then(|current| self.tree[current].memoized_state.hooks().cloned());

        let rendered = render_with_hooks(
            component,
            &props,
            RenderArgs {
                fiber: wip,
                lane: self.render_lane,
                previous,
                link: self.link.clone(),
                providers: &self.providers,
            },
        )?;

        {
            let fiber = &mut self.tree[wip];
            fiber.memoized_state = FiberState::Hooks(rendered.hooks.into());
            fiber.update_queue = FiberQueue::Effects(rendered.effects);
            fiber.flags |= rendered.flags;
            fiber.lanes |= rendered.skipped_lanes;
            fiber.dependencies = rendered.dependencies;
        }

        if let Some(current) = current {
            if !props_changed && !context_changed && !rendered.did_receive_update {
                tracing::trace!(component = %component.name(), "bail out after render");
                self.bailout_hooks(current, wip);
                return Ok(self.bailout_on_already_finished_work(wip));
            }
        }
        Ok(self.reconcile_children(current, wip, &rendered.children))
    }

    /// A render that produced nothing new keeps the committed effects.
    fn bailout_hooks(&mut self, current: FiberId, wip: FiberId) {
        let queue = self.tree[current].update_queue.clone();
        let fiber = &mut self.tree[wip];
        fiber.update_queue = queue;
        fiber.flags.remove(Flags::PASSIVE_EFFECT | Flags::UPDATE);
        let lane = self.render_lane;
        self.tree[current].lanes.remove(lane);
    }

    fn context_changed(&self, fiber: FiberId) -> bool {
        self.tree[fiber]
            .dependencies
            .iter()
            .any(|dependency| !dependency.matches(self.providers.read(dependency.context).as_ref()))
    }

    fn update_provider(&mut self, current: Option<FiberId>, wip: FiberId, context: ContextId) -> Option<FiberId> {
        let props = self.tree[wip].element_props();
        let value = props.data_any();
        self.providers.push(context, value.clone());

        if let Some(current) = current {
            let previous = self.tree[current].memoized_props.element().and_then(Props::data_any);
            let unchanged = match (&previous, &value) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            };
            if !unchanged {
                self.propagate_context_change(wip, context);
            }
        }
        self.reconcile_children(current, wip, props.children())
    }

    /// Schedules work on every consumer of `context` below `provider`, so
    /// they re-render even when their parents bail out.
    fn propagate_context_change(&mut self, provider: FiberId, context: ContextId) {
        let lane = self.render_lane;
        let provider_alt = self.tree.alternate(provider);
        let mut stack = self.tree.children(provider);
        while let Some(fiber) = stack.pop() {
            let (depends, shadowed) = {
                let node = &self.tree[fiber];
                (
                    node.dependencies.iter().any(|d| d.context == context),
                    matches!(node.kind, FiberKind::Provider(id) if id == context),
                )
            };
            if depends {
                tracing::trace!(fiber = ?fiber, "context changed for consumer");
                self.mark_lane(fiber, lane);
                let mut parent = self.tree[fiber].parent;
                while let Some(p) = parent {
                    if p == provider || Some(p) == provider_alt || !self.tree.contains(p) {
                        break;
                    }
                    self.mark_child_lane(p, lane);
                    parent = self.tree[p].parent;
                }
            }
            if !shadowed {
                stack.extend(self.tree.children(fiber));
            }
        }
        self.mark_child_lane(provider, lane);
    }

    pub(crate) fn mark_lane(&mut self, fiber: FiberId, lane: Lanes) {
        self.tree[fiber].lanes |= lane;
        if let Some(alt) = self.tree.alternate(fiber) {
            self.tree[alt].lanes |= lane;
        }
    }

    pub(crate) fn mark_child_lane(&mut self, fiber: FiberId, lane: Lanes) {
        self.tree[fiber].child_lanes |= lane;
        if let Some(alt) = self.tree.alternate(fiber) {
            self.tree[alt].child_lanes |= lane;
        }
    }

    fn update_memo(&mut self, current: Option<FiberId>, wip: FiberId, memo: &MemoComponent) -> Render<Option<FiberId>> {
        if let Some(current) = current {
            let previous = self.tree[current].memoized_props.element().cloned();
            let next = self.tree[wip].element_props();
            let same_ref = NodeRef::same(self.tree[current].node_ref.as_ref(), self.tree[wip].node_ref.as_ref());
            if let Some(previous) = previous {
                if same_ref && memo.props_equal(&previous, &next) {
                    self.tree[wip].pending_props = FiberProps::Element(previous);
                    if !self.tree[current].lanes.intersects(self.render_lane) {
                        tracing::trace!(component = %memo.component().name(), "memo props equal");
                        self.tree[wip].lanes = self.tree[current].lanes;
                        return Ok(self.bailout_on_already_finished_work(wip));
                    }
                    return self.update_function(Some(current), wip, memo.component(), false);
                }
            }
        }
        self.update_function(current, wip, memo.component(), true)
    }

    /// Suspense boundaries render their primary children inside an
    /// offscreen fiber and, while showing the fallback, keep that fiber
    /// hidden next to a fallback fragment.
    fn update_suspense(&mut self, current: Option<FiberId>, wip: FiberId) -> Option<FiberId> {
        let props = self.tree[wip].element_props();
        let primary_children = props.children().clone();
        let fallback_children = props.fallback().cloned().unwrap_or_default();

        let show_fallback = self.tree[wip].flags.contains(Flags::DID_CAPTURE);
        self.tree[wip].flags.remove(Flags::DID_CAPTURE);
        if show_fallback {
            let enclosing = self.enclosing_handler();
            self.suspense_handlers.push(enclosing);
            self.tree[wip].memoized_state = FiberState::ShowingFallback;
        } else {
            self.suspense_handlers.push(Some(wip));
            self.tree[wip].memoized_state = FiberState::None;
        }

        let current_primary = current.and_then(|current| self.tree[current].child);
        match (current_primary, show_fallback) {
            (None, false) => Some(self.mount_suspense_primary(wip, primary_children)),
            (None, true) => Some(self.mount_suspense_fallback(wip, primary_children, fallback_children)),
            (Some(primary), false) => Some(self.update_suspense_primary(wip, primary, primary_children)),
            (Some(primary), true) => {
                Some(self.update_suspense_fallback(wip, primary, primary_children, fallback_children))
            }
        }
    }

    fn offscreen_props(mode: OffscreenMode, children: Node) -> Rc<OffscreenProps> {
        Rc::new(OffscreenProps { mode, children })
    }

    fn link_suspense_children(&mut self, wip: FiberId, primary: FiberId, fallback: Option<FiberId>) {
        {
            let node = &mut self.tree[primary];
            node.parent = Some(wip);
            node.index = 0;
            node.sibling = fallback;
        }
        if let Some(fallback) = fallback {
            let node = &mut self.tree[fallback];
            node.parent = Some(wip);
            node.index = 1;
            node.sibling = None;
        }
        self.tree[wip].child = Some(primary);
    }

    fn mount_suspense_primary(&mut self, wip: FiberId, children: Node) -> FiberId {
        let props = Self::offscreen_props(OffscreenMode::Visible, children);
        let primary = self.tree.create_offscreen(props, self.render_lane);
        self.link_suspense_children(wip, primary, None);
        primary
    }

    fn mount_suspense_fallback(&mut self, wip: FiberId, primary_children: Node, fallback_children: Node) -> FiberId {
        let props = Self::offscreen_props(OffscreenMode::Hidden, primary_children);
        let lane = self.render_lane;
        let primary = self.tree.create_offscreen(props, lane);
        // The hidden primary fiber is never begun, so it completes as is.
        self.tree[primary].memoized_props = self.tree[primary].pending_props.clone();
        let fallback = self.tree.create_fragment(fallback_children, None, lane);
        self.link_suspense_children(wip, primary, Some(fallback));
        fallback
    }

    fn update_suspense_primary(&mut self, wip: FiberId, current_primary: FiberId, children: Node) -> FiberId {
        let current_fallback = self.tree[current_primary].sibling;
        let primary = self
            .tree
            .create_work_in_progress(current_primary, FiberProps::Offscreen(Self::offscreen_props(OffscreenMode::Visible, children)));
        self.link_suspense_children(wip, primary, None);
        if let Some(fallback) = current_fallback {
            let node = &mut self.tree[wip];
            node.deletions.push(fallback);
            node.flags |= Flags::CHILD_DELETION;
        }
        primary
    }

    fn update_suspense_fallback(
        &mut self,
        wip: FiberId,
        current_primary: FiberId,
        primary_children: Node,
        fallback_children: Node,
    ) -> FiberId {
        let current_fallback = self.tree[current_primary].sibling;
        let primary = self.tree.create_work_in_progress(
            current_primary,
            FiberProps::Offscreen(Self::offscreen_props(OffscreenMode::Hidden, primary_children)),
        );
        self.tree[primary].memoized_props = self.tree[primary].pending_props.clone();
        for child in self.tree.children(primary) {
            self.tree[child].parent = Some(primary);
        }

        let fallback = match current_fallback {
            Some(current_fallback) => self
                .tree
                .create_work_in_progress(current_fallback, FiberProps::Children(fallback_children)),
            None => {
                let fallback = self.tree.create_fragment(fallback_children, None, self.render_lane);
                self.tree[fallback].flags |= Flags::PLACEMENT;
                fallback
            }
        };
        self.link_suspense_children(wip, primary, Some(fallback));

        // A retry may have queued the old fallback for deletion; it stays.
        let node = &mut self.tree[wip];
        node.deletions.clear();
        node.flags.remove(Flags::CHILD_DELETION);
        fallback
    }
}
