//! Commit phase: applies a finished tree to the host.

use std::rc::Rc;

use crate::fiber::{FiberId, FiberKind, FiberProps, is_hidden_offscreen};
use crate::flags::Flags;
use crate::host::HostConfig;
use crate::lane::Lanes;
use crate::work_loop::{FiberRoot, report_host_error};

/// Summary of one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitStats {
    /// Lane that was committed.
    pub lane: Lanes,
    /// Host subtrees inserted or moved.
    pub placements: usize,
    /// Host instances whose props or text changed.
    pub updates: usize,
    /// Subtrees removed.
    pub deletions: usize,
    /// Offscreen subtrees hidden or revealed.
    pub visibility_changes: usize,
    /// Mutation flags present anywhere in the finished tree.
    pub mutation_flags: Flags,
    /// Whether passive effects were queued.
    pub passive: bool,
}

#[derive(Debug)]
pub(crate) struct CommitOutcome {
    pub(crate) stats: CommitStats,
    pub(crate) has_passive: bool,
}

impl<H: HostConfig> FiberRoot<H> {
    /// Commits the finished tree, if any. The host sees each mutation once,
    /// in tree order, before refs are attached.
    pub(crate) fn commit_root(&mut self, host: &H) -> Option<CommitOutcome> {
        let finished = self.finished_work.take()?;
        let lane = core::mem::take(&mut self.finished_lane);

        let (flags, remaining) = {
            let fiber = &self.tree[finished];
            (fiber.flags | fiber.subtree_flags, fiber.lanes | fiber.child_lanes)
        };
        self.root_lanes.mark_finished(remaining | self.interleaved_lanes);
        self.interleaved_lanes = Lanes::empty();
        tracing::debug!(?lane, ?remaining, ?flags, "commit");

        let mut stats = CommitStats {
            lane,
            mutation_flags: flags & Flags::MUTATION,
            ..CommitStats::default()
        };
        if flags.intersects(Flags::MUTATION | Flags::PASSIVE) {
            self.commit_mutation_effects(host, finished, &mut stats);
        }

        self.current = finished;

        if flags.intersects(Flags::LAYOUT) {
            self.commit_layout_effects(finished);
        }
        self.tree.sweep(finished);

        let has_passive = !self.pending_passive.is_empty();
        stats.passive = has_passive;
        Some(CommitOutcome { stats, has_passive })
    }

    fn commit_mutation_effects(&mut self, host: &H, fiber: FiberId, stats: &mut CommitStats) {
        let flags = self.tree[fiber].flags;
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = core::mem::take(&mut self.tree[fiber].deletions);
            for child in deletions {
                self.commit_deletion(host, fiber, child);
                stats.deletions += 1;
            }
        }

        if self.tree[fiber].subtree_flags.intersects(Flags::MUTATION | Flags::PASSIVE) {
            for child in self.tree.children(fiber) {
                self.commit_mutation_effects(host, child, stats);
            }
        }

        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(host, fiber);
            stats.placements += 1;
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_update(host, fiber);
            stats.updates += 1;
        }
        if flags.contains(Flags::REF) {
            if let Some(current) = self.tree.alternate(fiber) {
                if let Some(old) = &self.tree[current].node_ref {
                    old.detach();
                }
            }
        }
        if flags.contains(Flags::VISIBILITY) {
            self.commit_visibility(host, fiber);
            stats.visibility_changes += 1;
        }
        if flags.contains(Flags::PASSIVE_EFFECT) {
            if let Some(effects) = self.tree[fiber].update_queue.effects() {
                self.pending_passive.update.push(effects.clone());
            }
        }

        self.tree[fiber].flags.remove(
            Flags::PLACEMENT | Flags::UPDATE | Flags::CHILD_DELETION | Flags::VISIBILITY | Flags::PASSIVE_EFFECT,
        );
    }

    /// Host instance that `fiber`'s host children are attached to.
    fn host_parent(&self, fiber: FiberId) -> Option<H::Instance> {
        let mut parent = self.tree[fiber].parent;
        while let Some(id) = parent {
            if !self.tree.contains(id) {
                return None;
            }
            let node = &self.tree[id];
            match node.kind {
                FiberKind::Host(_) => return node.state_node.clone(),
                FiberKind::HostRoot => return Some(self.container.clone()),
                _ => parent = node.parent,
            }
        }
        None
    }

    /// Like [`host_parent`](Self::host_parent), but `fiber` itself counts.
    fn host_container_of(&self, fiber: FiberId) -> Option<H::Instance> {
        let node = &self.tree[fiber];
        match node.kind {
            FiberKind::Host(_) => node.state_node.clone(),
            FiberKind::HostRoot => Some(self.container.clone()),
            _ => self.host_parent(fiber),
        }
    }

    /// First host instance after `fiber` that is already in place.
    ///
    /// Walks right and up through non-host ancestors, skipping subtrees
    /// that are themselves being placed. Parent pointers are repaired on the
    /// way down since reused fibers may still point at an old parent.
    fn host_sibling(&mut self, fiber: FiberId) -> Option<H::Instance> {
        let mut node = fiber;
        'siblings: loop {
            while self.tree[node].sibling.is_none() {
                match self.tree[node].parent {
                    Some(parent) if !matches!(self.tree[parent].kind, FiberKind::Host(_) | FiberKind::HostRoot) => {
                        node = parent;
                    }
                    _ => return None,
                }
            }
            let parent = self.tree[node].parent;
            let next = self.tree[node].sibling?;
            self.tree[next].parent = parent;
            node = next;

            while !self.tree[node].kind.is_host() {
                if self.tree[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                let Some(child) = self.tree[node].child else {
                    continue 'siblings;
                };
                self.tree[child].parent = Some(node);
                node = child;
            }
            if !self.tree[node].flags.contains(Flags::PLACEMENT) {
                return self.tree[node].state_node.clone();
            }
        }
    }

    fn commit_placement(&mut self, host: &H, fiber: FiberId) {
        let Some(parent) = self.host_parent(fiber) else {
            return;
        };
        let before = self.host_sibling(fiber);
        let nodes = if self.tree[fiber].kind.is_host() {
            vec![fiber]
        } else {
            self.tree.host_children(fiber, false)
        };
        for node in nodes {
            let Some(instance) = self.tree[node].state_node.clone() else {
                continue;
            };
            let result = match &before {
                Some(before) => host.insert_before(&parent, &instance, before),
                None => host.append_child(&parent, &instance),
            };
            report_host_error("place", result);
        }
    }

    fn commit_update(&self, host: &H, fiber: FiberId) {
        let node = &self.tree[fiber];
        let Some(instance) = &node.state_node else {
            return;
        };
        match &node.memoized_props {
            FiberProps::Text(text) => host.set_text_content(instance, text),
            FiberProps::Element(props) => {
                let old = self
                    .tree
                    .alternate(fiber)
                    .and_then(|current| self.tree[current].memoized_props.element().cloned())
                    .unwrap_or_default();
                host.apply_props(instance, &old, props);
            }
            _ => {}
        }
    }

    /// Hides or reveals the top-level host nodes of an offscreen subtree.
    /// Nested hidden subtrees keep their own state.
    fn commit_visibility(&self, host: &H, fiber: FiberId) {
        let hidden = is_hidden_offscreen(&self.tree[fiber].memoized_props);
        tracing::debug!(fiber = ?fiber, hidden, "offscreen visibility changed");
        for node in self.tree.host_children(fiber, true) {
            if let Some(instance) = &self.tree[node].state_node {
                host.set_visibility(instance, hidden);
            }
        }
    }

    /// Removes `child` and its subtree from below `parent`.
    ///
    /// Every function component in the subtree has its effect cleanups
    /// queued, and every host ref is detached. Only the topmost host nodes
    /// are removed from the host.
    fn commit_deletion(&mut self, host: &H, parent: FiberId, child: FiberId) {
        let mut stack = vec![child];
        while let Some(fiber) = stack.pop() {
            let node = &self.tree[fiber];
            match node.kind {
                FiberKind::Host(_) => {
                    if let Some(node_ref) = &node.node_ref {
                        node_ref.detach();
                    }
                }
                FiberKind::Function(_) | FiberKind::Memo(_) => {
                    if let Some(effects) = node.update_queue.effects() {
                        self.pending_passive.unmount.push(effects.clone());
                    }
                }
                _ => {}
            }
            let mut children = self.tree.children(fiber);
            children.reverse();
            stack.extend(children);
        }

        if let Some(container) = self.host_container_of(parent) {
            let roots = if self.tree[child].kind.is_host() {
                vec![child]
            } else {
                self.tree.host_children(child, false)
            };
            for node in roots {
                if let Some(instance) = &self.tree[node].state_node {
                    report_host_error("remove_child", host.remove_child(&container, instance));
                }
            }
        }

        self.tree[child].parent = None;
        if let Some(alternate) = self.tree.alternate(child) {
            self.tree[alternate].parent = None;
        }
    }

    /// Attaches refs once the host tree is final.
    fn commit_layout_effects(&mut self, fiber: FiberId) {
        if self.tree[fiber].subtree_flags.intersects(Flags::LAYOUT) {
            for child in self.tree.children(fiber) {
                self.commit_layout_effects(child);
            }
        }
        let node = &mut self.tree[fiber];
        if node.flags.contains(Flags::REF) {
            node.flags.remove(Flags::REF);
            if let (Some(node_ref), Some(instance)) = (&node.node_ref, &node.state_node) {
                node_ref.attach(Rc::new(instance.clone()));
            }
        }
    }
}
