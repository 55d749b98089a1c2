//! Complete phase: host instances, update marks and flag bubbling.

use crate::fiber::{FiberId, FiberKind, FiberProps};
use crate::flags::Flags;
use crate::host::HostConfig;
use crate::lane::Lanes;
use crate::work_loop::{FiberRoot, report_host_error};

impl<H: HostConfig> FiberRoot<H> {
    pub(crate) fn complete_work(&mut self, host: &H, wip: FiberId) {
        let current = self.tree.alternate(wip);
        let kind = self.tree[wip].kind.clone();
        match kind {
            FiberKind::Host(tag) => {
                let props = self.tree[wip].memoized_props.element().cloned().unwrap_or_default();
                match current {
                    Some(current) if self.tree[wip].state_node.is_some() => {
                        let unchanged = self.tree[current]
                            .memoized_props
                            .element()
                            .is_some_and(|old| old.attrs_eq(&props));
                        if !unchanged {
                            self.tree[wip].flags |= Flags::UPDATE;
                        }
                    }
                    _ => {
                        let instance = host.create_instance(&tag, &props);
                        for child in self.tree.host_children(wip, false) {
                            if let Some(node) = &self.tree[child].state_node {
                                report_host_error("append_child", host.append_child(&instance, node));
                            }
                        }
                        self.tree[wip].state_node = Some(instance);
                    }
                }
            }
            FiberKind::Text => {
                let text = match &self.tree[wip].memoized_props {
                    FiberProps::Text(text) => text.clone(),
                    _ => "".into(),
                };
                match current {
                    Some(current) if self.tree[wip].state_node.is_some() => {
                        let changed = match &self.tree[current].memoized_props {
                            FiberProps::Text(old) => *old != text,
                            _ => true,
                        };
                        if changed {
                            self.tree[wip].flags |= Flags::UPDATE;
                        }
                    }
                    _ => {
                        self.tree[wip].state_node = Some(host.create_text_instance(&text));
                    }
                }
            }
            FiberKind::Provider(_) => self.providers.pop(),
            FiberKind::Suspense => {
                self.suspense_handlers.pop();
                let showing = self.tree[wip].memoized_state.is_showing_fallback();
                if let Some(current) = current {
                    let was_showing = self.tree[current].memoized_state.is_showing_fallback();
                    if showing != was_showing {
                        if let Some(primary) = self.tree[wip].child {
                            self.tree[primary].flags |= Flags::VISIBILITY;
                        }
                    }
                }
            }
            FiberKind::HostRoot
            | FiberKind::Function(_)
            | FiberKind::Fragment
            | FiberKind::Offscreen
            | FiberKind::Memo(_) => {}
        }
        self.bubble_properties(wip);
    }

    /// Folds the children's lanes and flags into `wip`.
    ///
    /// Children reused wholesale from the committed tree carry no new
    /// effects, so only their lanes count. The primary subtree of a boundary
    /// showing its fallback does not contribute lanes; a ping retries it.
    fn bubble_properties(&mut self, wip: FiberId) {
        let did_bailout = self
            .tree
            .alternate(wip)
            .is_some_and(|current| self.tree[current].child == self.tree[wip].child);
        let hidden_primary = match self.tree[wip].kind {
            FiberKind::Suspense if self.tree[wip].memoized_state.is_showing_fallback() => self.tree[wip].child,
            _ => None,
        };

        let mut subtree_flags = Flags::empty();
        let mut child_lanes = Lanes::empty();
        let mut child = self.tree[wip].child;
        while let Some(id) = child {
            let node = &mut self.tree[id];
            if Some(id) != hidden_primary {
                child_lanes |= node.lanes | node.child_lanes;
            }
            if !did_bailout {
                subtree_flags |= node.subtree_flags | node.flags;
            }
            node.parent = Some(wip);
            child = node.sibling;
        }

        let fiber = &mut self.tree[wip];
        fiber.subtree_flags |= subtree_flags;
        fiber.child_lanes = child_lanes;
    }
}
