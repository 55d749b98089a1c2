//! Child reconciliation: diffing a parent's current children against the
//! new child description.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::element::{Element, ElementType, Key, Node};
use crate::fiber::{FiberId, FiberKind, FiberProps, FiberTree};
use crate::flags::Flags;
use crate::host::HostConfig;
use crate::lane::Lanes;

/// Lookup key of an old child during array reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Key(Key),
    Index(usize),
}

impl<H: HostConfig> FiberTree<H> {
    /// Reconciles the children of `parent` and returns the new first child.
    ///
    /// With `track` unset (the parent is mounting) no placement or deletion
    /// is recorded; the parent's own placement covers the whole subtree.
    pub(crate) fn reconcile_child_fibers(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        new_child: &Node,
        lanes: Lanes,
        track: bool,
    ) -> Option<FiberId> {
        let new_child = match new_child {
            Node::Element(element)
                if matches!(element.ty(), ElementType::Fragment) && element.key().is_none() =>
            {
                element.props().children()
            }
            other => other,
        };

        match new_child {
            Node::Element(element) => {
                let fiber = self.reconcile_single_element(parent, current_first, element, lanes, track);
                Some(self.place_single_child(fiber, track))
            }
            Node::Text(text) => {
                let fiber = self.reconcile_single_text(parent, current_first, text, lanes, track);
                Some(self.place_single_child(fiber, track))
            }
            Node::List(items) => self.reconcile_children_array(parent, current_first, items, lanes, track),
            Node::Empty => {
                self.delete_remaining(parent, current_first, track);
                None
            }
        }
    }

    fn reconcile_single_element(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        element: &Element,
        lanes: Lanes,
        track: bool,
    ) -> FiberId {
        let mut child = current_first;
        while let Some(current) = child {
            if self[current].key.as_ref() == element.key() {
                if self[current].kind.same_type(element.ty()) {
                    let sibling = self[current].sibling;
                    self.delete_remaining(parent, sibling, track);
                    let existing = self.use_fiber(current, FiberProps::for_element(element));
                    let fiber = &mut self[existing];
                    fiber.parent = Some(parent);
                    fiber.node_ref = element.node_ref().cloned();
                    return existing;
                }
                self.delete_remaining(parent, Some(current), track);
                break;
            }
            self.delete_child(parent, current, track);
            child = self[current].sibling;
        }

        let created = self.create_from_element(element, lanes);
        self[created].parent = Some(parent);
        created
    }

    fn reconcile_single_text(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        text: &Rc<str>,
        lanes: Lanes,
        track: bool,
    ) -> FiberId {
        if let Some(current) = current_first {
            if matches!(self[current].kind, FiberKind::Text) {
                let sibling = self[current].sibling;
                self.delete_remaining(parent, sibling, track);
                let existing = self.use_fiber(current, FiberProps::Text(text.clone()));
                self[existing].parent = Some(parent);
                return existing;
            }
        }
        self.delete_remaining(parent, current_first, track);
        let created = self.create_text(text.clone(), lanes);
        self[created].parent = Some(parent);
        created
    }

    fn place_single_child(&mut self, fiber: FiberId, track: bool) -> FiberId {
        if track && self.alternate(fiber).is_none() {
            self[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn delete_child(&mut self, parent: FiberId, child: FiberId, track: bool) {
        if !track {
            return;
        }
        let parent = &mut self[parent];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining(&mut self, parent: FiberId, first: Option<FiberId>, track: bool) {
        if !track {
            return;
        }
        let mut child = first;
        while let Some(current) = child {
            self.delete_child(parent, current, track);
            child = self[current].sibling;
        }
    }

    /// Keyed diff of a child list.
    ///
    /// Old children are looked up by key, or by position when unkeyed. A
    /// reused child whose old position is left of the last reused position
    /// moved and gets `PLACEMENT`; new children always do. Old children that
    /// were not reused are deleted.
    fn reconcile_children_array(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        items: &[Node],
        lanes: Lanes,
        track: bool,
    ) -> Option<FiberId> {
        let mut olds = Vec::new();
        let mut existing = HashMap::new();
        let mut child = current_first;
        while let Some(current) = child {
            let fiber = &self[current];
            let key = fiber
                .key
                .clone()
                .map_or(ChildKey::Index(fiber.index), ChildKey::Key);
            existing.insert(key, current);
            olds.push(current);
            child = fiber.sibling;
        }

        let mut first = None;
        let mut previous: Option<FiberId> = None;
        let mut last_placed = 0;
        let mut reused = HashSet::new();
        for (index, item) in items.iter().enumerate() {
            let Some(fiber) = self.update_from_map(&mut existing, index, item, lanes) else {
                continue;
            };
            {
                let node = &mut self[fiber];
                node.index = index;
                node.parent = Some(parent);
            }
            match previous {
                Some(previous) => self[previous].sibling = Some(fiber),
                None => first = Some(fiber),
            }
            previous = Some(fiber);

            let current = self.alternate(fiber);
            if let Some(current) = current {
                reused.insert(current);
            }
            if !track {
                continue;
            }
            match current {
                Some(current) => {
                    let old_index = self[current].index;
                    if old_index < last_placed {
                        self[fiber].flags |= Flags::PLACEMENT;
                    } else {
                        last_placed = old_index;
                    }
                }
                None => self[fiber].flags |= Flags::PLACEMENT,
            }
        }
        if let Some(last) = previous {
            self[last].sibling = None;
        }

        for old in olds {
            if !reused.contains(&old) {
                self.delete_child(parent, old, track);
            }
        }
        first
    }

    /// Produces the fiber for one list item, reusing the old child found in
    /// `existing` when its type matches. Only reused children leave the map.
    fn update_from_map(
        &mut self,
        existing: &mut HashMap<ChildKey, FiberId>,
        index: usize,
        item: &Node,
        lanes: Lanes,
    ) -> Option<FiberId> {
        match item {
            Node::Empty => None,
            Node::Text(text) => {
                let key = ChildKey::Index(index);
                if let Some(&before) = existing.get(&key) {
                    if matches!(self[before].kind, FiberKind::Text) {
                        existing.remove(&key);
                        return Some(self.use_fiber(before, FiberProps::Text(text.clone())));
                    }
                }
                Some(self.create_text(text.clone(), lanes))
            }
            Node::Element(element) => {
                let key = element
                    .key()
                    .cloned()
                    .map_or(ChildKey::Index(index), ChildKey::Key);
                let before = existing.get(&key).copied();
                if matches!(element.ty(), ElementType::Fragment) {
                    return Some(self.update_fragment(
                        existing,
                        &key,
                        before,
                        element.props().children().clone(),
                        element.key().cloned(),
                        lanes,
                    ));
                }
                if let Some(before) = before {
                    if self[before].kind.same_type(element.ty()) {
                        existing.remove(&key);
                        let fiber = self.use_fiber(before, FiberProps::for_element(element));
                        self[fiber].node_ref = element.node_ref().cloned();
                        return Some(fiber);
                    }
                }
                Some(self.create_from_element(element, lanes))
            }
            Node::List(list) => {
                let key = ChildKey::Index(index);
                let before = existing.get(&key).copied();
                Some(self.update_fragment(existing, &key, before, Node::List(list.clone()), None, lanes))
            }
        }
    }

    fn update_fragment(
        &mut self,
        existing: &mut HashMap<ChildKey, FiberId>,
        map_key: &ChildKey,
        before: Option<FiberId>,
        children: Node,
        key: Option<Key>,
        lanes: Lanes,
    ) -> FiberId {
        if let Some(before) = before {
            if matches!(self[before].kind, FiberKind::Fragment) {
                existing.remove(map_key);
                return self.use_fiber(before, FiberProps::Children(children));
            }
        }
        self.create_fragment(children, key, lanes)
    }

    /// Work-in-progress twin of `current`, detached from its old siblings.
    fn use_fiber(&mut self, current: FiberId, props: FiberProps) -> FiberId {
        let fiber = self.create_work_in_progress(current, props);
        let node = &mut self[fiber];
        node.index = 0;
        node.sibling = None;
        fiber
    }

    /// Clones the current children of `parent` so the walk can descend into
    /// a bailed-out fiber whose subtree still has work.
    pub(crate) fn clone_child_fibers(&mut self, parent: FiberId) {
        let Some(mut current) = self[parent].child else {
            return;
        };
        let props = self[current].memoized_props.clone();
        let mut fiber = self.create_work_in_progress(current, props);
        self[fiber].parent = Some(parent);
        self[parent].child = Some(fiber);

        while let Some(next) = self[current].sibling {
            current = next;
            let props = self[current].memoized_props.clone();
            let sibling = self.create_work_in_progress(current, props);
            self[sibling].parent = Some(parent);
            self[fiber].sibling = Some(sibling);
            fiber = sibling;
        }
        self[fiber].sibling = None;
    }
}
