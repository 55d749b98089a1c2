#![allow(clippy::multiple_crate_versions)]

//! In-memory host for undertow.
//!
//! [`MemoryHost`] keeps an arena of element and text nodes, applies the
//! reconciler's mutations with DOM semantics (appending or inserting an
//! attached node moves it) and records every mutation as a [`HostOp`].
//! Microtasks are queued until [`MemoryHost::flush_microtasks`] runs them,
//! which lets tests decide exactly when synchronous work happens.

mod tree;

pub use tree::{HostOp, NodeId};

use core::cell::RefCell;
use core::fmt;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use undertow_core::{HostConfig, HostError, PropValue, Props};

use crate::tree::{HostTree, NodeData};

type Microtask = Box<dyn FnOnce()>;

/// A host tree living in memory.
///
/// Clones share the same tree, so a test can keep a handle while a
/// [`Root`](undertow_core::Root) owns another.
#[derive(Clone)]
pub struct MemoryHost {
    tree: Rc<RefCell<HostTree>>,
    microtasks: Rc<RefCell<VecDeque<Microtask>>>,
    container: NodeId,
}

impl MemoryHost {
    /// Creates an empty host with a `root` container element.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = HostTree::default();
        let container = tree.insert(NodeData::Element {
            tag: "root".into(),
            attrs: BTreeMap::new(),
        });
        Self {
            tree: Rc::new(RefCell::new(tree)),
            microtasks: Rc::new(RefCell::new(VecDeque::new())),
            container,
        }
    }

    /// The container element created with the host.
    #[must_use]
    pub const fn container(&self) -> NodeId {
        self.container
    }

    /// Creates another detached container element, for a second root.
    #[must_use]
    pub fn create_container(&self) -> NodeId {
        self.tree.borrow_mut().insert(NodeData::Element {
            tag: "root".into(),
            attrs: BTreeMap::new(),
        })
    }

    /// Runs queued microtasks, including ones queued while running, and
    /// returns how many ran.
    pub fn flush_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Number of queued microtasks.
    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    /// Takes the operations recorded since the last call.
    #[must_use]
    pub fn take_ops(&self) -> Vec<HostOp> {
        core::mem::take(&mut self.tree.borrow_mut().ops)
    }

    /// Serializes the visible content of the default container.
    #[must_use]
    pub fn render_to_string(&self) -> String {
        self.inner_html(self.container)
    }

    /// Serializes the visible children of `id`. Handler attributes are
    /// left out.
    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.tree.borrow().write_children(id, &mut out);
        out
    }

    /// Whether `id` is hidden. Unknown nodes count as visible.
    #[must_use]
    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.tree.borrow().get(id).is_ok_and(|node| node.hidden)
    }

    /// Tag of an element node.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<Rc<str>> {
        match &self.tree.borrow().get(id).ok()?.data {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            NodeData::Text(_) => None,
        }
    }

    /// Current value of an element attribute.
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<PropValue> {
        match &self.tree.borrow().get(id).ok()?.data {
            NodeData::Element { attrs, .. } => attrs.get(name).cloned(),
            NodeData::Text(_) => None,
        }
    }

    /// Content of a text node.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<String> {
        match &self.tree.borrow().get(id).ok()?.data {
            NodeData::Text(text) => Some(text.clone()),
            NodeData::Element { .. } => None,
        }
    }

    /// Children of `id`, in order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .borrow()
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Parent of `id`, if attached.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().get(id).ok()?.parent
    }

    /// Elements with `tag` attached below the default container, in
    /// document order.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let tree = self.tree.borrow();
        tree.descendants(self.container)
            .into_iter()
            .filter(|id| {
                tree.get(*id)
                    .is_ok_and(|node| matches!(&node.data, NodeData::Element { tag: found, .. } if &**found == tag))
            })
            .collect()
    }

    /// Number of nodes ever created, the containers included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.borrow().len()
    }

    /// Calls the handler stored under the attribute `event` of `id`.
    /// Returns `false` when there is no such handler.
    pub fn dispatch(&self, id: NodeId, event: &str) -> bool {
        let handler = match self.attr(id, event) {
            Some(PropValue::Handler(handler)) => handler,
            _ => return false,
        };
        tracing::trace!(node = %id, event, "dispatching event");
        handler();
        true
    }

    fn record(&self, result: Result<(), HostError>) -> Result<(), HostError> {
        if let Err(error) = &result {
            tracing::debug!(%error, "rejected host mutation");
        }
        result
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("container", &self.container)
            .field("nodes", &self.node_count())
            .field("microtasks", &self.pending_microtasks())
            .finish()
    }
}

impl HostConfig for MemoryHost {
    type Instance = NodeId;

    fn create_instance(&self, tag: &str, props: &Props) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        let tag: Rc<str> = tag.into();
        let attrs = props
            .attrs()
            .map(|(name, value)| (Rc::from(name), value.clone()))
            .collect();
        let id = tree.insert(NodeData::Element { tag: tag.clone(), attrs });
        tree.ops.push(HostOp::Create { id, tag });
        id
    }

    fn create_text_instance(&self, text: &str) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        let id = tree.insert(NodeData::Text(text.to_owned()));
        tree.ops.push(HostOp::CreateText {
            id,
            text: text.to_owned(),
        });
        id
    }

    fn append_child(&self, parent: &NodeId, child: &NodeId) -> Result<(), HostError> {
        let result = self.tree.borrow_mut().append(*parent, *child);
        self.record(result)
    }

    fn insert_before(&self, parent: &NodeId, child: &NodeId, before: &NodeId) -> Result<(), HostError> {
        let result = self.tree.borrow_mut().insert_before(*parent, *child, *before);
        self.record(result)
    }

    fn remove_child(&self, parent: &NodeId, child: &NodeId) -> Result<(), HostError> {
        let result = self.tree.borrow_mut().remove(*parent, *child);
        self.record(result)
    }

    fn set_text_content(&self, instance: &NodeId, text: &str) {
        let mut tree = self.tree.borrow_mut();
        let Ok(node) = tree.get_mut(*instance) else {
            return;
        };
        if let NodeData::Text(content) = &mut node.data {
            text.clone_into(content);
            tree.ops.push(HostOp::SetText {
                id: *instance,
                text: text.to_owned(),
            });
        }
    }

    fn apply_props(&self, instance: &NodeId, old: &Props, new: &Props) {
        let mut changed: Vec<Rc<str>> = new
            .attrs()
            .filter(|&(name, value)| old.get(name) != Some(value))
            .map(|(name, _)| Rc::from(name))
            .collect();
        changed.extend(
            old.attrs()
                .filter(|&(name, _)| new.get(name).is_none())
                .map(|(name, _)| Rc::from(name)),
        );

        let mut tree = self.tree.borrow_mut();
        let Ok(node) = tree.get_mut(*instance) else {
            return;
        };
        if let NodeData::Element { attrs, .. } = &mut node.data {
            *attrs = new
                .attrs()
                .map(|(name, value)| (Rc::from(name), value.clone()))
                .collect();
            tree.ops.push(HostOp::UpdateProps { id: *instance, changed });
        }
    }

    fn set_visibility(&self, instance: &NodeId, hidden: bool) {
        let mut tree = self.tree.borrow_mut();
        let Ok(node) = tree.get_mut(*instance) else {
            return;
        };
        if node.hidden == hidden {
            return;
        }
        node.hidden = hidden;
        tree.ops
            .push(if hidden { HostOp::Hide(*instance) } else { HostOp::Unhide(*instance) });
    }

    fn schedule_microtask(&self, task: Box<dyn FnOnce()>) {
        self.microtasks.borrow_mut().push_back(task);
    }
}

#[cfg(test)]
mod tests;
