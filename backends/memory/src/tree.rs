//! Arena of host nodes and the operation log.

use core::fmt::{self, Write};
use std::collections::BTreeMap;
use std::rc::Rc;

use undertow_core::{HostError, PropValue};

/// Identifier of a node in a [`MemoryHost`](crate::MemoryHost).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A mutation applied to the host tree, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    /// An element was created.
    Create {
        /// New node.
        id: NodeId,
        /// Element tag.
        tag: Rc<str>,
    },
    /// A text node was created.
    CreateText {
        /// New node.
        id: NodeId,
        /// Initial content.
        text: String,
    },
    /// A node was appended to a parent.
    Append {
        /// Parent node.
        parent: NodeId,
        /// Appended node.
        child: NodeId,
    },
    /// A node was inserted before a sibling.
    Insert {
        /// Parent node.
        parent: NodeId,
        /// Inserted node.
        child: NodeId,
        /// Sibling the node now precedes.
        before: NodeId,
    },
    /// A node was detached.
    Remove {
        /// Former parent.
        parent: NodeId,
        /// Detached node.
        child: NodeId,
    },
    /// Text content was replaced.
    SetText {
        /// Text node.
        id: NodeId,
        /// New content.
        text: String,
    },
    /// Element attributes changed.
    UpdateProps {
        /// Element node.
        id: NodeId,
        /// Names of the attributes that were added, removed or changed.
        changed: Vec<Rc<str>>,
    },
    /// A node was hidden.
    Hide(NodeId),
    /// A hidden node was shown again.
    Unhide(NodeId),
}

#[derive(Debug)]
pub(crate) enum NodeData {
    Element {
        tag: Rc<str>,
        attrs: BTreeMap<Rc<str>, PropValue>,
    },
    Text(String),
}

#[derive(Debug)]
pub(crate) struct HostNode {
    pub(crate) data: NodeData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) hidden: bool,
}

#[derive(Debug, Default)]
pub(crate) struct HostTree {
    nodes: Vec<HostNode>,
    pub(crate) ops: Vec<HostOp>,
}

impl HostTree {
    pub(crate) fn insert(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(HostNode {
            data,
            parent: None,
            children: Vec::new(),
            hidden: false,
        });
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&HostNode, HostError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| HostError::NodeNotFound(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| HostError::NodeNotFound(id.to_string()))
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `node` is `ancestor` or lies below it.
    fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(id.0).and_then(|node| node.parent);
        }
        false
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        let parent_node = self.get(parent)?;
        self.get(child)?;
        if matches!(parent_node.data, NodeData::Text(_)) {
            return Err(HostError::Unsupported(format!("text node {parent} cannot have children")));
        }
        if self.is_inclusive_descendant(parent, child) {
            return Err(HostError::Unsupported(format!("inserting {child} into {parent} would create a cycle")));
        }
        Ok(())
    }

    /// Detaches `child` from wherever it currently is.
    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.nodes[child.0].parent.take() else {
            return;
        };
        self.nodes[parent.0].children.retain(|id| *id != child);
    }

    pub(crate) fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.check_insertable(parent, child)?;
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        self.ops.push(HostOp::Append { parent, child });
        Ok(())
    }

    pub(crate) fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId) -> Result<(), HostError> {
        self.check_insertable(parent, child)?;
        if self.get(before)?.parent != Some(parent) {
            return Err(HostError::NotAChild {
                parent: parent.to_string(),
                child: before.to_string(),
            });
        }
        if child == before {
            return Ok(());
        }
        self.detach(child);
        let siblings = &mut self.nodes[parent.0].children;
        let position = siblings.iter().position(|id| *id == before).unwrap_or(siblings.len());
        siblings.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
        self.ops.push(HostOp::Insert { parent, child, before });
        Ok(())
    }

    pub(crate) fn remove(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.get(parent)?;
        if self.get(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        self.detach(child);
        self.ops.push(HostOp::Remove { parent, child });
        Ok(())
    }

    /// Serializes the children of `id`, skipping hidden nodes and handler
    /// attributes.
    pub(crate) fn write_children(&self, id: NodeId, out: &mut String) {
        if let Ok(node) = self.get(id) {
            for child in &node.children {
                self.write_node(*child, out);
            }
        }
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        if node.hidden {
            return;
        }
        match &node.data {
            NodeData::Text(text) => escape(text, out),
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    write_attr(name, value, out);
                }
                out.push('>');
                self.write_children(id, out);
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    /// Attached nodes below `root` in document order.
    pub(crate) fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root.0].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            found.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        found
    }
}

fn write_attr(name: &str, value: &PropValue, out: &mut String) {
    match value {
        PropValue::Handler(_) | PropValue::Bool(false) => {}
        PropValue::Bool(true) => {
            let _ = write!(out, " {name}");
        }
        PropValue::Str(value) => {
            let _ = write!(out, " {name}=\"");
            escape(value, out);
            out.push('"');
        }
        PropValue::Int(value) => {
            let _ = write!(out, " {name}=\"{value}\"");
        }
        PropValue::Float(value) => {
            let _ = write!(out, " {name}=\"{value}\"");
        }
    }
}

fn escape(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tree: &mut HostTree, tag: &str) -> NodeId {
        tree.insert(NodeData::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
        })
    }

    #[test]
    fn append_moves_an_attached_node() {
        let mut tree = HostTree::default();
        let a = element(&mut tree, "a");
        let b = element(&mut tree, "b");
        let child = element(&mut tree, "c");
        tree.append(a, child).unwrap();
        tree.append(b, child).unwrap();
        assert!(tree.nodes[a.0].children.is_empty());
        assert_eq!(tree.nodes[b.0].children, vec![child]);
        assert_eq!(tree.nodes[child.0].parent, Some(b));
    }

    #[test]
    fn insert_before_requires_a_child_reference() {
        let mut tree = HostTree::default();
        let parent = element(&mut tree, "ul");
        let stranger = element(&mut tree, "li");
        let child = element(&mut tree, "li");
        assert!(matches!(
            tree.insert_before(parent, child, stranger),
            Err(HostError::NotAChild { .. })
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut tree = HostTree::default();
        let outer = element(&mut tree, "div");
        let inner = element(&mut tree, "div");
        tree.append(outer, inner).unwrap();
        assert!(matches!(tree.append(inner, outer), Err(HostError::Unsupported(_))));
    }

    #[test]
    fn serialization_escapes_and_skips_hidden_nodes() {
        let mut tree = HostTree::default();
        let root = element(&mut tree, "root");
        let p = tree.insert(NodeData::Element {
            tag: "p".into(),
            attrs: BTreeMap::from([
                (Rc::from("title"), PropValue::from("a\"b")),
                (Rc::from("open"), PropValue::Bool(true)),
            ]),
        });
        let text = tree.insert(NodeData::Text("1 < 2".into()));
        let hidden = element(&mut tree, "span");
        tree.append(root, p).unwrap();
        tree.append(p, text).unwrap();
        tree.append(root, hidden).unwrap();
        tree.nodes[hidden.0].hidden = true;

        let mut out = String::new();
        tree.write_children(root, &mut out);
        assert_eq!(out, "<p open title=\"a&quot;b\">1 &lt; 2</p>");
    }
}
