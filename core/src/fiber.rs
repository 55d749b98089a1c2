//! Fiber nodes and the arena that owns them.
//!
//! Every fiber has at most one alternate. The committed tree and the tree
//! under construction share fiber pairs, so a render reuses the alternate
//! of each committed fiber instead of allocating. Fibers are addressed by
//! generational [`FiberId`]s; a state setter holding the id of a fiber that
//! has since been swept simply finds nothing.

use core::cell::RefCell;
use core::fmt;
use core::ops::{Index, IndexMut};
use std::collections::HashSet;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

use crate::context::{ContextDependency, ContextId};
use crate::element::{Component, Element, ElementType, Key, MemoComponent, Node, NodeRef, Props};
use crate::flags::Flags;
use crate::hooks::{Effect, Hook};
use crate::host::HostConfig;
use crate::lane::Lanes;
use crate::ring::Ring;
use crate::update_queue::{SharedQueue, Update};

new_key_type! {
    /// Generational handle to a fiber.
    pub struct FiberId;
}

/// What a fiber represents.
#[derive(Clone)]
pub(crate) enum FiberKind {
    HostRoot,
    Host(Rc<str>),
    Text,
    Function(Component),
    Fragment,
    Provider(ContextId),
    Suspense,
    Offscreen,
    Memo(MemoComponent),
}

impl FiberKind {
    fn from_element(ty: &ElementType) -> Self {
        match ty {
            ElementType::Host(tag) => Self::Host(tag.clone()),
            ElementType::Component(component) => Self::Function(component.clone()),
            ElementType::Fragment => Self::Fragment,
            ElementType::Provider(id) => Self::Provider(*id),
            ElementType::Suspense => Self::Suspense,
            ElementType::Memo(memo) => Self::Memo(memo.clone()),
        }
    }

    /// Whether a fiber of this kind can be reused for an element of type `ty`.
    pub(crate) fn same_type(&self, ty: &ElementType) -> bool {
        match (self, ty) {
            (Self::Host(a), ElementType::Host(b)) => a == b,
            (Self::Function(a), ElementType::Component(b)) => a.ptr_eq(b),
            (Self::Fragment, ElementType::Fragment) | (Self::Suspense, ElementType::Suspense) => true,
            (Self::Provider(a), ElementType::Provider(b)) => a == b,
            (Self::Memo(a), ElementType::Memo(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Host elements and text own a host instance.
    pub(crate) const fn is_host(&self) -> bool {
        matches!(self, Self::Host(_) | Self::Text)
    }

    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::HostRoot => "HostRoot",
            Self::Host(_) => "Host",
            Self::Text => "Text",
            Self::Function(_) => "Function",
            Self::Fragment => "Fragment",
            Self::Provider(_) => "Provider",
            Self::Suspense => "Suspense",
            Self::Offscreen => "Offscreen",
            Self::Memo(_) => "Memo",
        }
    }
}

impl fmt::Debug for FiberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(tag) => write!(f, "Host({tag})"),
            Self::Function(component) => write!(f, "Function({})", component.name()),
            Self::Memo(memo) => write!(f, "Memo({})", memo.component().name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Visibility of an offscreen subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OffscreenMode {
    Visible,
    Hidden,
}

#[derive(Debug)]
pub(crate) struct OffscreenProps {
    pub(crate) mode: OffscreenMode,
    pub(crate) children: Node,
}

/// Inputs of a fiber.
#[derive(Clone, Debug, Default)]
pub(crate) enum FiberProps {
    #[default]
    None,
    Element(Props),
    Text(Rc<str>),
    Children(Node),
    Offscreen(Rc<OffscreenProps>),
}

impl FiberProps {
    pub(crate) fn for_element(element: &Element) -> Self {
        match element.ty() {
            ElementType::Fragment => Self::Children(element.props().children().clone()),
            _ => Self::Element(element.props().clone()),
        }
    }

    /// Identity comparison used by the bail-out check.
    pub(crate) fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Element(a), Self::Element(b)) => a.ptr_eq(b),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Children(a), Self::Children(b)) => a.same(b),
            (Self::Offscreen(a), Self::Offscreen(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn element(&self) -> Option<&Props> {
        match self {
            Self::Element(props) => Some(props),
            _ => None,
        }
    }
}

/// Per-kind memoized state.
#[derive(Clone, Default)]
pub(crate) enum FiberState {
    #[default]
    None,
    /// Children of the host root.
    Root(Node),
    /// Hook list of a function or memo component.
    Hooks(Rc<[Hook]>),
    /// A suspense boundary currently showing its fallback.
    ShowingFallback,
}

impl FiberState {
    pub(crate) fn hooks(&self) -> Option<&Rc<[Hook]>> {
        match self {
            Self::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }

    pub(crate) const fn is_showing_fallback(&self) -> bool {
        matches!(self, Self::ShowingFallback)
    }
}

impl fmt::Debug for FiberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Root(node) => f.debug_tuple("Root").field(node).finish(),
            Self::Hooks(hooks) => write!(f, "Hooks({})", hooks.len()),
            Self::ShowingFallback => f.write_str("ShowingFallback"),
        }
    }
}

/// Update queue of the host root.
#[derive(Clone)]
pub(crate) struct RootQueue {
    pub(crate) shared: Rc<SharedQueue<Node>>,
    pub(crate) base_state: Node,
    pub(crate) base_queue: Rc<RefCell<Ring<Update<Node>>>>,
}

/// Per-kind queue.
#[derive(Clone, Default)]
pub(crate) enum FiberQueue {
    #[default]
    None,
    Root(RootQueue),
    /// Effects collected by the last render of a function component.
    Effects(Ring<Rc<Effect>>),
}

impl FiberQueue {
    pub(crate) fn effects(&self) -> Option<&Ring<Rc<Effect>>> {
        match self {
            Self::Effects(effects) => Some(effects),
            _ => None,
        }
    }
}

/// A unit of work.
pub(crate) struct Fiber<H: HostConfig> {
    pub(crate) kind: FiberKind,
    pub(crate) key: Option<Key>,
    pub(crate) pending_props: FiberProps,
    pub(crate) memoized_props: FiberProps,
    pub(crate) memoized_state: FiberState,
    pub(crate) update_queue: FiberQueue,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) index: usize,
    pub(crate) alternate: Option<FiberId>,
    pub(crate) flags: Flags,
    pub(crate) subtree_flags: Flags,
    pub(crate) deletions: Vec<FiberId>,
    pub(crate) lanes: Lanes,
    pub(crate) child_lanes: Lanes,
    pub(crate) state_node: Option<H::Instance>,
    pub(crate) node_ref: Option<NodeRef>,
    pub(crate) dependencies: Vec<ContextDependency>,
}

impl<H: HostConfig> Fiber<H> {
    fn new(kind: FiberKind, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            kind,
            key,
            pending_props,
            memoized_props: FiberProps::None,
            memoized_state: FiberState::None,
            update_queue: FiberQueue::None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            alternate: None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
            lanes: Lanes::empty(),
            child_lanes: Lanes::empty(),
            state_node: None,
            node_ref: None,
            dependencies: Vec::new(),
        }
    }

    /// Props of an element-backed fiber.
    pub(crate) fn element_props(&self) -> Props {
        self.pending_props.element().cloned().unwrap_or_default()
    }
}

impl<H: HostConfig> fmt::Debug for Fiber<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("flags", &self.flags)
            .field("lanes", &self.lanes)
            .field("child_lanes", &self.child_lanes)
            .field("state_node", &self.state_node)
            .finish_non_exhaustive()
    }
}

/// Arena of fibers.
pub(crate) struct FiberTree<H: HostConfig> {
    nodes: SlotMap<FiberId, Fiber<H>>,
}

impl<H: HostConfig> FiberTree<H> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn contains(&self, id: FiberId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The live alternate of `id`, if any.
    pub(crate) fn alternate(&self, id: FiberId) -> Option<FiberId> {
        self.nodes[id].alternate.filter(|alt| self.nodes.contains_key(*alt))
    }

    fn create(&mut self, kind: FiberKind, props: FiberProps, key: Option<Key>) -> FiberId {
        self.nodes.insert(Fiber::new(kind, props, key))
    }

    pub(crate) fn create_host_root(&mut self, queue: RootQueue) -> FiberId {
        let id = self.create(FiberKind::HostRoot, FiberProps::None, None);
        self.nodes[id].update_queue = FiberQueue::Root(queue);
        self.nodes[id].memoized_state = FiberState::Root(Node::Empty);
        id
    }

    pub(crate) fn create_from_element(&mut self, element: &Element, lanes: Lanes) -> FiberId {
        let id = self.create(
            FiberKind::from_element(element.ty()),
            FiberProps::for_element(element),
            element.key().cloned(),
        );
        let fiber = &mut self.nodes[id];
        fiber.lanes = lanes;
        fiber.node_ref = element.node_ref().cloned();
        id
    }

    pub(crate) fn create_text(&mut self, text: Rc<str>, lanes: Lanes) -> FiberId {
        let id = self.create(FiberKind::Text, FiberProps::Text(text), None);
        self.nodes[id].lanes = lanes;
        id
    }

    pub(crate) fn create_fragment(&mut self, children: Node, key: Option<Key>, lanes: Lanes) -> FiberId {
        let id = self.create(FiberKind::Fragment, FiberProps::Children(children), key);
        self.nodes[id].lanes = lanes;
        id
    }

    pub(crate) fn create_offscreen(&mut self, props: Rc<OffscreenProps>, lanes: Lanes) -> FiberId {
        let id = self.create(FiberKind::Offscreen, FiberProps::Offscreen(props), None);
        self.nodes[id].lanes = lanes;
        id
    }

    /// Returns the work-in-progress twin of `current`, reusing its alternate
    /// when one is alive.
    pub(crate) fn create_work_in_progress(&mut self, current: FiberId, pending_props: FiberProps) -> FiberId {
        let wip = match self.alternate(current) {
            Some(wip) => {
                let fiber = &mut self.nodes[wip];
                fiber.pending_props = pending_props;
                fiber.flags = Flags::empty();
                fiber.subtree_flags = Flags::empty();
                fiber.deletions.clear();
                wip
            }
            None => {
                let source = &self.nodes[current];
                let mut fiber = Fiber::new(source.kind.clone(), pending_props, source.key.clone());
                fiber.state_node = source.state_node.clone();
                fiber.alternate = Some(current);
                let wip = self.nodes.insert(fiber);
                self.nodes[current].alternate = Some(wip);
                wip
            }
        };

        let source = &self.nodes[current];
        let kind = source.kind.clone();
        let child = source.child;
        let sibling = source.sibling;
        let index = source.index;
        let memoized_props = source.memoized_props.clone();
        let memoized_state = source.memoized_state.clone();
        let update_queue = source.update_queue.clone();
        let lanes = source.lanes;
        let child_lanes = source.child_lanes;
        let state_node = source.state_node.clone();
        let node_ref = source.node_ref.clone();
        let dependencies = source.dependencies.clone();

        let fiber = &mut self.nodes[wip];
        fiber.kind = kind;
        fiber.child = child;
        fiber.sibling = sibling;
        fiber.index = index;
        fiber.memoized_props = memoized_props;
        fiber.memoized_state = memoized_state;
        fiber.update_queue = update_queue;
        fiber.lanes = lanes;
        fiber.child_lanes = child_lanes;
        fiber.state_node = state_node;
        fiber.node_ref = node_ref;
        fiber.dependencies = dependencies;
        wip
    }

    /// Children of `id` in order.
    pub(crate) fn children(&self, id: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut child = self.nodes[id].child;
        while let Some(c) = child {
            out.push(c);
            child = self.nodes[c].sibling;
        }
        out
    }

    /// Nearest host fibers below `id`, in document order. Stops descending at
    /// host fibers; with `skip_hidden`, also at hidden offscreen subtrees.
    pub(crate) fn host_children(&self, id: FiberId, skip_hidden: bool) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut stack: Vec<FiberId> = self.children(id);
        stack.reverse();
        while let Some(fiber) = stack.pop() {
            let node = &self.nodes[fiber];
            if node.kind.is_host() {
                out.push(fiber);
                continue;
            }
            if skip_hidden && is_hidden_offscreen(&node.memoized_props) {
                continue;
            }
            let mut children = self.children(fiber);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Drops every fiber that is neither reachable from `root` nor the
    /// alternate of a reachable fiber.
    pub(crate) fn sweep(&mut self, root: FiberId) {
        let mut keep = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.nodes.get(id) else {
                continue;
            };
            if !keep.insert(id) {
                continue;
            }
            if let Some(alt) = fiber.alternate {
                keep.insert(alt);
            }
            stack.extend(fiber.child);
            stack.extend(fiber.sibling);
        }
        let before = self.nodes.len();
        self.nodes.retain(|id, _| keep.contains(&id));
        let removed = before - self.nodes.len();
        if removed > 0 {
            tracing::trace!(removed, live = self.nodes.len(), "swept detached fibers");
        }
    }
}

pub(crate) fn is_hidden_offscreen(props: &FiberProps) -> bool {
    matches!(props, FiberProps::Offscreen(offscreen) if offscreen.mode == OffscreenMode::Hidden)
}

impl<H: HostConfig> Index<FiberId> for FiberTree<H> {
    type Output = Fiber<H>;

    fn index(&self, id: FiberId) -> &Self::Output {
        &self.nodes[id]
    }
}

impl<H: HostConfig> IndexMut<FiberId> for FiberTree<H> {
    fn index_mut(&mut self, id: FiberId) -> &mut Self::Output {
        &mut self.nodes[id]
    }
}

impl<H: HostConfig> fmt::Debug for FiberTree<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberTree")
            .field("len", &self.nodes.len())
            .finish()
    }
}
