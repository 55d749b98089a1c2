//! Immutable element descriptions.
//!
//! Application code builds [`Node`] values with [`host`], [`text`],
//! [`fragment`], [`suspense`], [`Component::element`] and
//! [`Context::provider`](crate::Context::provider). Elements are reference
//! counted and never mutated after construction, so identity comparison is
//! the cheap "nothing changed" test the reconciler relies on.

use core::any::Any;
use core::cell::RefCell;
use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::context::ContextId;
use crate::error::Render;
use crate::hooks::RenderCx;

/// Reconciliation key distinguishing siblings.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    /// Creates a key.
    pub fn new(key: impl Into<Rc<str>>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", &*self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Self::new(value.to_string())
    }
}

/// A child description.
#[derive(Clone, Default)]
pub enum Node {
    /// Renders nothing.
    #[default]
    Empty,
    /// A text leaf.
    Text(Rc<str>),
    /// A single element.
    Element(Element),
    /// An ordered list of children.
    List(Rc<[Node]>),
}

impl Node {
    /// Identity comparison: text by content, elements and lists by pointer.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Element(a), Self::Element(b)) => a.ptr_eq(b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether this node renders nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => write!(f, "Text({:?})", &**text),
            Self::Element(element) => element.fmt(f),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        text(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        text(value)
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

impl From<ElementBuilder> for Node {
    fn from(value: ElementBuilder) -> Self {
        Self::Element(value.build())
    }
}

impl From<Vec<Self>> for Node {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value.into())
    }
}

impl<T: Into<Self>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// What an element renders as.
#[derive(Clone)]
pub enum ElementType {
    /// A host node with the given tag.
    Host(Rc<str>),
    /// A function component.
    Component(Component),
    /// A transparent grouping of children.
    Fragment,
    /// Provides a context value to its subtree.
    Provider(ContextId),
    /// A suspense boundary with a fallback.
    Suspense,
    /// A component that skips rendering when its props compare equal.
    Memo(MemoComponent),
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(tag) => write!(f, "Host({tag})"),
            Self::Component(component) => write!(f, "Component({})", component.name()),
            Self::Fragment => f.write_str("Fragment"),
            Self::Provider(id) => write!(f, "Provider({id:?})"),
            Self::Suspense => f.write_str("Suspense"),
            Self::Memo(memo) => write!(f, "Memo({})", memo.component().name()),
        }
    }
}

/// An immutable element.
#[derive(Clone)]
pub struct Element(Rc<ElementInner>);

struct ElementInner {
    ty: ElementType,
    key: Option<Key>,
    props: Props,
    node_ref: Option<NodeRef>,
}

impl Element {
    /// The element's type.
    #[must_use]
    pub fn ty(&self) -> &ElementType {
        &self.0.ty
    }

    /// The reconciliation key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    /// The element's props.
    #[must_use]
    pub fn props(&self) -> &Props {
        &self.0.props
    }

    /// The ref attached to the element's host instance.
    #[must_use]
    pub fn node_ref(&self) -> Option<&NodeRef> {
        self.0.node_ref.as_ref()
    }

    /// Whether both handles point at the same element.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("ty", &self.0.ty)
            .field("key", &self.0.key)
            .finish_non_exhaustive()
    }
}

/// A prop value.
#[derive(Clone)]
pub enum PropValue {
    /// A string.
    Str(Rc<str>),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// An event handler; compared by identity.
    Handler(Rc<dyn Fn()>),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Handler(a), Self::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(value) => write!(f, "{:?}", &**value),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Handler(_) => f.write_str("<handler>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Element props: attributes, children, an optional suspense fallback and
/// optional typed data for components and providers.
#[derive(Clone, Default)]
pub struct Props(Rc<PropsInner>);

#[derive(Default)]
struct PropsInner {
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Node,
    fallback: Option<Node>,
    data: Option<Rc<dyn Any>>,
}

impl Props {
    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.attrs.get(name)
    }

    /// Looks up a string attribute.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(PropValue::Str(value)) => Some(&**value),
            _ => None,
        }
    }

    /// Looks up an integer attribute.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(PropValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Iterates over attributes in name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.attrs.iter().map(|(name, value)| (&**name, value))
    }

    /// The children passed to the element.
    #[must_use]
    pub fn children(&self) -> &Node {
        &self.0.children
    }

    /// The fallback of a suspense boundary.
    #[must_use]
    pub fn fallback(&self) -> Option<&Node> {
        self.0.fallback.as_ref()
    }

    /// Typed data attached with [`ElementBuilder::data`].
    #[must_use]
    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.0.data.as_deref().and_then(|data| data.downcast_ref())
    }

    pub(crate) fn data_any(&self) -> Option<Rc<dyn Any>> {
        self.0.data.clone()
    }

    /// Whether both handles point at the same props.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether the attributes are equal.
    #[must_use]
    pub fn attrs_eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.attrs == other.0.attrs
    }

    /// Field-by-field identity comparison used by memo components.
    #[must_use]
    pub fn shallow_eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let data_eq = match (&self.0.data, &other.0.data) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        let fallback_eq = match (&self.0.fallback, &other.0.fallback) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same(b),
            _ => false,
        };
        data_eq && fallback_eq && self.0.children.same(&other.0.children) && self.0.attrs == other.0.attrs
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.0.attrs)
            .field("children", &self.0.children)
            .finish_non_exhaustive()
    }
}

type RenderFn = dyn Fn(&mut RenderCx<'_>, &Props) -> Render;

/// A function component.
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    render: Rc<RenderFn>,
}

impl Component {
    /// Creates a component from a render function.
    ///
    /// The component's identity is the allocation made here: clones of the
    /// returned value are the same component, two calls with the same
    /// closure are not.
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>, &Props) -> Render + 'static,
    {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    /// The display name.
    #[must_use]
    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    /// Whether both values are the same component.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }

    /// Starts an element rendering this component.
    #[must_use]
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Component(self.clone()))
    }

    /// Wraps the component so it skips rendering when props are shallowly equal.
    #[must_use]
    pub fn memo(self) -> MemoComponent {
        MemoComponent(Rc::new(MemoInner {
            component: self,
            compare: None,
        }))
    }

    pub(crate) fn render(&self, cx: &mut RenderCx<'_>, props: &Props) -> Render {
        (self.render)(cx, props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

type CompareFn = dyn Fn(&Props, &Props) -> bool;

/// A component wrapped with a props comparator.
#[derive(Clone)]
pub struct MemoComponent(Rc<MemoInner>);

struct MemoInner {
    component: Component,
    compare: Option<Rc<CompareFn>>,
}

impl MemoComponent {
    /// Replaces the default shallow comparison.
    #[must_use]
    pub fn with_compare(self, compare: impl Fn(&Props, &Props) -> bool + 'static) -> Self {
        Self(Rc::new(MemoInner {
            component: self.0.component.clone(),
            compare: Some(Rc::new(compare)),
        }))
    }

    /// The wrapped component.
    #[must_use]
    pub fn component(&self) -> &Component {
        &self.0.component
    }

    /// Whether `next` may reuse the output rendered for `previous`.
    #[must_use]
    pub fn props_equal(&self, previous: &Props, next: &Props) -> bool {
        self.0
            .compare
            .as_ref()
            .map_or_else(|| previous.shallow_eq(next), |compare| compare(previous, next))
    }

    /// Whether both values are the same memo component.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Starts an element rendering this component.
    #[must_use]
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Memo(self.clone()))
    }
}

impl fmt::Debug for MemoComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memo({})", self.0.component.name)
    }
}

/// Handle receiving the host instance of the element it is attached to.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<Rc<dyn Any>>>>);

impl NodeRef {
    /// Creates an empty ref.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached instance, if it has the requested type.
    #[must_use]
    pub fn get<I: Clone + 'static>(&self) -> Option<I> {
        self.0
            .borrow()
            .as_deref()
            .and_then(|instance| instance.downcast_ref::<I>())
            .cloned()
    }

    /// Whether an instance is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub(crate) fn attach(&self, instance: Rc<dyn Any>) {
        *self.0.borrow_mut() = Some(instance);
    }

    pub(crate) fn detach(&self) {
        self.0.borrow_mut().take();
    }

    /// Whether both handles are the same ref.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn same(a: Option<&Self>, b: Option<&Self>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Builder for an [`Element`].
#[must_use]
pub struct ElementBuilder {
    ty: ElementType,
    key: Option<Key>,
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Vec<Node>,
    fallback: Option<Node>,
    data: Option<Rc<dyn Any>>,
    node_ref: Option<NodeRef>,
}

impl ElementBuilder {
    /// Starts an element of the given type.
    pub const fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            attrs: BTreeMap::new(),
            children: Vec::new(),
            fallback: None,
            data: None,
            node_ref: None,
        }
    }

    /// Sets the reconciliation key.
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets an attribute.
    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Registers an event handler under `event`.
    pub fn on(mut self, event: &str, handler: impl Fn() + 'static) -> Self {
        self.attrs
            .insert(event.into(), PropValue::Handler(Rc::new(handler)));
        self
    }

    /// Appends a child.
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Appends a list of children as one nested list.
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        let list: Vec<Node> = children.into_iter().map(Into::into).collect();
        self.children.push(Node::List(list.into()));
        self
    }

    /// Sets the suspense fallback.
    pub fn fallback(mut self, fallback: impl Into<Node>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Attaches typed data, readable with [`Props::data`].
    pub fn data<T: 'static>(mut self, data: T) -> Self {
        self.data = Some(Rc::new(data));
        self
    }

    pub(crate) fn data_rc(mut self, data: Rc<dyn Any>) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches a ref that receives the host instance after commit.
    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Finishes the element.
    pub fn build(self) -> Element {
        let mut children = self.children;
        let children = match children.len() {
            0 => Node::Empty,
            1 => children.remove(0),
            _ => Node::List(children.into()),
        };
        Element(Rc::new(ElementInner {
            ty: self.ty,
            key: self.key,
            props: Props(Rc::new(PropsInner {
                attrs: self.attrs,
                children,
                fallback: self.fallback,
                data: self.data,
            })),
            node_ref: self.node_ref,
        }))
    }
}

impl fmt::Debug for ElementBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementBuilder")
            .field("ty", &self.ty)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Starts a host element.
pub fn host(tag: &str) -> ElementBuilder {
    ElementBuilder::new(ElementType::Host(tag.into()))
}

/// A text node.
pub fn text(content: impl Into<Rc<str>>) -> Node {
    Node::Text(content.into())
}

/// Starts a fragment.
pub fn fragment() -> ElementBuilder {
    ElementBuilder::new(ElementType::Fragment)
}

/// Starts a suspense boundary showing `fallback` while its children suspend.
pub fn suspense(fallback: impl Into<Node>) -> ElementBuilder {
    ElementBuilder::new(ElementType::Suspense).fallback(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_flattens_single_child() {
        let element = host("div").child("hi").build();
        assert!(matches!(element.props().children(), Node::Text(t) if &**t == "hi"));

        let element = host("div").child("a").child("b").build();
        assert!(matches!(element.props().children(), Node::List(items) if items.len() == 2));

        assert!(host("div").build().props().children().is_empty());
    }

    #[test]
    fn node_identity() {
        let element: Node = host("p").build().into();
        assert!(element.same(&element.clone()));
        assert!(!element.same(&host("p").build().into()));
        assert!(text("a").same(&text("a")));
        assert!(!text("a").same(&Node::Empty));
    }

    #[test]
    fn shallow_eq_compares_fields() {
        let shared = host("span").build();
        let a = host("div").attr("id", "x").child(shared.clone()).build();
        let b = host("div").attr("id", "x").child(shared).build();
        assert!(a.props().shallow_eq(b.props()));

        let c = host("div").attr("id", "y").build();
        assert!(!a.props().shallow_eq(c.props()));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let handler: Rc<dyn Fn()> = Rc::new(|| {});
        assert_eq!(
            PropValue::Handler(handler.clone()),
            PropValue::Handler(handler)
        );
        assert_ne!(
            PropValue::Handler(Rc::new(|| {})),
            PropValue::Handler(Rc::new(|| {}))
        );
    }

    #[test]
    fn typed_data_round_trips_through_props() {
        let element = host("div").data(42_u32).build();
        assert_eq!(element.props().data::<u32>(), Some(&42));
        assert_eq!(element.props().data::<i32>(), None);
    }
}
