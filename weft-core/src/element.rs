//! Element Model
//!
//! Elements are the immutable descriptor objects produced by the authoring
//! API. They are pure data: a type, an optional reconciliation key, an
//! optional ref, and props. A fresh element tree is produced on every render
//! pass and discarded as soon as it has been diffed against the fiber tree.
//!
//! # Identity
//!
//! - Host elements are identified by their tag string.
//! - Components are identified by `Rc` pointer identity: create a
//!   [`Component`] once and clone it into every element that renders it.
//!   Two `Component::new` calls never compare equal, even with identical
//!   closures.
//! - Fragments are all the same type.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::RenderError;
use crate::host::HostHandle;
use crate::reconciler::hooks::HookCx;

/// Reconciliation key disambiguating siblings. An absent key defaults to
/// the sibling's position during list reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// String key.
    Str(String),
    /// Integer key.
    Int(i64),
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

/// An attribute value on a host element.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// String attribute.
    Str(String),
    /// Numeric attribute.
    Num(f64),
    /// Boolean attribute.
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Num(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Num(value as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// The render function signature for components.
///
/// Components receive an explicit hook context rather than relying on
/// ambient global state; the runtime is single-logical-thread, so the
/// context is threaded through the call.
pub type ComponentRender = dyn Fn(&mut HookCx<'_>, &Props) -> Result<Children, RenderError>;

/// A component: a reusable render function with stable identity.
///
/// Identity is `Rc` pointer identity. Reconciliation reuses a fiber only
/// when the old and new elements reference the *same* `Component` value
/// (possibly cloned), so define components once and clone them into
/// elements.
#[derive(Clone)]
pub struct Component {
    render: Rc<ComponentRender>,
}

impl Component {
    /// Wrap a render function as a component.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&mut HookCx<'_>, &Props) -> Result<Children, RenderError> + 'static,
    {
        Self {
            render: Rc::new(render),
        }
    }

    /// Build an element rendering this component.
    pub fn el(&self) -> Element {
        Element::component(self)
    }

    /// Whether two handles refer to the same component.
    pub(crate) fn same_as(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }

    /// Clone of the underlying render function.
    pub(crate) fn render_fn(&self) -> Rc<ComponentRender> {
        Rc::clone(&self.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({:p})", Rc::as_ptr(&self.render))
    }
}

/// The type of an element: a host primitive, a component, or a fragment.
#[derive(Clone, Debug)]
pub enum ElementType {
    /// A host-environment primitive, identified by tag (e.g. `"div"`).
    Host(String),
    /// A user component.
    Component(Component),
    /// A grouping element with no host representation of its own.
    Fragment,
}

impl ElementType {
    /// Type equality for reconciliation: host tags compare by string,
    /// components by pointer identity, fragments always match.
    pub(crate) fn same_type(&self, other: &ElementType) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Component(a), ElementType::Component(b)) => a.same_as(b),
            (ElementType::Fragment, ElementType::Fragment) => true,
            _ => false,
        }
    }
}

/// Callback form of a ref: invoked with the host handle on attach and with
/// `None` on detach.
pub type RefCallback = Rc<dyn Fn(Option<HostHandle>)>;

/// A mutable cell populated with a host handle during the commit layout
/// phase and cleared when the owning node unmounts.
#[derive(Clone, Default)]
pub struct NodeRef {
    slot: Rc<RefCell<Option<HostHandle>>>,
}

impl NodeRef {
    /// Create an empty ref.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently attached host handle, if any.
    pub fn get(&self) -> Option<HostHandle> {
        *self.slot.borrow()
    }

    pub(crate) fn set(&self, handle: Option<HostHandle>) {
        *self.slot.borrow_mut() = handle;
    }

    fn same_cell(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.get()).finish()
    }
}

/// A ref attached to a host element: absent, a mutable cell, or a callback.
#[derive(Clone, Default)]
pub enum RefObject {
    /// No ref.
    #[default]
    None,
    /// Mutable cell form.
    Cell(NodeRef),
    /// Callback form.
    Callback(RefCallback),
}

impl RefObject {
    /// Whether this is the absent ref.
    pub fn is_none(&self) -> bool {
        matches!(self, RefObject::None)
    }

    /// Identity comparison across renders; a changed identity re-triggers
    /// ref attachment at commit.
    pub(crate) fn same_identity(&self, other: &RefObject) -> bool {
        match (self, other) {
            (RefObject::None, RefObject::None) => true,
            (RefObject::Cell(a), RefObject::Cell(b)) => a.same_cell(b),
            (RefObject::Callback(a), RefObject::Callback(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for RefObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefObject::None => write!(f, "RefObject::None"),
            RefObject::Cell(cell) => f.debug_tuple("RefObject::Cell").field(cell).finish(),
            RefObject::Callback(_) => write!(f, "RefObject::Callback(..)"),
        }
    }
}

/// Props carried by an element: named attributes plus nested children.
#[derive(Clone, Debug, Default)]
pub struct Props {
    /// Named attributes, in insertion order.
    pub attrs: IndexMap<String, AttrValue>,
    /// Nested children.
    pub children: Children,
}

impl Props {
    /// Whether the attribute maps are equal. Children are diffed by the
    /// reconciler, not here.
    pub fn attrs_eq(&self, other: &Props) -> bool {
        self.attrs == other.attrs
    }
}

/// The children value of an element: nothing, a single child, or a list.
#[derive(Clone, Debug, Default)]
pub enum Children {
    /// No children.
    #[default]
    None,
    /// Exactly one child.
    One(Box<Child>),
    /// A list of children, reconciled with keyed diffing.
    Many(Vec<Child>),
}

impl From<Element> for Children {
    fn from(element: Element) -> Self {
        Children::One(Box::new(Child::Element(element)))
    }
}

impl From<Child> for Children {
    fn from(child: Child) -> Self {
        Children::One(Box::new(child))
    }
}

impl From<Vec<Child>> for Children {
    fn from(children: Vec<Child>) -> Self {
        Children::Many(children)
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::One(Box::new(Child::Text(text.to_owned())))
    }
}

/// One child slot: an element, a text run, or a nested list.
///
/// A nested list reconciles as an implicit fragment keyed by its position
/// among its siblings.
#[derive(Clone, Debug)]
pub enum Child {
    /// A nested element.
    Element(Element),
    /// A text node.
    Text(String),
    /// A bare list of children.
    List(Vec<Child>),
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_owned())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<Vec<Child>> for Child {
    fn from(children: Vec<Child>) -> Self {
        Child::List(children)
    }
}

/// Text child constructor. Numbers should be formatted by the caller.
pub fn text(content: impl Into<String>) -> Child {
    Child::Text(content.into())
}

/// Host element constructor; see [`Element::host`].
pub fn host(tag: impl Into<String>) -> Element {
    Element::host(tag)
}

/// Fragment constructor with children.
pub fn fragment(children: Vec<Child>) -> Element {
    Element::fragment().children(children)
}

/// An immutable element descriptor.
#[derive(Clone, Debug)]
pub struct Element {
    /// Element type.
    pub ty: ElementType,
    /// Optional reconciliation key.
    pub key: Option<Key>,
    /// Optional ref (host elements only; ignored elsewhere).
    pub node_ref: RefObject,
    /// Attributes and children.
    pub props: Props,
}

impl Element {
    /// A host-primitive element with the given tag.
    pub fn host(tag: impl Into<String>) -> Self {
        Self {
            ty: ElementType::Host(tag.into()),
            key: None,
            node_ref: RefObject::None,
            props: Props::default(),
        }
    }

    /// A fragment element.
    pub fn fragment() -> Self {
        Self {
            ty: ElementType::Fragment,
            key: None,
            node_ref: RefObject::None,
            props: Props::default(),
        }
    }

    /// An element rendering the given component.
    pub fn component(component: &Component) -> Self {
        Self {
            ty: ElementType::Component(component.clone()),
            key: None,
            node_ref: RefObject::None,
            props: Props::default(),
        }
    }

    /// Set the reconciliation key.
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set a named attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.props.attrs.insert(name.into(), value.into());
        self
    }

    /// Append one child, promoting the children value from none to one to
    /// many as needed.
    pub fn child(mut self, child: impl Into<Child>) -> Self {
        let child = child.into();
        self.props.children = match std::mem::take(&mut self.props.children) {
            Children::None => Children::One(Box::new(child)),
            Children::One(first) => Children::Many(vec![*first, child]),
            Children::Many(mut list) => {
                list.push(child);
                Children::Many(list)
            }
        };
        self
    }

    /// Replace the children with a list.
    pub fn children(mut self, children: Vec<Child>) -> Self {
        self.props.children = Children::Many(children);
        self
    }

    /// Attach a mutable-cell ref.
    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = RefObject::Cell(node_ref.clone());
        self
    }

    /// Attach a callback ref.
    pub fn ref_callback(mut self, callback: impl Fn(Option<HostHandle>) + 'static) -> Self {
        self.node_ref = RefObject::Callback(Rc::new(callback));
        self
    }
}
