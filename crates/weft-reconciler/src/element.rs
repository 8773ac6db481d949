#![forbid(unsafe_code)]

//! Declarative tree descriptions.
//!
//! A [`Node`] is what callers hand the root and what components return: a
//! host element, a text run, an ordered sequence, or nothing. Descriptions
//! are cheap to clone (component handles and provider values are
//! reference-counted) and carry no render state; the reconciler diffs them
//! against the committed fiber tree.
//!
//! Component identity is the `Rc` pointer of its function: build a
//! component once with [`Element::component`]'s source closure and reuse
//! the same handle across renders, otherwise every parent render looks
//! like a brand-new component type and remounts the subtree.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use weft_host::{PropMap, PropValue};

use crate::error::{RenderError, Result};
use crate::hooks::HookCx;

/// A component render function. The hook context is the render session:
/// all hook calls go through it, and it is only valid for the duration of
/// the call.
pub type ComponentFn = Rc<dyn Fn(&mut HookCx) -> Result<Node>>;

/// Value stored by a context provider, erased for transport through the
/// tree.
pub type ContextValue = Rc<dyn Any>;

/// One position in a declarative tree description.
#[derive(Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    /// An ordered sequence rendered in place (an unkeyed fragment).
    List(Vec<Node>),
    /// Renders nothing. Useful for conditional branches.
    Empty,
}

impl Node {
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<Node>> for Node {
    fn from(children: Vec<Node>) -> Self {
        Self::List(children)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(el) => el.fmt(f),
            Self::Text(t) => write!(f, "Text({t:?})"),
            Self::List(list) => f.debug_list().entries(list).finish(),
            Self::Empty => write!(f, "Empty"),
        }
    }
}

/// What kind of thing an element describes. Closed: begin/complete/commit
/// match exhaustively on the fiber kind this classifies into.
#[derive(Clone)]
pub enum ElementKind {
    /// Intrinsic host element, identified by tag.
    Host(String),
    /// User component function; identity is the `Rc` pointer.
    Component(ComponentFn),
    /// Transparent grouping marker.
    Fragment,
    /// Provides a context value to descendants.
    Provider(ContextId),
}

impl ElementKind {
    /// Structural type equality: the test that gates fiber reuse.
    #[must_use]
    pub fn same_type(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (Self::Host(a), Self::Host(b)) => a == b,
            (Self::Component(a), Self::Component(b)) => Rc::ptr_eq(a, b),
            (Self::Fragment, Self::Fragment) => true,
            (Self::Provider(a), Self::Provider(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(tag) => write!(f, "Host({tag})"),
            Self::Component(func) => write!(f, "Component({:p})", Rc::as_ptr(func)),
            Self::Fragment => write!(f, "Fragment"),
            Self::Provider(id) => write!(f, "Provider({id:?})"),
        }
    }
}

/// Element payload: host attributes, child descriptions, and (for
/// providers) the provided value.
#[derive(Clone, Default)]
pub struct Props {
    pub attrs: PropMap,
    pub children: Vec<Node>,
    pub context_value: Option<ContextValue>,
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children.len())
            .field("has_context_value", &self.context_value.is_some())
            .finish()
    }
}

/// A keyed, typed description of one tree position.
#[derive(Clone, Debug)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<String>,
    pub props: Props,
}

impl Element {
    /// Intrinsic host element.
    #[must_use]
    pub fn host(tag: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Host(tag.into()),
            key: None,
            props: Props::default(),
        }
    }

    /// Reference an existing component handle. The handle's pointer is the
    /// component's type identity; clone the same handle on every render.
    #[must_use]
    pub fn component(func: &ComponentFn) -> Self {
        Self {
            kind: ElementKind::Component(Rc::clone(func)),
            key: None,
            props: Props::default(),
        }
    }

    /// Transparent grouping of `children`, reconciled in place.
    #[must_use]
    pub fn fragment(children: Vec<Node>) -> Self {
        Self {
            kind: ElementKind::Fragment,
            key: None,
            props: Props {
                children,
                ..Props::default()
            },
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.attrs.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.props.children.push(child.into());
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.props.children = children;
        self
    }
}

// ─── Contexts ────────────────────────────────────────────────────────────────

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a context, shared by its providers and readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A typed context: a default value plus an identity that links providers
/// to `use_context` readers.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Rc::clone(&self.default),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("default", &self.default)
            .finish()
    }
}

impl<T: 'static> Context<T> {
    /// Create a context with `default`, returned to readers with no
    /// enclosing provider.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            default: Rc::new(default),
        }
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn default_value(&self) -> Rc<T> {
        Rc::clone(&self.default)
    }

    /// A provider element supplying `value` to every descendant reader.
    #[must_use]
    pub fn provider(&self, value: T, children: Vec<Node>) -> Element {
        Element {
            kind: ElementKind::Provider(self.id),
            key: None,
            props: Props {
                attrs: PropMap::default(),
                children,
                context_value: Some(Rc::new(value) as ContextValue),
            },
        }
    }

    /// Downcast an erased provider value back to this context's type.
    pub(crate) fn downcast(&self, value: &ContextValue) -> Result<Rc<T>> {
        Rc::clone(value)
            .downcast::<T>()
            .map_err(|_| RenderError::ContextType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_builder_collects_attrs_and_children() {
        let el = Element::host("div")
            .with_key("row-1")
            .with_attr("id", "root")
            .with_child("hello")
            .with_child(Element::host("span"));

        assert!(matches!(&el.kind, ElementKind::Host(tag) if tag == "div"));
        assert_eq!(el.key.as_deref(), Some("row-1"));
        assert_eq!(el.props.children.len(), 2);
        assert_eq!(
            el.props.attrs.get("id"),
            Some(&PropValue::Str("root".into()))
        );
    }

    #[test]
    fn component_identity_is_pointer_identity() {
        let a: ComponentFn = Rc::new(|_cx: &mut HookCx| Ok(Node::Empty));
        let b: ComponentFn = Rc::new(|_cx: &mut HookCx| Ok(Node::Empty));

        let el_a1 = Element::component(&a);
        let el_a2 = Element::component(&a);
        let el_b = Element::component(&b);

        assert!(el_a1.kind.same_type(&el_a2.kind));
        assert!(!el_a1.kind.same_type(&el_b.kind));
    }

    #[test]
    fn same_type_discriminates_kinds() {
        let host = Element::host("div");
        let frag = Element::fragment(vec![]);
        assert!(!host.kind.same_type(&frag.kind));
        assert!(host.kind.same_type(&Element::host("div").kind));
        assert!(!host.kind.same_type(&Element::host("span").kind));
    }

    #[test]
    fn context_ids_are_unique_and_providers_carry_values() {
        let a = Context::new(1u32);
        let b = Context::new(2u32);
        assert_ne!(a.id(), b.id());

        let el = a.provider(42, vec![Node::Empty]);
        assert!(matches!(el.kind, ElementKind::Provider(id) if id == a.id()));
        let value = el.props.context_value.expect("provider carries a value");
        assert_eq!(*a.downcast(&value).unwrap(), 42);
    }

    #[test]
    fn context_downcast_rejects_wrong_type() {
        let ctx = Context::new(0u32);
        let wrong: ContextValue = Rc::new("nope".to_owned());
        assert!(ctx.downcast(&wrong).is_err());
    }
}
