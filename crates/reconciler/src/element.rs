//! Declarative tree descriptions handed to the reconciler.
//!
//! Elements are cheap to clone: every payload sits behind an `Rc`, and the
//! identity of those `Rc`s is what the begin phase compares when deciding
//! whether a subtree can bail out.

use crate::context::ContextId;
use crate::error::{HookViolation, Interrupt};
use crate::hooks::RenderCx;
use core_types::HostHandle;
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub type Key = Arc<str>;

/// Host attributes in declaration order; duplicates are preserved.
pub type Attributes = Vec<(Arc<str>, Option<String>)>;

/// Type-erased component props.
pub type AnyProps = Rc<dyn Any>;

/// Outcome of executing a component.
pub type RenderResult = Result<Child, Interrupt>;

type RenderFn = dyn Fn(&mut RenderCx<'_>, &dyn Any) -> RenderResult;
type PropsEq = dyn Fn(&dyn Any, &dyn Any) -> bool;

/// One position in a child list.
#[derive(Clone, Default)]
pub enum Child {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    List(Rc<[Child]>),
}

impl Child {
    pub fn text(content: impl Into<Rc<str>>) -> Child {
        Child::Text(content.into())
    }

    pub fn list<I, C>(children: I) -> Child
    where
        I: IntoIterator<Item = C>,
        C: Into<Child>,
    {
        Child::List(children.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Child::Empty)
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(Rc::from(text))
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(Rc::from(text))
    }
}

impl From<Vec<Child>> for Child {
    fn from(children: Vec<Child>) -> Self {
        Child::List(Rc::from(children))
    }
}

impl From<Option<Element>> for Child {
    fn from(element: Option<Element>) -> Self {
        element.map_or(Child::Empty, Child::Element)
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Empty => f.write_str("Empty"),
            Child::Text(text) => write!(f, "Text({text:?})"),
            Child::Element(element) => element.fmt(f),
            Child::List(children) => f.debug_list().entries(children.iter()).finish(),
        }
    }
}

/// A keyed, typed node description.
#[derive(Clone)]
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    pub(crate) node_ref: Option<NodeRef>,
}

#[derive(Clone)]
pub(crate) enum ElementKind {
    Host { tag: Arc<str>, props: Rc<HostProps> },
    Component { component: Component, props: AnyProps },
    Memo { memo: MemoComponent, props: AnyProps },
    Fragment { children: Rc<[Child]> },
    Provider { context: ContextId, props: Rc<ProviderProps> },
    Suspense { props: Rc<SuspenseProps> },
}

impl Element {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            node_ref: None,
        }
    }

    pub fn host(tag: &str, attributes: Attributes, children: impl Into<Child>) -> Element {
        Element::new(ElementKind::Host {
            tag: Arc::from(tag),
            props: Rc::new(HostProps {
                attributes,
                children: children.into(),
            }),
        })
    }

    /// Host element reusing an existing props allocation, so an unchanged
    /// parent can hand the same props back and bail out.
    pub fn host_rc(tag: &str, props: Rc<HostProps>) -> Element {
        Element::new(ElementKind::Host {
            tag: Arc::from(tag),
            props,
        })
    }

    pub fn component<P: 'static>(component: &Component, props: P) -> Element {
        Element::component_rc(component, Rc::new(props))
    }

    pub fn component_rc<P: 'static>(component: &Component, props: Rc<P>) -> Element {
        Element::new(ElementKind::Component {
            component: component.clone(),
            props,
        })
    }

    pub fn memo<P: 'static>(memo: &MemoComponent, props: P) -> Element {
        Element::new(ElementKind::Memo {
            memo: memo.clone(),
            props: Rc::new(props),
        })
    }

    pub fn fragment<I, C>(children: I) -> Element
    where
        I: IntoIterator<Item = C>,
        C: Into<Child>,
    {
        Element::new(ElementKind::Fragment {
            children: children.into_iter().map(Into::into).collect(),
        })
    }

    pub fn suspense(children: impl Into<Child>, fallback: impl Into<Child>) -> Element {
        Element::new(ElementKind::Suspense {
            props: Rc::new(SuspenseProps {
                children: children.into(),
                fallback: fallback.into(),
            }),
        })
    }

    pub(crate) fn provider(context: ContextId, value: Rc<dyn Any>, children: Child) -> Element {
        Element::new(ElementKind::Provider {
            context,
            props: Rc::new(ProviderProps { value, children }),
        })
    }

    pub fn with_key(mut self, key: impl Into<Key>) -> Element {
        self.key = Some(key.into());
        self
    }

    pub fn with_ref(mut self, node_ref: &NodeRef) -> Element {
        self.node_ref = Some(node_ref.clone());
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub(crate) fn is_unkeyed_fragment(&self) -> Option<&Rc<[Child]>> {
        match &self.kind {
            ElementKind::Fragment { children } if self.key.is_none() => Some(children),
            _ => None,
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match &self.kind {
            ElementKind::Host { tag, .. } => &**tag,
            ElementKind::Component { component, .. } => component.name(),
            ElementKind::Memo { memo, .. } => memo.component().name(),
            ElementKind::Fragment { .. } => "Fragment",
            ElementKind::Provider { .. } => "Provider",
            ElementKind::Suspense { .. } => "Suspense",
        };
        match &self.key {
            Some(key) => write!(f, "<{name} key={key:?}>"),
            None => write!(f, "<{name}>"),
        }
    }
}

/// Props of a host element.
#[derive(Clone, Debug, Default)]
pub struct HostProps {
    pub attributes: Attributes,
    pub children: Child,
}

pub(crate) struct ProviderProps {
    pub(crate) value: Rc<dyn Any>,
    pub(crate) children: Child,
}

pub(crate) struct SuspenseProps {
    pub(crate) children: Child,
    pub(crate) fallback: Child,
}

/// A user component: a named render function over props of one type.
///
/// Identity is the allocation: two `Component`s are the same type only when
/// one was cloned from the other.
#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentInner>,
}

struct ComponentInner {
    name: &'static str,
    render: Box<RenderFn>,
}

impl Component {
    pub fn new<P, F>(name: &'static str, render: F) -> Component
    where
        P: 'static,
        F: Fn(&mut RenderCx<'_>, &P) -> RenderResult + 'static,
    {
        let render: Box<RenderFn> = Box::new(move |cx: &mut RenderCx<'_>, props: &dyn Any| {
            match props.downcast_ref::<P>() {
                Some(props) => render(cx, props),
                None => Err(Interrupt::Violation(HookViolation::PropsType { component: name })),
            }
        });
        Component {
            inner: Rc::new(ComponentInner { name, render }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn same(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn render(&self, cx: &mut RenderCx<'_>, props: &dyn Any) -> RenderResult {
        (self.inner.render)(cx, props)
    }

    /// Wraps the component so it skips re-rendering while its props compare
    /// equal.
    pub fn memo<P: PartialEq + 'static>(&self) -> MemoComponent {
        self.memo_by(|prev: &P, next: &P| prev == next)
    }

    pub fn memo_by<P, F>(&self, eq: F) -> MemoComponent
    where
        P: 'static,
        F: Fn(&P, &P) -> bool + 'static,
    {
        let compare: Box<PropsEq> = Box::new(move |prev: &dyn Any, next: &dyn Any| {
            match (prev.downcast_ref::<P>(), next.downcast_ref::<P>()) {
                (Some(prev), Some(next)) => eq(prev, next),
                _ => false,
            }
        });
        MemoComponent {
            inner: Rc::new(MemoInner {
                component: self.clone(),
                compare,
            }),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name())
    }
}

#[derive(Clone)]
pub struct MemoComponent {
    inner: Rc<MemoInner>,
}

struct MemoInner {
    component: Component,
    compare: Box<PropsEq>,
}

impl MemoComponent {
    pub fn component(&self) -> &Component {
        &self.inner.component
    }

    pub fn same(&self, other: &MemoComponent) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn props_equal(&self, prev: &dyn Any, next: &dyn Any) -> bool {
        (self.inner.compare)(prev, next)
    }
}

/// Slot receiving the host handle of the element it is attached to.
///
/// Filled during the layout pass of the commit that mounts the element and
/// cleared when the element is deleted or the ref moves elsewhere.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<Cell<Option<HostHandle>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<HostHandle> {
        self.0.get()
    }

    pub fn same(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set(&self, handle: Option<HostHandle>) {
        self.0.set(handle);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:?})", self.get())
    }
}

/// Builds an attribute list from string pairs.
pub fn attrs<const N: usize>(pairs: [(&str, &str); N]) -> Attributes {
    pairs
        .into_iter()
        .map(|(name, value)| (Arc::from(name), Some(value.to_string())))
        .collect()
}
