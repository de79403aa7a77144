//! The two tree representations the runtime moves between.
//!
//! A [`RenderNode`] tree is produced fresh by every build pass and describes
//! the desired shape. A [`LiveNode`] tree is the mounted counterpart: it is
//! mutated in place by the reconciler and carries stable [`NodeId`]s, which
//! are the observable notion of node identity — an in-place patch preserves
//! them, a replacement allocates new ones.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Attributes in this namespace carry structured per-instance data.
///
/// A change to any of them forces replacement of the whole subtree instead
/// of an in-place patch, and they feed [`ParsedConfig`](crate::dataset::ParsedConfig)
/// when read off the host element.
pub const CONFIG_ATTRIBUTE_PREFIX: &str = "data-";

/// Identity of a mounted node, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value backing this identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A node in the transient tree produced by a build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderNode {
    /// An element with a tag, attributes and children.
    Element(RenderElement),
    /// A text node.
    Text(String),
}

impl RenderNode {
    /// Returns the element tag, or `None` for text nodes.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element(element) => Some(element.tag()),
            Self::Text(_) => None,
        }
    }
}

impl From<RenderElement> for RenderNode {
    fn from(element: RenderElement) -> Self {
        Self::Element(element)
    }
}

/// An element in the transient render tree, assembled builder-style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderElement {
    pub(crate) tag: String,
    pub(crate) attributes: IndexMap<String, String>,
    pub(crate) value: Option<String>,
    pub(crate) opaque: bool,
    pub(crate) children: Vec<RenderNode>,
}

impl RenderElement {
    /// Creates an element with the given tag and no attributes or children.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
            value: None,
            opaque: false,
            children: Vec::new(),
        }
    }

    /// Sets an attribute, replacing any previous value for the same name.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets the bound value carried separately from attributes
    /// (the live counterpart of an input's current value).
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Marks the element as an opaque composite: a sub-component with its
    /// own lifecycle whose internals the reconciler must not disturb.
    #[must_use]
    pub const fn opaque(mut self) -> Self {
        self.opaque = true;
        self
    }

    /// Appends a child node.
    #[must_use]
    pub fn child(mut self, child: impl Into<RenderNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Appends a text child.
    #[must_use]
    pub fn text(self, value: impl Into<String>) -> Self {
        self.child(RenderNode::Text(value.into()))
    }

    /// The element tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The declared attributes, in insertion order.
    #[must_use]
    pub const fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    /// The declared children.
    #[must_use]
    pub fn children(&self) -> &[RenderNode] {
        &self.children
    }
}

/// Creates a [`RenderElement`] with the given tag.
#[must_use]
pub fn element(tag: impl Into<String>) -> RenderElement {
    RenderElement::new(tag)
}

/// Creates a text [`RenderNode`].
#[must_use]
pub fn text(value: impl Into<String>) -> RenderNode {
    RenderNode::Text(value.into())
}

/// A node in the mounted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveNode {
    /// A mounted element.
    Element(LiveElement),
    /// A mounted text node.
    Text(LiveText),
}

impl LiveNode {
    /// Deep-clones a render tree into a live tree with fresh identities.
    #[must_use]
    pub fn materialize(node: &RenderNode) -> Self {
        match node {
            RenderNode::Text(value) => Self::Text(LiveText {
                id: NodeId::next(),
                value: value.clone(),
            }),
            RenderNode::Element(el) => Self::Element(LiveElement {
                id: NodeId::next(),
                tag: el.tag.clone(),
                attributes: el.attributes.clone(),
                value: el.value.clone(),
                opaque: el.opaque,
                auxiliary: false,
                children: el.children.iter().map(Self::materialize).collect(),
            }),
        }
    }

    pub(crate) fn stylesheet_link(href: &str) -> Self {
        Self::Element(LiveElement {
            id: NodeId::next(),
            tag: "link".to_owned(),
            attributes: IndexMap::from_iter([
                ("rel".to_owned(), "stylesheet".to_owned()),
                ("href".to_owned(), href.to_owned()),
            ]),
            value: None,
            opaque: false,
            auxiliary: true,
            children: Vec::new(),
        })
    }

    /// The identity of this node.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        match self {
            Self::Element(el) => el.id,
            Self::Text(t) => t.id,
        }
    }

    /// Whether this is an injected auxiliary node (a stylesheet link),
    /// which is never diffed and never counts as the component's root.
    #[must_use]
    pub const fn is_auxiliary(&self) -> bool {
        match self {
            Self::Element(el) => el.auxiliary,
            Self::Text(_) => false,
        }
    }

    /// Returns the element data, or `None` for text nodes.
    #[must_use]
    pub const fn as_element(&self) -> Option<&LiveElement> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    /// Returns the text data, or `None` for elements.
    #[must_use]
    pub const fn as_text(&self) -> Option<&LiveText> {
        match self {
            Self::Text(t) => Some(t),
            Self::Element(_) => None,
        }
    }

    /// Visits this node and every descendant element, depth-first.
    pub fn walk_elements(&self, visit: &mut impl FnMut(&LiveElement)) {
        if let Self::Element(el) = self {
            visit(el);
            for child in &el.children {
                child.walk_elements(visit);
            }
        }
    }
}

/// A mounted text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveText {
    pub(crate) id: NodeId,
    pub(crate) value: String,
}

impl LiveText {
    /// The identity of this node.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// The current text value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A mounted element, mutable in place by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveElement {
    pub(crate) id: NodeId,
    pub(crate) tag: String,
    pub(crate) attributes: IndexMap<String, String>,
    pub(crate) value: Option<String>,
    pub(crate) opaque: bool,
    pub(crate) auxiliary: bool,
    pub(crate) children: Vec<LiveNode>,
}

impl LiveElement {
    /// The identity of this node.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// The element tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The current attributes, in order.
    #[must_use]
    pub const fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    /// Looks up a single attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The bound value, for input-like elements.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether the reconciler treats this element as an opaque leaf.
    #[must_use]
    pub const fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// The current children.
    #[must_use]
    pub fn children(&self) -> &[LiveNode] {
        &self.children
    }
}
