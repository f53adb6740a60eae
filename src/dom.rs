//! Output tree backend
//!
//! The VM never touches a concrete output medium directly; every mutation
//! goes through `DomBackend`. `Document` is a small in-memory tree used by
//! the CLI and the test-suite. It serializes to HTML and counts mutations so
//! update passes can be measured.

use indexmap::IndexMap;
use serde_json::Value;

/// Handle to a node owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub usize);

/// Mutation primitives supplied by the host's rendering backend
pub trait DomBackend {
    fn create_element(&mut self, tag: &str) -> NodeRef;
    fn create_text(&mut self, text: &str) -> NodeRef;
    fn create_comment(&mut self, text: &str) -> NodeRef;
    /// Trusted markup inserted without escaping
    fn create_raw(&mut self, html: &str) -> NodeRef;

    fn set_text(&mut self, node: NodeRef, text: &str);
    fn set_attribute(&mut self, element: NodeRef, name: &str, value: &str, namespace: Option<&str>);
    fn remove_attribute(&mut self, element: NodeRef, name: &str);
    fn set_property(&mut self, element: NodeRef, name: &str, value: &Value);

    /// Insert `node` into `parent` before `reference`, or at the end when
    /// `reference` is `None`. Moving an attached node detaches it first.
    fn insert_before(&mut self, parent: NodeRef, node: NodeRef, reference: Option<NodeRef>);
    fn remove_child(&mut self, parent: NodeRef, node: NodeRef);

    fn parent(&self, node: NodeRef) -> Option<NodeRef>;
    fn next_sibling(&self, node: NodeRef) -> Option<NodeRef>;
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Fragment,
    Element {
        tag: String,
        attributes: IndexMap<String, (String, Option<String>)>,
        properties: IndexMap<String, Value>,
    },
    Text(String),
    Comment(String),
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Default)]
pub struct Document {
    nodes: Vec<Node>,
    mutations: usize,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached container to render into
    pub fn create_fragment(&mut self) -> NodeRef {
        self.alloc(NodeKind::Fragment)
    }

    /// Number of tree mutations issued so far
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    pub fn kind(&self, node: NodeRef) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn children(&self, node: NodeRef) -> &[NodeRef] {
        &self.nodes[node.0].children
    }

    pub fn attribute(&self, element: NodeRef, name: &str) -> Option<&str> {
        match &self.nodes[element.0].kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(|(v, _)| v.as_str()),
            _ => None,
        }
    }

    pub fn property(&self, element: NodeRef, name: &str) -> Option<&Value> {
        match &self.nodes[element.0].kind {
            NodeKind::Element { properties, .. } => properties.get(name),
            _ => None,
        }
    }

    /// Serialize the children of `node` (or the node itself for leaves)
    pub fn inner_html(&self, node: NodeRef) -> String {
        let mut out = String::new();
        for child in &self.nodes[node.0].children {
            self.write_html(*child, &mut out);
        }
        out
    }

    pub fn to_html(&self, node: NodeRef) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeRef, out: &mut String) {
        let entry = &self.nodes[node.0];
        match &entry.kind {
            NodeKind::Fragment => {
                for child in &entry.children {
                    self.write_html(*child, out);
                }
            }
            NodeKind::Element {
                tag, attributes, ..
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, (value, _)) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) && entry.children.is_empty() {
                    return;
                }
                for child in &entry.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Raw(html) => out.push_str(html),
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeRef {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeRef(self.nodes.len() - 1)
    }

    fn detach(&mut self, node: NodeRef) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }
}

impl DomBackend for Document {
    fn create_element(&mut self, tag: &str) -> NodeRef {
        self.alloc(NodeKind::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> NodeRef {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    fn create_comment(&mut self, text: &str) -> NodeRef {
        self.alloc(NodeKind::Comment(text.to_string()))
    }

    fn create_raw(&mut self, html: &str) -> NodeRef {
        self.alloc(NodeKind::Raw(html.to_string()))
    }

    fn set_text(&mut self, node: NodeRef, text: &str) {
        self.mutations += 1;
        match &mut self.nodes[node.0].kind {
            NodeKind::Text(t) | NodeKind::Comment(t) | NodeKind::Raw(t) => *t = text.to_string(),
            _ => {}
        }
    }

    fn set_attribute(&mut self, element: NodeRef, name: &str, value: &str, namespace: Option<&str>) {
        self.mutations += 1;
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[element.0].kind {
            attributes.insert(
                name.to_string(),
                (value.to_string(), namespace.map(str::to_string)),
            );
        }
    }

    fn remove_attribute(&mut self, element: NodeRef, name: &str) {
        self.mutations += 1;
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[element.0].kind {
            attributes.shift_remove(name);
        }
    }

    fn set_property(&mut self, element: NodeRef, name: &str, value: &Value) {
        self.mutations += 1;
        if let NodeKind::Element { properties, .. } = &mut self.nodes[element.0].kind {
            properties.insert(name.to_string(), value.clone());
        }
    }

    fn insert_before(&mut self, parent: NodeRef, node: NodeRef, reference: Option<NodeRef>) {
        self.mutations += 1;
        self.detach(node);
        let children = &mut self.nodes[parent.0].children;
        let position = reference
            .and_then(|r| children.iter().position(|c| *c == r))
            .unwrap_or(children.len());
        children.insert(position, node);
        self.nodes[node.0].parent = Some(parent);
    }

    fn remove_child(&mut self, parent: NodeRef, node: NodeRef) {
        self.mutations += 1;
        if self.nodes[node.0].parent == Some(parent) {
            self.detach(node);
        }
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0].parent
    }

    fn next_sibling(&self, node: NodeRef) -> Option<NodeRef> {
        let parent = self.nodes[node.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let position = siblings.iter().position(|c| *c == node)?;
        siblings.get(position + 1).copied()
    }
}

/// Forwards to another backend, counting the mutations that pass through
pub struct CountingBackend<'a> {
    inner: &'a mut dyn DomBackend,
    mutations: usize,
}

impl<'a> CountingBackend<'a> {
    pub fn new(inner: &'a mut dyn DomBackend) -> Self {
        Self {
            inner,
            mutations: 0,
        }
    }

    pub fn mutations(&self) -> usize {
        self.mutations
    }
}

impl DomBackend for CountingBackend<'_> {
    fn create_element(&mut self, tag: &str) -> NodeRef {
        self.inner.create_element(tag)
    }

    fn create_text(&mut self, text: &str) -> NodeRef {
        self.inner.create_text(text)
    }

    fn create_comment(&mut self, text: &str) -> NodeRef {
        self.inner.create_comment(text)
    }

    fn create_raw(&mut self, html: &str) -> NodeRef {
        self.inner.create_raw(html)
    }

    fn set_text(&mut self, node: NodeRef, text: &str) {
        self.mutations += 1;
        self.inner.set_text(node, text)
    }

    fn set_attribute(&mut self, element: NodeRef, name: &str, value: &str, namespace: Option<&str>) {
        self.mutations += 1;
        self.inner.set_attribute(element, name, value, namespace)
    }

    fn remove_attribute(&mut self, element: NodeRef, name: &str) {
        self.mutations += 1;
        self.inner.remove_attribute(element, name)
    }

    fn set_property(&mut self, element: NodeRef, name: &str, value: &Value) {
        self.mutations += 1;
        self.inner.set_property(element, name, value)
    }

    fn insert_before(&mut self, parent: NodeRef, node: NodeRef, reference: Option<NodeRef>) {
        self.mutations += 1;
        self.inner.insert_before(parent, node, reference)
    }

    fn remove_child(&mut self, parent: NodeRef, node: NodeRef) {
        self.mutations += 1;
        self.inner.remove_child(parent, node)
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.inner.parent(node)
    }

    fn next_sibling(&self, node: NodeRef) -> Option<NodeRef> {
        self.inner.next_sibling(node)
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
