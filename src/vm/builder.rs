//! Element stack: where the VM inserts output, and which output ranges it
//! is tracking for later updates

use super::expressions::{to_text, CompiledArgs, Reference};
use super::scope::Scope;
use crate::dom::{DomBackend, NodeRef};
use crate::environment::Modifier;
use crate::error::{WeftError, WeftResult};
use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

pub type BoundsRef = Rc<RefCell<Bounds>>;

/// One end of a range: a node, or a nested range
#[derive(Debug, Clone)]
pub enum Edge {
    Node(NodeRef),
    Nested(BoundsRef),
}

impl Edge {
    fn first_node(&self) -> Option<NodeRef> {
        match self {
            Edge::Node(node) => Some(*node),
            Edge::Nested(bounds) => bounds.borrow().first_node(),
        }
    }

    fn last_node(&self) -> Option<NodeRef> {
        match self {
            Edge::Node(node) => Some(*node),
            Edge::Nested(bounds) => bounds.borrow().last_node(),
        }
    }
}

/// A contiguous run of sibling nodes under `parent`
#[derive(Debug, Clone)]
pub struct Bounds {
    pub parent: NodeRef,
    pub first: Option<Edge>,
    pub last: Option<Edge>,
}

impl Bounds {
    pub fn new(parent: NodeRef) -> Self {
        Self {
            parent,
            first: None,
            last: None,
        }
    }

    pub fn first_node(&self) -> Option<NodeRef> {
        self.first.as_ref().and_then(Edge::first_node)
    }

    pub fn last_node(&self) -> Option<NodeRef> {
        self.last.as_ref().and_then(Edge::last_node)
    }

    fn record(&mut self, edge: Edge) {
        if self.first.is_none() {
            self.first = Some(edge.clone());
        }
        self.last = Some(edge);
    }

    /// The nodes in the range, in document order
    pub fn nodes(&self, dom: &dyn DomBackend) -> Vec<NodeRef> {
        let mut nodes = Vec::new();
        let (Some(first), Some(last)) = (self.first_node(), self.last_node()) else {
            return nodes;
        };
        let mut cursor = Some(first);
        while let Some(node) = cursor {
            nodes.push(node);
            if node == last {
                break;
            }
            cursor = dom.next_sibling(node);
        }
        nodes
    }
}

/// Remove every node of a range; returns the node that followed it
pub fn clear(bounds: &BoundsRef, dom: &mut dyn DomBackend) -> Option<NodeRef> {
    let bounds = bounds.borrow();
    let next = bounds.last_node().and_then(|n| dom.next_sibling(n));
    for node in bounds.nodes(dom) {
        dom.remove_child(bounds.parent, node);
    }
    next
}

/// Move every node of a range in front of `reference`
pub fn move_before(bounds: &BoundsRef, dom: &mut dyn DomBackend, reference: Option<NodeRef>) {
    let bounds = bounds.borrow();
    for node in bounds.nodes(dom) {
        dom.insert_before(bounds.parent, node, reference);
    }
}

/// An attribute or class value queued on an element before it is flushed
#[derive(Debug, Clone)]
pub enum AttrValue {
    Static(String),
    Dynamic(Reference),
}

impl AttrValue {
    /// Current attribute text, `None` when the attribute should be absent
    pub fn current(&self) -> WeftResult<Option<String>> {
        match self {
            AttrValue::Static(text) => Ok(Some(text.clone())),
            AttrValue::Dynamic(reference) => Ok(attribute_value(&reference.value()?)),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, AttrValue::Dynamic(_))
    }
}

/// Null and false remove an attribute, true sets it empty
pub fn attribute_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        other => Some(to_text(other)),
    }
}

/// Space-separated class list; absent and empty parts are skipped
pub fn class_text(parts: &[AttrValue]) -> WeftResult<String> {
    let mut names = Vec::with_capacity(parts.len());
    for part in parts {
        if let Some(name) = part.current()? {
            if !name.is_empty() {
                names.push(name);
            }
        }
    }
    Ok(names.join(" "))
}

#[derive(Debug, Clone)]
pub struct QueuedAttribute {
    pub value: AttrValue,
    pub namespace: Option<String>,
}

/// Operations queued between opening an element and flushing it
#[derive(Debug, Default)]
pub struct PendingElement {
    pub attributes: IndexMap<String, QueuedAttribute>,
    pub classes: Vec<AttrValue>,
    pub properties: Vec<(String, Reference)>,
    pub modifiers: Vec<(Modifier, CompiledArgs, Scope)>,
}

impl PendingElement {
    /// Queue an attribute; `class` accumulates, anything else replaces
    pub fn set_attribute(&mut self, name: &str, value: AttrValue, namespace: Option<String>) {
        if name == "class" {
            self.classes.push(value);
        } else {
            self.attributes
                .insert(name.to_string(), QueuedAttribute { value, namespace });
        }
    }
}

struct ElementFrame {
    element: NodeRef,
    next_sibling: Option<NodeRef>,
    pending: Option<PendingElement>,
}

struct Tracker {
    bounds: BoundsRef,
    depth: usize,
}

pub struct ElementStack {
    frames: Vec<ElementFrame>,
    trackers: Vec<Tracker>,
}

impl ElementStack {
    /// Insert into `parent`, in front of `next_sibling`
    pub fn new(parent: NodeRef, next_sibling: Option<NodeRef>) -> Self {
        Self {
            frames: vec![ElementFrame {
                element: parent,
                next_sibling,
                pending: None,
            }],
            trackers: Vec::new(),
        }
    }

    fn top(&self) -> &ElementFrame {
        // The root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    pub fn parent(&self) -> NodeRef {
        self.top().element
    }

    fn record(&mut self, edge: Edge) {
        let depth = self.frames.len();
        if let Some(tracker) = self.trackers.last() {
            if tracker.depth == depth {
                tracker.bounds.borrow_mut().record(edge);
            }
        }
    }

    pub fn append_node(&mut self, dom: &mut dyn DomBackend, node: NodeRef) {
        let frame = self.top();
        dom.insert_before(frame.element, node, frame.next_sibling);
        self.record(Edge::Node(node));
    }

    pub fn append_text(&mut self, dom: &mut dyn DomBackend, text: &str) -> NodeRef {
        let node = dom.create_text(text);
        self.append_node(dom, node);
        node
    }

    pub fn append_raw(&mut self, dom: &mut dyn DomBackend, html: &str) -> NodeRef {
        let node = dom.create_raw(html);
        self.append_node(dom, node);
        node
    }

    pub fn append_comment(&mut self, dom: &mut dyn DomBackend, text: &str) -> NodeRef {
        let node = dom.create_comment(text);
        self.append_node(dom, node);
        node
    }

    pub fn open_element(&mut self, dom: &mut dyn DomBackend, tag: &str) -> NodeRef {
        let element = dom.create_element(tag);
        self.append_node(dom, element);
        self.frames.push(ElementFrame {
            element,
            next_sibling: None,
            pending: Some(PendingElement::default()),
        });
        element
    }

    /// Queue for the element being opened
    pub fn pending_mut(&mut self, opcode: &str) -> WeftResult<&mut PendingElement> {
        let depth = self.frames.len();
        self.frames[depth - 1]
            .pending
            .as_mut()
            .ok_or_else(|| WeftError::invalid_state(opcode, "no element is being opened"))
    }

    /// Take the queue of the element being opened, leaving it flushed
    pub fn take_pending(&mut self) -> Option<(NodeRef, PendingElement)> {
        let depth = self.frames.len();
        let frame = &mut self.frames[depth - 1];
        frame.pending.take().map(|p| (frame.element, p))
    }

    pub fn close_element(&mut self) -> WeftResult<NodeRef> {
        if self.frames.len() <= 1 {
            return Err(WeftError::invalid_state(
                "CloseElement",
                "no open element to close",
            ));
        }
        let depth = self.frames.len();
        if self.trackers.last().map(|t| t.depth == depth).unwrap_or(false) {
            return Err(WeftError::invalid_state(
                "CloseElement",
                "a tracked range is still open inside the element",
            ));
        }
        let frame = self.frames.pop().ok_or_else(|| {
            WeftError::invalid_state("CloseElement", "element stack is empty")
        })?;
        Ok(frame.element)
    }

    /// Start tracking the nodes appended at the current position
    pub fn push_tracker(&mut self) -> BoundsRef {
        let bounds = Rc::new(RefCell::new(Bounds::new(self.parent())));
        self.trackers.push(Tracker {
            bounds: bounds.clone(),
            depth: self.frames.len(),
        });
        bounds
    }

    /// Stop tracking; an empty range gets a placeholder comment
    pub fn pop_tracker(&mut self, dom: &mut dyn DomBackend) -> WeftResult<BoundsRef> {
        let is_empty = match self.trackers.last() {
            Some(tracker) => tracker.bounds.borrow().first.is_none(),
            None => {
                return Err(WeftError::invalid_state(
                    "Exit",
                    "no tracked range to close",
                ))
            }
        };
        if is_empty {
            self.append_comment(dom, "");
        }
        let tracker = self
            .trackers
            .pop()
            .ok_or_else(|| WeftError::invalid_state("Exit", "no tracked range to close"))?;
        if tracker.depth != self.frames.len() {
            return Err(WeftError::invalid_state(
                "Exit",
                "tracked range closed at a different element depth",
            ));
        }
        self.record(Edge::Nested(tracker.bounds.clone()));
        Ok(tracker.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::vm::expressions::CompiledExpr;

    #[test]
    fn test_nested_trackers_share_edges() {
        let mut doc = Document::new();
        let root = doc.create_fragment();
        let mut stack = ElementStack::new(root, None);

        let outer = stack.push_tracker();
        let a = stack.append_text(&mut doc, "a");
        let inner = stack.push_tracker();
        let b = stack.append_text(&mut doc, "b");
        stack.pop_tracker(&mut doc).unwrap();
        stack.pop_tracker(&mut doc).unwrap();

        assert_eq!(outer.borrow().first_node(), Some(a));
        assert_eq!(outer.borrow().last_node(), Some(b));
        assert_eq!(inner.borrow().nodes(&doc), vec![b]);
    }

    #[test]
    fn test_empty_range_gets_placeholder() {
        let mut doc = Document::new();
        let root = doc.create_fragment();
        let mut stack = ElementStack::new(root, None);
        let bounds = stack.push_tracker();
        stack.pop_tracker(&mut doc).unwrap();
        assert_eq!(doc.inner_html(root), "<!---->");
        assert_eq!(bounds.borrow().nodes(&doc).len(), 1);
    }

    #[test]
    fn test_class_text_skips_absent_parts() {
        let scope = Scope::root(1, serde_json::json!({"active": false, "size": "lg"}));
        let lookup = |name: &str| {
            AttrValue::Dynamic(Reference::new(
                std::sync::Arc::new(CompiledExpr::SelfLookup(vec![name.to_string()])),
                scope.clone(),
            ))
        };
        let parts = vec![
            AttrValue::Static("btn".to_string()),
            lookup("active"),
            lookup("size"),
        ];
        assert_eq!(class_text(&parts).unwrap(), "btn lg");
        assert_eq!(attribute_value(&Value::Bool(true)), Some(String::new()));
        assert_eq!(attribute_value(&Value::Null), None);
    }

    #[test]
    fn test_elements_nest_and_clear() {
        let mut doc = Document::new();
        let root = doc.create_fragment();
        let after = doc.create_text("!");
        doc.insert_before(root, after, None);

        let mut stack = ElementStack::new(root, Some(after));
        let bounds = stack.push_tracker();
        stack.open_element(&mut doc, "b");
        stack.take_pending();
        stack.append_text(&mut doc, "bold");
        stack.close_element().unwrap();
        stack.append_text(&mut doc, " tail");
        stack.pop_tracker(&mut doc).unwrap();
        assert_eq!(doc.inner_html(root), "<b>bold</b> tail!");

        let next = clear(&bounds, &mut doc);
        assert_eq!(next, Some(after));
        assert_eq!(doc.inner_html(root), "!");
    }
}
