//! Host environment: helpers, modifiers and components resolved by path

use crate::blocks::Layout;
use crate::dom::{DomBackend, NodeRef};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type HelperFn = dyn Fn(&[Value], &IndexMap<String, Value>) -> Value + Send + Sync;
pub type ModifierFn =
    dyn Fn(&mut dyn DomBackend, NodeRef, &[Value], &IndexMap<String, Value>) + Send + Sync;

/// A host function callable from templates
#[derive(Clone)]
pub struct Helper {
    pub name: String,
    func: Arc<HelperFn>,
}

impl Helper {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value], &IndexMap<String, Value>) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn call(&self, positional: &[Value], named: &IndexMap<String, Value>) -> Value {
        (self.func)(positional, named)
    }
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Helper({})", self.name)
    }
}

/// A host function installed on an element, re-run when its arguments change
#[derive(Clone)]
pub struct Modifier {
    pub name: String,
    func: Arc<ModifierFn>,
}

impl Modifier {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut dyn DomBackend, NodeRef, &[Value], &IndexMap<String, Value>)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn install(
        &self,
        dom: &mut dyn DomBackend,
        element: NodeRef,
        positional: &[Value],
        named: &IndexMap<String, Value>,
    ) {
        (self.func)(dom, element, positional, named)
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifier({})", self.name)
    }
}

/// A component: a name and the layout rendered in its place
#[derive(Debug)]
pub struct ComponentDefinition {
    pub name: String,
    pub layout: Layout,
}

/// Capabilities the scanner, compilers and VM consult
pub trait Environment {
    fn lookup_helper(&self, path: &[String]) -> Option<Helper>;

    fn has_helper(&self, path: &[String]) -> bool {
        self.lookup_helper(path).is_some()
    }

    fn lookup_modifier(&self, path: &[String]) -> Option<Modifier>;

    fn lookup_component(&self, tag: &str) -> Option<Arc<ComponentDefinition>>;
}

/// Map-backed environment
#[derive(Debug, Default)]
pub struct Registry {
    helpers: HashMap<String, Helper>,
    modifiers: HashMap<String, Modifier>,
    components: HashMap<String, Arc<ComponentDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_helper(
        &mut self,
        name: &str,
        func: impl Fn(&[Value], &IndexMap<String, Value>) -> Value + Send + Sync + 'static,
    ) {
        self.helpers
            .insert(name.to_string(), Helper::new(name, func));
    }

    pub fn register_modifier(
        &mut self,
        name: &str,
        func: impl Fn(&mut dyn DomBackend, NodeRef, &[Value], &IndexMap<String, Value>)
            + Send
            + Sync
            + 'static,
    ) {
        self.modifiers
            .insert(name.to_string(), Modifier::new(name, func));
    }

    pub fn register_component(&mut self, name: &str, layout: Layout) {
        self.components.insert(
            name.to_string(),
            Arc::new(ComponentDefinition {
                name: name.to_string(),
                layout,
            }),
        );
    }
}

impl Environment for Registry {
    fn lookup_helper(&self, path: &[String]) -> Option<Helper> {
        self.helpers.get(&path.join(".")).cloned()
    }

    fn lookup_modifier(&self, path: &[String]) -> Option<Modifier> {
        self.modifiers.get(&path.join(".")).cloned()
    }

    fn lookup_component(&self, tag: &str) -> Option<Arc<ComponentDefinition>> {
        self.components.get(tag).cloned()
    }
}
