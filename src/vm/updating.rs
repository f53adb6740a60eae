//! Updating VM
//!
//! A render leaves behind a tree of `UpdatingOp`s. Re-running that tree
//! after the data changed patches only what changed: leaf ops compare
//! against the last value they wrote, guards invalidate their enclosing
//! tracked range (which is then cleared and re-executed in place), and
//! lists reconcile their iterations by key.

use super::builder::{attribute_value, class_text, clear, move_before, AttrValue, BoundsRef, Edge};
use super::expressions::{is_truthy, to_text, CompiledArgs, Reference};
use super::opcode::KeyPath;
use super::scope::{cell, Scope, ValueCell};
use super::{Closed, IterationSeed, ResumeState, VM};
use crate::dom::{CountingBackend, DomBackend, NodeRef};
use crate::environment::{Environment, Modifier};
use crate::error::{WeftError, WeftResult};
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug)]
pub enum UpdatingOp {
    Text {
        node: NodeRef,
        reference: Reference,
        last: String,
    },
    Attr {
        element: NodeRef,
        name: String,
        namespace: Option<String>,
        reference: Reference,
        last: Option<String>,
    },
    Class {
        element: NodeRef,
        parts: Vec<AttrValue>,
        last: String,
    },
    Prop {
        element: NodeRef,
        name: String,
        reference: Reference,
        last: Value,
    },
    Modifier {
        element: NodeRef,
        modifier: Modifier,
        args: CompiledArgs,
        scope: Scope,
        last: (Vec<Value>, IndexMap<String, Value>),
    },
    /// Keeps an argument cell in step with the expression it came from
    Bind {
        reference: Reference,
        cell: ValueCell,
    },
    /// Invalidates the enclosing range when the truthiness flips
    Assert {
        reference: Reference,
        last: bool,
    },
    Try(TryBlock),
    List(ListBlock),
}

/// A tracked range and the updates recorded inside it
#[derive(Debug)]
pub struct TryBlock {
    pub bounds: BoundsRef,
    pub resume: ResumeState,
    pub children: Vec<UpdatingOp>,
}

/// One keyed item of a list
#[derive(Debug)]
pub struct Iteration {
    pub bounds: BoundsRef,
    pub item: ValueCell,
    pub index: ValueCell,
    pub children: Vec<UpdatingOp>,
}

#[derive(Debug)]
pub struct ListBlock {
    pub bounds: BoundsRef,
    pub reference: Reference,
    pub key: KeyPath,
    /// Runs one iteration, from `EnterWithKey` to its `Exit`
    pub resume: ResumeState,
    pub iterations: IndexMap<String, Iteration>,
}

/// Work done by one render or update pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// VM instructions executed
    pub instructions: usize,
    /// Backend mutations performed
    pub mutations: usize,
}

/// Output of a render, able to bring that output up to date later
#[derive(Debug)]
pub struct RenderResult {
    root: NodeRef,
    bounds: BoundsRef,
    self_cell: ValueCell,
    args: IndexMap<String, ValueCell>,
    ops: Vec<UpdatingOp>,
    stats: RenderStats,
}

impl RenderResult {
    pub(crate) fn new(
        root: NodeRef,
        bounds: BoundsRef,
        self_cell: ValueCell,
        args: IndexMap<String, ValueCell>,
        ops: Vec<UpdatingOp>,
        stats: RenderStats,
    ) -> Self {
        Self {
            root,
            bounds,
            self_cell,
            args,
            ops,
            stats,
        }
    }

    /// The node the output was rendered into
    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// The top-level nodes of the output, in order
    pub fn nodes(&self, dom: &dyn DomBackend) -> Vec<NodeRef> {
        self.bounds.borrow().nodes(dom)
    }

    /// Work done by the most recent pass
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn ops(&self) -> &[UpdatingOp] {
        &self.ops
    }

    /// Replace a named argument of a rendered layout; takes effect on the
    /// next `refresh` or `rerender`
    pub fn set_arg(&mut self, name: &str, value: Value) -> WeftResult<()> {
        let slot = self
            .args
            .get(name)
            .ok_or_else(|| WeftError::invalid_state("set_arg", format!("no argument '{}'", name)))?;
        *slot.borrow_mut() = value;
        Ok(())
    }

    /// Replace `this` and bring the output up to date
    pub fn rerender(
        &mut self,
        env: &dyn Environment,
        dom: &mut dyn DomBackend,
        self_value: Value,
    ) -> WeftResult<RenderStats> {
        *self.self_cell.borrow_mut() = self_value;
        self.refresh(env, dom)
    }

    /// Bring the output up to date with the current inputs
    pub fn refresh(
        &mut self,
        env: &dyn Environment,
        dom: &mut dyn DomBackend,
    ) -> WeftResult<RenderStats> {
        let mut vm = UpdatingVM::new(env, dom);
        if vm.execute(&mut self.ops)? {
            return Err(WeftError::invalid_state(
                "Assert",
                "a guard outside of any tracked range changed",
            ));
        }
        self.stats = RenderStats {
            instructions: vm.instructions,
            mutations: vm.dom.mutations(),
        };
        debug!(
            "updated with {} instructions, {} mutations",
            self.stats.instructions, self.stats.mutations
        );
        Ok(self.stats)
    }
}

struct UpdatingVM<'a> {
    env: &'a dyn Environment,
    dom: CountingBackend<'a>,
    instructions: usize,
}

impl<'a> UpdatingVM<'a> {
    fn new(env: &'a dyn Environment, dom: &'a mut dyn DomBackend) -> Self {
        Self {
            env,
            dom: CountingBackend::new(dom),
            instructions: 0,
        }
    }

    /// Run a list of ops; `true` means the enclosing range must be rebuilt
    fn execute(&mut self, ops: &mut [UpdatingOp]) -> WeftResult<bool> {
        for op in ops.iter_mut() {
            if self.update(op)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn update(&mut self, op: &mut UpdatingOp) -> WeftResult<bool> {
        match op {
            UpdatingOp::Text {
                node,
                reference,
                last,
            } => {
                let text = to_text(&reference.value()?);
                if text != *last {
                    self.dom.set_text(*node, &text);
                    *last = text;
                }
            }
            UpdatingOp::Attr {
                element,
                name,
                namespace,
                reference,
                last,
            } => {
                let value = attribute_value(&reference.value()?);
                if value != *last {
                    match &value {
                        Some(text) => {
                            self.dom
                                .set_attribute(*element, name, text, namespace.as_deref())
                        }
                        None => self.dom.remove_attribute(*element, name),
                    }
                    *last = value;
                }
            }
            UpdatingOp::Class {
                element,
                parts,
                last,
            } => {
                let text = class_text(parts)?;
                if text != *last {
                    if text.is_empty() {
                        self.dom.remove_attribute(*element, "class");
                    } else {
                        self.dom.set_attribute(*element, "class", &text, None);
                    }
                    *last = text;
                }
            }
            UpdatingOp::Prop {
                element,
                name,
                reference,
                last,
            } => {
                let value = reference.value()?;
                if value != *last {
                    self.dom.set_property(*element, name, &value);
                    *last = value;
                }
            }
            UpdatingOp::Modifier {
                element,
                modifier,
                args,
                scope,
                last,
            } => {
                let current = args.evaluate(scope)?;
                if current != *last {
                    modifier.install(&mut self.dom, *element, &current.0, &current.1);
                    *last = current;
                }
            }
            UpdatingOp::Bind { reference, cell } => {
                store(cell, reference.value()?);
            }
            UpdatingOp::Assert { reference, last } => {
                if is_truthy(&reference.value()?) != *last {
                    return Ok(true);
                }
            }
            UpdatingOp::Try(block) => {
                if self.execute(&mut block.children)? {
                    self.rebuild(block)?;
                }
            }
            UpdatingOp::List(list) => self.reconcile(list)?,
        }
        Ok(false)
    }

    /// Clear a range and execute it again where it stood
    fn rebuild(&mut self, block: &mut TryBlock) -> WeftResult<()> {
        let parent = block.bounds.borrow().parent;
        let next = clear(&block.bounds, &mut self.dom);
        match self.resume(&block.resume, parent, next, None)? {
            Closed::Try(fresh) => {
                block.children = fresh.children;
                adopt(&block.bounds, &fresh.bounds);
                Ok(())
            }
            Closed::Iteration(..) => Err(WeftError::invalid_state(
                "Enter",
                "range re-executed as a list iteration",
            )),
        }
    }

    fn render_iteration(
        &mut self,
        resume: &ResumeState,
        parent: NodeRef,
        next: Option<NodeRef>,
        seed: IterationSeed,
    ) -> WeftResult<Iteration> {
        match self.resume(resume, parent, next, Some(seed))? {
            Closed::Iteration(_, iteration) => Ok(iteration),
            Closed::Try(_) => Err(WeftError::invalid_state(
                "EnterWithKey",
                "iteration re-executed as a tracked range",
            )),
        }
    }

    fn resume(
        &mut self,
        resume: &ResumeState,
        parent: NodeRef,
        next: Option<NodeRef>,
        seed: Option<IterationSeed>,
    ) -> WeftResult<Closed> {
        let (closed, instructions) = VM::resume(self.env, &mut self.dom, resume, parent, next, seed)?;
        self.instructions += instructions;
        Ok(closed)
    }

    /// Bring a list's iterations in line with the current items.
    ///
    /// Reused iterations on a longest run of increasing old positions stay
    /// where they are; every other item is placed back to front, in front of
    /// the one placed before it.
    fn reconcile(&mut self, list: &mut ListBlock) -> WeftResult<()> {
        let items = list.key.items(&list.reference.value()?);
        let (parent, list_next, placeholder) = {
            let bounds = list.bounds.borrow();
            let placeholder = match (&bounds.first, list.iterations.is_empty()) {
                (Some(Edge::Node(node)), true) => Some(*node),
                _ => None,
            };
            let next = bounds.last_node().and_then(|n| self.dom.next_sibling(n));
            (bounds.parent, next, placeholder)
        };

        let mut old = std::mem::take(&mut list.iterations);
        let wanted: HashSet<&str> = items.iter().map(|(k, _)| k.as_str()).collect();
        let removed: Vec<String> = old
            .keys()
            .filter(|k| !wanted.contains(k.as_str()))
            .cloned()
            .collect();
        for key in removed {
            if let Some(iteration) = old.shift_remove(&key) {
                clear(&iteration.bounds, &mut self.dom);
            }
        }

        let previous: Vec<Option<usize>> =
            items.iter().map(|(k, _)| old.get_index_of(k)).collect();
        let stable = longest_increasing(&previous);

        let mut reference = list_next;
        let mut placed: Vec<(String, Iteration)> = Vec::with_capacity(items.len());
        for (index, (key, value)) in items.into_iter().enumerate().rev() {
            let iteration = match old.swap_remove(&key) {
                Some(mut iteration) => {
                    store(&iteration.item, value);
                    store(&iteration.index, Value::from(index));
                    if self.execute(&mut iteration.children)? {
                        let next = clear(&iteration.bounds, &mut self.dom);
                        let seed = IterationSeed {
                            key: key.clone(),
                            item: iteration.item.clone(),
                            index: iteration.index.clone(),
                        };
                        let fresh = self.render_iteration(&list.resume, parent, next, seed)?;
                        iteration.children = fresh.children;
                        adopt(&iteration.bounds, &fresh.bounds);
                    }
                    if !stable[index] {
                        move_before(&iteration.bounds, &mut self.dom, reference);
                    }
                    iteration
                }
                None => {
                    let seed = IterationSeed {
                        key: key.clone(),
                        item: cell(value),
                        index: cell(Value::from(index)),
                    };
                    self.render_iteration(&list.resume, parent, reference, seed)?
                }
            };
            reference = iteration.bounds.borrow().first_node();
            placed.push((key, iteration));
        }
        placed.reverse();

        {
            let mut bounds = list.bounds.borrow_mut();
            match (placed.first(), placed.last()) {
                (Some((_, first)), Some((_, last))) => {
                    if let Some(node) = placeholder {
                        self.dom.remove_child(parent, node);
                    }
                    bounds.first = Some(Edge::Nested(first.bounds.clone()));
                    bounds.last = Some(Edge::Nested(last.bounds.clone()));
                }
                _ if placeholder.is_none() => {
                    let node = self.dom.create_comment("");
                    self.dom.insert_before(parent, node, list_next);
                    bounds.first = Some(Edge::Node(node));
                    bounds.last = Some(Edge::Node(node));
                }
                _ => {}
            }
        }
        list.iterations = placed.into_iter().collect();
        Ok(())
    }
}

/// Mark the items forming a longest strictly increasing run of known old
/// positions. Those iterations are already in order relative to each other.
fn longest_increasing(positions: &[Option<usize>]) -> Vec<bool> {
    // tails[k]: (old position, item index) ending the best run of length k + 1
    let mut tails: Vec<(usize, usize)> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; positions.len()];
    for (i, position) in positions.iter().enumerate() {
        let Some(position) = *position else {
            continue;
        };
        let at = tails.partition_point(|&(p, _)| p < position);
        if at > 0 {
            previous[i] = Some(tails[at - 1].1);
        }
        if at == tails.len() {
            tails.push((position, i));
        } else {
            tails[at] = (position, i);
        }
    }

    let mut stable = vec![false; positions.len()];
    let mut cursor = tails.last().map(|&(_, i)| i);
    while let Some(i) = cursor {
        stable[i] = true;
        cursor = previous[i];
    }
    stable
}

/// Write a cell only when the value differs
fn store(slot: &ValueCell, value: Value) {
    if *slot.borrow() != value {
        *slot.borrow_mut() = value;
    }
}

/// Point existing bounds at a freshly rendered range, so ranges that nest
/// the old handle see the new nodes
fn adopt(target: &BoundsRef, fresh: &BoundsRef) {
    let edges = fresh.borrow().clone();
    *target.borrow_mut() = edges;
}
