//! Rendering virtual machine
//!
//! The VM executes compiled `OpSeq`s against a `DomBackend`. While it
//! builds the output it records a tree of updating operations: value
//! bindings, guards, and tracked ranges it can later re-enter. The
//! `UpdatingVM` replays that tree to patch the output in place.

pub mod builder;
pub mod compiler;
pub mod expressions;
pub mod frame;
pub mod opcode;
pub mod scope;
pub mod updating;

mod execution;
mod ops;

use crate::blocks::TopLevelBlock;
use crate::dom::{CountingBackend, DomBackend, NodeRef};
use crate::environment::Environment;
use crate::error::{WeftError, WeftResult};
use builder::ElementStack;
use expressions::Reference;
use frame::Frame;
use indexmap::IndexMap;
use log::debug;
use opcode::{OpId, OpSeq};
use scope::{cell, BlockHandle, Scope, ValueCell};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use updating::{Iteration, ListBlock, TryBlock};

pub use updating::{RenderResult, RenderStats, UpdatingOp};

/// Evaluation stack entry
#[derive(Debug, Clone)]
pub enum StackEntry {
    Reference(Reference),
    Condition(bool),
}

/// Arguments staged for the next block, yield or layout
#[derive(Debug, Default)]
pub struct ArgsRegister {
    pub positional: Vec<ValueCell>,
    pub named: IndexMap<String, ValueCell>,
    pub blocks: IndexMap<String, BlockHandle>,
}

/// Everything needed to re-execute a tracked range on its own
#[derive(Clone)]
pub struct ResumeState {
    pub unit: Arc<TopLevelBlock>,
    pub ops: Arc<OpSeq>,
    /// The `Enter` (or `EnterWithKey`) that opens the range
    pub start: OpId,
    /// The `Exit` that closes it
    pub end: OpId,
    pub scope: Scope,
}

impl fmt::Debug for ResumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeState")
            .field("start", &self.start)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}

/// Items of the list being iterated
pub(crate) struct ListState {
    items: Vec<(String, Value)>,
    position: usize,
}

/// The item `NextIter` loaded, waiting for `EnterWithKey`
pub(crate) struct IterationSeed {
    pub key: String,
    pub item: ValueCell,
    pub index: ValueCell,
}

/// A range closed while nothing enclosing it was being built
pub(crate) enum Closed {
    Try(TryBlock),
    Iteration(String, Iteration),
}

/// Updating operations under construction
pub(crate) enum OpsFrame {
    Block(Vec<UpdatingOp>),
    Captured(Option<Closed>),
    Try(TryBlock),
    Iteration(String, Iteration),
    List(ListBlock),
}

/// Attributes of the component whose layout is running
pub(crate) struct ComponentState {
    attributes: Vec<(String, Reference)>,
}

pub struct VM<'a> {
    env: &'a dyn Environment,
    dom: CountingBackend<'a>,
    frames: Vec<Frame>,
    scopes: Vec<Scope>,
    stack: Vec<StackEntry>,
    args: ArgsRegister,
    elements: ElementStack,
    updating: Vec<OpsFrame>,
    lists: Vec<ListState>,
    iteration: Option<IterationSeed>,
    components: Vec<ComponentState>,
    instructions: usize,
    /// Frame depth and instruction after which execution stops early
    stop: Option<(usize, OpId)>,
}

impl<'a> VM<'a> {
    fn new(
        env: &'a dyn Environment,
        dom: &'a mut dyn DomBackend,
        parent: NodeRef,
        next_sibling: Option<NodeRef>,
    ) -> Self {
        Self {
            env,
            dom: CountingBackend::new(dom),
            frames: Vec::with_capacity(16),
            scopes: Vec::with_capacity(16),
            stack: Vec::with_capacity(16),
            args: ArgsRegister::default(),
            elements: ElementStack::new(parent, next_sibling),
            updating: Vec::new(),
            lists: Vec::new(),
            iteration: None,
            components: Vec::new(),
            instructions: 0,
            stop: None,
        }
    }

    /// Render an entry point into `parent`
    pub fn render_entry_point(
        env: &'a dyn Environment,
        dom: &'a mut dyn DomBackend,
        unit: &Arc<TopLevelBlock>,
        parent: NodeRef,
        self_value: Value,
    ) -> WeftResult<RenderResult> {
        let ops = unit.compile(env)?;
        let self_cell = cell(self_value);
        let mut vm = VM::new(env, dom, parent, None);
        vm.scopes
            .push(Scope::with_self(unit.symbols().size(), self_cell.clone()));
        vm.run_root(unit.clone(), ops, self_cell, IndexMap::new())
    }

    /// Render a layout into `parent` with the given named arguments
    pub fn render_layout(
        env: &'a dyn Environment,
        dom: &'a mut dyn DomBackend,
        unit: &Arc<TopLevelBlock>,
        parent: NodeRef,
        args: IndexMap<String, Value>,
    ) -> WeftResult<RenderResult> {
        let ops = unit.compile(env)?;
        let self_cell = cell(Value::Null);
        let mut vm = VM::new(env, dom, parent, None);
        vm.scopes
            .push(Scope::with_self(unit.symbols().size(), self_cell.clone()));
        let cells: IndexMap<String, ValueCell> =
            args.into_iter().map(|(k, v)| (k, cell(v))).collect();
        vm.args.named = cells.clone();
        vm.run_root(unit.clone(), ops, self_cell, cells)
    }

    fn run_root(
        mut self,
        unit: Arc<TopLevelBlock>,
        ops: Arc<OpSeq>,
        self_cell: ValueCell,
        args: IndexMap<String, ValueCell>,
    ) -> WeftResult<RenderResult> {
        let root = self.elements.parent();
        self.updating.push(OpsFrame::Block(Vec::new()));
        let bounds = self.elements.push_tracker();
        self.frames.push(Frame::new(unit, ops, false));

        execution::execute_vm(&mut self)?;

        self.elements.pop_tracker(&mut self.dom)?;
        let ops = match self.updating.pop() {
            Some(OpsFrame::Block(ops)) if self.updating.is_empty() => ops,
            _ => {
                return Err(WeftError::invalid_state(
                    "render",
                    "tracked ranges left open at the end of the program",
                ))
            }
        };
        let stats = RenderStats {
            instructions: self.instructions,
            mutations: self.dom.mutations(),
        };
        debug!(
            "rendered {} instructions, {} mutations, {} updating ops",
            stats.instructions,
            stats.mutations,
            ops.len()
        );
        Ok(RenderResult::new(root, bounds, self_cell, args, ops, stats))
    }

    /// Re-execute a tracked range from its opening instruction to its `Exit`,
    /// inserting output into `parent` before `next_sibling`
    pub(crate) fn resume(
        env: &'a dyn Environment,
        dom: &'a mut dyn DomBackend,
        resume: &ResumeState,
        parent: NodeRef,
        next_sibling: Option<NodeRef>,
        seed: Option<IterationSeed>,
    ) -> WeftResult<(Closed, usize)> {
        let mut vm = VM::new(env, dom, parent, next_sibling);
        vm.scopes.push(resume.scope.clone());
        vm.updating.push(OpsFrame::Captured(None));
        if let Some(seed) = seed {
            vm.args.positional = vec![seed.item.clone(), seed.index.clone()];
            vm.iteration = Some(seed);
        }
        vm.frames
            .push(Frame::at(resume.unit.clone(), resume.ops.clone(), resume.start));
        vm.stop = Some((1, resume.end));

        execution::execute_vm(&mut vm)?;

        match vm.updating.pop() {
            Some(OpsFrame::Captured(Some(closed))) => Ok((closed, vm.instructions)),
            _ => Err(WeftError::invalid_state(
                "resume",
                "range did not close where it was recorded",
            )),
        }
    }

    // ==================== State Access ====================

    fn current_frame_mut(&mut self, opcode: &str) -> WeftResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| WeftError::invalid_state(opcode, "no frame is executing"))
    }

    fn current_unit(&self, opcode: &str) -> WeftResult<Arc<TopLevelBlock>> {
        self.frames
            .last()
            .map(|f| f.unit.clone())
            .ok_or_else(|| WeftError::invalid_state(opcode, "no frame is executing"))
    }

    fn current_scope(&self, opcode: &str) -> WeftResult<&Scope> {
        self.scopes
            .last()
            .ok_or_else(|| WeftError::invalid_state(opcode, "scope stack is empty"))
    }

    fn current_scope_mut(&mut self, opcode: &str) -> WeftResult<&mut Scope> {
        self.scopes
            .last_mut()
            .ok_or_else(|| WeftError::invalid_state(opcode, "scope stack is empty"))
    }

    fn pop_reference(&mut self, opcode: &str) -> WeftResult<Reference> {
        match self.stack.pop() {
            Some(StackEntry::Reference(reference)) => Ok(reference),
            Some(StackEntry::Condition(_)) => Err(WeftError::invalid_state(
                opcode,
                "expected a reference, found a condition",
            )),
            None => Err(WeftError::invalid_state(opcode, "evaluation stack is empty")),
        }
    }

    fn pop_condition(&mut self, opcode: &str) -> WeftResult<bool> {
        match self.stack.pop() {
            Some(StackEntry::Condition(condition)) => Ok(condition),
            Some(StackEntry::Reference(_)) => Err(WeftError::invalid_state(
                opcode,
                "expected a condition, found a reference",
            )),
            None => Err(WeftError::invalid_state(opcode, "evaluation stack is empty")),
        }
    }

    /// Add an updating operation to the innermost range being built
    fn record(&mut self, op: UpdatingOp) -> WeftResult<()> {
        match self.updating.last_mut() {
            Some(OpsFrame::Block(ops)) => ops.push(op),
            Some(OpsFrame::Try(block)) => block.children.push(op),
            Some(OpsFrame::Iteration(_, iteration)) => iteration.children.push(op),
            Some(OpsFrame::List(_)) | Some(OpsFrame::Captured(_)) | None => {
                return Err(WeftError::invalid_state(
                    "record",
                    "no open range to record an update in",
                ))
            }
        }
        Ok(())
    }

    /// Hand a closed range to whatever encloses it
    fn attach(&mut self, opcode: &str, closed: Closed) -> WeftResult<()> {
        match (self.updating.last_mut(), closed) {
            (Some(OpsFrame::Captured(slot)), closed) => {
                *slot = Some(closed);
                Ok(())
            }
            (Some(OpsFrame::List(list)), Closed::Iteration(key, iteration)) => {
                if list.iterations.contains_key(&key) {
                    return Err(WeftError::invalid_state(
                        opcode,
                        format!("iteration key '{}' is already in use", key),
                    ));
                }
                list.iterations.insert(key, iteration);
                Ok(())
            }
            (_, Closed::Try(block)) => self.record(UpdatingOp::Try(block)),
            (_, Closed::Iteration(key, _)) => Err(WeftError::invalid_state(
                opcode,
                format!("iteration '{}' closed outside of its list", key),
            )),
        }
    }

    fn resume_state(&self, opcode: &str, start: OpId, end: OpId) -> WeftResult<ResumeState> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| WeftError::invalid_state(opcode, "no frame is executing"))?;
        Ok(ResumeState {
            unit: frame.unit.clone(),
            ops: frame.ops.clone(),
            start,
            end,
            scope: self.current_scope(opcode)?.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::environment::Registry;

    fn iteration(vm: &mut VM<'_>) -> Iteration {
        Iteration {
            bounds: vm.elements.push_tracker(),
            item: cell(Value::Null),
            index: cell(Value::from(0)),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_stray_iteration_names_the_closing_opcode() {
        let env = Registry::new();
        let mut doc = Document::new();
        let root = doc.create_fragment();
        let mut vm = VM::new(&env, &mut doc, root, None);
        vm.updating.push(OpsFrame::Block(Vec::new()));

        let stray = iteration(&mut vm);
        let err = vm
            .attach("Exit", Closed::Iteration("row-1".to_string(), stray))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("at Exit"), "{}", message);
        assert!(message.contains("'row-1'"), "{}", message);
    }
}
