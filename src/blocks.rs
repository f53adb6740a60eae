//! Scanned blocks and their lazily compiled instruction lists
//!
//! A scanned template is a `TopLevelBlock`: its own program plus every nested
//! `InlineBlock`, addressed by `BlockId`. The top-level block is either an
//! entry point (a render root) or a component layout; `EntryPoint` and
//! `Layout` are thin shared handles over it. Each block compiles at most
//! once; the result is cached in a `OnceCell`.

use crate::dom::{DomBackend, NodeRef};
use crate::environment::Environment;
use crate::error::{WeftError, WeftResult};
use crate::symbol_table::{SymbolTables, TableId};
use crate::syntax::Program;
use crate::vm::compiler::{
    BlockContext, EntryPointCompiler, InlineBlockCompiler, LayoutCompiler, LayoutParts,
};
use crate::vm::opcode::OpSeq;
use crate::vm::{RenderResult, VM};
use indexmap::IndexMap;
use log::debug;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::Arc;

/// Index of a nested block within its top-level template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

impl BlockId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Uncompiled,
    Compiled,
}

fn state_of<T>(cell: &OnceCell<T>) -> CompileState {
    if cell.get().is_some() {
        CompileState::Compiled
    } else {
        CompileState::Uncompiled
    }
}

/// A nested block: the body of a conditional, loop or component invocation
#[derive(Debug)]
pub struct InlineBlock {
    pub locals: Vec<String>,
    pub program: Program,
    pub children: Vec<BlockId>,
    table: Option<TableId>,
    ops: OnceCell<Arc<OpSeq>>,
}

impl InlineBlock {
    pub(crate) fn new(locals: Vec<String>, program: Program, children: Vec<BlockId>) -> Self {
        Self {
            locals,
            program,
            children,
            table: None,
            ops: OnceCell::new(),
        }
    }

    pub fn has_positional_parameters(&self) -> bool {
        !self.locals.is_empty()
    }

    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    pub fn compile_state(&self) -> CompileState {
        state_of(&self.ops)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevelKind {
    EntryPoint,
    Layout {
        named: Vec<String>,
        yields: Vec<String>,
    },
}

#[derive(Debug)]
pub struct TopLevelBlock {
    kind: TopLevelKind,
    program: Program,
    children: Vec<BlockId>,
    blocks: Vec<InlineBlock>,
    symbols: SymbolTables,
    table: TableId,
    meta: Option<Value>,
    ops: OnceCell<Arc<OpSeq>>,
    parts: OnceCell<Option<LayoutParts>>,
}

impl TopLevelBlock {
    /// Assemble a scanned template and assign every block its symbol table
    pub(crate) fn new(
        kind: TopLevelKind,
        program: Program,
        children: Vec<BlockId>,
        mut blocks: Vec<InlineBlock>,
        meta: Option<Value>,
    ) -> Self {
        let (mut symbols, table) = match &kind {
            TopLevelKind::EntryPoint => SymbolTables::for_entry_point(),
            TopLevelKind::Layout { named, yields } => SymbolTables::for_layout(named, yields),
        };

        let mut pending: Vec<(BlockId, TableId)> =
            children.iter().rev().map(|c| (*c, table)).collect();
        while let Some((id, parent)) = pending.pop() {
            let Some(block) = blocks.get_mut(id.index()) else {
                continue;
            };
            if block.table.is_some() {
                continue;
            }
            let own = symbols.init_for_block(parent, &block.locals);
            block.table = Some(own);
            pending.extend(block.children.iter().rev().map(|c| (*c, own)));
        }

        Self {
            kind,
            program,
            children,
            blocks,
            symbols,
            table,
            meta,
            ops: OnceCell::new(),
            parts: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> &TopLevelKind {
        &self.kind
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    pub fn blocks(&self) -> &[InlineBlock] {
        &self.blocks
    }

    pub fn symbols(&self) -> &SymbolTables {
        &self.symbols
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn block(&self, id: BlockId) -> WeftResult<&InlineBlock> {
        self.blocks.get(id.index()).ok_or_else(|| {
            WeftError::malformed_template(format!("no block with index {}", id.index()))
        })
    }

    pub fn compile_state(&self) -> CompileState {
        state_of(&self.ops)
    }

    /// Compile a nested block, once
    pub fn compile_block(&self, id: BlockId, env: &dyn Environment) -> WeftResult<Arc<OpSeq>> {
        let block = self.block(id)?;
        let ops = block.ops.get_or_try_init(|| {
            let table = block.table.ok_or_else(|| {
                WeftError::malformed_template(format!(
                    "block {} is not referenced by any statement",
                    id.index()
                ))
            })?;
            debug!("compiling block {}", id.index());
            let ctx = BlockContext::new(self, table, env);
            InlineBlockCompiler::new(&ctx).compile(block).map(Arc::new)
        })?;
        Ok(ops.clone())
    }

    /// Compile the top-level program, once
    pub fn compile(&self, env: &dyn Environment) -> WeftResult<Arc<OpSeq>> {
        let ops = self.ops.get_or_try_init(|| {
            let ctx = BlockContext::new(self, self.table, env);
            let ops = match &self.kind {
                TopLevelKind::EntryPoint => {
                    debug!("compiling entry point");
                    EntryPointCompiler::new(&ctx).compile(&self.program)?
                }
                TopLevelKind::Layout { .. } => {
                    debug!("compiling layout");
                    let parts = self.layout_parts(env)?;
                    LayoutCompiler::new(&ctx).assemble(parts, &self.program)?
                }
            };
            Ok::<_, WeftError>(Arc::new(ops))
        })?;
        Ok(ops.clone())
    }

    /// Tag, preamble and body of a layout whose program is one root element
    fn layout_parts(&self, env: &dyn Environment) -> WeftResult<Option<&LayoutParts>> {
        let parts = self.parts.get_or_try_init(|| {
            let ctx = BlockContext::new(self, self.table, env);
            LayoutCompiler::new(&ctx).parts(&self.program)
        })?;
        Ok(parts.as_ref())
    }
}

/// A top-level template rendered as the root of an output tree
#[derive(Debug, Clone)]
pub struct EntryPoint(Arc<TopLevelBlock>);

impl EntryPoint {
    pub(crate) fn new(unit: TopLevelBlock) -> Self {
        Self(Arc::new(unit))
    }

    pub fn unit(&self) -> &Arc<TopLevelBlock> {
        &self.0
    }

    pub fn compile(&self, env: &dyn Environment) -> WeftResult<Arc<OpSeq>> {
        self.0.compile(env)
    }

    pub fn compile_state(&self) -> CompileState {
        self.0.compile_state()
    }

    /// Render into `parent` with `self_value` as the template's `this`
    pub fn render(
        &self,
        env: &dyn Environment,
        dom: &mut dyn DomBackend,
        parent: NodeRef,
        self_value: Value,
    ) -> WeftResult<RenderResult> {
        VM::render_entry_point(env, dom, &self.0, parent, self_value)
    }
}

/// A component's template
#[derive(Debug, Clone)]
pub struct Layout(Arc<TopLevelBlock>);

impl Layout {
    pub(crate) fn new(unit: TopLevelBlock) -> Self {
        Self(Arc::new(unit))
    }

    pub fn unit(&self) -> &Arc<TopLevelBlock> {
        &self.0
    }

    pub fn named(&self) -> &[String] {
        match self.0.kind() {
            TopLevelKind::Layout { named, .. } => named,
            TopLevelKind::EntryPoint => &[],
        }
    }

    pub fn yields(&self) -> &[String] {
        match self.0.kind() {
            TopLevelKind::Layout { yields, .. } => yields,
            TopLevelKind::EntryPoint => &[],
        }
    }

    pub fn has_named_parameters(&self) -> bool {
        !self.named().is_empty()
    }

    pub fn has_yields(&self) -> bool {
        !self.yields().is_empty()
    }

    pub fn compile(&self, env: &dyn Environment) -> WeftResult<Arc<OpSeq>> {
        self.0.compile(env)
    }

    pub fn compile_state(&self) -> CompileState {
        self.0.compile_state()
    }

    /// Tag/preamble/body decomposition, `None` for layouts without a single
    /// root element
    pub fn parts(&self, env: &dyn Environment) -> WeftResult<Option<&LayoutParts>> {
        self.0.layout_parts(env)
    }

    /// Render as a root with the given named arguments
    pub fn render(
        &self,
        env: &dyn Environment,
        dom: &mut dyn DomBackend,
        parent: NodeRef,
        args: IndexMap<String, Value>,
    ) -> WeftResult<RenderResult> {
        VM::render_layout(env, dom, &self.0, parent, args)
    }
}
