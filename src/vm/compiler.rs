//! Block compilers: lower scanned programs into `OpSeq`s
//!
//! Every statement lowers itself through an `OpBuilder`, consulting the
//! `BlockContext` for symbol slots and host capabilities. The builder emits
//! at a cursor, which lets control flow be laid out as a skeleton of labels
//! first and filled in afterwards, so no jump ever needs patching.

use super::opcode::{splice_ops, OpId, OpSeq, Opcode};
use crate::blocks::{BlockId, InlineBlock, TopLevelBlock, TopLevelKind};
use crate::environment::Environment;
use crate::error::{SymbolKind, WeftError, WeftResult};
use crate::symbol_table::TableId;
use crate::syntax::{Program, StatementSyntax};
use log::trace;

/// What a statement sees while it lowers itself
pub struct BlockContext<'a> {
    pub unit: &'a TopLevelBlock,
    pub table: TableId,
    pub env: &'a dyn Environment,
}

impl<'a> BlockContext<'a> {
    pub fn new(unit: &'a TopLevelBlock, table: TableId, env: &'a dyn Environment) -> Self {
        Self { unit, table, env }
    }

    pub fn local_symbol(&self, name: &str) -> Option<usize> {
        self.unit.symbols().get_local(self.table, name)
    }

    pub fn named_symbol(&self, name: &str) -> WeftResult<usize> {
        self.unit
            .symbols()
            .get_named(self.table, name)
            .ok_or_else(|| WeftError::unresolved_symbol(SymbolKind::Named, name))
    }

    pub fn yield_symbol(&self, name: &str) -> WeftResult<usize> {
        self.unit
            .symbols()
            .get_yield(self.table, name)
            .ok_or_else(|| WeftError::unresolved_symbol(SymbolKind::Yield, name))
    }

    pub fn child(&self, id: BlockId) -> WeftResult<&'a InlineBlock> {
        self.unit.block(id)
    }

    /// Compile a referenced nested block ahead of execution
    pub fn compile_child(&self, id: BlockId) -> WeftResult<()> {
        self.unit.compile_block(id, self.env).map(|_| ())
    }
}

/// Cursor-based opcode emitter
#[derive(Debug, Default)]
pub struct OpBuilder {
    ops: OpSeq,
    cursor: Option<OpId>,
}

impl OpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the cursor (the end, unless inside `before`)
    pub fn emit(&mut self, op: Opcode) -> OpId {
        self.ops.insert_before(op, self.cursor)
    }

    pub fn emit_before(&mut self, op: Opcode, reference: OpId) -> OpId {
        self.ops.insert_before(op, Some(reference))
    }

    pub fn label(&mut self, name: &str) -> OpId {
        self.emit(Opcode::Label(name.to_string()))
    }

    /// Run `f` with the cursor moved in front of `reference`
    pub fn before<R>(
        &mut self,
        reference: OpId,
        f: impl FnOnce(&mut Self) -> WeftResult<R>,
    ) -> WeftResult<R> {
        let saved = self.cursor.replace(reference);
        let result = f(self);
        self.cursor = saved;
        result
    }

    pub fn splice(&mut self, source: &OpSeq) {
        splice_ops(&mut self.ops, source, self.cursor);
    }

    pub fn finish(self) -> OpSeq {
        self.ops
    }
}

fn compile_statements<'s>(
    ctx: &BlockContext<'_>,
    statements: impl IntoIterator<Item = &'s StatementSyntax>,
    builder: &mut OpBuilder,
) -> WeftResult<()> {
    for statement in statements {
        trace!("lowering {}", statement.name());
        statement.compile(builder, ctx)?;
    }
    Ok(())
}

fn program_statements(program: &Program) -> impl Iterator<Item = &StatementSyntax> {
    program.iter().map(|(_, s)| s)
}

pub struct InlineBlockCompiler<'a> {
    ctx: &'a BlockContext<'a>,
}

impl<'a> InlineBlockCompiler<'a> {
    pub fn new(ctx: &'a BlockContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn compile(&self, block: &InlineBlock) -> WeftResult<OpSeq> {
        let mut builder = OpBuilder::new();
        let scoped = block.has_positional_parameters();
        if scoped {
            let symbols = block
                .locals
                .iter()
                .map(|name| {
                    self.ctx
                        .local_symbol(name)
                        .ok_or_else(|| WeftError::unresolved_symbol(SymbolKind::Local, name))
                })
                .collect::<WeftResult<Vec<_>>>()?;
            builder.emit(Opcode::PushChildScope);
            builder.emit(Opcode::BindPositionalArgs(symbols));
        }
        compile_statements(self.ctx, program_statements(&block.program), &mut builder)?;
        if scoped {
            builder.emit(Opcode::PopScope);
        }
        Ok(builder.finish())
    }
}

pub struct EntryPointCompiler<'a> {
    ctx: &'a BlockContext<'a>,
}

impl<'a> EntryPointCompiler<'a> {
    pub fn new(ctx: &'a BlockContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn compile(&self, program: &Program) -> WeftResult<OpSeq> {
        let mut builder = OpBuilder::new();
        compile_statements(self.ctx, program_statements(program), &mut builder)?;
        Ok(builder.finish())
    }
}

/// A layout's root element split around the point where the invoking
/// component's attributes are applied
#[derive(Debug)]
pub struct LayoutParts {
    pub tag: String,
    /// Attribute and modifier setup of the root element
    pub preamble: OpSeq,
    /// Root element body
    pub main: OpSeq,
}

pub struct LayoutCompiler<'a> {
    ctx: &'a BlockContext<'a>,
}

impl<'a> LayoutCompiler<'a> {
    pub fn new(ctx: &'a BlockContext<'a>) -> Self {
        Self { ctx }
    }

    /// Split a layout program into tag, preamble and body.
    ///
    /// Layouts that do not start with an element have no parts. Layouts that
    /// do must consist of exactly that one element.
    pub fn parts(&self, program: &Program) -> WeftResult<Option<LayoutParts>> {
        let statements: Vec<&StatementSyntax> = program_statements(program).collect();
        let tag = match statements.first() {
            Some(StatementSyntax::OpenPrimitiveElement { tag }) => tag.clone(),
            _ => return Ok(None),
        };

        let mut position = 1;
        let mut preamble = OpBuilder::new();
        while let Some(statement) = statements.get(position) {
            if !statement.is_element_operation() {
                break;
            }
            statement.compile(&mut preamble, self.ctx)?;
            position += 1;
        }

        if !matches!(statements.get(position), Some(StatementSyntax::FlushElement)) {
            return Err(WeftError::malformed_template(format!(
                "layout root <{}> is not flushed after its attributes",
                tag
            )));
        }
        position += 1;

        let body_end = statements.len() - 1;
        if body_end < position || !matches!(statements[body_end], StatementSyntax::CloseElement) {
            return Err(WeftError::malformed_template(format!(
                "layout must end by closing its root <{}>",
                tag
            )));
        }
        let body = &statements[position..body_end];
        let mut depth = 0usize;
        for statement in body {
            match statement {
                StatementSyntax::OpenPrimitiveElement { .. } => depth += 1,
                StatementSyntax::CloseElement => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        WeftError::malformed_template("layout must have a single root element")
                    })?;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(WeftError::malformed_template(format!(
                "unclosed element inside layout root <{}>",
                tag
            )));
        }

        let mut main = OpBuilder::new();
        compile_statements(self.ctx, body.iter().copied(), &mut main)?;

        Ok(Some(LayoutParts {
            tag,
            preamble: preamble.finish(),
            main: main.finish(),
        }))
    }

    /// Final layout sequence: argument binding, then the root element with
    /// the invoking component's attributes shadowing the preamble
    pub fn assemble(&self, parts: Option<&LayoutParts>, program: &Program) -> WeftResult<OpSeq> {
        let mut builder = OpBuilder::new();

        if let TopLevelKind::Layout { named, yields } = self.ctx.unit.kind() {
            if !named.is_empty() {
                let pairs = named
                    .iter()
                    .map(|n| Ok((n.clone(), self.ctx.named_symbol(n)?)))
                    .collect::<WeftResult<Vec<_>>>()?;
                builder.emit(Opcode::BindNamedArgs(pairs));
            }
            if !yields.is_empty() {
                let pairs = yields
                    .iter()
                    .map(|n| Ok((n.clone(), self.ctx.yield_symbol(n)?)))
                    .collect::<WeftResult<Vec<_>>>()?;
                builder.emit(Opcode::BindBlocks(pairs));
            }
        }

        match parts {
            Some(parts) => {
                builder.emit(Opcode::OpenPrimitiveElement(parts.tag.clone()));
                builder.splice(&parts.preamble);
                builder.emit(Opcode::ShadowAttributes);
                builder.emit(Opcode::FlushElement);
                builder.splice(&parts.main);
                builder.emit(Opcode::CloseElement);
            }
            None => compile_statements(self.ctx, program_statements(program), &mut builder)?,
        }
        Ok(builder.finish())
    }
}
