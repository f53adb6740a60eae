//! Scanner: serialized template to live syntax tree
//!
//! Nested blocks are scanned in index order. Because the block-form compiler
//! stores blocks in post-order, every block a statement can reference has
//! already been materialized by the time that statement is read.

use crate::blocks::{BlockId, EntryPoint, InlineBlock, Layout, TopLevelBlock, TopLevelKind};
use crate::environment::Environment;
use crate::error::{WeftError, WeftResult};
use crate::syntax::{Program, StatementSyntax};
use crate::wire::{SerializedTemplate, Statement};
use log::debug;

pub struct Scanner<'a> {
    spec: &'a SerializedTemplate,
    env: &'a dyn Environment,
}

impl<'a> Scanner<'a> {
    pub fn new(spec: &'a SerializedTemplate, env: &'a dyn Environment) -> Self {
        Self { spec, env }
    }

    pub fn scan_entry_point(&self) -> WeftResult<EntryPoint> {
        Ok(EntryPoint::new(self.scan_top(TopLevelKind::EntryPoint)?))
    }

    pub fn scan_layout(&self) -> WeftResult<Layout> {
        let kind = TopLevelKind::Layout {
            named: self.spec.named.clone(),
            yields: self.spec.yields.clone(),
        };
        Ok(Layout::new(self.scan_top(kind)?))
    }

    fn scan_top(&self, kind: TopLevelKind) -> WeftResult<TopLevelBlock> {
        let mut blocks = Vec::with_capacity(self.spec.blocks.len());
        for (index, block) in self.spec.blocks.iter().enumerate() {
            let (program, children) =
                BlockScanner::new(&block.statements, index, self.env).scan()?;
            blocks.push(InlineBlock::new(block.locals.clone(), program, children));
        }

        let (program, children) =
            BlockScanner::new(&self.spec.statements, blocks.len(), self.env).scan()?;
        debug!(
            "scanned {} statements and {} nested blocks",
            program.len(),
            blocks.len()
        );
        Ok(TopLevelBlock::new(
            kind,
            program,
            children,
            blocks,
            self.spec.meta.clone(),
        ))
    }
}

/// Scans one block's statements into its program
pub struct BlockScanner<'a> {
    reader: SyntaxReader<'a>,
    program: Program,
    children: Vec<BlockId>,
}

impl<'a> BlockScanner<'a> {
    /// `available` is the number of nested blocks this block may reference
    pub fn new(statements: &'a [Statement], available: usize, env: &'a dyn Environment) -> Self {
        Self {
            reader: SyntaxReader::new(statements, available, env),
            program: Program::new(),
            children: Vec::new(),
        }
    }

    pub fn scan(mut self) -> WeftResult<(Program, Vec<BlockId>)> {
        while let Some(statement) = self.reader.next()? {
            for scanned in statement.scan(&mut self)? {
                self.program.append(scanned);
            }
        }
        Ok((self.program, self.children))
    }

    pub fn next(&mut self) -> WeftResult<Option<StatementSyntax>> {
        self.reader.next()
    }

    pub fn unput(&mut self, statement: StatementSyntax) -> WeftResult<()> {
        self.reader.unput(statement)
    }

    pub fn add_child(&mut self, block: BlockId) {
        if !self.children.contains(&block) {
            self.children.push(block);
        }
    }
}

/// Statement reader with a single push-back slot
pub struct SyntaxReader<'a> {
    statements: &'a [Statement],
    current: usize,
    available: usize,
    env: &'a dyn Environment,
    pushed: Option<StatementSyntax>,
    unputs: usize,
}

impl<'a> SyntaxReader<'a> {
    pub fn new(statements: &'a [Statement], available: usize, env: &'a dyn Environment) -> Self {
        Self {
            statements,
            current: 0,
            available,
            env,
            pushed: None,
            unputs: 0,
        }
    }

    pub fn next(&mut self) -> WeftResult<Option<StatementSyntax>> {
        if let Some(statement) = self.pushed.take() {
            return Ok(Some(statement));
        }
        let Some(statement) = self.statements.get(self.current) else {
            return Ok(None);
        };
        self.current += 1;
        StatementSyntax::from_spec(statement, self.available, self.env).map(Some)
    }

    /// Push a statement back so the next `next` returns it
    pub fn unput(&mut self, statement: StatementSyntax) -> WeftResult<()> {
        if self.pushed.is_some() {
            return Err(WeftError::malformed_template(format!(
                "cannot push back '{}': a statement is already pending",
                statement.name()
            )));
        }
        self.unputs += 1;
        if self.unputs > self.statements.len() {
            return Err(WeftError::malformed_template(format!(
                "scanner re-processed more statements than the block holds ({})",
                self.statements.len()
            )));
        }
        self.pushed = Some(statement);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{parse_opcodes, TemplateCompiler};
    use crate::environment::Registry;
    use crate::syntax::StatementSyntax;
    use serde_json::json;

    fn serialized(stream: serde_json::Value) -> SerializedTemplate {
        let opcodes = parse_opcodes(&stream.to_string()).unwrap();
        TemplateCompiler::process(&opcodes).unwrap().to_serialized()
    }

    fn names(program: &Program) -> Vec<&'static str> {
        program.iter().map(|(_, s)| s.name()).collect()
    }

    #[test]
    fn test_open_element_desugars() {
        let spec = serialized(json!([
            ["startProgram", {"blockParams": []}],
            ["openElement", "div", null],
            ["literal", "box"],
            ["staticAttr", "class", null],
            ["get", ["title"]],
            ["dynamicAttr", "title", null],
            ["text", "hi"],
            ["closeElement"],
            ["endProgram"]
        ]));
        let env = Registry::new();
        let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
        assert_eq!(
            names(entry.unit().program()),
            vec![
                "openPrimitiveElement",
                "staticAttr",
                "dynamicAttr",
                "flushElement",
                "text",
                "closeElement"
            ]
        );
    }

    #[test]
    fn test_pretty_prints_scanned_program() {
        let spec = serialized(json!([
            ["startProgram", {"blockParams": []}],
            ["openElement", "div", null],
            ["literal", "box"],
            ["staticAttr", "class", null],
            ["get", ["title"]],
            ["dynamicAttr", "title", null],
            ["text", "hi"],
            ["closeElement"],
            ["endProgram"]
        ]));
        let env = Registry::new();
        let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
        assert_eq!(
            crate::syntax::pretty(entry.unit().program()),
            [
                "   0  openPrimitiveElement <div>",
                "   1  staticAttr class=\"box\"",
                "   2  dynamicAttr title=(get title)",
                "   3  flushElement",
                "   4  text \"hi\"",
                "   5  closeElement",
                "",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_element_without_attributes_flushes_immediately() {
        let spec = serialized(json!([
            ["startProgram", {"blockParams": []}],
            ["openElement", "p", null],
            ["closeElement"],
            ["endProgram"]
        ]));
        let env = Registry::new();
        let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
        assert_eq!(
            names(entry.unit().program()),
            vec!["openPrimitiveElement", "flushElement", "closeElement"]
        );
    }

    #[test]
    fn test_children_and_symbol_tables() {
        let spec = serialized(json!([
            ["startProgram", {"blockParams": []}],
            ["startProgram", {"blockParams": ["item"]}],
            ["get", ["item", "name"]],
            ["append", false],
            ["endProgram"],
            ["prepareObject", 0],
            ["get", ["items"]],
            ["prepareArray", 1],
            ["block", ["each"], 0, null],
            ["endProgram"]
        ]));
        let env = Registry::new();
        let entry = Scanner::new(&spec, &env).scan_entry_point().unwrap();
        let unit = entry.unit();
        assert_eq!(unit.children(), &[BlockId::new(0)]);

        let block = &unit.blocks()[0];
        let table = block.table().unwrap();
        assert_eq!(unit.symbols().get_local(table, "item"), Some(1));
        assert!(matches!(
            unit.program().iter().next().map(|(_, s)| s),
            Some(StatementSyntax::Block { .. })
        ));
    }

    #[test]
    fn test_forward_block_reference_is_rejected() {
        let spec = SerializedTemplate::from_json_str(
            &json!({
                "statements": [["block", ["if"], [true], null, 3]],
                "blocks": []
            })
            .to_string(),
        )
        .unwrap();
        let env = Registry::new();
        let err = Scanner::new(&spec, &env).scan_entry_point().unwrap_err();
        assert!(matches!(err, WeftError::MalformedTemplate { .. }));
    }

    #[test]
    fn test_unput_slot_holds_one_statement() {
        let statements = vec![Statement::Text("a".to_string())];
        let env = Registry::new();
        let mut reader = SyntaxReader::new(&statements, 0, &env);
        let first = reader.next().unwrap().unwrap();
        reader.unput(first.clone()).unwrap();
        assert!(reader.unput(first).is_err());
        assert!(matches!(reader.next().unwrap(), Some(StatementSyntax::Text(_))));
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn test_unknown_component_is_unresolved() {
        let spec = serialized(json!([
            ["startProgram", {"blockParams": []}],
            ["prepareObject", 0],
            ["component", "x-missing", null],
            ["endProgram"]
        ]));
        let env = Registry::new();
        let err = Scanner::new(&spec, &env).scan_entry_point().unwrap_err();
        assert!(matches!(err, WeftError::UnresolvedCapability { .. }));
    }
}
