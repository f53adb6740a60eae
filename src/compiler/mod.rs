//! Block-form compiler - converts a flat opcode stream into a Template
//!
//! The compiler keeps two stacks: the blocks currently being built (one per
//! open `startProgram`) and the intermediate values that expression opcodes
//! push before the statement opcode that consumes them.

mod expressions;
pub mod opcode;
mod statements;
pub mod template;

use crate::error::{WeftError, WeftResult};
use crate::wire::{Expression, Hash, Params};
use lazy_static::lazy_static;
use log::{debug, trace};
use std::collections::HashMap;

pub use opcode::{parse_opcodes, TemplateOpcode};
pub use template::{Block, Template};

/// Intermediate value on the compiler's value stack
#[derive(Debug, Clone, PartialEq)]
pub enum StackValue {
    Expr(Expression),
    Params(Params),
    Hash(Hash),
}

type Handler = fn(&mut TemplateCompiler, &TemplateOpcode) -> WeftResult<()>;

lazy_static! {
    /// Opcode name -> handler
    static ref HANDLERS: HashMap<&'static str, Handler> = {
        let mut m: HashMap<&'static str, Handler> = HashMap::new();
        // Nesting
        m.insert("startProgram", TemplateCompiler::start_program);
        m.insert("endProgram", TemplateCompiler::end_program);
        // Statements
        m.insert("text", TemplateCompiler::text);
        m.insert("append", TemplateCompiler::append);
        m.insert("comment", TemplateCompiler::comment);
        m.insert("modifier", TemplateCompiler::modifier);
        m.insert("block", TemplateCompiler::block);
        m.insert("component", TemplateCompiler::component);
        m.insert("openElement", TemplateCompiler::open_element);
        m.insert("closeElement", TemplateCompiler::close_element);
        m.insert("addClass", TemplateCompiler::add_class);
        m.insert("staticAttr", TemplateCompiler::static_attr);
        m.insert("dynamicAttr", TemplateCompiler::dynamic_attr);
        m.insert("dynamicProp", TemplateCompiler::dynamic_prop);
        m.insert("yield", TemplateCompiler::yield_to);
        // Expressions
        m.insert("literal", TemplateCompiler::literal);
        m.insert("unknown", TemplateCompiler::unknown);
        m.insert("attr", TemplateCompiler::attr);
        m.insert("get", TemplateCompiler::get);
        m.insert("concat", TemplateCompiler::concat);
        m.insert("helper", TemplateCompiler::helper);
        // Stack management
        m.insert("pushLiteral", TemplateCompiler::push_literal);
        m.insert("prepareArray", TemplateCompiler::prepare_array);
        m.insert("prepareObject", TemplateCompiler::prepare_object);
        m
    };
}

/// Compiler state for building a Template
pub struct TemplateCompiler {
    template: Template,
    blocks: Vec<Block>,
    values: Vec<StackValue>,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self {
            template: Template::default(),
            blocks: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Compile an opcode stream into a Template
    pub fn process(opcodes: &[TemplateOpcode]) -> WeftResult<Template> {
        let mut compiler = TemplateCompiler::new();
        for opcode in opcodes {
            compiler.dispatch(opcode)?;
        }
        compiler.finish()
    }

    fn dispatch(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        trace!("template opcode {} {:?}", opcode.name, opcode.args);
        let handler = HANDLERS
            .get(opcode.name.as_str())
            .ok_or_else(|| WeftError::unimplemented(opcode.name.clone()))?;
        handler(self, opcode)
    }

    fn finish(self) -> WeftResult<Template> {
        if !self.blocks.is_empty() {
            return Err(WeftError::malformed_opcode(
                "endProgram",
                format!("{} program(s) were never closed", self.blocks.len()),
            ));
        }
        if !self.values.is_empty() {
            return Err(WeftError::malformed_opcode(
                "endProgram",
                format!("{} value(s) left on the stack", self.values.len()),
            ));
        }
        debug!(
            "compiled template: {} statements, {} blocks, named {:?}, yields {:?}",
            self.template.statements.len(),
            self.template.blocks.len(),
            self.template.named,
            self.template.yields
        );
        Ok(self.template)
    }

    // ==================== Nesting ====================

    fn start_program(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let positionals = match opcode.arg(0) {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Object(program) => match program.get("blockParams") {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(serde_json::Value::Array(params)) => params
                    .iter()
                    .map(|p| p.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        WeftError::malformed_opcode(
                            opcode.name.clone(),
                            "blockParams must be strings",
                        )
                    })?,
                Some(_) => {
                    return Err(WeftError::malformed_opcode(
                        opcode.name.clone(),
                        "blockParams must be an array",
                    ))
                }
            },
            _ => {
                return Err(WeftError::malformed_opcode(
                    opcode.name.clone(),
                    "argument 0 must be a program object",
                ))
            }
        };
        self.blocks.push(Block::new(positionals));
        Ok(())
    }

    fn end_program(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let block = self.blocks.pop().ok_or_else(|| {
            WeftError::malformed_opcode(opcode.name.clone(), "no program is open")
        })?;

        if self.blocks.is_empty() {
            self.template.statements = block.statements;
            self.template.positionals = block.positionals;
        } else {
            self.template.blocks.push(block);
        }
        Ok(())
    }

    // ==================== Utilities ====================

    fn push(&mut self, opcode: &TemplateOpcode, statement: crate::wire::Statement) -> WeftResult<()> {
        let current = self.blocks.last_mut().ok_or_else(|| {
            WeftError::malformed_opcode(opcode.name.clone(), "statement outside of a program")
        })?;
        current.push(statement);
        Ok(())
    }

    fn push_value(&mut self, value: StackValue) {
        self.values.push(value);
    }

    fn pop_value(&mut self, opcode: &TemplateOpcode) -> WeftResult<StackValue> {
        self.values
            .pop()
            .ok_or_else(|| WeftError::underflow(opcode.name.clone(), 1, 0))
    }

    fn pop_expression(&mut self, opcode: &TemplateOpcode) -> WeftResult<Expression> {
        match self.pop_value(opcode)? {
            StackValue::Expr(expr) => Ok(expr),
            other => Err(WeftError::malformed_opcode(
                opcode.name.clone(),
                format!("expected an expression on the stack, found {:?}", other),
            )),
        }
    }

    /// Pop positional params; a `null` literal stands for "no params"
    fn pop_params(&mut self, opcode: &TemplateOpcode) -> WeftResult<Option<Params>> {
        match self.pop_value(opcode)? {
            StackValue::Params(params) => Ok(Some(params)),
            StackValue::Expr(expr) if expr.is_null_literal() => Ok(None),
            other => Err(WeftError::malformed_opcode(
                opcode.name.clone(),
                format!("expected params on the stack, found {:?}", other),
            )),
        }
    }

    /// Pop a hash; a `null` literal stands for "no hash"
    fn pop_hash(&mut self, opcode: &TemplateOpcode) -> WeftResult<Option<Hash>> {
        match self.pop_value(opcode)? {
            StackValue::Hash(hash) => Ok(Some(hash)),
            StackValue::Expr(expr) if expr.is_null_literal() => Ok(None),
            other => Err(WeftError::malformed_opcode(
                opcode.name.clone(),
                format!("expected a hash on the stack, found {:?}", other),
            )),
        }
    }

    fn require(&self, opcode: &TemplateOpcode, count: usize) -> WeftResult<()> {
        if self.values.len() < count {
            return Err(WeftError::underflow(
                opcode.name.clone(),
                count,
                self.values.len(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Statement;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ops(source: serde_json::Value) -> Vec<TemplateOpcode> {
        serde_json::from_value(source).unwrap()
    }

    #[test]
    fn test_single_text_program() {
        let template = TemplateCompiler::process(&ops(json!([
            ["startProgram", {"blockParams": []}],
            ["text", "hi"],
            ["endProgram"]
        ])))
        .unwrap();

        let serialized = template.to_serialized();
        assert_eq!(serialized.statements, vec![Statement::Text("hi".to_string())]);
        assert!(serialized.locals.is_empty());
        assert!(serialized.named.is_empty());
        assert!(serialized.yields.is_empty());
        assert!(serialized.blocks.is_empty());
    }

    #[test]
    fn test_prepare_array_pops_in_lifo_order() {
        let mut compiler = TemplateCompiler::new();
        for opcode in ops(json!([
            ["pushLiteral", "a"],
            ["pushLiteral", "b"],
            ["prepareArray", 2]
        ])) {
            compiler.dispatch(&opcode).unwrap();
        }
        assert_eq!(
            compiler.values,
            vec![StackValue::Params(vec![
                Expression::Literal(json!("b")),
                Expression::Literal(json!("a")),
            ])]
        );
    }

    #[test]
    fn test_prepare_object_pairs_key_then_value() {
        let mut compiler = TemplateCompiler::new();
        for opcode in ops(json!([
            ["get", ["id"]],
            ["pushLiteral", "key"],
            ["prepareObject", 1]
        ])) {
            compiler.dispatch(&opcode).unwrap();
        }
        let mut hash = Hash::new();
        hash.insert("key".to_string(), Expression::Get(vec!["id".to_string()]));
        assert_eq!(compiler.values, vec![StackValue::Hash(hash)]);
    }

    #[test]
    fn test_stack_underflow() {
        let err = TemplateCompiler::process(&ops(json!([
            ["startProgram", {"blockParams": []}],
            ["pushLiteral", "a"],
            ["prepareArray", 2]
        ])))
        .unwrap_err();
        assert!(matches!(
            err,
            WeftError::StackUnderflow { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_unimplemented_opcode() {
        let err = TemplateCompiler::process(&ops(json!([
            ["startProgram", {"blockParams": []}],
            ["shout", "hi"]
        ])))
        .unwrap_err();
        assert!(matches!(err, WeftError::UnimplementedOpcode { ref opcode } if opcode == "shout"));
    }

    #[test]
    fn test_leftover_values_are_rejected() {
        let err = TemplateCompiler::process(&ops(json!([
            ["startProgram", {"blockParams": []}],
            ["pushLiteral", "dangling"],
            ["endProgram"]
        ])))
        .unwrap_err();
        assert!(matches!(err, WeftError::MalformedOpcode { .. }));
    }

    #[test]
    fn test_nested_blocks_are_post_ordered() {
        let template = TemplateCompiler::process(&ops(json!([
            ["startProgram", {"blockParams": []}],
            ["startProgram", {"blockParams": ["item"]}],
            ["startProgram", {"blockParams": []}],
            ["text", "inner"],
            ["endProgram"],
            ["text", "outer"],
            ["endProgram"],
            ["endProgram"]
        ])))
        .unwrap();

        assert_eq!(template.blocks.len(), 2);
        assert_eq!(template.blocks[0].statements, vec![Statement::Text("inner".to_string())]);
        assert_eq!(template.blocks[1].positionals, vec!["item".to_string()]);
        assert!(template.statements.is_empty());
    }
}
