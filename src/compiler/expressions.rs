//! Expression and stack-management opcode handlers

use super::{StackValue, TemplateCompiler};
use crate::compiler::TemplateOpcode;
use crate::error::{WeftError, WeftResult};
use crate::wire::{Expression, Hash};
use serde_json::Value;

impl TemplateCompiler {
    pub(super) fn literal(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let value = scalar(opcode, 0)?;
        self.push_value(StackValue::Expr(Expression::Literal(value)));
        Ok(())
    }

    pub(super) fn unknown(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let path = opcode.path_arg(0)?;
        self.push_value(StackValue::Expr(Expression::Unknown(path)));
        Ok(())
    }

    pub(super) fn attr(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let path = opcode.path_arg(0)?;
        self.template.named.insert(path[0].clone());
        self.push_value(StackValue::Expr(Expression::Attr(path)));
        Ok(())
    }

    pub(super) fn get(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let path = opcode.path_arg(0)?;
        self.push_value(StackValue::Expr(Expression::Get(path)));
        Ok(())
    }

    pub(super) fn concat(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let parts = self.pop_params(opcode)?.unwrap_or_default();
        self.push_value(StackValue::Expr(Expression::Concat(parts)));
        Ok(())
    }

    pub(super) fn helper(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let path = opcode.path_arg(0)?;
        let params = self.pop_params(opcode)?.unwrap_or_default();
        let hash = self.pop_hash(opcode)?.unwrap_or_default();
        self.push_value(StackValue::Expr(Expression::Helper { path, params, hash }));
        Ok(())
    }

    // ==================== Stack Management ====================

    pub(super) fn push_literal(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        self.literal(opcode)
    }

    pub(super) fn prepare_array(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let size = opcode.count_arg(0)?;
        self.require(opcode, size)?;

        let mut values = Vec::with_capacity(size);
        for _ in 0..size {
            values.push(self.pop_expression(opcode)?);
        }

        self.push_value(StackValue::Params(values));
        Ok(())
    }

    pub(super) fn prepare_object(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let size = opcode.count_arg(0)?;
        self.require(opcode, size * 2)?;

        let mut object = Hash::with_capacity(size);
        for _ in 0..size {
            let key = match self.pop_expression(opcode)? {
                Expression::Literal(Value::String(key)) => key,
                other => {
                    return Err(WeftError::malformed_opcode(
                        opcode.name.clone(),
                        format!("hash key must be a string literal, found {:?}", other),
                    ))
                }
            };
            let value = self.pop_expression(opcode)?;
            object.insert(key, value);
        }

        self.push_value(StackValue::Hash(object));
        Ok(())
    }
}

fn scalar(opcode: &TemplateOpcode, i: usize) -> WeftResult<Value> {
    match opcode.arg(i) {
        v @ (Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)) => Ok(v.clone()),
        other => Err(WeftError::malformed_opcode(
            opcode.name.clone(),
            format!("literal must be a scalar, found {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{TemplateCompiler, TemplateOpcode};
    use crate::wire::{Expression, Statement};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn process(stream: serde_json::Value) -> crate::error::WeftResult<crate::compiler::Template> {
        let opcodes: Vec<TemplateOpcode> = serde_json::from_value(stream).unwrap();
        TemplateCompiler::process(&opcodes)
    }

    #[test]
    fn test_attr_registers_named_parameter() {
        let template = process(json!([
            ["startProgram", {"blockParams": []}],
            ["attr", ["name"]],
            ["append", false],
            ["attr", ["name", "first"]],
            ["append", false],
            ["endProgram"]
        ]))
        .unwrap();

        assert_eq!(template.named.iter().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(
            template.statements[0],
            Statement::Append {
                value: Expression::Attr(vec!["name".to_string()]),
                trusted: false,
            }
        );
    }

    #[test]
    fn test_helper_with_params_and_hash() {
        let template = process(json!([
            ["startProgram", {"blockParams": []}],
            ["literal", "!"],
            ["pushLiteral", "suffix"],
            ["prepareObject", 1],
            ["get", ["name"]],
            ["prepareArray", 1],
            ["helper", ["shout"]],
            ["append", false],
            ["endProgram"]
        ]))
        .unwrap();

        assert_eq!(
            template.statements[0].to_json(),
            json!(["append", ["helper", ["shout"], [["get", ["name"]]], {"suffix": "!"}], false])
        );
    }

    #[test]
    fn test_prepare_object_underflow_counts_pairs() {
        let err = process(json!([
            ["startProgram", {"blockParams": []}],
            ["pushLiteral", "key"],
            ["prepareObject", 1]
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            crate::error::WeftError::StackUnderflow { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_concat_parts() {
        let template = process(json!([
            ["startProgram", {"blockParams": []}],
            ["get", ["last"]],
            ["literal", " "],
            ["get", ["first"]],
            ["prepareArray", 3],
            ["concat"],
            ["dynamicAttr", "title", null],
            ["endProgram"]
        ]))
        .unwrap();
        assert_eq!(
            template.statements[0].to_json(),
            json!(["dynamicAttr", "title", ["concat", [["get", ["first"]], " ", ["get", ["last"]]]]])
        );
    }
}
