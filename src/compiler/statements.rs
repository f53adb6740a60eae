//! Statement-producing opcode handlers

use super::TemplateCompiler;
use crate::compiler::TemplateOpcode;
use crate::error::WeftResult;
use crate::wire::Statement;

impl TemplateCompiler {
    pub(super) fn text(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let content = opcode.string_arg(0)?;
        self.push(opcode, Statement::Text(content))
    }

    pub(super) fn append(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let trusted = opcode.bool_arg(0)?;
        let value = self.pop_expression(opcode)?;
        self.push(opcode, Statement::Append { value, trusted })
    }

    pub(super) fn comment(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let value = opcode.string_arg(0)?;
        self.push(opcode, Statement::Comment(value))
    }

    pub(super) fn modifier(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let path = opcode.path_arg(0)?;
        let params = self.pop_params(opcode)?;
        let hash = self.pop_hash(opcode)?;
        self.push(opcode, Statement::Modifier { path, params, hash })
    }

    pub(super) fn block(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let path = opcode.path_arg(0)?;
        let template = opcode.index_arg(1)?;
        let inverse = opcode.index_arg(2)?;
        let params = self.pop_params(opcode)?;
        let hash = self.pop_hash(opcode)?;
        self.push(
            opcode,
            Statement::Block {
                path,
                params,
                hash,
                template,
                inverse,
            },
        )
    }

    pub(super) fn component(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let tag = opcode.string_arg(0)?;
        let template = opcode.index_arg(1)?;
        let attrs = self.pop_hash(opcode)?;
        self.push(
            opcode,
            Statement::Component {
                tag,
                attrs,
                template,
            },
        )
    }

    pub(super) fn open_element(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let tag = opcode.string_arg(0)?;
        let block_params = opcode.optional_path_arg(1)?;
        self.push(opcode, Statement::OpenElement { tag, block_params })
    }

    pub(super) fn close_element(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        self.push(opcode, Statement::CloseElement)
    }

    pub(super) fn add_class(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let value = self.pop_expression(opcode)?;
        self.push(opcode, Statement::AddClass(value))
    }

    pub(super) fn static_attr(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let name = opcode.string_arg(0)?;
        let namespace = opcode.optional_string_arg(1)?;
        let value = self.pop_expression(opcode)?;
        self.push(
            opcode,
            Statement::StaticAttr {
                name,
                value,
                namespace,
            },
        )
    }

    pub(super) fn dynamic_attr(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let name = opcode.string_arg(0)?;
        let namespace = opcode.optional_string_arg(1)?;
        let value = self.pop_expression(opcode)?;
        self.push(
            opcode,
            Statement::DynamicAttr {
                name,
                value,
                namespace,
            },
        )
    }

    pub(super) fn dynamic_prop(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let name = opcode.string_arg(0)?;
        let value = self.pop_expression(opcode)?;
        self.push(opcode, Statement::DynamicProp { name, value })
    }

    pub(super) fn yield_to(&mut self, opcode: &TemplateOpcode) -> WeftResult<()> {
        let to = opcode.string_arg(0)?;
        let params = self.pop_params(opcode)?;
        self.push(
            opcode,
            Statement::Yield {
                to: to.clone(),
                params,
            },
        )?;
        self.template.yields.insert(to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{TemplateCompiler, TemplateOpcode};
    use crate::wire::{Expression, Statement};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(body: serde_json::Value) -> crate::compiler::Template {
        let mut stream = vec![json!(["startProgram", {"blockParams": []}])];
        stream.extend(body.as_array().unwrap().iter().cloned());
        stream.push(json!(["endProgram"]));
        let opcodes: Vec<TemplateOpcode> = serde_json::from_value(json!(stream)).unwrap();
        TemplateCompiler::process(&opcodes).unwrap()
    }

    #[test]
    fn test_static_attr_without_namespace() {
        let template = compile(json!([
            ["openElement", "div", null],
            ["literal", "box"],
            ["staticAttr", "class", null],
            ["closeElement"]
        ]));
        let statements: Vec<_> = template
            .to_serialized()
            .statements
            .iter()
            .map(Statement::to_json)
            .collect();
        assert_eq!(
            statements,
            vec![
                json!(["openElement", "div"]),
                json!(["staticAttr", "class", "box"]),
                json!(["closeElement"]),
            ]
        );
    }

    #[test]
    fn test_block_pops_params_then_hash() {
        let template = compile(json!([
            ["prepareObject", 0],
            ["get", ["items"]],
            ["prepareArray", 1],
            ["block", ["each"], 0, null]
        ]));
        assert_eq!(
            template.statements[0],
            Statement::Block {
                path: vec!["each".to_string()],
                params: Some(vec![Expression::Get(vec!["items".to_string()])]),
                hash: Some(Default::default()),
                template: Some(0),
                inverse: None,
            }
        );
        assert_eq!(
            template.statements[0].to_json(),
            json!(["block", ["each"], [["get", ["items"]]], {}, 0])
        );
    }

    #[test]
    fn test_yield_registers_target() {
        let template = compile(json!([
            ["prepareArray", 0],
            ["yield", "default"],
            ["prepareArray", 0],
            ["yield", "default"]
        ]));
        assert_eq!(
            template.yields.iter().collect::<Vec<_>>(),
            vec!["default"]
        );
        assert_eq!(template.statements.len(), 2);
    }
}
