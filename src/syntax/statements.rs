//! Statement syntax nodes
//!
//! Built from serialized statements by the scanner, desugared by `scan`,
//! and lowered into opcodes by `compile`.

use super::expressions::{ArgsSyntax, ExpressionSyntax};
use crate::blocks::BlockId;
use crate::environment::{ComponentDefinition, Environment, Modifier};
use crate::error::{CapabilityKind, WeftError, WeftResult};
use crate::scanner::BlockScanner;
use crate::vm::compiler::{BlockContext, OpBuilder};
use crate::vm::expressions::{to_text, CompiledArgs, CompiledExpr};
use crate::vm::opcode::{ComponentInvocation, KeyPath, Opcode};
use crate::wire::{Hash, Path, Statement};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum StatementSyntax {
    Text(String),
    Comment(String),
    Append {
        value: ExpressionSyntax,
        trusted: bool,
    },
    Modifier {
        modifier: Modifier,
        args: ArgsSyntax,
    },
    Block {
        path: Path,
        args: ArgsSyntax,
        template: Option<BlockId>,
        inverse: Option<BlockId>,
    },
    Component {
        definition: Arc<ComponentDefinition>,
        attrs: IndexMap<String, ExpressionSyntax>,
        template: Option<BlockId>,
    },
    OpenElement {
        tag: String,
        block_params: Vec<String>,
    },
    OpenPrimitiveElement {
        tag: String,
    },
    FlushElement,
    CloseElement,
    AddClass(ExpressionSyntax),
    StaticAttr {
        name: String,
        value: ExpressionSyntax,
        namespace: Option<String>,
    },
    DynamicAttr {
        name: String,
        value: ExpressionSyntax,
        namespace: Option<String>,
    },
    DynamicProp {
        name: String,
        value: ExpressionSyntax,
    },
    Yield {
        to: String,
        args: ArgsSyntax,
    },
}

impl fmt::Display for StatementSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            StatementSyntax::Text(text) | StatementSyntax::Comment(text) => {
                write!(f, " {:?}", text)
            }
            StatementSyntax::Append { value, trusted } => {
                write!(f, " {}", value)?;
                if *trusted {
                    write!(f, " trusted")?;
                }
                Ok(())
            }
            StatementSyntax::Modifier { modifier, args } => {
                write!(f, " {}{}", modifier.name, args)
            }
            StatementSyntax::Block {
                path,
                args,
                template,
                inverse,
            } => {
                write!(f, " {}{}", path.join("."), args)?;
                if let Some(template) = template {
                    write!(f, " template=#{}", template.index())?;
                }
                if let Some(inverse) = inverse {
                    write!(f, " inverse=#{}", inverse.index())?;
                }
                Ok(())
            }
            StatementSyntax::Component {
                definition,
                attrs,
                template,
            } => {
                write!(f, " <{}>", definition.name)?;
                for (name, value) in attrs {
                    write!(f, " {}={}", name, value)?;
                }
                if let Some(template) = template {
                    write!(f, " template=#{}", template.index())?;
                }
                Ok(())
            }
            StatementSyntax::OpenElement { tag, block_params } => {
                write!(f, " <{}>", tag)?;
                if !block_params.is_empty() {
                    write!(f, " as |{}|", block_params.join(" "))?;
                }
                Ok(())
            }
            StatementSyntax::OpenPrimitiveElement { tag } => write!(f, " <{}>", tag),
            StatementSyntax::FlushElement | StatementSyntax::CloseElement => Ok(()),
            StatementSyntax::AddClass(value) => write!(f, " {}", value),
            StatementSyntax::StaticAttr {
                name,
                value,
                namespace,
            }
            | StatementSyntax::DynamicAttr {
                name,
                value,
                namespace,
            } => match namespace {
                Some(ns) => write!(f, " {}:{}={}", ns, name, value),
                None => write!(f, " {}={}", name, value),
            },
            StatementSyntax::DynamicProp { name, value } => write!(f, " {}={}", name, value),
            StatementSyntax::Yield { to, args } => write!(f, " to={}{}", to, args),
        }
    }
}

/// Borrowed view of an attribute-like statement
#[derive(Debug, Clone, Copy)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: &'a ExpressionSyntax,
    pub namespace: Option<&'a str>,
}

fn block_ref(index: Option<usize>, available: usize) -> WeftResult<Option<BlockId>> {
    match index {
        None => Ok(None),
        Some(i) if i < available => Ok(Some(BlockId::new(i))),
        Some(i) => Err(WeftError::malformed_template(format!(
            "statement references block {} but only {} blocks precede it",
            i, available
        ))),
    }
}

fn hash_syntax(hash: Option<&Hash>) -> IndexMap<String, ExpressionSyntax> {
    hash.map(|h| {
        h.iter()
            .map(|(k, v)| (k.clone(), ExpressionSyntax::from_spec(v)))
            .collect()
    })
    .unwrap_or_default()
}

impl StatementSyntax {
    /// Build the live node for a serialized statement. `available` is the
    /// number of nested blocks already materialized.
    pub fn from_spec(
        statement: &Statement,
        available: usize,
        env: &dyn Environment,
    ) -> WeftResult<Self> {
        let syntax = match statement {
            Statement::Text(s) => StatementSyntax::Text(s.clone()),
            Statement::Comment(s) => StatementSyntax::Comment(s.clone()),
            Statement::Append { value, trusted } => StatementSyntax::Append {
                value: ExpressionSyntax::from_spec(value),
                trusted: *trusted,
            },
            Statement::Modifier { path, params, hash } => StatementSyntax::Modifier {
                modifier: env.lookup_modifier(path).ok_or_else(|| {
                    WeftError::unresolved_capability(CapabilityKind::Modifier, path.join("."))
                })?,
                args: ArgsSyntax::from_spec(params.as_ref(), hash.as_ref()),
            },
            Statement::Block {
                path,
                params,
                hash,
                template,
                inverse,
            } => StatementSyntax::Block {
                path: path.clone(),
                args: ArgsSyntax::from_spec(params.as_ref(), hash.as_ref()),
                template: block_ref(*template, available)?,
                inverse: block_ref(*inverse, available)?,
            },
            Statement::Component {
                tag,
                attrs,
                template,
            } => StatementSyntax::Component {
                definition: env.lookup_component(tag).ok_or_else(|| {
                    WeftError::unresolved_capability(CapabilityKind::Component, tag.clone())
                })?,
                attrs: hash_syntax(attrs.as_ref()),
                template: block_ref(*template, available)?,
            },
            Statement::OpenElement { tag, block_params } => StatementSyntax::OpenElement {
                tag: tag.clone(),
                block_params: block_params.clone().unwrap_or_default(),
            },
            Statement::CloseElement => StatementSyntax::CloseElement,
            Statement::AddClass(value) => {
                StatementSyntax::AddClass(ExpressionSyntax::from_spec(value))
            }
            Statement::StaticAttr {
                name,
                value,
                namespace,
            } => StatementSyntax::StaticAttr {
                name: name.clone(),
                value: ExpressionSyntax::from_spec(value),
                namespace: namespace.clone(),
            },
            Statement::DynamicAttr {
                name,
                value,
                namespace,
            } => StatementSyntax::DynamicAttr {
                name: name.clone(),
                value: ExpressionSyntax::from_spec(value),
                namespace: namespace.clone(),
            },
            Statement::DynamicProp { name, value } => StatementSyntax::DynamicProp {
                name: name.clone(),
                value: ExpressionSyntax::from_spec(value),
            },
            Statement::Yield { to, params } => StatementSyntax::Yield {
                to: to.clone(),
                args: ArgsSyntax::from_spec(params.as_ref(), None),
            },
        };
        Ok(syntax)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatementSyntax::Text(_) => "text",
            StatementSyntax::Comment(_) => "comment",
            StatementSyntax::Append { .. } => "append",
            StatementSyntax::Modifier { .. } => "modifier",
            StatementSyntax::Block { .. } => "block",
            StatementSyntax::Component { .. } => "component",
            StatementSyntax::OpenElement { .. } => "openElement",
            StatementSyntax::OpenPrimitiveElement { .. } => "openPrimitiveElement",
            StatementSyntax::FlushElement => "flushElement",
            StatementSyntax::CloseElement => "closeElement",
            StatementSyntax::AddClass(_) => "addClass",
            StatementSyntax::StaticAttr { .. } => "staticAttr",
            StatementSyntax::DynamicAttr { .. } => "dynamicAttr",
            StatementSyntax::DynamicProp { .. } => "dynamicProp",
            StatementSyntax::Yield { .. } => "yield",
        }
    }

    pub fn as_attribute(&self) -> Option<Attribute<'_>> {
        match self {
            StatementSyntax::StaticAttr {
                name,
                value,
                namespace,
            }
            | StatementSyntax::DynamicAttr {
                name,
                value,
                namespace,
            } => Some(Attribute {
                name,
                value,
                namespace: namespace.as_deref(),
            }),
            StatementSyntax::DynamicProp { name, value } => Some(Attribute {
                name,
                value,
                namespace: None,
            }),
            _ => None,
        }
    }

    /// Statements that configure the element currently being opened
    pub fn is_element_operation(&self) -> bool {
        self.as_attribute().is_some()
            || matches!(
                self,
                StatementSyntax::AddClass(_) | StatementSyntax::Modifier { .. }
            )
    }

    /// Desugar this statement into the statements appended to the program
    pub fn scan(self, scanner: &mut BlockScanner<'_>) -> WeftResult<Vec<StatementSyntax>> {
        match self {
            StatementSyntax::OpenElement { tag, .. } => {
                let mut out = vec![StatementSyntax::OpenPrimitiveElement { tag }];
                while let Some(next) = scanner.next()? {
                    if next.is_element_operation() {
                        out.push(next);
                    } else {
                        scanner.unput(next)?;
                        break;
                    }
                }
                out.push(StatementSyntax::FlushElement);
                Ok(out)
            }
            StatementSyntax::Block {
                template, inverse, ..
            } => {
                template.into_iter().chain(inverse).for_each(|b| scanner.add_child(b));
                Ok(vec![self])
            }
            StatementSyntax::Component { template, .. } => {
                if let Some(block) = template {
                    scanner.add_child(block);
                }
                Ok(vec![self])
            }
            other => Ok(vec![other]),
        }
    }

    pub fn compile(&self, builder: &mut OpBuilder, ctx: &BlockContext<'_>) -> WeftResult<()> {
        match self {
            StatementSyntax::Text(text) => {
                builder.emit(Opcode::Text(text.clone()));
            }
            StatementSyntax::Comment(text) => {
                builder.emit(Opcode::Comment(text.clone()));
            }
            StatementSyntax::Append { value, trusted } => {
                builder.emit(Opcode::PutValue(Arc::new(value.compile(ctx)?)));
                builder.emit(Opcode::Append { trusted: *trusted });
            }
            StatementSyntax::Modifier { modifier, args } => {
                builder.emit(Opcode::Modifier {
                    modifier: modifier.clone(),
                    args: args.compile(ctx)?,
                });
            }
            StatementSyntax::Block {
                path,
                args,
                template,
                inverse,
            } => compile_block_helper(builder, ctx, path, args, *template, *inverse)?,
            StatementSyntax::Component {
                definition,
                attrs,
                template,
            } => {
                let mut args = IndexMap::new();
                let mut attributes = Vec::new();
                for (name, value) in attrs {
                    let compiled = Arc::new(value.compile(ctx)?);
                    match name.strip_prefix('@') {
                        Some(arg) => {
                            args.insert(arg.to_string(), compiled);
                        }
                        None => attributes.push((name.clone(), compiled)),
                    }
                }
                if let Some(block) = template {
                    ctx.compile_child(*block)?;
                }
                builder.emit(Opcode::OpenComponent(Arc::new(ComponentInvocation {
                    definition: definition.clone(),
                    args,
                    attributes,
                    template: *template,
                })));
                builder.emit(Opcode::CloseComponent);
            }
            StatementSyntax::OpenElement { tag, .. }
            | StatementSyntax::OpenPrimitiveElement { tag } => {
                builder.emit(Opcode::OpenPrimitiveElement(tag.clone()));
            }
            StatementSyntax::FlushElement => {
                builder.emit(Opcode::FlushElement);
            }
            StatementSyntax::CloseElement => {
                builder.emit(Opcode::CloseElement);
            }
            StatementSyntax::AddClass(value) => {
                builder.emit(Opcode::PutValue(Arc::new(value.compile(ctx)?)));
                builder.emit(Opcode::AddClass);
            }
            StatementSyntax::StaticAttr {
                name,
                value,
                namespace,
            } => match value {
                ExpressionSyntax::Value(v) => {
                    builder.emit(Opcode::StaticAttr {
                        name: name.clone(),
                        value: to_text(v),
                        namespace: namespace.clone(),
                    });
                }
                dynamic => {
                    builder.emit(Opcode::PutValue(Arc::new(dynamic.compile(ctx)?)));
                    builder.emit(Opcode::DynamicAttr {
                        name: name.clone(),
                        namespace: namespace.clone(),
                    });
                }
            },
            StatementSyntax::DynamicAttr {
                name,
                value,
                namespace,
            } => {
                builder.emit(Opcode::PutValue(Arc::new(value.compile(ctx)?)));
                builder.emit(Opcode::DynamicAttr {
                    name: name.clone(),
                    namespace: namespace.clone(),
                });
            }
            StatementSyntax::DynamicProp { name, value } => {
                builder.emit(Opcode::PutValue(Arc::new(value.compile(ctx)?)));
                builder.emit(Opcode::DynamicProp(name.clone()));
            }
            StatementSyntax::Yield { to, args } => {
                let symbol = ctx.yield_symbol(to)?;
                builder.emit(Opcode::PutArgs(args.compile(ctx)?));
                builder.emit(Opcode::InvokeYield(symbol));
            }
        }
        Ok(())
    }
}

// ==================== Block Helpers ====================

fn single_param<'a>(path: &Path, args: &'a ArgsSyntax) -> WeftResult<&'a ExpressionSyntax> {
    match args.positional.as_slice() {
        [param] => Ok(param),
        other => Err(WeftError::malformed_template(format!(
            "#{} takes exactly one parameter, found {}",
            path.join("."),
            other.len()
        ))),
    }
}

fn evaluate_block(
    builder: &mut OpBuilder,
    ctx: &BlockContext<'_>,
    block: Option<BlockId>,
) -> WeftResult<()> {
    if let Some(block) = block {
        ctx.compile_child(block)?;
        builder.emit(Opcode::Evaluate(block));
    }
    Ok(())
}

fn compile_block_helper(
    builder: &mut OpBuilder,
    ctx: &BlockContext<'_>,
    path: &Path,
    args: &ArgsSyntax,
    template: Option<BlockId>,
    inverse: Option<BlockId>,
) -> WeftResult<()> {
    match path.as_slice() {
        [name] if name == "if" || name == "unless" || name == "with" => {
            let condition = Arc::new(single_param(path, args)?.compile(ctx)?);
            let binds_value = name == "with"
                && template
                    .map(|b| ctx.child(b).map(|b| b.has_positional_parameters()))
                    .transpose()?
                    .unwrap_or(false);
            let negate = name == "unless";

            // Enter ... ELSE ... END Exit
            let exit = builder.emit(Opcode::Exit);
            let end = builder.emit_before(Opcode::Label("END".to_string()), exit);
            let otherwise = builder.emit_before(Opcode::Label("ELSE".to_string()), end);
            builder.emit_before(Opcode::Enter { end: exit }, otherwise);

            builder.before(otherwise, |b| {
                b.emit(Opcode::PutValue(condition.clone()));
                b.emit(Opcode::Test);
                b.emit(if negate {
                    Opcode::JumpIf(otherwise)
                } else {
                    Opcode::JumpUnless(otherwise)
                });
                if binds_value {
                    b.emit(Opcode::PutArgs(CompiledArgs {
                        positional: vec![condition.clone()],
                        named: IndexMap::new(),
                    }));
                }
                evaluate_block(b, ctx, template)?;
                b.emit(Opcode::Jump(end));
                Ok(())
            })?;
            builder.before(end, |b| evaluate_block(b, ctx, inverse))
        }
        [name] if name == "each" => {
            let list = Arc::new(single_param(path, args)?.compile(ctx)?);
            let key = match args.named.get("key") {
                None => KeyPath::Identity,
                Some(expr) => KeyPath::parse(expr.as_static_string().ok_or_else(|| {
                    WeftError::malformed_template("#each key= must be a string literal")
                })?),
            };

            match inverse {
                None => compile_each(builder, ctx, list, key, template),
                Some(inverse) => {
                    let exit = builder.emit(Opcode::Exit);
                    let end = builder.emit_before(Opcode::Label("END".to_string()), exit);
                    let otherwise = builder.emit_before(Opcode::Label("ELSE".to_string()), end);
                    builder.emit_before(Opcode::Enter { end: exit }, otherwise);
                    builder.before(otherwise, |b| {
                        b.emit(Opcode::PutValue(list.clone()));
                        b.emit(Opcode::Test);
                        b.emit(Opcode::JumpUnless(otherwise));
                        compile_each(b, ctx, list.clone(), key, template)?;
                        b.emit(Opcode::Jump(end));
                        Ok(())
                    })?;
                    builder.before(end, |b| evaluate_block(b, ctx, Some(inverse)))
                }
            }
        }
        _ => Err(WeftError::unresolved_capability(
            CapabilityKind::BlockHelper,
            path.join("."),
        )),
    }
}

fn compile_each(
    builder: &mut OpBuilder,
    ctx: &BlockContext<'_>,
    list: Arc<CompiledExpr>,
    key: KeyPath,
    template: Option<BlockId>,
) -> WeftResult<()> {
    let exit_list = builder.emit(Opcode::ExitList);
    builder.before(exit_list, |b| {
        let iter = b.label("ITER");
        b.emit(Opcode::NextIter { end: exit_list });
        let exit = b.emit(Opcode::Exit);
        b.emit(Opcode::Jump(iter));

        let start = b.emit_before(Opcode::EnterWithKey, exit);
        b.before(exit, |b| evaluate_block(b, ctx, template))?;

        b.emit_before(Opcode::PutValue(list), iter);
        b.emit_before(Opcode::EnterList { key, start, end: exit }, iter);
        Ok(())
    })
}
