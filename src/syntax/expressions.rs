//! Expression syntax nodes and their lowering to compiled expressions

use crate::error::{CapabilityKind, WeftError, WeftResult};
use crate::vm::compiler::BlockContext;
use crate::vm::expressions::{CompiledArgs, CompiledExpr};
use crate::wire::{Expression, Hash, Params, Path};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionSyntax {
    Value(Value),
    Unknown(Path),
    GetNamedParameter(Path),
    Get(Path),
    Concat(Vec<ExpressionSyntax>),
    Helper { path: Path, args: ArgsSyntax },
}

/// Positional and named arguments of a helper, modifier or block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgsSyntax {
    pub positional: Vec<ExpressionSyntax>,
    pub named: IndexMap<String, ExpressionSyntax>,
}

impl ArgsSyntax {
    pub fn from_spec(params: Option<&Params>, hash: Option<&Hash>) -> Self {
        Self {
            positional: params
                .map(|p| p.iter().map(ExpressionSyntax::from_spec).collect())
                .unwrap_or_default(),
            named: hash
                .map(|h| {
                    h.iter()
                        .map(|(k, v)| (k.clone(), ExpressionSyntax::from_spec(v)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn compile(&self, ctx: &BlockContext<'_>) -> WeftResult<CompiledArgs> {
        let positional = self
            .positional
            .iter()
            .map(|e| e.compile(ctx).map(Arc::new))
            .collect::<WeftResult<Vec<_>>>()?;
        let mut named = IndexMap::with_capacity(self.named.len());
        for (name, expr) in &self.named {
            named.insert(name.clone(), Arc::new(expr.compile(ctx)?));
        }
        Ok(CompiledArgs { positional, named })
    }
}

impl ExpressionSyntax {
    pub fn from_spec(expression: &Expression) -> Self {
        match expression {
            Expression::Literal(v) => ExpressionSyntax::Value(v.clone()),
            Expression::Unknown(path) => ExpressionSyntax::Unknown(path.clone()),
            Expression::Attr(path) => ExpressionSyntax::GetNamedParameter(path.clone()),
            Expression::Get(path) => ExpressionSyntax::Get(path.clone()),
            Expression::Concat(parts) => {
                ExpressionSyntax::Concat(parts.iter().map(ExpressionSyntax::from_spec).collect())
            }
            Expression::Helper { path, params, hash } => ExpressionSyntax::Helper {
                path: path.clone(),
                args: ArgsSyntax::from_spec(Some(params), Some(hash)),
            },
        }
    }

    /// Literal string value, if this is one
    pub fn as_static_string(&self) -> Option<&str> {
        match self {
            ExpressionSyntax::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn compile(&self, ctx: &BlockContext<'_>) -> WeftResult<CompiledExpr> {
        match self {
            ExpressionSyntax::Value(v) => Ok(CompiledExpr::Value(v.clone())),
            ExpressionSyntax::Get(path) => Ok(compile_get(ctx, path)),
            ExpressionSyntax::Unknown(path) => {
                if path.len() == 1 && ctx.local_symbol(&path[0]).is_some() {
                    return Ok(compile_get(ctx, path));
                }
                match ctx.env.lookup_helper(path) {
                    Some(helper) => Ok(CompiledExpr::Helper {
                        helper,
                        args: CompiledArgs::default(),
                    }),
                    None => Ok(compile_get(ctx, path)),
                }
            }
            ExpressionSyntax::GetNamedParameter(path) => {
                let head = path.first().ok_or_else(|| {
                    WeftError::malformed_template("named parameter reference with an empty path")
                })?;
                let symbol = ctx.named_symbol(head)?;
                Ok(CompiledExpr::NamedLookup {
                    symbol,
                    path: path[1..].to_vec(),
                })
            }
            ExpressionSyntax::Concat(parts) => Ok(CompiledExpr::Concat(
                parts
                    .iter()
                    .map(|p| p.compile(ctx).map(Arc::new))
                    .collect::<WeftResult<Vec<_>>>()?,
            )),
            ExpressionSyntax::Helper { path, args } => {
                let helper = ctx.env.lookup_helper(path).ok_or_else(|| {
                    WeftError::unresolved_capability(CapabilityKind::Helper, path.join("."))
                })?;
                Ok(CompiledExpr::Helper {
                    helper,
                    args: args.compile(ctx)?,
                })
            }
        }
    }
}

impl fmt::Display for ArgsSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arg in &self.positional {
            write!(f, " {}", arg)?;
        }
        for (name, arg) in &self.named {
            write!(f, " {}={}", name, arg)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExpressionSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionSyntax::Value(v) => write!(f, "{}", v),
            ExpressionSyntax::Unknown(path) => write!(f, "{}", path.join(".")),
            ExpressionSyntax::GetNamedParameter(path) => write!(f, "@{}", path.join(".")),
            ExpressionSyntax::Get(path) => write!(f, "(get {})", path.join(".")),
            ExpressionSyntax::Concat(parts) => {
                write!(f, "(concat")?;
                for part in parts {
                    write!(f, " {}", part)?;
                }
                write!(f, ")")
            }
            ExpressionSyntax::Helper { path, args } => write!(f, "({}{})", path.join("."), args),
        }
    }
}

fn compile_get(ctx: &BlockContext<'_>, path: &[String]) -> CompiledExpr {
    let Some(head) = path.first() else {
        return CompiledExpr::SelfLookup(Vec::new());
    };
    if head == "this" {
        return CompiledExpr::SelfLookup(path[1..].to_vec());
    }
    match ctx.local_symbol(head) {
        Some(symbol) => CompiledExpr::LocalLookup {
            symbol,
            path: path[1..].to_vec(),
        },
        None => CompiledExpr::SelfLookup(path.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path(p: &str) -> Path {
        p.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_display_nests_helper_calls() {
        let mut named = IndexMap::new();
        named.insert("sep".to_string(), ExpressionSyntax::Value(json!("-")));
        let expr = ExpressionSyntax::Helper {
            path: path("join"),
            args: ArgsSyntax {
                positional: vec![
                    ExpressionSyntax::Get(path("user.first")),
                    ExpressionSyntax::Concat(vec![
                        ExpressionSyntax::GetNamedParameter(path("last")),
                        ExpressionSyntax::Value(json!(1)),
                    ]),
                ],
                named,
            },
        };
        assert_eq!(
            expr.to_string(),
            r#"(join (get user.first) (concat @last 1) sep="-")"#
        );
    }

    #[test]
    fn test_display_bare_unknown() {
        assert_eq!(ExpressionSyntax::Unknown(path("title")).to_string(), "title");
    }
}
