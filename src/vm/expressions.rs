//! Compiled expressions and the references the VM evaluates them through
//!
//! A `CompiledExpr` has all of its names resolved: locals and named
//! parameters are scope slots, helpers are host functions. Evaluating one
//! needs nothing but a `Scope`.

use super::scope::Scope;
use crate::environment::Helper;
use crate::error::WeftResult;
use crate::symbol_table::SELF_SYMBOL;
use crate::wire::Path;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum CompiledExpr {
    Value(Value),
    /// Property path on `self`
    SelfLookup(Path),
    /// Positional block parameter, then a property path on it
    LocalLookup { symbol: usize, path: Path },
    /// Named parameter (`@name`), then a property path on it
    NamedLookup { symbol: usize, path: Path },
    Concat(Vec<Arc<CompiledExpr>>),
    Helper { helper: Helper, args: CompiledArgs },
}

#[derive(Debug, Clone, Default)]
pub struct CompiledArgs {
    pub positional: Vec<Arc<CompiledExpr>>,
    pub named: IndexMap<String, Arc<CompiledExpr>>,
}

impl CompiledArgs {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub fn evaluate(&self, scope: &Scope) -> WeftResult<(Vec<Value>, IndexMap<String, Value>)> {
        let positional = self
            .positional
            .iter()
            .map(|e| e.evaluate(scope))
            .collect::<WeftResult<Vec<_>>>()?;
        let mut named = IndexMap::with_capacity(self.named.len());
        for (name, expr) in &self.named {
            named.insert(name.clone(), expr.evaluate(scope)?);
        }
        Ok((positional, named))
    }
}

impl CompiledExpr {
    pub fn evaluate(&self, scope: &Scope) -> WeftResult<Value> {
        match self {
            CompiledExpr::Value(v) => Ok(v.clone()),
            CompiledExpr::SelfLookup(path) => Ok(get_path(&scope.value(SELF_SYMBOL)?, path)),
            CompiledExpr::LocalLookup { symbol, path }
            | CompiledExpr::NamedLookup { symbol, path } => {
                Ok(get_path(&scope.value(*symbol)?, path))
            }
            CompiledExpr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&to_text(&part.evaluate(scope)?));
                }
                Ok(Value::String(out))
            }
            CompiledExpr::Helper { helper, args } => {
                let (positional, named) = args.evaluate(scope)?;
                Ok(helper.call(&positional, &named))
            }
        }
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledExpr::Value(v) => write!(f, "{}", v),
            CompiledExpr::SelfLookup(path) => write!(f, "this.{}", path.join(".")),
            CompiledExpr::LocalLookup { symbol, path } => write!(f, "${}{}", symbol, suffix(path)),
            CompiledExpr::NamedLookup { symbol, path } => write!(f, "@{}{}", symbol, suffix(path)),
            CompiledExpr::Concat(parts) => {
                write!(f, "concat(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
            CompiledExpr::Helper { helper, args } => {
                write!(f, "{}(", helper.name)?;
                let mut first = true;
                for arg in &args.positional {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{}", arg)?;
                }
                for (name, arg) in &args.named {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{}={}", name, arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn suffix(path: &[String]) -> String {
    path.iter().map(|p| format!(".{}", p)).collect()
}

/// An expression paired with the scope it must be evaluated in
///
/// References are what the updating VM holds on to: re-evaluating one after
/// the data changed yields the current value of the expression.
#[derive(Debug, Clone)]
pub struct Reference {
    pub expr: Arc<CompiledExpr>,
    pub scope: Scope,
}

impl Reference {
    pub fn new(expr: Arc<CompiledExpr>, scope: Scope) -> Self {
        Self { expr, scope }
    }

    pub fn value(&self) -> WeftResult<Value> {
        self.expr.evaluate(&self.scope)
    }
}

// ==================== Value Semantics ====================

/// Walk a property path; anything missing reads as null
pub fn get_path(value: &Value, path: &[String]) -> Value {
    let mut current = value;
    for segment in path {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return Value::Null,
            },
            Value::Array(items) if segment == "length" => return Value::from(items.len()),
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return Value::Null,
            },
            Value::String(s) if segment == "length" => return Value::from(s.chars().count()),
            _ => return Value::Null,
        };
    }
    current.clone()
}

/// Template truthiness: null, false, 0, "" and [] are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Text content of a value when appended to the output
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path() {
        let data = json!({"user": {"name": "Ann", "tags": ["a", "b"]}});
        let path = |p: &str| p.split('.').map(str::to_string).collect::<Vec<_>>();
        assert_eq!(get_path(&data, &path("user.name")), json!("Ann"));
        assert_eq!(get_path(&data, &path("user.tags.1")), json!("b"));
        assert_eq!(get_path(&data, &path("user.tags.length")), json!(2));
        assert_eq!(get_path(&data, &path("user.missing.deeper")), Value::Null);
        assert_eq!(get_path(&data, &[]), data);
    }

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!([])] {
            assert!(!is_truthy(&falsy), "{} should be falsy", falsy);
        }
        for truthy in [json!(true), json!(1), json!("0"), json!([0]), json!({})] {
            assert!(is_truthy(&truthy), "{} should be truthy", truthy);
        }
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!(null)), "");
        assert_eq!(to_text(&json!(1.5)), "1.5");
        assert_eq!(to_text(&json!(["a", 1])), "a,1");
    }

    #[test]
    fn test_concat_evaluates_parts_in_order() {
        let scope = Scope::root(1, json!({"first": "Ann", "last": "Lee"}));
        let expr = CompiledExpr::Concat(vec![
            Arc::new(CompiledExpr::SelfLookup(vec!["first".to_string()])),
            Arc::new(CompiledExpr::Value(json!(" "))),
            Arc::new(CompiledExpr::SelfLookup(vec!["last".to_string()])),
        ]);
        assert_eq!(expr.evaluate(&scope).unwrap(), json!("Ann Lee"));
    }
}
