//! Serialized template format
//!
//! This is the contract between the block-form compiler and the scanner.
//! Statements and expressions are encoded as JSON arrays tagged by their
//! first element (`["text", "hi"]`, `["get", ["user", "name"]]`); literal
//! expressions are plain JSON scalars. Trailing absent fields are elided on
//! encode and restored as absent on decode, while absent fields in the
//! middle of a record keep their position as `null`.

use crate::error::{WeftError, WeftResult};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub type Path = Vec<String>;
pub type Params = Vec<Expression>;
pub type Hash = IndexMap<String, Expression>;

/// Serialized expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// JSON scalar (string, number, boolean or null)
    Literal(Value),
    /// Path that is either a helper or a property, decided at compile time
    Unknown(Path),
    /// Named parameter reference (`@name`)
    Attr(Path),
    /// Property or local lookup
    Get(Path),
    Concat(Params),
    Helper { path: Path, params: Params, hash: Hash },
}

/// Serialized statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Text(String),
    Append {
        value: Expression,
        trusted: bool,
    },
    Comment(String),
    Modifier {
        path: Path,
        params: Option<Params>,
        hash: Option<Hash>,
    },
    Block {
        path: Path,
        params: Option<Params>,
        hash: Option<Hash>,
        template: Option<usize>,
        inverse: Option<usize>,
    },
    Component {
        tag: String,
        attrs: Option<Hash>,
        template: Option<usize>,
    },
    OpenElement {
        tag: String,
        block_params: Option<Vec<String>>,
    },
    CloseElement,
    AddClass(Expression),
    StaticAttr {
        name: String,
        value: Expression,
        namespace: Option<String>,
    },
    DynamicAttr {
        name: String,
        value: Expression,
        namespace: Option<String>,
    },
    DynamicProp {
        name: String,
        value: Expression,
    },
    Yield {
        to: String,
        params: Option<Params>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedBlock {
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub locals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTemplate {
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub locals: Vec<String>,
    #[serde(default)]
    pub named: Vec<String>,
    #[serde(default)]
    pub yields: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<SerializedBlock>,
    #[serde(default)]
    pub meta: Option<Value>,
}

impl SerializedTemplate {
    pub fn from_json_str(source: &str) -> WeftResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json_string(&self) -> WeftResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ==================== Encoding ====================

fn path_json(path: &[String]) -> Value {
    Value::Array(path.iter().cloned().map(Value::String).collect())
}

fn params_json(params: &[Expression]) -> Value {
    Value::Array(params.iter().map(Expression::to_json).collect())
}

fn hash_json(hash: &Hash) -> Value {
    Value::Object(
        hash.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

fn opt<T>(value: &Option<T>, f: impl FnOnce(&T) -> Value) -> Value {
    value.as_ref().map(f).unwrap_or(Value::Null)
}

/// Build a tagged record, trimming trailing nulls
fn record(tag: &str, mut fields: Vec<Value>) -> Value {
    while matches!(fields.last(), Some(Value::Null)) {
        fields.pop();
    }
    let mut out = Vec::with_capacity(fields.len() + 1);
    out.push(Value::String(tag.to_string()));
    out.extend(fields);
    Value::Array(out)
}

impl Expression {
    pub fn to_json(&self) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::Unknown(path) => record("unknown", vec![path_json(path)]),
            Expression::Attr(path) => record("attr", vec![path_json(path)]),
            Expression::Get(path) => record("get", vec![path_json(path)]),
            Expression::Concat(parts) => record("concat", vec![params_json(parts)]),
            Expression::Helper { path, params, hash } => record(
                "helper",
                vec![path_json(path), params_json(params), hash_json(hash)],
            ),
        }
    }

    pub fn from_json(value: &Value) -> WeftResult<Self> {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Ok(Expression::Literal(value.clone()))
            }
            Value::Array(items) => {
                let fields = Fields::new(items, "expression")?;
                match fields.tag {
                    "unknown" => Ok(Expression::Unknown(fields.path(0)?)),
                    "attr" => Ok(Expression::Attr(fields.path(0)?)),
                    "get" => Ok(Expression::Get(fields.path(0)?)),
                    "concat" => Ok(Expression::Concat(fields.params(0)?.unwrap_or_default())),
                    "helper" => Ok(Expression::Helper {
                        path: fields.path(0)?,
                        params: fields.params(1)?.unwrap_or_default(),
                        hash: fields.hash(2)?.unwrap_or_default(),
                    }),
                    other => Err(WeftError::malformed_template(format!(
                        "unknown expression tag '{}'",
                        other
                    ))),
                }
            }
            Value::Object(_) => Err(WeftError::malformed_template(
                "a hash is not an expression",
            )),
        }
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expression::Literal(Value::Null))
    }
}

impl Statement {
    pub fn tag(&self) -> &'static str {
        match self {
            Statement::Text(_) => "text",
            Statement::Append { .. } => "append",
            Statement::Comment(_) => "comment",
            Statement::Modifier { .. } => "modifier",
            Statement::Block { .. } => "block",
            Statement::Component { .. } => "component",
            Statement::OpenElement { .. } => "openElement",
            Statement::CloseElement => "closeElement",
            Statement::AddClass(_) => "addClass",
            Statement::StaticAttr { .. } => "staticAttr",
            Statement::DynamicAttr { .. } => "dynamicAttr",
            Statement::DynamicProp { .. } => "dynamicProp",
            Statement::Yield { .. } => "yield",
        }
    }

    pub fn to_json(&self) -> Value {
        let tag = self.tag();
        match self {
            Statement::Text(s) | Statement::Comment(s) => {
                record(tag, vec![Value::String(s.clone())])
            }
            Statement::Append { value, trusted } => {
                record(tag, vec![value.to_json(), Value::Bool(*trusted)])
            }
            Statement::Modifier { path, params, hash } => record(
                tag,
                vec![path_json(path), opt(params, |p| params_json(p)), opt(hash, hash_json)],
            ),
            Statement::Block {
                path,
                params,
                hash,
                template,
                inverse,
            } => record(
                tag,
                vec![
                    path_json(path),
                    opt(params, |p| params_json(p)),
                    opt(hash, hash_json),
                    opt(template, |t| Value::from(*t)),
                    opt(inverse, |i| Value::from(*i)),
                ],
            ),
            Statement::Component {
                tag: name,
                attrs,
                template,
            } => record(
                tag,
                vec![
                    Value::String(name.clone()),
                    opt(attrs, hash_json),
                    opt(template, |t| Value::from(*t)),
                ],
            ),
            Statement::OpenElement {
                tag: name,
                block_params,
            } => record(
                tag,
                vec![Value::String(name.clone()), opt(block_params, |p| path_json(p))],
            ),
            Statement::CloseElement => record(tag, vec![]),
            Statement::AddClass(value) => record(tag, vec![value.to_json()]),
            Statement::StaticAttr {
                name,
                value,
                namespace,
            }
            | Statement::DynamicAttr {
                name,
                value,
                namespace,
            } => record(
                tag,
                vec![
                    Value::String(name.clone()),
                    value.to_json(),
                    opt(namespace, |n| Value::String(n.clone())),
                ],
            ),
            Statement::DynamicProp { name, value } => {
                record(tag, vec![Value::String(name.clone()), value.to_json()])
            }
            Statement::Yield { to, params } => record(
                tag,
                vec![Value::String(to.clone()), opt(params, |p| params_json(p))],
            ),
        }
    }

    pub fn from_json(value: &Value) -> WeftResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| WeftError::malformed_template("statement must be an array"))?;
        let f = Fields::new(items, "statement")?;

        let statement = match f.tag {
            "text" => Statement::Text(f.string(0)?),
            "comment" => Statement::Comment(f.string(0)?),
            "append" => Statement::Append {
                value: f.expression(0)?,
                trusted: f.boolean(1)?,
            },
            "modifier" => Statement::Modifier {
                path: f.path(0)?,
                params: f.params(1)?,
                hash: f.hash(2)?,
            },
            "block" => Statement::Block {
                path: f.path(0)?,
                params: f.params(1)?,
                hash: f.hash(2)?,
                template: f.index(3)?,
                inverse: f.index(4)?,
            },
            "component" => Statement::Component {
                tag: f.string(0)?,
                attrs: f.hash(1)?,
                template: f.index(2)?,
            },
            "openElement" => Statement::OpenElement {
                tag: f.string(0)?,
                block_params: f.optional(1).map(|_| f.path(1)).transpose()?,
            },
            "closeElement" => Statement::CloseElement,
            "addClass" => Statement::AddClass(f.expression(0)?),
            "staticAttr" => Statement::StaticAttr {
                name: f.string(0)?,
                value: f.expression(1)?,
                namespace: f.optional_string(2)?,
            },
            "dynamicAttr" => Statement::DynamicAttr {
                name: f.string(0)?,
                value: f.expression(1)?,
                namespace: f.optional_string(2)?,
            },
            "dynamicProp" => Statement::DynamicProp {
                name: f.string(0)?,
                value: f.expression(1)?,
            },
            "yield" => Statement::Yield {
                to: f.string(0)?,
                params: f.params(1)?,
            },
            other => {
                return Err(WeftError::malformed_template(format!(
                    "unknown statement tag '{}'",
                    other
                )))
            }
        };
        Ok(statement)
    }
}

// ==================== Decoding ====================

/// Positional view over a tagged record's fields
struct Fields<'a> {
    tag: &'a str,
    items: &'a [Value],
}

impl<'a> Fields<'a> {
    fn new(items: &'a [Value], what: &str) -> WeftResult<Self> {
        let tag = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| WeftError::malformed_template(format!("{} is missing its tag", what)))?;
        Ok(Self {
            tag,
            items: &items[1..],
        })
    }

    /// Field at `i`, with missing and `null` both meaning absent
    fn optional(&self, i: usize) -> Option<&'a Value> {
        self.items.get(i).filter(|v| !v.is_null())
    }

    fn error(&self, i: usize, expected: &str) -> WeftError {
        WeftError::malformed_template(format!(
            "field {} of '{}' must be {}",
            i, self.tag, expected
        ))
    }

    fn string(&self, i: usize) -> WeftResult<String> {
        self.optional(i)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.error(i, "a string"))
    }

    fn optional_string(&self, i: usize) -> WeftResult<Option<String>> {
        match self.optional(i) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.error(i, "a string")),
        }
    }

    fn boolean(&self, i: usize) -> WeftResult<bool> {
        match self.optional(i) {
            None => Ok(false),
            Some(v) => v.as_bool().ok_or_else(|| self.error(i, "a boolean")),
        }
    }

    fn index(&self, i: usize) -> WeftResult<Option<usize>> {
        match self.optional(i) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| self.error(i, "a block index")),
        }
    }

    fn path(&self, i: usize) -> WeftResult<Path> {
        let parts = self
            .optional(i)
            .and_then(Value::as_array)
            .ok_or_else(|| self.error(i, "a path"))?;
        parts
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.error(i, "a path of strings"))
            })
            .collect()
    }

    fn expression(&self, i: usize) -> WeftResult<Expression> {
        match self.optional(i) {
            None => Ok(Expression::Literal(Value::Null)),
            Some(v) => Expression::from_json(v),
        }
    }

    fn params(&self, i: usize) -> WeftResult<Option<Params>> {
        match self.optional(i) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(Expression::from_json)
                .collect::<WeftResult<Vec<_>>>()
                .map(Some),
            Some(_) => Err(self.error(i, "an array of expressions")),
        }
    }

    fn hash(&self, i: usize) -> WeftResult<Option<Hash>> {
        match self.optional(i) {
            None => Ok(None),
            Some(Value::Object(map)) => {
                let mut hash = Hash::new();
                for (k, v) in map {
                    hash.insert(k.clone(), Expression::from_json(v)?);
                }
                Ok(Some(hash))
            }
            Some(_) => Err(self.error(i, "a hash")),
        }
    }
}

impl Serialize for Statement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Statement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Statement::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Expression::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_trailing_nulls_are_elided() {
        let stmt = Statement::StaticAttr {
            name: "class".to_string(),
            value: Expression::Literal(json!("big")),
            namespace: None,
        };
        assert_eq!(stmt.to_json(), json!(["staticAttr", "class", "big"]));
    }

    #[test]
    fn test_inner_nulls_keep_their_position() {
        let stmt = Statement::Block {
            path: vec!["if".to_string()],
            params: Some(vec![Expression::Get(vec!["ok".to_string()])]),
            hash: None,
            template: None,
            inverse: Some(0),
        };
        let encoded = stmt.to_json();
        assert_eq!(
            encoded,
            json!(["block", ["if"], [["get", ["ok"]]], null, null, 0])
        );
        assert_eq!(Statement::from_json(&encoded).unwrap(), stmt);
    }

    #[test]
    fn test_missing_value_decodes_as_null_literal() {
        let stmt = Statement::from_json(&json!(["addClass"])).unwrap();
        assert_eq!(stmt, Statement::AddClass(Expression::Literal(Value::Null)));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = Statement::from_json(&json!(["bogus", 1])).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_template_json() {
        let source = r#"{"statements":[["text","hi"]],"locals":[],"named":[],"yields":[],"blocks":[],"meta":null}"#;
        let template = SerializedTemplate::from_json_str(source).unwrap();
        assert_eq!(template.statements, vec![Statement::Text("hi".to_string())]);
        assert_eq!(template.to_json_string().unwrap(), source);
    }
}
