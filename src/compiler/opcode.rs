//! Compile-time opcodes produced by the upstream template parser
//!
//! Each opcode is a name plus positional JSON arguments, written on the wire
//! as a flat array: `["staticAttr", "class", null]`.

use crate::error::{WeftError, WeftResult};
use crate::wire::Path;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOpcode {
    pub name: String,
    pub args: Vec<Value>,
}

const NULL: Value = Value::Null;

impl TemplateOpcode {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Argument at `i`; missing arguments read as `null`
    pub fn arg(&self, i: usize) -> &Value {
        self.args.get(i).unwrap_or(&NULL)
    }

    fn malformed(&self, i: usize, expected: &str) -> WeftError {
        WeftError::malformed_opcode(
            self.name.clone(),
            format!("argument {} must be {}, found {}", i, expected, self.arg(i)),
        )
    }

    pub fn string_arg(&self, i: usize) -> WeftResult<String> {
        self.arg(i)
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.malformed(i, "a string"))
    }

    pub fn optional_string_arg(&self, i: usize) -> WeftResult<Option<String>> {
        match self.arg(i) {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            _ => Err(self.malformed(i, "a string or null")),
        }
    }

    pub fn bool_arg(&self, i: usize) -> WeftResult<bool> {
        match self.arg(i) {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            _ => Err(self.malformed(i, "a boolean")),
        }
    }

    pub fn count_arg(&self, i: usize) -> WeftResult<usize> {
        self.arg(i)
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| self.malformed(i, "a non-negative integer"))
    }

    pub fn index_arg(&self, i: usize) -> WeftResult<Option<usize>> {
        match self.arg(i) {
            Value::Null => Ok(None),
            v => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| self.malformed(i, "a block index or null")),
        }
    }

    pub fn path_arg(&self, i: usize) -> WeftResult<Path> {
        let parts = self
            .arg(i)
            .as_array()
            .ok_or_else(|| self.malformed(i, "a path"))?;
        let path: Path = parts
            .iter()
            .map(|p| p.as_str().map(str::to_string))
            .collect::<Option<_>>()
            .ok_or_else(|| self.malformed(i, "a path of strings"))?;
        if path.is_empty() {
            return Err(self.malformed(i, "a non-empty path"));
        }
        Ok(path)
    }

    pub fn optional_path_arg(&self, i: usize) -> WeftResult<Option<Path>> {
        match self.arg(i) {
            Value::Null => Ok(None),
            Value::Array(parts) if parts.is_empty() => Ok(Some(Vec::new())),
            _ => self.path_arg(i).map(Some),
        }
    }
}

impl<'de> Deserialize<'de> for TemplateOpcode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut items = Vec::<Value>::deserialize(deserializer)?;
        if items.is_empty() {
            return Err(serde::de::Error::custom("opcode must not be empty"));
        }
        let name = match items.remove(0) {
            Value::String(name) => name,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "opcode name must be a string, found {}",
                    other
                )))
            }
        };
        Ok(TemplateOpcode { name, args: items })
    }
}

/// Parse an opcode stream from its JSON form
pub fn parse_opcodes(source: &str) -> WeftResult<Vec<TemplateOpcode>> {
    Ok(serde_json::from_str(source)?)
}
