//! Instruction set for the rendering VM
//!
//! Compiled blocks are `OpSeq`s: arena linked lists of opcodes. Jump targets
//! are handles of other opcodes in the same sequence, so a sequence can be
//! spliced into another one as long as its targets are remapped
//! (`splice_ops`).

use super::expressions::{get_path, to_text, CompiledArgs, CompiledExpr};
use crate::blocks::BlockId;
use crate::environment::{ComponentDefinition, Modifier};
use crate::list::{LinkedList, NodeId};
use crate::wire::Path;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

pub type OpId = NodeId;
pub type OpSeq = LinkedList<Opcode>;

/// How `each` derives the identity of an iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPath {
    Index,
    Identity,
    Path(Path),
}

impl KeyPath {
    pub fn parse(key: &str) -> Self {
        match key {
            "@index" => KeyPath::Index,
            "@identity" | "" => KeyPath::Identity,
            path => KeyPath::Path(path.split('.').map(str::to_string).collect()),
        }
    }

    /// Key every item of a list. A repeated key gets the first `#n` suffix
    /// not already issued, so keys stay unique even when an item's own key
    /// looks like a suffixed one. Anything but an array iterates as empty.
    pub fn items(&self, list: &Value) -> Vec<(String, Value)> {
        let Value::Array(items) = list else {
            return Vec::new();
        };
        let mut issued: HashSet<String> = HashSet::with_capacity(items.len());
        let mut repeats: HashMap<String, usize> = HashMap::new();
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let base = match self {
                    KeyPath::Index => index.to_string(),
                    KeyPath::Identity => match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                    KeyPath::Path(path) => to_text(&get_path(item, path)),
                };
                let mut key = base.clone();
                if issued.contains(&key) {
                    let n = repeats.entry(base).or_insert(0);
                    loop {
                        *n += 1;
                        let candidate = format!("{}#{}", key, n);
                        if !issued.contains(&candidate) {
                            key = candidate;
                            break;
                        }
                    }
                }
                issued.insert(key.clone());
                (key, item.clone())
            })
            .collect()
    }
}

/// Everything `OpenComponent` needs to invoke a component
#[derive(Debug)]
pub struct ComponentInvocation {
    pub definition: Arc<ComponentDefinition>,
    /// `@name` arguments, keyed without the sigil
    pub args: IndexMap<String, Arc<CompiledExpr>>,
    /// Plain attributes, applied to the layout's root element
    pub attributes: Vec<(String, Arc<CompiledExpr>)>,
    pub template: Option<BlockId>,
}

/// VM instruction
#[derive(Debug, Clone)]
pub enum Opcode {
    // ==================== Scope ====================
    /// Push a copy of the current scope
    PushChildScope,
    /// Drop the current scope
    PopScope,
    /// Evaluate arguments into fresh cells in the argument register
    PutArgs(CompiledArgs),
    /// Bind the argument register's positional cells to these slots
    BindPositionalArgs(Vec<usize>),
    /// Bind the argument register's named cells to these slots
    BindNamedArgs(Vec<(String, usize)>),
    /// Bind the argument register's blocks to these yield slots
    BindBlocks(Vec<(String, usize)>),

    // ==================== Control Flow ====================
    /// Jump target marker; does nothing
    Label(String),
    /// Start a tracked range that ends at `end`
    Enter { end: OpId },
    /// Close the innermost tracked range or list iteration
    Exit,
    Jump(OpId),
    /// Pop a condition, jump if it holds
    JumpIf(OpId),
    /// Pop a condition, jump unless it holds
    JumpUnless(OpId),
    /// Pop a reference, guard its truthiness and push it as a condition
    Test,
    /// Run a nested block of the current template
    Evaluate(BlockId),
    /// Run the block bound to a yield slot, if any
    InvokeYield(usize),

    // ==================== Expressions ====================
    /// Push a reference to an expression in the current scope
    PutValue(Arc<CompiledExpr>),

    // ==================== Output ====================
    Text(String),
    Comment(String),
    /// Pop a reference and append its text (or trusted markup)
    Append { trusted: bool },
    OpenPrimitiveElement(String),
    StaticAttr {
        name: String,
        value: String,
        namespace: Option<String>,
    },
    /// Pop a reference and queue it as an attribute
    DynamicAttr {
        name: String,
        namespace: Option<String>,
    },
    /// Pop a reference and queue it as a property
    DynamicProp(String),
    /// Pop a reference and queue it as a class name
    AddClass,
    Modifier {
        modifier: Modifier,
        args: CompiledArgs,
    },
    /// Write queued attributes, properties and modifiers to the open element
    FlushElement,
    CloseElement,
    OpenComponent(Arc<ComponentInvocation>),
    /// Queue the invoking component's attributes on the open element
    ShadowAttributes,
    CloseComponent,

    // ==================== Lists ====================
    /// Pop a reference to a list and start iterating it; iterations run
    /// from `start` to `end`
    EnterList {
        key: KeyPath,
        start: OpId,
        end: OpId,
    },
    ExitList,
    /// Start a tracked range for the current iteration
    EnterWithKey,
    /// Load the next item into the argument register, or jump to `end`
    NextIter { end: OpId },
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::PushChildScope => "PushChildScope",
            Opcode::PopScope => "PopScope",
            Opcode::PutArgs(_) => "PutArgs",
            Opcode::BindPositionalArgs(_) => "BindPositionalArgs",
            Opcode::BindNamedArgs(_) => "BindNamedArgs",
            Opcode::BindBlocks(_) => "BindBlocks",
            Opcode::Label(_) => "Label",
            Opcode::Enter { .. } => "Enter",
            Opcode::Exit => "Exit",
            Opcode::Jump(_) => "Jump",
            Opcode::JumpIf(_) => "JumpIf",
            Opcode::JumpUnless(_) => "JumpUnless",
            Opcode::Test => "Test",
            Opcode::Evaluate(_) => "Evaluate",
            Opcode::InvokeYield(_) => "InvokeYield",
            Opcode::PutValue(_) => "PutValue",
            Opcode::Text(_) => "Text",
            Opcode::Comment(_) => "Comment",
            Opcode::Append { .. } => "Append",
            Opcode::OpenPrimitiveElement(_) => "OpenPrimitiveElement",
            Opcode::StaticAttr { .. } => "StaticAttr",
            Opcode::DynamicAttr { .. } => "DynamicAttr",
            Opcode::DynamicProp(_) => "DynamicProp",
            Opcode::AddClass => "AddClass",
            Opcode::Modifier { .. } => "Modifier",
            Opcode::FlushElement => "FlushElement",
            Opcode::CloseElement => "CloseElement",
            Opcode::OpenComponent(_) => "OpenComponent",
            Opcode::ShadowAttributes => "ShadowAttributes",
            Opcode::CloseComponent => "CloseComponent",
            Opcode::EnterList { .. } => "EnterList",
            Opcode::ExitList => "ExitList",
            Opcode::EnterWithKey => "EnterWithKey",
            Opcode::NextIter { .. } => "NextIter",
        }
    }

    /// Rewrite jump targets after the sequence was copied
    pub fn retarget(&mut self, mapping: &HashMap<OpId, OpId>) {
        let remap = |id: &mut OpId| {
            if let Some(new) = mapping.get(id) {
                *id = *new;
            }
        };
        match self {
            Opcode::Enter { end } | Opcode::NextIter { end } => remap(end),
            Opcode::Jump(target) | Opcode::JumpIf(target) | Opcode::JumpUnless(target) => {
                remap(target)
            }
            Opcode::EnterList { start, end, .. } => {
                remap(start);
                remap(end);
            }
            _ => {}
        }
    }

    fn describe(&self, position: &dyn Fn(OpId) -> usize) -> String {
        match self {
            Opcode::PutArgs(args) => {
                let mut out = String::from("PutArgs(");
                for (i, arg) in args.positional.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}", arg);
                }
                for (name, arg) in &args.named {
                    let _ = write!(out, ", {}={}", name, arg);
                }
                out.push(')');
                out
            }
            Opcode::BindPositionalArgs(symbols) => format!("BindPositionalArgs({:?})", symbols),
            Opcode::BindNamedArgs(pairs) | Opcode::BindBlocks(pairs) => {
                let pairs: Vec<String> = pairs.iter().map(|(n, s)| format!("{}=${}", n, s)).collect();
                format!("{}({})", self.name(), pairs.join(", "))
            }
            Opcode::Label(label) => format!("Label({})", label),
            Opcode::Enter { end } => format!("Enter(end={})", position(*end)),
            Opcode::Jump(t) | Opcode::JumpIf(t) | Opcode::JumpUnless(t) => {
                format!("{}({})", self.name(), position(*t))
            }
            Opcode::Evaluate(block) => format!("Evaluate(block {})", block.index()),
            Opcode::InvokeYield(symbol) => format!("InvokeYield(${})", symbol),
            Opcode::PutValue(expr) => format!("PutValue({})", expr),
            Opcode::Text(text) => format!("Text({:?})", text),
            Opcode::Comment(text) => format!("Comment({:?})", text),
            Opcode::Append { trusted } => format!("Append(trusted={})", trusted),
            Opcode::OpenPrimitiveElement(tag) => format!("OpenPrimitiveElement({})", tag),
            Opcode::StaticAttr { name, value, .. } => format!("StaticAttr({}={:?})", name, value),
            Opcode::DynamicAttr { name, .. } => format!("DynamicAttr({})", name),
            Opcode::DynamicProp(name) => format!("DynamicProp({})", name),
            Opcode::Modifier { modifier, .. } => format!("Modifier({})", modifier.name),
            Opcode::OpenComponent(invocation) => {
                format!("OpenComponent({})", invocation.definition.name)
            }
            Opcode::EnterList { key, start, end } => format!(
                "EnterList(key={:?}, start={}, end={})",
                key,
                position(*start),
                position(*end)
            ),
            Opcode::NextIter { end } => format!("NextIter(end={})", position(*end)),
            other => other.name().to_string(),
        }
    }
}

/// Copy `source` into `target` before `reference`, remapping jump targets
pub fn splice_ops(target: &mut OpSeq, source: &OpSeq, reference: Option<OpId>) {
    let mapping = target.splice_list(source, reference);
    for new in mapping.values() {
        if let Some(op) = target.get_mut(*new) {
            op.retarget(&mapping);
        }
    }
}

/// Human-readable listing, one numbered instruction per line
pub fn dump(ops: &OpSeq) -> String {
    let positions: HashMap<OpId, usize> = ops
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id, i))
        .collect();
    let position = |id: OpId| positions.get(&id).copied().unwrap_or(usize::MAX);

    let mut out = String::new();
    for (i, (_, op)) in ops.iter().enumerate() {
        let _ = writeln!(out, "{:4}  {}", i, op.describe(&position));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_splice_remaps_targets() {
        let mut source = OpSeq::new();
        let exit = source.append(Opcode::Exit);
        source.insert_before(Opcode::Enter { end: exit }, Some(exit));

        let mut target = OpSeq::new();
        target.append(Opcode::Text("before".to_string()));
        let close = target.append(Opcode::CloseElement);
        splice_ops(&mut target, &source, Some(close));

        let listing = dump(&target);
        assert_eq!(
            listing,
            "   0  Text(\"before\")\n   1  Enter(end=2)\n   2  Exit\n   3  CloseElement\n"
        );
    }

    #[test]
    fn test_duplicate_keys_are_suffixed() {
        let list = serde_json::json!([{"id": 1}, {"id": 2}, {"id": 1}]);
        let keys: Vec<String> = KeyPath::parse("id")
            .items(&list)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["1", "2", "1#1"]);
        assert!(KeyPath::Identity.items(&serde_json::json!(null)).is_empty());
    }

    #[test]
    fn test_suffixed_keys_never_collide() {
        let keys: Vec<String> = KeyPath::Identity
            .items(&serde_json::json!(["a", "a", "a#1", "a", "a#1"]))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "a#1", "a#1#1", "a#2", "a#1#2"]);
    }

    #[test]
    fn test_key_path_parse() {
        assert_eq!(KeyPath::parse("@index"), KeyPath::Index);
        assert_eq!(KeyPath::parse("@identity"), KeyPath::Identity);
        assert_eq!(
            KeyPath::parse("user.id"),
            KeyPath::Path(vec!["user".to_string(), "id".to_string()])
        );
    }
}
