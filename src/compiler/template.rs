//! Block and Template records built by the block-form compiler

use crate::wire::{SerializedBlock, SerializedTemplate, Statement};
use indexmap::IndexSet;
use serde_json::Value;

/// A scope-bearing group of statements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub positionals: Vec<String>,
}

impl Block {
    pub fn new(positionals: Vec<String>) -> Self {
        Self {
            statements: Vec::new(),
            positionals,
        }
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn to_serialized(&self) -> SerializedBlock {
        SerializedBlock {
            statements: self.statements.clone(),
            locals: self.positionals.clone(),
        }
    }
}

/// The top-level block of a compiled template
///
/// `blocks` holds every nested block in the order it was closed, so nested
/// blocks always precede the blocks that reference them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub statements: Vec<Statement>,
    pub positionals: Vec<String>,
    pub named: IndexSet<String>,
    pub yields: IndexSet<String>,
    pub blocks: Vec<Block>,
    pub meta: Option<Value>,
}

impl Template {
    /// Attach opaque host metadata carried through serialization
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn to_serialized(&self) -> SerializedTemplate {
        SerializedTemplate {
            statements: self.statements.clone(),
            locals: self.positionals.clone(),
            named: self.named.iter().cloned().collect(),
            yields: self.yields.iter().cloned().collect(),
            blocks: self.blocks.iter().map(Block::to_serialized).collect(),
            meta: self.meta.clone(),
        }
    }
}
