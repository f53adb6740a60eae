//! Runtime scopes
//!
//! A scope is a flat frame of slots indexed by the symbols the compiler
//! assigned. Slots hold shared value cells, so a child scope (a copy of its
//! parent's slot handles) observes later writes to the cells it inherited.

use crate::blocks::{BlockId, TopLevelBlock};
use crate::error::{WeftError, WeftResult};
use crate::symbol_table::SELF_SYMBOL;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub type ValueCell = Rc<RefCell<Value>>;

pub fn cell(value: Value) -> ValueCell {
    Rc::new(RefCell::new(value))
}

/// A block passed to a layout, evaluated in its caller's scope on `yield`
#[derive(Clone)]
pub struct BlockHandle {
    pub unit: Arc<TopLevelBlock>,
    pub block: BlockId,
    pub scope: Scope,
}

impl fmt::Debug for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHandle({})", self.block.index())
    }
}

#[derive(Debug, Clone, Default)]
pub enum ScopeSlot {
    #[default]
    Empty,
    Value(ValueCell),
    Block(Rc<BlockHandle>),
}

#[derive(Debug, Clone)]
pub struct Scope {
    slots: Vec<ScopeSlot>,
}

impl Scope {
    pub fn root(size: usize, self_value: Value) -> Self {
        Self::with_self(size, cell(self_value))
    }

    pub fn with_self(size: usize, self_cell: ValueCell) -> Self {
        let mut slots = vec![ScopeSlot::Empty; size.max(1)];
        slots[SELF_SYMBOL] = ScopeSlot::Value(self_cell);
        Self { slots }
    }

    /// A scope sharing every slot handle of this one
    pub fn child(&self) -> Self {
        self.clone()
    }

    fn slot_mut(&mut self, symbol: usize) -> &mut ScopeSlot {
        if symbol >= self.slots.len() {
            self.slots.resize(symbol + 1, ScopeSlot::Empty);
        }
        &mut self.slots[symbol]
    }

    pub fn bind_value(&mut self, symbol: usize, value: ValueCell) {
        *self.slot_mut(symbol) = ScopeSlot::Value(value);
    }

    pub fn bind_block(&mut self, symbol: usize, handle: Option<BlockHandle>) {
        *self.slot_mut(symbol) = match handle {
            Some(handle) => ScopeSlot::Block(Rc::new(handle)),
            None => ScopeSlot::Empty,
        };
    }

    /// Current value of a slot; unbound slots read as null
    pub fn value(&self, symbol: usize) -> WeftResult<Value> {
        match self.slots.get(symbol) {
            Some(ScopeSlot::Value(cell)) => Ok(cell.borrow().clone()),
            Some(ScopeSlot::Empty) | None => Ok(Value::Null),
            Some(ScopeSlot::Block(_)) => Err(WeftError::invalid_state(
                "lookup",
                format!("slot {} holds a block, not a value", symbol),
            )),
        }
    }

    pub fn block(&self, symbol: usize) -> Option<Rc<BlockHandle>> {
        match self.slots.get(symbol) {
            Some(ScopeSlot::Block(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn self_cell(&self) -> Option<ValueCell> {
        match self.slots.get(SELF_SYMBOL) {
            Some(ScopeSlot::Value(cell)) => Some(cell.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_scope_shares_cells() {
        let mut parent = Scope::root(3, json!({"a": 1}));
        let item = cell(json!("first"));
        parent.bind_value(1, item.clone());

        let mut child = parent.child();
        child.bind_value(2, cell(json!("only in child")));

        *item.borrow_mut() = json!("changed");
        assert_eq!(child.value(1).unwrap(), json!("changed"));
        assert_eq!(parent.value(2).unwrap(), Value::Null);
        assert_eq!(child.value(SELF_SYMBOL).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_binding_past_the_end_grows() {
        let mut scope = Scope::root(1, Value::Null);
        scope.bind_value(4, cell(json!(true)));
        assert_eq!(scope.value(4).unwrap(), json!(true));
        assert_eq!(scope.value(9).unwrap(), Value::Null);
        assert!(scope.block(4).is_none());
    }
}
