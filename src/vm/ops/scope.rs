use super::super::expressions::{CompiledArgs, CompiledExpr, Reference};
use super::super::scope::{cell, ValueCell};
use super::super::{ArgsRegister, UpdatingOp, VM};
use crate::error::{WeftError, WeftResult};
use indexmap::IndexMap;
use serde_json::Value;

pub fn execute_push_child_scope(vm: &mut VM<'_>) -> WeftResult<()> {
    let scope = vm.current_scope("PushChildScope")?.child();
    vm.scopes.push(scope);
    Ok(())
}

pub fn execute_pop_scope(vm: &mut VM<'_>) -> WeftResult<()> {
    vm.scopes
        .pop()
        .map(|_| ())
        .ok_or_else(|| WeftError::invalid_state("PopScope", "scope stack is empty"))
}

/// A cell holding the reference's value, kept current by a `Bind`
/// unless the value is constant
fn bound_cell(vm: &mut VM<'_>, reference: Reference) -> WeftResult<ValueCell> {
    let value = reference.value()?;
    let constant = matches!(&*reference.expr, CompiledExpr::Value(_));
    let slot = cell(value);
    if !constant {
        vm.record(UpdatingOp::Bind {
            reference,
            cell: slot.clone(),
        })?;
    }
    Ok(slot)
}

pub fn execute_put_args(vm: &mut VM<'_>, args: &CompiledArgs) -> WeftResult<()> {
    let scope = vm.current_scope("PutArgs")?.clone();

    let mut positional = Vec::with_capacity(args.positional.len());
    for expr in &args.positional {
        positional.push(bound_cell(vm, Reference::new(expr.clone(), scope.clone()))?);
    }
    let mut named = IndexMap::with_capacity(args.named.len());
    for (name, expr) in &args.named {
        let slot = bound_cell(vm, Reference::new(expr.clone(), scope.clone()))?;
        named.insert(name.clone(), slot);
    }

    vm.args = ArgsRegister {
        positional,
        named,
        blocks: IndexMap::new(),
    };
    Ok(())
}

pub fn execute_bind_positional_args(vm: &mut VM<'_>, symbols: &[usize]) -> WeftResult<()> {
    let cells: Vec<ValueCell> = (0..symbols.len())
        .map(|i| {
            vm.args
                .positional
                .get(i)
                .cloned()
                .unwrap_or_else(|| cell(Value::Null))
        })
        .collect();
    let scope = vm.current_scope_mut("BindPositionalArgs")?;
    for (symbol, value) in symbols.iter().zip(cells) {
        scope.bind_value(*symbol, value);
    }
    Ok(())
}

pub fn execute_bind_named_args(vm: &mut VM<'_>, pairs: &[(String, usize)]) -> WeftResult<()> {
    let cells: Vec<ValueCell> = pairs
        .iter()
        .map(|(name, _)| {
            vm.args
                .named
                .get(name)
                .cloned()
                .unwrap_or_else(|| cell(Value::Null))
        })
        .collect();
    let scope = vm.current_scope_mut("BindNamedArgs")?;
    for ((_, symbol), value) in pairs.iter().zip(cells) {
        scope.bind_value(*symbol, value);
    }
    Ok(())
}

pub fn execute_bind_blocks(vm: &mut VM<'_>, pairs: &[(String, usize)]) -> WeftResult<()> {
    let handles: Vec<_> = pairs
        .iter()
        .map(|(name, _)| vm.args.blocks.get(name).cloned())
        .collect();
    let scope = vm.current_scope_mut("BindBlocks")?;
    for ((_, symbol), handle) in pairs.iter().zip(handles) {
        scope.bind_block(*symbol, handle);
    }
    Ok(())
}
