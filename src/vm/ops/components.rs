use super::super::frame::Frame;
use super::super::opcode::ComponentInvocation;
use super::super::scope::{cell, BlockHandle, Scope};
use super::super::{ArgsRegister, ComponentState, UpdatingOp, VM};
use super::dom::attr_value;
use crate::error::{WeftError, WeftResult};
use crate::vm::expressions::{CompiledExpr, Reference};
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

/// Stage the invocation's arguments and block, then run the layout in a
/// fresh root scope
pub fn execute_open_component(
    vm: &mut VM<'_>,
    invocation: &Arc<ComponentInvocation>,
) -> WeftResult<()> {
    let caller = vm.current_unit("OpenComponent")?;
    let scope = vm.current_scope("OpenComponent")?.clone();
    let layout = &invocation.definition.layout;
    let ops = layout.compile(vm.env)?;
    debug!("invoking component <{}>", invocation.definition.name);

    let mut named = IndexMap::with_capacity(invocation.args.len());
    for (name, expr) in &invocation.args {
        let reference = Reference::new(expr.clone(), scope.clone());
        let slot = cell(reference.value()?);
        if !matches!(&**expr, CompiledExpr::Value(_)) {
            vm.record(UpdatingOp::Bind {
                reference,
                cell: slot.clone(),
            })?;
        }
        named.insert(name.clone(), slot);
    }

    let mut blocks = IndexMap::new();
    if let Some(block) = invocation.template {
        blocks.insert(
            "default".to_string(),
            BlockHandle {
                unit: caller,
                block,
                scope: scope.clone(),
            },
        );
    }
    vm.args = ArgsRegister {
        positional: Vec::new(),
        named,
        blocks,
    };

    let attributes = invocation
        .attributes
        .iter()
        .map(|(name, expr)| (name.clone(), Reference::new(expr.clone(), scope.clone())))
        .collect();
    vm.components.push(ComponentState { attributes });

    let unit = layout.unit().clone();
    vm.scopes
        .push(Scope::root(unit.symbols().size(), Value::Null));
    vm.frames.push(Frame::new(unit, ops, true));
    Ok(())
}

/// Queue the invoking component's attributes on the layout's root element
pub fn execute_shadow_attributes(vm: &mut VM<'_>) -> WeftResult<()> {
    let attributes = match vm.components.last() {
        Some(component) => component.attributes.clone(),
        None => return Ok(()),
    };
    let pending = vm.elements.pending_mut("ShadowAttributes")?;
    for (name, reference) in attributes {
        pending.set_attribute(&name, attr_value(reference), None);
    }
    Ok(())
}

pub fn execute_close_component(vm: &mut VM<'_>) -> WeftResult<()> {
    vm.components
        .pop()
        .map(|_| ())
        .ok_or_else(|| WeftError::invalid_state("CloseComponent", "no component is open"))
}
