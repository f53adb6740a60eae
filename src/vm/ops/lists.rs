use super::super::opcode::{KeyPath, OpId};
use super::super::scope::cell;
use super::super::updating::{Iteration, ListBlock};
use super::super::{IterationSeed, ListState, OpsFrame, UpdatingOp, VM};
use crate::error::{WeftError, WeftResult};
use indexmap::IndexMap;
use serde_json::Value;

/// Pop the list reference and open a tracked range around all iterations
pub fn execute_enter_list(vm: &mut VM<'_>, key: &KeyPath, start: OpId, end: OpId) -> WeftResult<()> {
    let reference = vm.pop_reference("EnterList")?;
    let items = key.items(&reference.value()?);
    let resume = vm.resume_state("EnterList", start, end)?;
    let bounds = vm.elements.push_tracker();
    vm.updating.push(OpsFrame::List(ListBlock {
        bounds,
        reference,
        key: key.clone(),
        resume,
        iterations: IndexMap::with_capacity(items.len()),
    }));
    vm.lists.push(ListState { items, position: 0 });
    Ok(())
}

pub fn execute_exit_list(vm: &mut VM<'_>) -> WeftResult<()> {
    vm.lists
        .pop()
        .ok_or_else(|| WeftError::invalid_state("ExitList", "no list is being iterated"))?;
    vm.elements.pop_tracker(&mut vm.dom)?;
    match vm.updating.pop() {
        Some(OpsFrame::List(list)) => vm.record(UpdatingOp::List(list)),
        _ => Err(WeftError::invalid_state(
            "ExitList",
            "innermost open range is not a list",
        )),
    }
}

/// Load the next item as the block's positional arguments
pub fn execute_next_iter(vm: &mut VM<'_>, end: OpId) -> WeftResult<()> {
    let state = vm
        .lists
        .last_mut()
        .ok_or_else(|| WeftError::invalid_state("NextIter", "no list is being iterated"))?;
    let Some((key, value)) = state.items.get(state.position).cloned() else {
        return vm.current_frame_mut("NextIter").map(|f| f.jump_to(end));
    };
    let index = state.position;
    state.position += 1;

    let item = cell(value);
    let index = cell(Value::from(index));
    vm.args.positional = vec![item.clone(), index.clone()];
    vm.args.named.clear();
    vm.iteration = Some(IterationSeed { key, item, index });
    Ok(())
}

pub fn execute_enter_with_key(vm: &mut VM<'_>) -> WeftResult<()> {
    let seed = vm
        .iteration
        .take()
        .ok_or_else(|| WeftError::invalid_state("EnterWithKey", "no item was loaded"))?;
    let bounds = vm.elements.push_tracker();
    vm.updating.push(OpsFrame::Iteration(
        seed.key,
        Iteration {
            bounds,
            item: seed.item,
            index: seed.index,
            children: Vec::new(),
        },
    ));
    Ok(())
}
