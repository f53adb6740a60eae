use super::super::expressions::{is_truthy, CompiledExpr, Reference};
use super::super::frame::Frame;
use super::super::opcode::OpId;
use super::super::updating::TryBlock;
use super::super::{Closed, OpsFrame, StackEntry, UpdatingOp, VM};
use crate::blocks::BlockId;
use crate::error::{WeftError, WeftResult};
use std::sync::Arc;

pub fn execute_jump(vm: &mut VM<'_>, target: OpId) -> WeftResult<()> {
    vm.current_frame_mut("Jump")?.jump_to(target);
    Ok(())
}

pub fn execute_jump_if(vm: &mut VM<'_>, target: OpId, expected: bool) -> WeftResult<()> {
    let opcode = if expected { "JumpIf" } else { "JumpUnless" };
    if vm.pop_condition(opcode)? == expected {
        vm.current_frame_mut(opcode)?.jump_to(target);
    }
    Ok(())
}

pub fn execute_put_value(vm: &mut VM<'_>, expr: &Arc<CompiledExpr>) -> WeftResult<()> {
    let scope = vm.current_scope("PutValue")?.clone();
    vm.stack
        .push(StackEntry::Reference(Reference::new(expr.clone(), scope)));
    Ok(())
}

pub fn execute_test(vm: &mut VM<'_>) -> WeftResult<()> {
    let reference = vm.pop_reference("Test")?;
    let condition = is_truthy(&reference.value()?);
    if !matches!(&*reference.expr, CompiledExpr::Value(_)) {
        vm.record(UpdatingOp::Assert {
            reference,
            last: condition,
        })?;
    }
    vm.stack.push(StackEntry::Condition(condition));
    Ok(())
}

pub fn execute_enter(vm: &mut VM<'_>, at: OpId, end: OpId) -> WeftResult<()> {
    let resume = vm.resume_state("Enter", at, end)?;
    let bounds = vm.elements.push_tracker();
    vm.updating.push(OpsFrame::Try(TryBlock {
        bounds,
        resume,
        children: Vec::new(),
    }));
    Ok(())
}

pub fn execute_exit(vm: &mut VM<'_>) -> WeftResult<()> {
    vm.elements.pop_tracker(&mut vm.dom)?;
    let closed = match vm.updating.pop() {
        Some(OpsFrame::Try(block)) => Closed::Try(block),
        Some(OpsFrame::Iteration(key, iteration)) => Closed::Iteration(key, iteration),
        _ => {
            return Err(WeftError::invalid_state(
                "Exit",
                "no tracked range or iteration is open",
            ))
        }
    };
    vm.attach("Exit", closed)
}

pub fn execute_evaluate(vm: &mut VM<'_>, block: BlockId) -> WeftResult<()> {
    let unit = vm.current_unit("Evaluate")?;
    let ops = unit.compile_block(block, vm.env)?;
    vm.frames.push(Frame::new(unit, ops, false));
    Ok(())
}

/// Run the block bound to a yield slot in the scope it was passed from
pub fn execute_invoke_yield(vm: &mut VM<'_>, symbol: usize) -> WeftResult<()> {
    let Some(handle) = vm.current_scope("InvokeYield")?.block(symbol) else {
        return Ok(());
    };
    let ops = handle.unit.compile_block(handle.block, vm.env)?;
    vm.scopes.push(handle.scope.child());
    vm.frames.push(Frame::new(handle.unit.clone(), ops, true));
    Ok(())
}
