//! VM Execution Loop
//!
//! This module contains the main execution loop and opcode dispatch logic.

use super::opcode::{OpId, Opcode};
use super::ops;
use super::VM;
use crate::error::{WeftError, WeftResult};
use log::trace;

pub fn execute_vm(vm: &mut VM<'_>) -> WeftResult<()> {
    loop {
        let depth = vm.frames.len();
        let Some(frame) = vm.frames.last_mut() else {
            return Ok(());
        };

        let Some((pc, ops)) = frame.fetch() else {
            let finished = vm.frames.pop();
            if finished.map(|f| f.pops_scope).unwrap_or(false) {
                ops::execute_pop_scope(vm)?;
            }
            continue;
        };

        let opcode = ops
            .get(pc)
            .ok_or_else(|| WeftError::invalid_state("fetch", "instruction handle is stale"))?;
        vm.instructions += 1;
        trace!("{:>3} {}", depth, opcode.name());

        vm.execute_opcode(opcode, pc)?;

        if vm.stop == Some((depth, pc)) {
            return Ok(());
        }
    }
}

impl VM<'_> {
    fn execute_opcode(&mut self, opcode: &Opcode, at: OpId) -> WeftResult<()> {
        match opcode {
            // Scope
            Opcode::PushChildScope => ops::execute_push_child_scope(self),
            Opcode::PopScope => ops::execute_pop_scope(self),
            Opcode::PutArgs(args) => ops::execute_put_args(self, args),
            Opcode::BindPositionalArgs(symbols) => ops::execute_bind_positional_args(self, symbols),
            Opcode::BindNamedArgs(pairs) => ops::execute_bind_named_args(self, pairs),
            Opcode::BindBlocks(pairs) => ops::execute_bind_blocks(self, pairs),

            // Control flow
            Opcode::Label(_) => Ok(()),
            Opcode::Enter { end } => ops::execute_enter(self, at, *end),
            Opcode::Exit => ops::execute_exit(self),
            Opcode::Jump(target) => ops::execute_jump(self, *target),
            Opcode::JumpIf(target) => ops::execute_jump_if(self, *target, true),
            Opcode::JumpUnless(target) => ops::execute_jump_if(self, *target, false),
            Opcode::Test => ops::execute_test(self),
            Opcode::Evaluate(block) => ops::execute_evaluate(self, *block),
            Opcode::InvokeYield(symbol) => ops::execute_invoke_yield(self, *symbol),

            // Expressions
            Opcode::PutValue(expr) => ops::execute_put_value(self, expr),

            // Output
            Opcode::Text(text) => ops::execute_text(self, text),
            Opcode::Comment(text) => ops::execute_comment(self, text),
            Opcode::Append { trusted } => ops::execute_append(self, *trusted),
            Opcode::OpenPrimitiveElement(tag) => ops::execute_open_element(self, tag),
            Opcode::StaticAttr {
                name,
                value,
                namespace,
            } => ops::execute_static_attr(self, name, value, namespace.as_deref()),
            Opcode::DynamicAttr { name, namespace } => {
                ops::execute_dynamic_attr(self, name, namespace.as_deref())
            }
            Opcode::DynamicProp(name) => ops::execute_dynamic_prop(self, name),
            Opcode::AddClass => ops::execute_add_class(self),
            Opcode::Modifier { modifier, args } => ops::execute_modifier(self, modifier, args),
            Opcode::FlushElement => ops::execute_flush_element(self),
            Opcode::CloseElement => ops::execute_close_element(self),

            // Components
            Opcode::OpenComponent(invocation) => ops::execute_open_component(self, invocation),
            Opcode::ShadowAttributes => ops::execute_shadow_attributes(self),
            Opcode::CloseComponent => ops::execute_close_component(self),

            // Lists
            Opcode::EnterList { key, start, end } => {
                ops::execute_enter_list(self, key, *start, *end)
            }
            Opcode::ExitList => ops::execute_exit_list(self),
            Opcode::EnterWithKey => ops::execute_enter_with_key(self),
            Opcode::NextIter { end } => ops::execute_next_iter(self, *end),
        }
    }
}
