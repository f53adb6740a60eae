use super::super::builder::{attribute_value, class_text, AttrValue, PendingElement};
use super::super::expressions::{to_text, CompiledArgs, CompiledExpr, Reference};
use super::super::{UpdatingOp, VM};
use crate::dom::{DomBackend, NodeRef};
use crate::environment::Modifier;
use crate::error::WeftResult;

/// Constant expressions are written once and never re-checked
pub(super) fn attr_value(reference: Reference) -> AttrValue {
    match &*reference.expr {
        CompiledExpr::Value(value) => AttrValue::Static(to_text(value)),
        _ => AttrValue::Dynamic(reference),
    }
}

pub fn execute_text(vm: &mut VM<'_>, text: &str) -> WeftResult<()> {
    vm.elements.append_text(&mut vm.dom, text);
    Ok(())
}

pub fn execute_comment(vm: &mut VM<'_>, text: &str) -> WeftResult<()> {
    vm.elements.append_comment(&mut vm.dom, text);
    Ok(())
}

pub fn execute_append(vm: &mut VM<'_>, trusted: bool) -> WeftResult<()> {
    let reference = vm.pop_reference("Append")?;
    let text = to_text(&reference.value()?);
    let node = if trusted {
        vm.elements.append_raw(&mut vm.dom, &text)
    } else {
        vm.elements.append_text(&mut vm.dom, &text)
    };
    if !matches!(&*reference.expr, CompiledExpr::Value(_)) {
        vm.record(UpdatingOp::Text {
            node,
            reference,
            last: text,
        })?;
    }
    Ok(())
}

pub fn execute_open_element(vm: &mut VM<'_>, tag: &str) -> WeftResult<()> {
    vm.elements.open_element(&mut vm.dom, tag);
    Ok(())
}

pub fn execute_static_attr(
    vm: &mut VM<'_>,
    name: &str,
    value: &str,
    namespace: Option<&str>,
) -> WeftResult<()> {
    vm.elements.pending_mut("StaticAttr")?.set_attribute(
        name,
        AttrValue::Static(value.to_string()),
        namespace.map(str::to_string),
    );
    Ok(())
}

pub fn execute_dynamic_attr(vm: &mut VM<'_>, name: &str, namespace: Option<&str>) -> WeftResult<()> {
    let reference = vm.pop_reference("DynamicAttr")?;
    vm.elements.pending_mut("DynamicAttr")?.set_attribute(
        name,
        attr_value(reference),
        namespace.map(str::to_string),
    );
    Ok(())
}

pub fn execute_dynamic_prop(vm: &mut VM<'_>, name: &str) -> WeftResult<()> {
    let reference = vm.pop_reference("DynamicProp")?;
    vm.elements
        .pending_mut("DynamicProp")?
        .properties
        .push((name.to_string(), reference));
    Ok(())
}

pub fn execute_add_class(vm: &mut VM<'_>) -> WeftResult<()> {
    let reference = vm.pop_reference("AddClass")?;
    vm.elements
        .pending_mut("AddClass")?
        .classes
        .push(attr_value(reference));
    Ok(())
}

pub fn execute_modifier(vm: &mut VM<'_>, modifier: &Modifier, args: &CompiledArgs) -> WeftResult<()> {
    let scope = vm.current_scope("Modifier")?.clone();
    vm.elements
        .pending_mut("Modifier")?
        .modifiers
        .push((modifier.clone(), args.clone(), scope));
    Ok(())
}

pub fn execute_flush_element(vm: &mut VM<'_>) -> WeftResult<()> {
    match vm.elements.take_pending() {
        Some((element, pending)) => flush(vm, element, pending),
        None => Ok(()),
    }
}

pub fn execute_close_element(vm: &mut VM<'_>) -> WeftResult<()> {
    execute_flush_element(vm)?;
    vm.elements.close_element()?;
    Ok(())
}

/// Write everything queued on an element, recording the dynamic parts
fn flush(vm: &mut VM<'_>, element: NodeRef, pending: PendingElement) -> WeftResult<()> {
    for (name, queued) in pending.attributes {
        let namespace = queued.namespace.as_deref();
        match queued.value {
            AttrValue::Static(text) => vm.dom.set_attribute(element, &name, &text, namespace),
            AttrValue::Dynamic(reference) => {
                let last = attribute_value(&reference.value()?);
                if let Some(text) = &last {
                    vm.dom.set_attribute(element, &name, text, namespace);
                }
                vm.record(UpdatingOp::Attr {
                    element,
                    name,
                    namespace: queued.namespace,
                    reference,
                    last,
                })?;
            }
        }
    }

    if !pending.classes.is_empty() {
        let text = class_text(&pending.classes)?;
        if !text.is_empty() {
            vm.dom.set_attribute(element, "class", &text, None);
        }
        if pending.classes.iter().any(AttrValue::is_dynamic) {
            vm.record(UpdatingOp::Class {
                element,
                parts: pending.classes,
                last: text,
            })?;
        }
    }

    for (name, reference) in pending.properties {
        let value = reference.value()?;
        vm.dom.set_property(element, &name, &value);
        vm.record(UpdatingOp::Prop {
            element,
            name,
            reference,
            last: value,
        })?;
    }

    for (modifier, args, scope) in pending.modifiers {
        let last = args.evaluate(&scope)?;
        modifier.install(&mut vm.dom, element, &last.0, &last.1);
        vm.record(UpdatingOp::Modifier {
            element,
            modifier,
            args,
            scope,
            last,
        })?;
    }
    Ok(())
}
