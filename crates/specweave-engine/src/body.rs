//! Method-body weaving
//!
//! A woven body calls its specification function on entry and keeps the
//! returned deferred check in a fresh local. Every normal exit hands the
//! check the outcome before returning:
//!
//! ```text
//! entry:          aload 0; <load args>; invokestatic Spec.mSpec; astore N
//! return (void):  aload N; invokeinterface DeferredRunnable.run
//! return (value): dup|dup2; [valueOf]; aload N; swap; invokeinterface DeferredCheck.check
//! ctor return:    aload N; aload 0; invokeinterface DeferredCheck.check
//! ```
//!
//! Exceptional exits are not intercepted.

use crate::config::WeaverConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::resolver::SpecBinding;
use crate::splice::{splice, Edit};
use specweave_bytecode::{
    compute_frame_sizes, Instruction, InvokeKind, Kind, Method, MethodDescriptor, MethodRef,
    ReturnType, ValueType,
};

/// Whether a body belongs to a constructor or an instance method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Instance initializer: the specification receives only the arguments
    Constructor,
    /// Instance method: the specification receives the receiver first
    Method,
}

/// Loads of every declared parameter, starting at local `first_slot`
pub(crate) fn load_params(descriptor: &MethodDescriptor, first_slot: u16) -> Vec<Instruction> {
    let mut slot = first_slot;
    descriptor
        .params
        .iter()
        .map(|param| {
            let inst = Instruction::Load(param.kind(), slot);
            slot += param.slots();
            inst
        })
        .collect()
}

/// Invocation of the deferred runnable in local `slot`
pub(crate) fn run_deferred(config: &WeaverConfig, slot: u16) -> Vec<Instruction> {
    vec![
        Instruction::Load(Kind::Ref, slot),
        Instruction::Invoke(
            InvokeKind::Interface,
            MethodRef::new(
                config.deferred_runnable.as_str(),
                config.deferred_runnable_method.as_str(),
                config.run_descriptor(),
                true,
            ),
        ),
    ]
}

fn check_call(config: &WeaverConfig) -> Instruction {
    Instruction::Invoke(
        InvokeKind::Interface,
        MethodRef::new(
            config.deferred_check.as_str(),
            config.deferred_check_method.as_str(),
            config.check_descriptor(),
            true,
        ),
    )
}

/// Box a primitive on top of the stack with its `valueOf`
pub(crate) fn box_value(ty: &ValueType) -> Option<Instruction> {
    let box_class = ty.box_class()?;
    let descriptor = MethodDescriptor::new(
        vec![ty.clone()],
        ReturnType::Value(ValueType::object(box_class)),
    );
    Some(Instruction::Invoke(
        InvokeKind::Static,
        MethodRef::new(box_class, "valueOf", descriptor, false),
    ))
}

/// Hand the value about to be returned to the deferred check in `slot`,
/// leaving the original value on the stack
pub(crate) fn check_result(config: &WeaverConfig, ty: &ValueType, slot: u16) -> Vec<Instruction> {
    let mut seq = Vec::with_capacity(5);
    seq.push(if ty.slots() == 2 {
        Instruction::Dup2
    } else {
        Instruction::Dup
    });
    seq.extend(box_value(ty));
    seq.push(Instruction::Load(Kind::Ref, slot));
    seq.push(Instruction::Swap);
    seq.push(check_call(config));
    seq
}

/// Exit sequence for a method returning `ret` with the deferred value in `slot`
pub(crate) fn exit_sequence(config: &WeaverConfig, ret: &ReturnType, slot: u16) -> Vec<Instruction> {
    match ret {
        ReturnType::Void => run_deferred(config, slot),
        ReturnType::Value(ty) => check_result(config, ty, slot),
    }
}

fn constructor_exit(config: &WeaverConfig, slot: u16) -> Vec<Instruction> {
    vec![
        Instruction::Load(Kind::Ref, slot),
        Instruction::Load(Kind::Ref, 0),
        check_call(config),
    ]
}

/// Weave `binding`'s specification into `method`
///
/// Returns the new method with frame sizes recomputed.
pub fn weave_body(
    class: &str,
    method: &Method,
    binding: &SpecBinding,
    kind: BodyKind,
    config: &WeaverConfig,
) -> WeaveResult<Method> {
    let invalid = |reason: String| WeaveError::InvalidMethod {
        class: class.to_string(),
        method: format!("{}{}", method.name, method.descriptor),
        reason,
    };

    let code = method
        .code
        .as_ref()
        .ok_or_else(|| invalid("method has no body".to_string()))?;
    if method.is_static() {
        return Err(invalid("static methods carry no contract".to_string()));
    }

    let sizes = compute_frame_sizes(method).map_err(|e| invalid(e.to_string()))?;
    let slot = code.max_locals.max(sizes.max_locals);
    if slot == u16::MAX {
        return Err(invalid("no free local slot".to_string()));
    }

    let mut prologue = Vec::new();
    if kind == BodyKind::Method {
        prologue.push(Instruction::Load(Kind::Ref, 0));
    }
    prologue.extend(load_params(&method.descriptor, 1));
    prologue.push(Instruction::Invoke(InvokeKind::Static, binding.spec.clone()));
    prologue.push(Instruction::Store(Kind::Ref, slot));

    let exit = match kind {
        BodyKind::Constructor => constructor_exit(config, slot),
        BodyKind::Method => exit_sequence(config, &method.descriptor.ret, slot),
    };

    let woven_code = splice(code, prologue, |_, inst| {
        if inst.is_return() {
            Edit::Before(exit.clone())
        } else {
            Edit::Keep
        }
    });

    let mut woven = Method {
        access: method.access,
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        code: Some(woven_code),
    };
    let sizes = compute_frame_sizes(&woven).map_err(|e| invalid(e.to_string()))?;
    if let Some(code) = woven.code.as_mut() {
        code.max_stack = sizes.max_stack;
        code.max_locals = sizes.max_locals;
    }
    Ok(woven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use specweave_bytecode::{access, ClassBuilder, Cond};

    fn binding(desc: &str) -> SpecBinding {
        SpecBinding {
            owner: "Account".to_string(),
            owner_is_interface: false,
            spec: MethodRef::new(
                "AccountSpec",
                "withdrawSpec",
                MethodDescriptor::parse(desc).unwrap(),
                false,
            ),
        }
    }

    fn account() -> specweave_bytecode::ClassFile {
        ClassBuilder::new("Account")
            .method(access::PUBLIC, "withdraw", "(I)Z", |code| {
                let refuse = code.new_label();
                code.load(Kind::Ref, 0)
                    .getfield("Account", "balance", "I")
                    .load(Kind::Int, 1)
                    .if_cmp(Cond::Lt, refuse)
                    .iconst(1)
                    .ret(Kind::Int);
                code.bind(refuse).iconst(0).ret(Kind::Int);
            })
            .method(access::PUBLIC, "deposit", "(J)V", |code| {
                code.ret_void();
            })
            .method(access::PUBLIC, "<init>", "(I)V", |code| {
                code.ret_void();
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_entry_and_every_exit_woven() {
        let config = WeaverConfig::default();
        let class = account();
        let woven = weave_body(
            "Account",
            &class.methods[0],
            &binding("(LAccount;I)Lcontracts/DeferredCheck;"),
            BodyKind::Method,
            &config,
        )
        .unwrap();
        let code = woven.code.as_ref().unwrap();

        assert_eq!(code.instructions[0], Instruction::Load(Kind::Ref, 0));
        assert_eq!(code.instructions[1], Instruction::Load(Kind::Int, 1));
        assert!(matches!(&code.instructions[2], Instruction::Invoke(InvokeKind::Static, m) if m.name == "withdrawSpec"));
        assert_eq!(code.instructions[3], Instruction::Store(Kind::Ref, 2));

        let checks = code
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Invoke(InvokeKind::Interface, m) if m.name == "check"))
            .count();
        assert_eq!(checks, 2);

        let boxes = code
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Invoke(InvokeKind::Static, m) if m.owner == "lang/Boolean"))
            .count();
        assert_eq!(boxes, 2);

        // The branch to the refusal path lands on its check sequence
        let branch = code
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::IfCmp(_, target) => Some(*target as usize),
                _ => None,
            })
            .unwrap();
        assert_eq!(code.instructions[branch], Instruction::ConstInt(0));
        assert_eq!(code.instructions[branch + 1], Instruction::Dup);
        assert_eq!(code.max_locals, 3);
    }

    #[test]
    fn test_void_method_runs_deferred() {
        let config = WeaverConfig::default();
        let class = account();
        let woven = weave_body(
            "Account",
            &class.methods[1],
            &binding("(LAccount;J)Lcontracts/DeferredRunnable;"),
            BodyKind::Method,
            &config,
        )
        .unwrap();
        let code = woven.code.as_ref().unwrap();
        // receiver + long param occupy slots 0..3
        assert_eq!(code.instructions[1], Instruction::Load(Kind::Long, 1));
        assert_eq!(code.instructions[3], Instruction::Store(Kind::Ref, 3));
        let tail = &code.instructions[code.instructions.len() - 3..];
        assert_eq!(tail[0], Instruction::Load(Kind::Ref, 3));
        assert!(matches!(&tail[1], Instruction::Invoke(InvokeKind::Interface, m) if m.name == "run"));
        assert_eq!(tail[2], Instruction::ReturnVoid);
    }

    #[test]
    fn test_constructor_checks_receiver() {
        let config = WeaverConfig::default();
        let class = account();
        let woven = weave_body(
            "Account",
            &class.methods[2],
            &binding("(I)Lcontracts/DeferredCheck;"),
            BodyKind::Constructor,
            &config,
        )
        .unwrap();
        let code = woven.code.as_ref().unwrap();
        assert_eq!(code.instructions[0], Instruction::Load(Kind::Int, 1));
        assert_eq!(
            &code.instructions[3..5],
            &[Instruction::Load(Kind::Ref, 2), Instruction::Load(Kind::Ref, 0)]
        );
        assert!(matches!(&code.instructions[5], Instruction::Invoke(InvokeKind::Interface, m) if m.name == "check"));
    }

    #[test]
    fn test_wide_result_uses_dup2() {
        let config = WeaverConfig::default();
        let seq = check_result(&config, &ValueType::Double, 4);
        assert_eq!(seq[0], Instruction::Dup2);
        assert!(matches!(&seq[1], Instruction::Invoke(_, m) if m.owner == "lang/Double" && m.name == "valueOf"));

        let seq = check_result(&config, &ValueType::object("Account"), 4);
        assert_eq!(seq[0], Instruction::Dup);
        assert_eq!(seq[1], Instruction::Load(Kind::Ref, 4));
        assert_eq!(seq.len(), 4);
    }

    #[test]
    fn test_bodiless_method_rejected() {
        let config = WeaverConfig::default();
        let class = ClassBuilder::new("Account")
            .abstract_method(access::PUBLIC, "withdraw", "(I)Z")
            .build()
            .unwrap();
        let err = weave_body(
            "Account",
            &class.methods[0],
            &binding("(LAccount;I)Lcontracts/DeferredCheck;"),
            BodyKind::Method,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, WeaveError::InvalidMethod { .. }));
    }
}
