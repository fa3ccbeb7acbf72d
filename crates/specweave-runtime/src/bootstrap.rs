//! Built-in classes of the bootstrap scope
//!
//! These are served before the application scope and never pass through
//! the weaver's transformation (the bootstrap scope is contract-free).
//! Most of their methods are native; see [`crate::natives`].

use crate::error::VmResult;
use specweave_bytecode::{access, ClassBuilder, ClassFile, Kind, ROOT_CLASS};

/// Opt-in marker annotation
pub const CONTRACTED: &str = "contracts/Contracted";
/// Annotation the weaver adds to classes it changed
pub const WOVEN: &str = "contracts/Woven";
/// Contract primitives
pub const CONTRACTS: &str = "contracts/Contracts";
/// Deferred check over a result
pub const DEFERRED_CHECK: &str = "contracts/DeferredCheck";
/// Deferred check without a result
pub const DEFERRED_RUNNABLE: &str = "contracts/DeferredRunnable";
/// Predicate over a result, `test(Llang/Object;)Z`
pub const PREDICATE: &str = "contracts/Predicate";
/// Argument-free condition, `holds()Z`
pub const CONDITION: &str = "contracts/Condition";
/// Host implementation of [`DEFERRED_CHECK`]
pub const POSTCONDITION_CHECK: &str = "contracts/PostconditionCheck";
/// Host implementation of [`DEFERRED_RUNNABLE`]
pub const POSTCONDITION_RUNNABLE: &str = "contracts/PostconditionRunnable";
/// Root of throwable classes
pub const THROWABLE: &str = "lang/Throwable";

/// Box classes: (class, primitive descriptor, unboxing method)
pub const BOXES: &[(&str, &str, &str)] = &[
    ("lang/Boolean", "Z", "booleanValue"),
    ("lang/Byte", "B", "byteValue"),
    ("lang/Character", "C", "charValue"),
    ("lang/Short", "S", "shortValue"),
    ("lang/Integer", "I", "intValue"),
    ("lang/Long", "J", "longValue"),
    ("lang/Float", "F", "floatValue"),
    ("lang/Double", "D", "doubleValue"),
];

fn object() -> VmResult<ClassFile> {
    Ok(ClassBuilder::new(ROOT_CLASS)
        .native_method(access::PUBLIC, "<init>", "()V")
        .build()?)
}

fn throwable() -> VmResult<ClassFile> {
    Ok(ClassBuilder::new(THROWABLE)
        .method(access::PUBLIC, "<init>", "()V", |code| {
            code.load(Kind::Ref, 0)
                .invoke_special(ROOT_CLASS, "<init>", "()V")
                .ret_void();
        })
        .build()?)
}

fn box_class(name: &str, prim: &str, unbox: &str) -> VmResult<ClassFile> {
    Ok(ClassBuilder::new(name)
        .access(access::PUBLIC | access::FINAL)
        .native_method(
            access::PUBLIC | access::STATIC,
            "valueOf",
            &format!("({})L{};", prim, name),
        )
        .native_method(access::PUBLIC, unbox, &format!("(){}", prim))
        .build()?)
}

fn annotation(name: &str) -> VmResult<ClassFile> {
    Ok(ClassBuilder::new(name).interface().build()?)
}

fn interface(name: &str, method: &str, desc: &str) -> VmResult<ClassFile> {
    Ok(ClassBuilder::new(name)
        .interface()
        .abstract_method(access::PUBLIC, method, desc)
        .build()?)
}

fn contracts() -> VmResult<ClassFile> {
    let flags = access::PUBLIC | access::STATIC;
    Ok(ClassBuilder::new(CONTRACTS)
        .access(access::PUBLIC | access::FINAL)
        .native_method(flags, "requires", "(Z)V")
        .native_method(
            flags,
            "ensures",
            &format!("(L{};)L{};", PREDICATE, DEFERRED_CHECK),
        )
        .native_method(
            flags,
            "ensures",
            &format!("(L{};)L{};", CONDITION, DEFERRED_RUNNABLE),
        )
        .build()?)
}

fn deferred_impl(name: &str, iface: &str, method: &str, desc: &str) -> VmResult<ClassFile> {
    Ok(ClassBuilder::new(name)
        .access(access::PUBLIC | access::FINAL)
        .implements(iface)
        .native_method(access::PUBLIC, method, desc)
        .build()?)
}

/// Every built-in class
pub fn classes() -> VmResult<Vec<ClassFile>> {
    let mut classes = vec![
        object()?,
        throwable()?,
        annotation(CONTRACTED)?,
        annotation(WOVEN)?,
        interface(DEFERRED_CHECK, "check", "(Llang/Object;)V")?,
        interface(DEFERRED_RUNNABLE, "run", "()V")?,
        interface(PREDICATE, "test", "(Llang/Object;)Z")?,
        interface(CONDITION, "holds", "()Z")?,
        contracts()?,
        deferred_impl(POSTCONDITION_CHECK, DEFERRED_CHECK, "check", "(Llang/Object;)V")?,
        deferred_impl(POSTCONDITION_RUNNABLE, DEFERRED_RUNNABLE, "run", "()V")?,
    ];
    for (name, prim, unbox) in BOXES {
        classes.push(box_class(name, prim, unbox)?);
    }
    Ok(classes)
}
