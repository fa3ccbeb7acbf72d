//! Host implementations of native methods
//!
//! Natives are keyed by (declaring class, name, descriptor) and receive the
//! declaring class name plus the arguments, receiver first.

use crate::bootstrap::{self, BOXES};
use crate::contracts;
use crate::error::{VmError, VmResult};
use crate::heap::{NativeData, Object};
use crate::interpreter::Vm;
use crate::value::Value;
use rustc_hash::FxHashMap;
use specweave_bytecode::ROOT_CLASS;
use tracing::trace;

/// Native method implementation
pub type NativeFn = fn(&mut Vm, &str, &[Value]) -> VmResult<Option<Value>>;

type NativeKey = (String, String, String);

/// Registry of native methods
#[derive(Default)]
pub struct NativeRegistry {
    entries: FxHashMap<NativeKey, NativeFn>,
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in native
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ROOT_CLASS, "<init>", "()V", object_init);
        for (class, prim, unbox) in BOXES {
            registry.register(class, "valueOf", &format!("({})L{};", prim, class), box_value);
            registry.register(class, unbox, &format!("(){}", prim), unbox_value);
        }
        registry.register(bootstrap::CONTRACTS, "requires", "(Z)V", requires);
        registry.register(
            bootstrap::CONTRACTS,
            "ensures",
            &format!("(L{};)L{};", bootstrap::PREDICATE, bootstrap::DEFERRED_CHECK),
            ensures_predicate,
        );
        registry.register(
            bootstrap::CONTRACTS,
            "ensures",
            &format!("(L{};)L{};", bootstrap::CONDITION, bootstrap::DEFERRED_RUNNABLE),
            ensures_condition,
        );
        registry.register(
            bootstrap::POSTCONDITION_CHECK,
            "check",
            "(Llang/Object;)V",
            run_check,
        );
        registry.register(bootstrap::POSTCONDITION_RUNNABLE, "run", "()V", run_runnable);
        registry
    }

    /// Register (or replace) a native
    pub fn register(&mut self, class: &str, name: &str, descriptor: &str, native: NativeFn) {
        self.entries.insert(
            (class.to_string(), name.to_string(), descriptor.to_string()),
            native,
        );
    }

    /// Look up a native
    pub fn get(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.entries
            .get(&(class.to_string(), name.to_string(), descriptor.to_string()))
            .copied()
    }

    /// Number of registered natives
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn arg(args: &[Value], index: usize) -> VmResult<Value> {
    args.get(index)
        .copied()
        .ok_or_else(|| VmError::TypeError(format!("missing native argument {}", index)))
}

// ===== lang =====

fn object_init(_vm: &mut Vm, _class: &str, _args: &[Value]) -> VmResult<Option<Value>> {
    Ok(None)
}

fn box_value(vm: &mut Vm, class: &str, args: &[Value]) -> VmResult<Option<Value>> {
    let value = arg(args, 0)?;
    let obj = vm.heap_mut().alloc(Object::native(class, NativeData::Boxed(value)));
    Ok(Some(Value::Ref(obj)))
}

fn unbox_value(vm: &mut Vm, _class: &str, args: &[Value]) -> VmResult<Option<Value>> {
    let obj = arg(args, 0)?.as_object()?;
    match &vm.heap().get(obj)?.native {
        Some(NativeData::Boxed(value)) => Ok(Some(*value)),
        _ => Err(VmError::TypeError("unboxing a non-box object".to_string())),
    }
}

// ===== contracts =====

fn requires(vm: &mut Vm, _class: &str, args: &[Value]) -> VmResult<Option<Value>> {
    let holds = arg(args, 0)?.as_bool()?;
    contracts::requires_at(holds, vm.current_site())?;
    Ok(None)
}

fn ensures_predicate(vm: &mut Vm, _class: &str, args: &[Value]) -> VmResult<Option<Value>> {
    let data = NativeData::Check {
        predicate: arg(args, 0)?,
        site: vm.current_site(),
    };
    let obj = vm
        .heap_mut()
        .alloc(Object::native(bootstrap::POSTCONDITION_CHECK, data));
    Ok(Some(Value::Ref(obj)))
}

fn ensures_condition(vm: &mut Vm, _class: &str, args: &[Value]) -> VmResult<Option<Value>> {
    let data = NativeData::Runnable {
        condition: arg(args, 0)?,
        site: vm.current_site(),
    };
    let obj = vm
        .heap_mut()
        .alloc(Object::native(bootstrap::POSTCONDITION_RUNNABLE, data));
    Ok(Some(Value::Ref(obj)))
}

fn run_check(vm: &mut Vm, _class: &str, args: &[Value]) -> VmResult<Option<Value>> {
    let this = arg(args, 0)?.as_object()?;
    let result = arg(args, 1)?;
    let (predicate, site) = match &vm.heap().get(this)?.native {
        Some(NativeData::Check { predicate, site }) => (*predicate, site.clone()),
        _ => return Err(VmError::TypeError("not a postcondition check".to_string())),
    };
    trace!(site = %site, "running deferred check");
    let holds = vm
        .invoke_virtual(predicate, "test", "(Llang/Object;)Z", &[result])?
        .ok_or_else(|| VmError::TypeError("predicate returned no value".to_string()))?;
    contracts::ensures_at(holds.as_bool()?, site)?;
    Ok(None)
}

fn run_runnable(vm: &mut Vm, _class: &str, args: &[Value]) -> VmResult<Option<Value>> {
    let this = arg(args, 0)?.as_object()?;
    let (condition, site) = match &vm.heap().get(this)?.native {
        Some(NativeData::Runnable { condition, site }) => (*condition, site.clone()),
        _ => return Err(VmError::TypeError("not a postcondition runnable".to_string())),
    };
    trace!(site = %site, "running deferred runnable");
    let holds = vm
        .invoke_virtual(condition, "holds", "()Z", &[])?
        .ok_or_else(|| VmError::TypeError("condition returned no value".to_string()))?;
    contracts::ensures_at(holds.as_bool()?, site)?;
    Ok(None)
}
