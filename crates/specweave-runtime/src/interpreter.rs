//! Virtual machine interpreter
//!
//! Executes methods of loaded classes one frame at a time. Every class is
//! obtained through the [`ClassLoader`], so application classes run in their
//! woven form.
//!
//! Dispatch walks the receiver's superclass chain for the first method with
//! a body (or a native implementation) matching name and descriptor. Thrown
//! objects unwind to the innermost covering handler; contract violations
//! and other VM errors are not catchable by bytecode.

use crate::error::{VmError, VmResult};
use crate::frame::{Frame, Slot};
use crate::heap::{Heap, Object};
use crate::loader::ClassLoader;
use crate::natives::NativeRegistry;
use crate::value::{ObjRef, Value};
use rustc_hash::FxHashMap;
use specweave_bytecode::{
    ClassFile, Code, Cond, FieldRef, Instruction, InvokeKind, Kind, MethodDescriptor, MethodRef,
    ReturnType,
};
use specweave_engine::{ClassSource, Weaver};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Default limit on nested calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

enum Step {
    Next,
    Jump(u32),
    Return(Option<Value>),
}

/// Specweave virtual machine
pub struct Vm {
    loader: ClassLoader,
    heap: Heap,
    natives: NativeRegistry,
    calls: Vec<String>,
    max_call_depth: usize,
}

impl Vm {
    /// Create a VM loading application classes from `source` through `weaver`
    pub fn new(source: Arc<dyn ClassSource>, weaver: Arc<Weaver>) -> VmResult<Self> {
        Ok(Self {
            loader: ClassLoader::new(source, weaver)?,
            heap: Heap::new(),
            natives: NativeRegistry::with_builtins(),
            calls: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        })
    }

    /// Limit nested calls
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// The class loader
    pub fn loader(&self) -> &ClassLoader {
        &self.loader
    }

    /// The object heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable object heap
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Native method registry
    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    /// Load (and weave) a class
    pub fn load_class(&mut self, name: &str) -> VmResult<Arc<ClassFile>> {
        self.loader.load(name)
    }

    /// The innermost executing bytecode method, as `owner.name`
    pub fn current_site(&self) -> String {
        self.calls
            .last()
            .cloned()
            .unwrap_or_else(|| "<host>".to_string())
    }

    // ===== Host API =====

    /// Allocate an instance of `class` and run its constructor
    pub fn new_instance(&mut self, class: &str, descriptor: &str, args: &[Value]) -> VmResult<Value> {
        let obj = self.allocate(class)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::Ref(obj));
        full.extend_from_slice(args);
        let target = MethodRef::new(class, "<init>", MethodDescriptor::parse(descriptor)?, false);
        self.invoke(InvokeKind::Special, &target, full)?;
        Ok(Value::Ref(obj))
    }

    /// Call a static method
    pub fn invoke_static(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        let target = MethodRef::new(class, name, MethodDescriptor::parse(descriptor)?, false);
        self.invoke(InvokeKind::Static, &target, args.to_vec())
    }

    /// Call an instance method with dynamic dispatch on `receiver`
    pub fn invoke_virtual(
        &mut self,
        receiver: Value,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        let class = self.class_of(receiver)?;
        let target = MethodRef::new(class, name, MethodDescriptor::parse(descriptor)?, false);
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver);
        full.extend_from_slice(args);
        self.invoke(InvokeKind::Virtual, &target, full)
    }

    /// Read an instance field
    pub fn get_field(&self, obj: Value, name: &str) -> VmResult<Value> {
        self.heap.get(obj.as_object()?)?.get_field(name)
    }

    /// Class of a non-null reference
    pub fn class_of(&self, value: Value) -> VmResult<String> {
        Ok(self.heap.get(value.as_object()?)?.class.clone())
    }

    // ===== Invocation =====

    fn allocate(&mut self, class: &str) -> VmResult<ObjRef> {
        let mut fields = FxHashMap::default();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            let file = self.loader.load(&name)?;
            for field in &file.fields {
                fields
                    .entry(field.name.clone())
                    .or_insert_with(|| Value::default_for(&field.ty));
            }
            current = file.super_name.clone();
        }
        Ok(self.heap.alloc(Object::new(class, fields)))
    }

    /// Select the method to run for `target` under `kind`
    fn resolve(&mut self, kind: InvokeKind, target: &MethodRef, receiver: Option<Value>) -> VmResult<(Arc<ClassFile>, usize)> {
        let start = match (kind, receiver) {
            (InvokeKind::Virtual | InvokeKind::Interface, Some(receiver)) => self.class_of(receiver)?,
            _ => target.owner.clone(),
        };
        let mut current = Some(start.clone());
        while let Some(name) = current {
            let file = self.loader.load(&name)?;
            let found = file.methods.iter().position(|m| {
                m.name == target.name
                    && m.descriptor == target.descriptor
                    && m.is_static() == (kind == InvokeKind::Static)
                    && (m.code.is_some() || m.is_native())
            });
            if let Some(idx) = found {
                return Ok((file, idx));
            }
            current = file.super_name.clone();
        }
        Err(VmError::NoSuchMethod {
            class: start,
            name: target.name.clone(),
            descriptor: target.descriptor.to_string(),
        })
    }

    fn invoke(&mut self, kind: InvokeKind, target: &MethodRef, args: Vec<Value>) -> VmResult<Option<Value>> {
        let receiver = if kind == InvokeKind::Static {
            None
        } else {
            let receiver = args.first().copied().ok_or(VmError::NullPointer)?;
            receiver.as_object()?;
            Some(receiver)
        };
        let (class, idx) = self.resolve(kind, target, receiver)?;
        self.call(class, idx, args)
    }

    fn call(&mut self, class: Arc<ClassFile>, idx: usize, args: Vec<Value>) -> VmResult<Option<Value>> {
        let method = &class.methods[idx];
        let site = format!("{}.{}", class.name, method.name);
        if method.is_native() {
            let descriptor = method.descriptor.to_string();
            let native = self
                .natives
                .get(&class.name, &method.name, &descriptor)
                .ok_or_else(|| VmError::MissingNative(format!("{}{}", site, descriptor)))?;
            return native(self, &class.name, &args);
        }
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| VmError::AbstractMethod(site.clone()))?;

        if self.calls.len() >= self.max_call_depth {
            return Err(VmError::StackOverflow(self.calls.len()));
        }
        trace!(method = %site, "enter");
        self.calls.push(site.clone());
        let result = self.execute(&site, code, &method.descriptor, &args);
        self.calls.pop();
        result
    }

    // ===== Execution =====

    fn execute(&mut self, site: &str, code: &Code, descriptor: &MethodDescriptor, args: &[Value]) -> VmResult<Option<Value>> {
        let mut frame = Frame::new(site, code.max_locals, code.max_stack, args)?;
        let mut pc: usize = 0;
        loop {
            let inst = code
                .instructions
                .get(pc)
                .ok_or_else(|| VmError::FellOffEnd(site.to_string()))?;
            match self.step(&mut frame, inst) {
                Ok(Step::Next) => pc += 1,
                Ok(Step::Jump(target)) => pc = target as usize,
                Ok(Step::Return(value)) => {
                    return match (&descriptor.ret, value) {
                        (ReturnType::Void, None) => Ok(None),
                        (ReturnType::Value(ty), Some(v)) if ty.kind() == v.kind() => Ok(Some(v)),
                        (_, value) => Err(VmError::TypeError(format!(
                            "{}: return of {:?} from method returning {}",
                            site, value, descriptor.ret
                        ))),
                    };
                }
                Err(VmError::Thrown { class, object }) => {
                    match self.find_handler(code, pc, &class)? {
                        Some(target) => {
                            trace!(method = %site, exception = %class, "caught");
                            frame.clear_stack();
                            frame.push(Value::Ref(object))?;
                            pc = target as usize;
                        }
                        None => return Err(VmError::Thrown { class, object }),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn find_handler(&mut self, code: &Code, pc: usize, thrown: &str) -> VmResult<Option<u32>> {
        let pc = pc as u32;
        for handler in &code.handlers {
            if pc < handler.start || pc >= handler.end {
                continue;
            }
            let matches = match &handler.catch_type {
                None => true,
                Some(catch_type) => self.loader.is_assignable(thrown, catch_type)?,
            };
            if matches {
                return Ok(Some(handler.target));
            }
        }
        Ok(None)
    }

    fn step(&mut self, frame: &mut Frame, inst: &Instruction) -> VmResult<Step> {
        match inst {
            Instruction::Nop => {}
            Instruction::Pop => {
                frame.pop_slot()?;
            }
            Instruction::Pop2 => {
                frame.pop_slot()?;
                frame.pop_slot()?;
            }
            Instruction::Dup => {
                let v1 = frame.pop_slot()?;
                push_slots(frame, &[v1, v1])?;
            }
            Instruction::DupX1 => {
                let v1 = frame.pop_slot()?;
                let v2 = frame.pop_slot()?;
                push_slots(frame, &[v1, v2, v1])?;
            }
            Instruction::Dup2 => {
                let v1 = frame.pop_slot()?;
                let v2 = frame.pop_slot()?;
                push_slots(frame, &[v2, v1, v2, v1])?;
            }
            Instruction::Dup2X1 => {
                let v1 = frame.pop_slot()?;
                let v2 = frame.pop_slot()?;
                let v3 = frame.pop_slot()?;
                push_slots(frame, &[v2, v1, v3, v2, v1])?;
            }
            Instruction::Swap => {
                let v1 = frame.pop_slot()?;
                let v2 = frame.pop_slot()?;
                push_slots(frame, &[v1, v2])?;
            }
            Instruction::ConstNull => frame.push(Value::Null)?,
            Instruction::ConstInt(v) => frame.push(Value::Int(*v))?,
            Instruction::ConstLong(v) => frame.push(Value::Long(*v))?,
            Instruction::ConstFloat(v) => frame.push(Value::Float(*v))?,
            Instruction::ConstDouble(v) => frame.push(Value::Double(*v))?,
            Instruction::Load(kind, slot) => {
                let value = frame.load(*kind, *slot)?;
                frame.push(value)?;
            }
            Instruction::Store(kind, slot) => {
                let value = frame.pop_kind(*kind)?;
                frame.store(*slot, value)?;
            }
            Instruction::Add(kind)
            | Instruction::Sub(kind)
            | Instruction::Mul(kind)
            | Instruction::Div(kind)
            | Instruction::Rem(kind) => {
                let b = frame.pop_kind(*kind)?;
                let a = frame.pop_kind(*kind)?;
                frame.push(arithmetic(inst, a, b)?)?;
            }
            Instruction::Neg(kind) => {
                let value = match frame.pop_kind(*kind)? {
                    Value::Int(v) => Value::Int(v.wrapping_neg()),
                    Value::Long(v) => Value::Long(v.wrapping_neg()),
                    Value::Float(v) => Value::Float(-v),
                    Value::Double(v) => Value::Double(-v),
                    other => return Err(VmError::TypeError(format!("cannot negate {}", other))),
                };
                frame.push(value)?;
            }
            Instruction::LongCmp => {
                let b = frame.pop_kind(Kind::Long)?.as_long()?;
                let a = frame.pop_kind(Kind::Long)?.as_long()?;
                let result = match a.cmp(&b) {
                    Ordering::Less => -1,
                    Ordering::Equal => 0,
                    Ordering::Greater => 1,
                };
                frame.push(Value::Int(result))?;
            }
            Instruction::If(cond, target) => {
                let value = frame.pop_kind(Kind::Int)?.as_int()?;
                if cond.holds(value.cmp(&0)) {
                    return Ok(Step::Jump(*target));
                }
            }
            Instruction::IfCmp(cond, target) => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                if compare(*cond, a, b)? {
                    return Ok(Step::Jump(*target));
                }
            }
            Instruction::IfNull(target) => {
                if frame.pop_kind(Kind::Ref)?.is_null() {
                    return Ok(Step::Jump(*target));
                }
            }
            Instruction::IfNonNull(target) => {
                if !frame.pop_kind(Kind::Ref)?.is_null() {
                    return Ok(Step::Jump(*target));
                }
            }
            Instruction::Goto(target) => return Ok(Step::Jump(*target)),
            Instruction::New(class) => {
                let obj = self.allocate(class)?;
                frame.push(Value::Ref(obj))?;
            }
            Instruction::GetField(field) => {
                let obj = frame.pop_kind(Kind::Ref)?.as_object()?;
                let value = self.heap.get(obj)?.get_field(&field.name)?;
                check_field(field, value)?;
                frame.push(value)?;
            }
            Instruction::PutField(field) => {
                let value = frame.pop_kind(field.ty.kind())?;
                let obj = frame.pop_kind(Kind::Ref)?.as_object()?;
                self.heap.get_mut(obj)?.set_field(&field.name, value)?;
            }
            Instruction::CheckCast(class) => {
                let value = frame.pop_kind(Kind::Ref)?;
                if let Some(obj) = value.as_reference()? {
                    let found = self.heap.get(obj)?.class.clone();
                    if !self.loader.is_assignable(&found, class)? {
                        return Err(VmError::ClassCast {
                            expected: class.clone(),
                            found,
                        });
                    }
                }
                frame.push(value)?;
            }
            Instruction::InstanceOf(class) => {
                let value = frame.pop_kind(Kind::Ref)?;
                let is = match value.as_reference()? {
                    Some(obj) => {
                        let found = self.heap.get(obj)?.class.clone();
                        self.loader.is_assignable(&found, class)?
                    }
                    None => false,
                };
                frame.push(Value::bool(is))?;
            }
            Instruction::Invoke(kind, target) => {
                let mut args = Vec::with_capacity(target.descriptor.params.len() + 1);
                for param in target.descriptor.params.iter().rev() {
                    args.push(frame.pop_kind(param.kind())?);
                }
                if *kind != InvokeKind::Static {
                    args.push(frame.pop_kind(Kind::Ref)?);
                }
                args.reverse();
                if let Some(value) = self.invoke(*kind, target, args)? {
                    frame.push(value)?;
                }
            }
            Instruction::Return(kind) => {
                let value = frame.pop_kind(*kind)?;
                return Ok(Step::Return(Some(value)));
            }
            Instruction::ReturnVoid => return Ok(Step::Return(None)),
            Instruction::Throw => {
                let object = frame.pop_kind(Kind::Ref)?.as_object()?;
                let class = self.heap.get(object)?.class.clone();
                return Err(VmError::Thrown { class, object });
            }
        }
        Ok(Step::Next)
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("loader", &self.loader)
            .field("objects", &self.heap.len())
            .field("depth", &self.calls.len())
            .finish()
    }
}

fn push_slots(frame: &mut Frame, slots: &[Slot]) -> VmResult<()> {
    for slot in slots {
        frame.push_slot(*slot)?;
    }
    Ok(())
}

fn check_field(field: &FieldRef, value: Value) -> VmResult<()> {
    if value.kind() != field.ty.kind() {
        return Err(VmError::TypeError(format!(
            "field {}.{} of type {} holds {}",
            field.owner, field.name, field.ty, value
        )));
    }
    Ok(())
}

fn arithmetic(inst: &Instruction, a: Value, b: Value) -> VmResult<Value> {
    use Instruction::*;
    Ok(match (inst, a, b) {
        (Add(_), Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
        (Sub(_), Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(b)),
        (Mul(_), Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(b)),
        (Div(_) | Rem(_), Value::Int(_), Value::Int(0)) => return Err(VmError::DivisionByZero),
        (Div(_), Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_div(b)),
        (Rem(_), Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_rem(b)),

        (Add(_), Value::Long(a), Value::Long(b)) => Value::Long(a.wrapping_add(b)),
        (Sub(_), Value::Long(a), Value::Long(b)) => Value::Long(a.wrapping_sub(b)),
        (Mul(_), Value::Long(a), Value::Long(b)) => Value::Long(a.wrapping_mul(b)),
        (Div(_) | Rem(_), Value::Long(_), Value::Long(0)) => return Err(VmError::DivisionByZero),
        (Div(_), Value::Long(a), Value::Long(b)) => Value::Long(a.wrapping_div(b)),
        (Rem(_), Value::Long(a), Value::Long(b)) => Value::Long(a.wrapping_rem(b)),

        (Add(_), Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (Sub(_), Value::Float(a), Value::Float(b)) => Value::Float(a - b),
        (Mul(_), Value::Float(a), Value::Float(b)) => Value::Float(a * b),
        (Div(_), Value::Float(a), Value::Float(b)) => Value::Float(a / b),
        (Rem(_), Value::Float(a), Value::Float(b)) => Value::Float(a % b),

        (Add(_), Value::Double(a), Value::Double(b)) => Value::Double(a + b),
        (Sub(_), Value::Double(a), Value::Double(b)) => Value::Double(a - b),
        (Mul(_), Value::Double(a), Value::Double(b)) => Value::Double(a * b),
        (Div(_), Value::Double(a), Value::Double(b)) => Value::Double(a / b),
        (Rem(_), Value::Double(a), Value::Double(b)) => Value::Double(a % b),

        (inst, a, b) => {
            return Err(VmError::TypeError(format!(
                "invalid operands for {}: {}, {}",
                inst, a, b
            )))
        }
    })
}

fn compare(cond: Cond, a: Value, b: Value) -> VmResult<bool> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(cond.holds(a.cmp(&b))),
        (a, b) if a.kind() == Kind::Ref && b.kind() == Kind::Ref => match cond {
            Cond::Eq => Ok(a == b),
            Cond::Ne => Ok(a != b),
            _ => Err(VmError::TypeError(format!("ordered comparison of references ({:?})", cond))),
        },
        (a, b) => Err(VmError::TypeError(format!("cannot compare {} and {}", a, b))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specweave_bytecode::{access, ClassBuilder, Handler};
    use specweave_engine::MemorySource;

    fn vm_with(classes: Vec<ClassFile>) -> Vm {
        let source = MemorySource::new();
        for class in classes {
            source.insert(class.name.clone(), class.encode());
        }
        Vm::new(Arc::new(source), Arc::new(Weaver::default())).unwrap()
    }

    #[test]
    fn test_static_arithmetic() {
        let class = ClassBuilder::new("app/Math")
            .method(access::PUBLIC | access::STATIC, "mix", "(IJ)J", |code| {
                code.load(Kind::Long, 1)
                    .load(Kind::Long, 1)
                    .emit(Instruction::Mul(Kind::Long))
                    .load(Kind::Int, 0)
                    .emit(Instruction::Pop)
                    .ret(Kind::Long);
            })
            .build()
            .unwrap();
        let mut vm = vm_with(vec![class]);
        let result = vm
            .invoke_static("app/Math", "mix", "(IJ)J", &[Value::Int(1), Value::Long(6)])
            .unwrap();
        assert_eq!(result, Some(Value::Long(36)));
    }

    #[test]
    fn test_division_by_zero() {
        let class = ClassBuilder::new("app/Math")
            .method(access::PUBLIC | access::STATIC, "div", "(II)I", |code| {
                code.load(Kind::Int, 0)
                    .load(Kind::Int, 1)
                    .emit(Instruction::Div(Kind::Int))
                    .ret(Kind::Int);
            })
            .build()
            .unwrap();
        let mut vm = vm_with(vec![class]);
        assert_eq!(
            vm.invoke_static("app/Math", "div", "(II)I", &[Value::Int(7), Value::Int(2)])
                .unwrap(),
            Some(Value::Int(3))
        );
        assert!(matches!(
            vm.invoke_static("app/Math", "div", "(II)I", &[Value::Int(7), Value::Int(0)]),
            Err(VmError::DivisionByZero)
        ));
    }

    #[test]
    fn test_virtual_dispatch_walks_chain() {
        let base = ClassBuilder::new("app/Base")
            .method(access::PUBLIC, "<init>", "()V", |code| {
                code.load(Kind::Ref, 0)
                    .invoke_special("lang/Object", "<init>", "()V")
                    .ret_void();
            })
            .method(access::PUBLIC, "id", "()I", |code| {
                code.iconst(1).ret(Kind::Int);
            })
            .method(access::PUBLIC, "twice", "()I", |code| {
                code.load(Kind::Ref, 0)
                    .invoke_virtual("app/Base", "id", "()I")
                    .iconst(2)
                    .emit(Instruction::Mul(Kind::Int))
                    .ret(Kind::Int);
            })
            .build()
            .unwrap();
        let sub = ClassBuilder::new("app/Sub")
            .extends("app/Base")
            .method(access::PUBLIC, "<init>", "()V", |code| {
                code.load(Kind::Ref, 0)
                    .invoke_special("app/Base", "<init>", "()V")
                    .ret_void();
            })
            .method(access::PUBLIC, "id", "()I", |code| {
                code.iconst(5).ret(Kind::Int);
            })
            .build()
            .unwrap();
        let mut vm = vm_with(vec![base, sub]);
        let obj = vm.new_instance("app/Sub", "()V", &[]).unwrap();
        assert_eq!(vm.invoke_virtual(obj, "twice", "()I", &[]).unwrap(), Some(Value::Int(10)));
        assert_eq!(vm.class_of(obj).unwrap(), "app/Sub");
    }

    #[test]
    fn test_fields_and_boxes() {
        let class = ClassBuilder::new("app/Cell")
            .field(access::PRIVATE, "value", "J")
            .method(access::PUBLIC, "<init>", "(J)V", |code| {
                code.load(Kind::Ref, 0)
                    .invoke_special("lang/Object", "<init>", "()V")
                    .load(Kind::Ref, 0)
                    .load(Kind::Long, 1)
                    .putfield("app/Cell", "value", "J")
                    .ret_void();
            })
            .method(access::PUBLIC, "boxed", "()Llang/Object;", |code| {
                code.load(Kind::Ref, 0)
                    .getfield("app/Cell", "value", "J")
                    .invoke_static("lang/Long", "valueOf", "(J)Llang/Long;")
                    .ret(Kind::Ref);
            })
            .build()
            .unwrap();
        let mut vm = vm_with(vec![class]);
        let cell = vm.new_instance("app/Cell", "(J)V", &[Value::Long(42)]).unwrap();
        assert_eq!(vm.get_field(cell, "value").unwrap(), Value::Long(42));

        let boxed = vm.invoke_virtual(cell, "boxed", "()Llang/Object;", &[]).unwrap().unwrap();
        assert_eq!(vm.class_of(boxed).unwrap(), "lang/Long");
        assert_eq!(
            vm.invoke_virtual(boxed, "longValue", "()J", &[]).unwrap(),
            Some(Value::Long(42))
        );
    }

    #[test]
    fn test_thrown_object_caught_by_handler() {
        let class = ClassBuilder::new("app/Thrower")
            .method(access::PUBLIC | access::STATIC, "run", "(I)I", |code| {
                let start = code.new_label();
                let end = code.new_label();
                let handler = code.new_label();
                let skip = code.new_label();
                code.bind(start)
                    .load(Kind::Int, 0)
                    .if_zero(Cond::Eq, skip)
                    .new_object("lang/Throwable")
                    .emit(Instruction::Dup)
                    .invoke_special("lang/Throwable", "<init>", "()V")
                    .throw();
                code.bind(skip).iconst(1).bind(end).ret(Kind::Int);
                code.bind(handler)
                    .emit(Instruction::Pop)
                    .iconst(-1)
                    .ret(Kind::Int);
                code.try_catch(start, end, handler, Some("lang/Throwable"));
            })
            .build()
            .unwrap();
        let mut vm = vm_with(vec![class]);
        assert_eq!(
            vm.invoke_static("app/Thrower", "run", "(I)I", &[Value::Int(0)]).unwrap(),
            Some(Value::Int(1))
        );
        assert_eq!(
            vm.invoke_static("app/Thrower", "run", "(I)I", &[Value::Int(1)]).unwrap(),
            Some(Value::Int(-1))
        );
    }

    #[test]
    fn test_uncaught_throw() {
        let class = ClassBuilder::new("app/Thrower")
            .method(access::PUBLIC | access::STATIC, "run", "()V", |code| {
                code.new_object("lang/Throwable")
                    .emit(Instruction::Dup)
                    .invoke_special("lang/Throwable", "<init>", "()V")
                    .throw();
            })
            .build()
            .unwrap();
        let mut vm = vm_with(vec![class]);
        match vm.invoke_static("app/Thrower", "run", "()V", &[]) {
            Err(VmError::Thrown { class, .. }) => assert_eq!(class, "lang/Throwable"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declared_max_stack_enforced() {
        let mut class = ClassBuilder::new("app/Tight")
            .method(access::PUBLIC | access::STATIC, "two", "()I", |code| {
                code.iconst(1).iconst(1).emit(Instruction::Add(Kind::Int)).ret(Kind::Int);
            })
            .build()
            .unwrap();
        if let Some(code) = class.methods[0].code.as_mut() {
            code.max_stack = 1;
        }
        let mut vm = vm_with(vec![class]);
        assert!(matches!(
            vm.invoke_static("app/Tight", "two", "()I", &[]),
            Err(VmError::OperandOverflow { max: 1, .. })
        ));
    }

    #[test]
    fn test_recursion_limit() {
        let class = ClassBuilder::new("app/Loop")
            .method(access::PUBLIC | access::STATIC, "spin", "()V", |code| {
                code.invoke_static("app/Loop", "spin", "()V").ret_void();
            })
            .build()
            .unwrap();
        let mut vm = vm_with(vec![class]).with_max_call_depth(16);
        assert!(matches!(
            vm.invoke_static("app/Loop", "spin", "()V", &[]),
            Err(VmError::StackOverflow(16))
        ));
    }

    #[test]
    fn test_handler_ranges() {
        let code = Code {
            max_stack: 1,
            max_locals: 0,
            instructions: vec![Instruction::ReturnVoid; 4],
            handlers: vec![Handler {
                start: 1,
                end: 3,
                target: 3,
                catch_type: None,
            }],
        };
        let mut vm = vm_with(Vec::new());
        assert_eq!(vm.find_handler(&code, 0, "lang/Throwable").unwrap(), None);
        assert_eq!(vm.find_handler(&code, 2, "lang/Throwable").unwrap(), Some(3));
        assert_eq!(vm.find_handler(&code, 3, "lang/Throwable").unwrap(), None);
    }

    #[test]
    fn test_missing_method() {
        let mut vm = vm_with(Vec::new());
        assert!(matches!(
            vm.invoke_static("lang/Object", "nope", "()V", &[]),
            Err(VmError::NoSuchMethod { .. })
        ));
    }
}
