//! Programmatic class construction
//!
//! `CodeBuilder` emits instructions with symbolic labels that are patched to
//! instruction indices when the body is finished. `ClassBuilder` assembles a
//! whole class and computes each method's frame sizes.

use crate::class::{access, ClassFile, Code, Field, Handler, Method};
use crate::descriptor::{DescriptorError, MethodDescriptor, ValueType};
use crate::instruction::{Cond, FieldRef, Instruction, InvokeKind, Kind, MethodRef};
use crate::verify::{compute_frame_sizes, VerifyError};
use thiserror::Error;

/// Errors surfaced when a builder is finished
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A label was jumped to but never bound
    #[error("Label {0} was never bound")]
    UnboundLabel(usize),

    /// A label was bound twice
    #[error("Label {0} bound more than once")]
    LabelRebound(usize),

    /// Malformed descriptor passed to an emit helper
    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Body failed frame computation
    #[error("Method {method}: {error}")]
    Verify {
        /// `name` + descriptor
        method: String,
        /// Underlying error
        error: VerifyError,
    },
}

/// A label for jump targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    /// Unique label ID within the builder
    pub id: usize,
}

/// Unresolved jump that needs label patching
#[derive(Debug, Clone)]
struct UnresolvedJump {
    /// Index of the branch instruction
    index: usize,
    /// Target label
    target_label: Label,
}

#[derive(Debug, Clone)]
struct PendingHandler {
    start: Label,
    end: Label,
    target: Label,
    catch_type: Option<String>,
}

/// Builder for a single method body
#[derive(Debug, Default)]
pub struct CodeBuilder {
    instructions: Vec<Instruction>,
    labels: Vec<Option<u32>>,
    unresolved: Vec<UnresolvedJump>,
    handlers: Vec<PendingHandler>,
    error: Option<BuildError>,
}

impl CodeBuilder {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next emitted instruction will get
    pub fn position(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Define a new, unbound label
    pub fn new_label(&mut self) -> Label {
        let id = self.labels.len();
        self.labels.push(None);
        Label { id }
    }

    /// Bind a label to the next emitted instruction
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let position = self.position();
        if matches!(self.labels.get(label.id), Some(None)) {
            self.labels[label.id] = Some(position);
        } else {
            self.fail(BuildError::LabelRebound(label.id));
        }
        self
    }

    /// Append an instruction as-is
    pub fn emit(&mut self, inst: Instruction) -> &mut Self {
        self.instructions.push(inst);
        self
    }

    fn emit_jump(&mut self, inst: Instruction, label: Label) -> &mut Self {
        self.unresolved.push(UnresolvedJump {
            index: self.instructions.len(),
            target_label: label,
        });
        self.emit(inst)
    }

    fn fail(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    // ===== Constants and Locals =====

    /// Push an int
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.emit(Instruction::ConstInt(value))
    }

    /// Push null
    pub fn aconst_null(&mut self) -> &mut Self {
        self.emit(Instruction::ConstNull)
    }

    /// Push a local
    pub fn load(&mut self, kind: Kind, slot: u16) -> &mut Self {
        self.emit(Instruction::Load(kind, slot))
    }

    /// Pop into a local
    pub fn store(&mut self, kind: Kind, slot: u16) -> &mut Self {
        self.emit(Instruction::Store(kind, slot))
    }

    // ===== Objects =====

    /// Allocate an instance
    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.emit(Instruction::New(class.to_string()))
    }

    /// Read an instance field
    pub fn getfield(&mut self, owner: &str, name: &str, ty: &str) -> &mut Self {
        match ValueType::parse(ty) {
            Ok(ty) => self.emit(Instruction::GetField(FieldRef::new(owner, name, ty))),
            Err(e) => {
                self.fail(e.into());
                self
            }
        }
    }

    /// Write an instance field
    pub fn putfield(&mut self, owner: &str, name: &str, ty: &str) -> &mut Self {
        match ValueType::parse(ty) {
            Ok(ty) => self.emit(Instruction::PutField(FieldRef::new(owner, name, ty))),
            Err(e) => {
                self.fail(e.into());
                self
            }
        }
    }

    // ===== Invocation =====

    /// Emit an invocation
    pub fn invoke(&mut self, kind: InvokeKind, owner: &str, name: &str, desc: &str) -> &mut Self {
        match MethodDescriptor::parse(desc) {
            Ok(descriptor) => {
                let interface = kind == InvokeKind::Interface;
                self.emit(Instruction::Invoke(
                    kind,
                    MethodRef::new(owner, name, descriptor, interface),
                ))
            }
            Err(e) => {
                self.fail(e.into());
                self
            }
        }
    }

    /// `invokevirtual`
    pub fn invoke_virtual(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.invoke(InvokeKind::Virtual, owner, name, desc)
    }

    /// `invokeinterface`
    pub fn invoke_interface(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.invoke(InvokeKind::Interface, owner, name, desc)
    }

    /// `invokespecial`
    pub fn invoke_special(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.invoke(InvokeKind::Special, owner, name, desc)
    }

    /// `invokestatic`
    pub fn invoke_static(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.invoke(InvokeKind::Static, owner, name, desc)
    }

    // ===== Control Flow =====

    /// Unconditional branch
    pub fn goto(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Instruction::Goto(0), label)
    }

    /// Compare an int with zero and branch
    pub fn if_zero(&mut self, cond: Cond, label: Label) -> &mut Self {
        self.emit_jump(Instruction::If(cond, 0), label)
    }

    /// Compare two ints and branch
    pub fn if_cmp(&mut self, cond: Cond, label: Label) -> &mut Self {
        self.emit_jump(Instruction::IfCmp(cond, 0), label)
    }

    /// Branch if null
    pub fn if_null(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Instruction::IfNull(0), label)
    }

    /// Branch if not null
    pub fn if_non_null(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Instruction::IfNonNull(0), label)
    }

    /// Return a value
    pub fn ret(&mut self, kind: Kind) -> &mut Self {
        self.emit(Instruction::Return(kind))
    }

    /// Return void
    pub fn ret_void(&mut self) -> &mut Self {
        self.emit(Instruction::ReturnVoid)
    }

    /// Throw the reference on top of the stack
    pub fn throw(&mut self) -> &mut Self {
        self.emit(Instruction::Throw)
    }

    /// Register a handler for `[start, end)` jumping to `target`
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        target: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.handlers.push(PendingHandler {
            start,
            end,
            target,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    fn resolve(&self, label: Label) -> Result<u32, BuildError> {
        self.labels
            .get(label.id)
            .copied()
            .flatten()
            .ok_or(BuildError::UnboundLabel(label.id))
    }

    /// Patch labels and produce the body
    ///
    /// `max_stack`/`max_locals` are left at zero; `ClassBuilder` fills them.
    pub fn finish(mut self) -> Result<Code, BuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        for jump in &self.unresolved {
            let target = self.resolve(jump.target_label)?;
            if let Some(slot) = self.instructions[jump.index].branch_target_mut() {
                *slot = target;
            }
        }
        let handlers = self
            .handlers
            .iter()
            .map(|h| {
                Ok(Handler {
                    start: self.resolve(h.start)?,
                    end: self.resolve(h.end)?,
                    target: self.resolve(h.target)?,
                    catch_type: h.catch_type.clone(),
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(Code {
            max_stack: 0,
            max_locals: 0,
            instructions: self.instructions,
            handlers,
        })
    }
}

/// Builder for a whole class
#[derive(Debug)]
pub struct ClassBuilder {
    class: ClassFile,
    error: Option<BuildError>,
}

impl ClassBuilder {
    /// Start a public class extending the root class
    pub fn new(name: &str) -> Self {
        let super_name = if name == crate::ROOT_CLASS {
            None
        } else {
            Some(crate::ROOT_CLASS.to_string())
        };
        Self {
            class: ClassFile::new(name, super_name),
            error: None,
        }
    }

    /// Set the superclass
    pub fn extends(mut self, name: &str) -> Self {
        self.class.super_name = Some(name.to_string());
        self
    }

    /// Make this an interface
    pub fn interface(mut self) -> Self {
        self.class.access |= access::INTERFACE | access::ABSTRACT;
        self
    }

    /// Replace the class access flags
    pub fn access(mut self, flags: u16) -> Self {
        self.class.access = flags;
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, name: &str) -> Self {
        self.class.interfaces.push(name.to_string());
        self
    }

    /// Add a class-level marker annotation
    pub fn annotate(mut self, name: &str) -> Self {
        self.class.annotations.push(name.to_string());
        self
    }

    /// Declare a field
    pub fn field(mut self, flags: u16, name: &str, ty: &str) -> Self {
        match ValueType::parse(ty) {
            Ok(ty) => self.class.fields.push(Field {
                access: flags,
                name: name.to_string(),
                ty,
            }),
            Err(e) => self.fail(e.into()),
        }
        self
    }

    /// Declare a method whose body is emitted by `body`
    pub fn method<F>(mut self, flags: u16, name: &str, desc: &str, body: F) -> Self
    where
        F: FnOnce(&mut CodeBuilder),
    {
        let descriptor = match MethodDescriptor::parse(desc) {
            Ok(d) => d,
            Err(e) => {
                self.fail(e.into());
                return self;
            }
        };
        let mut code = CodeBuilder::new();
        body(&mut code);
        let code = match code.finish() {
            Ok(code) => code,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        let mut method = Method {
            access: flags,
            name: name.to_string(),
            descriptor,
            code: Some(code),
        };
        match compute_frame_sizes(&method) {
            Ok(sizes) => {
                if let Some(code) = method.code.as_mut() {
                    code.max_stack = sizes.max_stack;
                    code.max_locals = sizes.max_locals;
                }
                self.class.methods.push(method);
            }
            Err(error) => self.fail(BuildError::Verify {
                method: format!("{}{}", name, desc),
                error,
            }),
        }
        self
    }

    /// Declare a method without a body
    pub fn abstract_method(self, flags: u16, name: &str, desc: &str) -> Self {
        self.bodiless(flags | access::ABSTRACT, name, desc)
    }

    /// Declare a host-implemented method
    pub fn native_method(self, flags: u16, name: &str, desc: &str) -> Self {
        self.bodiless(flags | access::NATIVE, name, desc)
    }

    fn bodiless(mut self, flags: u16, name: &str, desc: &str) -> Self {
        match MethodDescriptor::parse(desc) {
            Ok(descriptor) => self.class.methods.push(Method {
                access: flags,
                name: name.to_string(),
                descriptor,
                code: None,
            }),
            Err(e) => self.fail(e.into()),
        }
        self
    }

    fn fail(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Finish the class, reporting the first error encountered
    pub fn build(self) -> Result<ClassFile, BuildError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.class),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_label() {
        let mut code = CodeBuilder::new();
        let positive = code.new_label();
        code.load(Kind::Int, 1)
            .if_zero(Cond::Ge, positive)
            .iconst(0)
            .ret(Kind::Int);
        code.bind(positive).iconst(1).ret(Kind::Int);
        let code = code.finish().unwrap();
        assert_eq!(code.instructions[1], Instruction::If(Cond::Ge, 4));
    }

    #[test]
    fn test_unbound_label() {
        let mut code = CodeBuilder::new();
        let nowhere = code.new_label();
        code.goto(nowhere);
        assert_eq!(code.finish().unwrap_err(), BuildError::UnboundLabel(0));
    }

    #[test]
    fn test_rebinding_label() {
        let mut code = CodeBuilder::new();
        let l = code.new_label();
        code.bind(l).ret_void();
        code.bind(l);
        assert_eq!(code.finish().unwrap_err(), BuildError::LabelRebound(0));
    }

    #[test]
    fn test_class_builder_frame_sizes() {
        let class = ClassBuilder::new("Counter")
            .field(access::PRIVATE, "count", "I")
            .method(access::PUBLIC, "bump", "(I)V", |code| {
                code.load(Kind::Ref, 0)
                    .load(Kind::Ref, 0)
                    .getfield("Counter", "count", "I")
                    .load(Kind::Int, 1)
                    .emit(Instruction::Add(Kind::Int))
                    .putfield("Counter", "count", "I")
                    .ret_void();
            })
            .abstract_method(access::PUBLIC, "reset", "()V")
            .build()
            .unwrap();

        assert_eq!(class.super_name.as_deref(), Some(crate::ROOT_CLASS));
        let bump = &class.methods[0];
        let code = bump.code.as_ref().unwrap();
        assert_eq!((code.max_stack, code.max_locals), (3, 2));
        assert!(class.methods[1].code.is_none());
        assert!(crate::verify_class(&class).is_ok());
    }

    #[test]
    fn test_builder_reports_bad_descriptor() {
        let err = ClassBuilder::new("Broken")
            .method(access::PUBLIC, "f", "(Q)V", |code| {
                code.ret_void();
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::Descriptor(_)));
    }

    #[test]
    fn test_builder_reports_verify_error() {
        let err = ClassBuilder::new("Broken")
            .method(access::PUBLIC, "f", "()V", |code| {
                code.emit(Instruction::Pop).ret_void();
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::Verify { .. }));
    }
}
