//! Typed instruction IR
//!
//! Method bodies are decoded into a flat `Vec<Instruction>`. Branch targets
//! and exception handler ranges refer to instruction indices, so rewriting
//! passes can splice instructions and remap targets without touching byte
//! offsets.

use crate::descriptor::{MethodDescriptor, ValueType};
use crate::opcode::Opcode;
use std::fmt;

/// Computational kind of a value on the operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// 32-bit integer (also boolean, byte, char, short)
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Object or array reference
    Ref,
}

impl Kind {
    /// Slots occupied by a value of this kind
    pub fn slots(self) -> u16 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// Encoding tag
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Int => 0,
            Self::Long => 1,
            Self::Float => 2,
            Self::Double => 3,
            Self::Ref => 4,
        }
    }

    /// Decode an encoding tag
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Int),
            1 => Some(Self::Long),
            2 => Some(Self::Float),
            3 => Some(Self::Double),
            4 => Some(Self::Ref),
            _ => None,
        }
    }

    fn prefix(self) -> char {
        match self {
            Self::Int => 'i',
            Self::Long => 'l',
            Self::Float => 'f',
            Self::Double => 'd',
            Self::Ref => 'a',
        }
    }
}

/// Branch condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<=`
    Le,
}

impl Cond {
    /// Evaluate the condition on an ordering
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Lt => ordering == Less,
            Self::Ge => ordering != Less,
            Self::Gt => ordering == Greater,
            Self::Le => ordering != Greater,
        }
    }

    /// Encoding tag
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Eq => 0,
            Self::Ne => 1,
            Self::Lt => 2,
            Self::Ge => 3,
            Self::Gt => 4,
            Self::Le => 5,
        }
    }

    /// Decode an encoding tag
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Eq),
            1 => Some(Self::Ne),
            2 => Some(Self::Lt),
            3 => Some(Self::Ge),
            4 => Some(Self::Gt),
            5 => Some(Self::Le),
            _ => None,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Gt => "gt",
            Self::Le => "le",
        }
    }
}

/// How an invocation selects its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// Dispatch on the receiver's runtime class
    Virtual,
    /// Dispatch through an interface type
    Interface,
    /// Exact target: constructors, `super` calls, private methods
    Special,
    /// No receiver
    Static,
}

impl InvokeKind {
    /// True for the two kinds that select the target at run time
    pub fn is_dispatched(self) -> bool {
        matches!(self, Self::Virtual | Self::Interface)
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Self::Virtual => "invokevirtual",
            Self::Interface => "invokeinterface",
            Self::Special => "invokespecial",
            Self::Static => "invokestatic",
        }
    }
}

/// Symbolic reference to a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Internal name of the class named at the call site
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: MethodDescriptor,
    /// Whether `owner` is an interface
    pub interface: bool,
}

impl MethodRef {
    /// Build a method reference
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
        interface: bool,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor,
            interface,
        }
    }
}

/// Symbolic reference to an instance field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Declaring class
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field type
    pub ty: ValueType,
}

impl FieldRef {
    /// Build a field reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            ty,
        }
    }
}

/// A single typed instruction
///
/// `u32` targets are instruction indices within the same method body.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// No operation
    Nop,
    /// Pop one slot
    Pop,
    /// Pop two slots
    Pop2,
    /// Duplicate the top slot
    Dup,
    /// Duplicate the top slot beneath the second
    DupX1,
    /// Duplicate the top two slots
    Dup2,
    /// Duplicate the top two slots beneath the third
    Dup2X1,
    /// Swap the top two slots
    Swap,
    /// Push null
    ConstNull,
    /// Push an int
    ConstInt(i32),
    /// Push a long
    ConstLong(i64),
    /// Push a float
    ConstFloat(f32),
    /// Push a double
    ConstDouble(f64),
    /// Push a local
    Load(Kind, u16),
    /// Pop into a local
    Store(Kind, u16),
    /// Addition
    Add(Kind),
    /// Subtraction
    Sub(Kind),
    /// Multiplication
    Mul(Kind),
    /// Division
    Div(Kind),
    /// Remainder
    Rem(Kind),
    /// Negation
    Neg(Kind),
    /// Compare two longs, push -1, 0 or 1
    LongCmp,
    /// Compare an int against zero and branch
    If(Cond, u32),
    /// Compare two ints and branch
    IfCmp(Cond, u32),
    /// Branch if null
    IfNull(u32),
    /// Branch if not null
    IfNonNull(u32),
    /// Unconditional branch
    Goto(u32),
    /// Allocate an uninitialized instance
    New(String),
    /// Read an instance field
    GetField(FieldRef),
    /// Write an instance field
    PutField(FieldRef),
    /// Checked reference cast
    CheckCast(String),
    /// Push 1 if the reference is an instance of the class
    InstanceOf(String),
    /// Method invocation
    Invoke(InvokeKind, MethodRef),
    /// Return a value
    Return(Kind),
    /// Return from a void method or constructor
    ReturnVoid,
    /// Throw the reference on top of the stack
    Throw,
}

impl Instruction {
    /// Encoding opcode
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::Pop => Opcode::Pop,
            Self::Pop2 => Opcode::Pop2,
            Self::Dup => Opcode::Dup,
            Self::DupX1 => Opcode::DupX1,
            Self::Dup2 => Opcode::Dup2,
            Self::Dup2X1 => Opcode::Dup2X1,
            Self::Swap => Opcode::Swap,
            Self::ConstNull => Opcode::ConstNull,
            Self::ConstInt(_) => Opcode::ConstInt,
            Self::ConstLong(_) => Opcode::ConstLong,
            Self::ConstFloat(_) => Opcode::ConstFloat,
            Self::ConstDouble(_) => Opcode::ConstDouble,
            Self::Load(..) => Opcode::Load,
            Self::Store(..) => Opcode::Store,
            Self::Add(_) => Opcode::Add,
            Self::Sub(_) => Opcode::Sub,
            Self::Mul(_) => Opcode::Mul,
            Self::Div(_) => Opcode::Div,
            Self::Rem(_) => Opcode::Rem,
            Self::Neg(_) => Opcode::Neg,
            Self::LongCmp => Opcode::LongCmp,
            Self::If(..) => Opcode::If,
            Self::IfCmp(..) => Opcode::IfCmp,
            Self::IfNull(_) => Opcode::IfNull,
            Self::IfNonNull(_) => Opcode::IfNonNull,
            Self::Goto(_) => Opcode::Goto,
            Self::New(_) => Opcode::New,
            Self::GetField(_) => Opcode::GetField,
            Self::PutField(_) => Opcode::PutField,
            Self::CheckCast(_) => Opcode::CheckCast,
            Self::InstanceOf(_) => Opcode::InstanceOf,
            Self::Invoke(InvokeKind::Virtual, _) => Opcode::InvokeVirtual,
            Self::Invoke(InvokeKind::Interface, _) => Opcode::InvokeInterface,
            Self::Invoke(InvokeKind::Special, _) => Opcode::InvokeSpecial,
            Self::Invoke(InvokeKind::Static, _) => Opcode::InvokeStatic,
            Self::Return(_) => Opcode::Return,
            Self::ReturnVoid => Opcode::ReturnVoid,
            Self::Throw => Opcode::Throw,
        }
    }

    /// Stack effect in slots: (popped, pushed)
    pub fn stack_effect(&self) -> (u16, u16) {
        match self {
            Self::Nop | Self::Goto(_) | Self::ReturnVoid => (0, 0),
            Self::Pop => (1, 0),
            Self::Pop2 => (2, 0),
            Self::Dup => (1, 2),
            Self::DupX1 => (2, 3),
            Self::Dup2 => (2, 4),
            Self::Dup2X1 => (3, 5),
            Self::Swap => (2, 2),
            Self::ConstNull | Self::ConstInt(_) | Self::ConstFloat(_) => (0, 1),
            Self::ConstLong(_) | Self::ConstDouble(_) => (0, 2),
            Self::Load(kind, _) => (0, kind.slots()),
            Self::Store(kind, _) => (kind.slots(), 0),
            Self::Add(kind)
            | Self::Sub(kind)
            | Self::Mul(kind)
            | Self::Div(kind)
            | Self::Rem(kind) => (kind.slots() * 2, kind.slots()),
            Self::Neg(kind) => (kind.slots(), kind.slots()),
            Self::LongCmp => (4, 1),
            Self::If(..) | Self::IfNull(_) | Self::IfNonNull(_) => (1, 0),
            Self::IfCmp(..) => (2, 0),
            Self::New(_) => (0, 1),
            Self::GetField(field) => (1, field.ty.slots()),
            Self::PutField(field) => (1 + field.ty.slots(), 0),
            Self::CheckCast(_) | Self::InstanceOf(_) => (1, 1),
            Self::Invoke(kind, method) => {
                let receiver = if *kind == InvokeKind::Static { 0 } else { 1 };
                (
                    method.descriptor.param_slots() + receiver,
                    method.descriptor.ret.slots(),
                )
            }
            Self::Return(kind) => (kind.slots(), 0),
            Self::Throw => (1, 0),
        }
    }

    /// Branch target, if this instruction can jump
    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Self::If(_, target)
            | Self::IfCmp(_, target)
            | Self::IfNull(target)
            | Self::IfNonNull(target)
            | Self::Goto(target) => Some(*target),
            _ => None,
        }
    }

    /// Mutable access to the branch target
    pub fn branch_target_mut(&mut self) -> Option<&mut u32> {
        match self {
            Self::If(_, target)
            | Self::IfCmp(_, target)
            | Self::IfNull(target)
            | Self::IfNonNull(target)
            | Self::Goto(target) => Some(target),
            _ => None,
        }
    }

    /// True for normal method exits
    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return(_) | Self::ReturnVoid)
    }

    /// True if control never falls through to the next instruction
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Goto(_) | Self::Throw) || self.is_return()
    }

    /// Local slot touched by a load/store, with the slots it spans
    pub fn local_access(&self) -> Option<(u16, u16)> {
        match self {
            Self::Load(kind, slot) | Self::Store(kind, slot) => Some((*slot, kind.slots())),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstInt(v) => write!(f, "iconst {}", v),
            Self::ConstLong(v) => write!(f, "lconst {}", v),
            Self::ConstFloat(v) => write!(f, "fconst {}", v),
            Self::ConstDouble(v) => write!(f, "dconst {}", v),
            Self::Load(kind, slot) => write!(f, "{}load {}", kind.prefix(), slot),
            Self::Store(kind, slot) => write!(f, "{}store {}", kind.prefix(), slot),
            Self::Add(kind) => write!(f, "{}add", kind.prefix()),
            Self::Sub(kind) => write!(f, "{}sub", kind.prefix()),
            Self::Mul(kind) => write!(f, "{}mul", kind.prefix()),
            Self::Div(kind) => write!(f, "{}div", kind.prefix()),
            Self::Rem(kind) => write!(f, "{}rem", kind.prefix()),
            Self::Neg(kind) => write!(f, "{}neg", kind.prefix()),
            Self::If(cond, target) => write!(f, "if{} @{}", cond.mnemonic(), target),
            Self::IfCmp(cond, target) => write!(f, "if_icmp{} @{}", cond.mnemonic(), target),
            Self::IfNull(target) => write!(f, "ifnull @{}", target),
            Self::IfNonNull(target) => write!(f, "ifnonnull @{}", target),
            Self::Goto(target) => write!(f, "goto @{}", target),
            Self::New(class) => write!(f, "new {}", class),
            Self::GetField(field) => write!(f, "getfield {}.{}:{}", field.owner, field.name, field.ty),
            Self::PutField(field) => write!(f, "putfield {}.{}:{}", field.owner, field.name, field.ty),
            Self::CheckCast(class) => write!(f, "checkcast {}", class),
            Self::InstanceOf(class) => write!(f, "instanceof {}", class),
            Self::Invoke(kind, method) => write!(
                f,
                "{} {}.{}{}",
                kind.mnemonic(),
                method.owner,
                method.name,
                method.descriptor
            ),
            Self::Return(kind) => write!(f, "{}return", kind.prefix()),
            other => f.write_str(other.opcode().name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn withdraw() -> MethodRef {
        MethodRef::new(
            "Account",
            "withdraw",
            MethodDescriptor::parse("(I)Z").unwrap(),
            false,
        )
    }

    #[test]
    fn test_invoke_stack_effect() {
        let virt = Instruction::Invoke(InvokeKind::Virtual, withdraw());
        assert_eq!(virt.stack_effect(), (2, 1));
        let stat = Instruction::Invoke(InvokeKind::Static, withdraw());
        assert_eq!(stat.stack_effect(), (1, 1));

        let wide = MethodRef::new("M", "f", MethodDescriptor::parse("(JD)J").unwrap(), false);
        assert_eq!(
            Instruction::Invoke(InvokeKind::Static, wide).stack_effect(),
            (4, 2)
        );
    }

    #[test]
    fn test_branch_targets() {
        let mut inst = Instruction::IfCmp(Cond::Lt, 7);
        assert_eq!(inst.branch_target(), Some(7));
        *inst.branch_target_mut().unwrap() = 9;
        assert_eq!(inst, Instruction::IfCmp(Cond::Lt, 9));
        assert_eq!(Instruction::Nop.branch_target(), None);
    }

    #[test]
    fn test_terminators() {
        assert!(Instruction::Goto(0).is_terminator());
        assert!(Instruction::Throw.is_terminator());
        assert!(Instruction::Return(Kind::Int).is_terminator());
        assert!(!Instruction::If(Cond::Eq, 0).is_terminator());
    }

    #[test]
    fn test_cond_holds() {
        use std::cmp::Ordering;
        assert!(Cond::Ge.holds(Ordering::Equal));
        assert!(Cond::Ge.holds(Ordering::Greater));
        assert!(!Cond::Lt.holds(Ordering::Equal));
        assert!(Cond::Ne.holds(Ordering::Less));
    }

    #[test]
    fn test_display() {
        let inst = Instruction::Invoke(InvokeKind::Virtual, withdraw());
        assert_eq!(inst.to_string(), "invokevirtual Account.withdraw(I)Z");
        assert_eq!(Instruction::Load(Kind::Ref, 0).to_string(), "aload 0");
        assert_eq!(Instruction::Dup2X1.to_string(), "dup2_x1");
    }
}
