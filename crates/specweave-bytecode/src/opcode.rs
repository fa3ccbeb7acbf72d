//! Encoding opcodes
//!
//! Every instruction is encoded as a one-byte opcode followed by its
//! operands. Opcodes are grouped by category:
//! - 0x00-0x0F: Stack manipulation
//! - 0x10-0x1F: Constants
//! - 0x20-0x2F: Locals
//! - 0x30-0x3F: Arithmetic
//! - 0x40-0x4F: Control flow
//! - 0x50-0x5F: Objects
//! - 0x60-0x6F: Invocation
//! - 0x70-0x7F: Method exits

/// Encoding opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop one slot
    Pop = 0x01,
    /// Pop two slots
    Pop2 = 0x02,
    /// Duplicate top slot
    Dup = 0x03,
    /// Duplicate top slot beneath the second
    DupX1 = 0x04,
    /// Duplicate top two slots
    Dup2 = 0x05,
    /// Duplicate top two slots beneath the third
    Dup2X1 = 0x06,
    /// Swap top two slots
    Swap = 0x07,

    // ===== Constants (0x10-0x1F) =====
    /// Push null
    ConstNull = 0x10,
    /// Push int (operand: i32)
    ConstInt = 0x11,
    /// Push long (operand: i64)
    ConstLong = 0x12,
    /// Push float (operand: f32 bits)
    ConstFloat = 0x13,
    /// Push double (operand: f64)
    ConstDouble = 0x14,

    // ===== Locals (0x20-0x2F) =====
    /// Load local (operands: kind u8, slot u16)
    Load = 0x20,
    /// Store local (operands: kind u8, slot u16)
    Store = 0x21,

    // ===== Arithmetic (0x30-0x3F) =====
    /// Add (operand: kind u8)
    Add = 0x30,
    /// Subtract (operand: kind u8)
    Sub = 0x31,
    /// Multiply (operand: kind u8)
    Mul = 0x32,
    /// Divide (operand: kind u8)
    Div = 0x33,
    /// Remainder (operand: kind u8)
    Rem = 0x34,
    /// Negate (operand: kind u8)
    Neg = 0x35,
    /// Compare longs
    LongCmp = 0x36,

    // ===== Control Flow (0x40-0x4F) =====
    /// Compare int with zero (operands: cond u8, target u32)
    If = 0x40,
    /// Compare two ints (operands: cond u8, target u32)
    IfCmp = 0x41,
    /// Branch if null (operand: target u32)
    IfNull = 0x42,
    /// Branch if not null (operand: target u32)
    IfNonNull = 0x43,
    /// Unconditional branch (operand: target u32)
    Goto = 0x44,

    // ===== Objects (0x50-0x5F) =====
    /// Allocate (operand: class name index u32)
    New = 0x50,
    /// Read field (operands: owner, name, type indices)
    GetField = 0x51,
    /// Write field (operands: owner, name, type indices)
    PutField = 0x52,
    /// Checked cast (operand: class name index u32)
    CheckCast = 0x53,
    /// Instance test (operand: class name index u32)
    InstanceOf = 0x54,

    // ===== Invocation (0x60-0x6F) =====
    /// Dynamically dispatched call (operands: owner, name, descriptor, interface flag)
    InvokeVirtual = 0x60,
    /// Interface call (operands as above)
    InvokeInterface = 0x61,
    /// Non-dispatched instance call (operands as above)
    InvokeSpecial = 0x62,
    /// Static call (operands as above)
    InvokeStatic = 0x63,

    // ===== Method Exits (0x70-0x7F) =====
    /// Return value (operand: kind u8)
    Return = 0x70,
    /// Return void
    ReturnVoid = 0x71,
    /// Throw reference
    Throw = 0x72,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Pop2),
            0x03 => Some(Self::Dup),
            0x04 => Some(Self::DupX1),
            0x05 => Some(Self::Dup2),
            0x06 => Some(Self::Dup2X1),
            0x07 => Some(Self::Swap),

            0x10 => Some(Self::ConstNull),
            0x11 => Some(Self::ConstInt),
            0x12 => Some(Self::ConstLong),
            0x13 => Some(Self::ConstFloat),
            0x14 => Some(Self::ConstDouble),

            0x20 => Some(Self::Load),
            0x21 => Some(Self::Store),

            0x30 => Some(Self::Add),
            0x31 => Some(Self::Sub),
            0x32 => Some(Self::Mul),
            0x33 => Some(Self::Div),
            0x34 => Some(Self::Rem),
            0x35 => Some(Self::Neg),
            0x36 => Some(Self::LongCmp),

            0x40 => Some(Self::If),
            0x41 => Some(Self::IfCmp),
            0x42 => Some(Self::IfNull),
            0x43 => Some(Self::IfNonNull),
            0x44 => Some(Self::Goto),

            0x50 => Some(Self::New),
            0x51 => Some(Self::GetField),
            0x52 => Some(Self::PutField),
            0x53 => Some(Self::CheckCast),
            0x54 => Some(Self::InstanceOf),

            0x60 => Some(Self::InvokeVirtual),
            0x61 => Some(Self::InvokeInterface),
            0x62 => Some(Self::InvokeSpecial),
            0x63 => Some(Self::InvokeStatic),

            0x70 => Some(Self::Return),
            0x71 => Some(Self::ReturnVoid),
            0x72 => Some(Self::Throw),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Pop => "pop",
            Self::Pop2 => "pop2",
            Self::Dup => "dup",
            Self::DupX1 => "dup_x1",
            Self::Dup2 => "dup2",
            Self::Dup2X1 => "dup2_x1",
            Self::Swap => "swap",
            Self::ConstNull => "aconst_null",
            Self::ConstInt => "iconst",
            Self::ConstLong => "lconst",
            Self::ConstFloat => "fconst",
            Self::ConstDouble => "dconst",
            Self::Load => "load",
            Self::Store => "store",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::Neg => "neg",
            Self::LongCmp => "lcmp",
            Self::If => "if",
            Self::IfCmp => "if_icmp",
            Self::IfNull => "ifnull",
            Self::IfNonNull => "ifnonnull",
            Self::Goto => "goto",
            Self::New => "new",
            Self::GetField => "getfield",
            Self::PutField => "putfield",
            Self::CheckCast => "checkcast",
            Self::InstanceOf => "instanceof",
            Self::InvokeVirtual => "invokevirtual",
            Self::InvokeInterface => "invokeinterface",
            Self::InvokeSpecial => "invokespecial",
            Self::InvokeStatic => "invokestatic",
            Self::Return => "return",
            Self::ReturnVoid => "return",
            Self::Throw => "athrow",
        }
    }

    /// Check if this opcode is a jump instruction
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::If | Self::IfCmp | Self::IfNull | Self::IfNonNull | Self::Goto
        )
    }

    /// Check if this opcode is an invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual | Self::InvokeInterface | Self::InvokeSpecial | Self::InvokeStatic
        )
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnVoid)
    }
}
