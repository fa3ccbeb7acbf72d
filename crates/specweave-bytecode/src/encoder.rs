//! Bytecode encoding and decoding utilities
//!
//! Low-level little-endian writer/reader plus instruction (de)serialization
//! against a class file's constant pool.

use crate::constants::ConstantPool;
use crate::descriptor::{DescriptorError, MethodDescriptor, ValueType};
use crate::instruction::{Cond, FieldRef, Instruction, InvokeKind, Kind, MethodRef};
use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Constant pool index out of range
    #[error("Invalid constant pool index {index} at offset {offset}")]
    InvalidConstant {
        /// Offending index
        index: u32,
        /// Reader offset
        offset: usize,
    },

    /// Operand byte outside its allowed range
    #[error("Invalid {what} operand at offset {offset}")]
    InvalidOperand {
        /// Operand description
        what: &'static str,
        /// Reader offset
        offset: usize,
    },

    /// Malformed descriptor in the constant pool
    #[error("Malformed descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
pub struct BytecodeWriter {
    /// Internal buffer containing the bytecode
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new bytecode writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit float (little-endian)
    pub fn emit_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Patch a previously emitted u32 value at the given offset
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        let bytes = value.to_le_bytes();
        self.buffer[offset..offset + 4].copy_from_slice(&bytes);
    }

    /// Reserve space for a u32 value (returns offset for later patching)
    pub fn reserve_u32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_u32(0);
        offset
    }

    // ===== Instruction Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit one instruction, interning its symbolic operands in `pool`
    pub fn emit_instruction(&mut self, inst: &Instruction, pool: &mut ConstantPool) {
        self.emit_opcode(inst.opcode());
        match inst {
            Instruction::ConstInt(v) => self.emit_i32(*v),
            Instruction::ConstLong(v) => self.emit_i64(*v),
            Instruction::ConstFloat(v) => self.emit_f32(*v),
            Instruction::ConstDouble(v) => self.emit_f64(*v),
            Instruction::Load(kind, slot) | Instruction::Store(kind, slot) => {
                self.emit_u8(kind.to_u8());
                self.emit_u16(*slot);
            }
            Instruction::Add(kind)
            | Instruction::Sub(kind)
            | Instruction::Mul(kind)
            | Instruction::Div(kind)
            | Instruction::Rem(kind)
            | Instruction::Neg(kind)
            | Instruction::Return(kind) => self.emit_u8(kind.to_u8()),
            Instruction::If(cond, target) | Instruction::IfCmp(cond, target) => {
                self.emit_u8(cond.to_u8());
                self.emit_u32(*target);
            }
            Instruction::IfNull(target)
            | Instruction::IfNonNull(target)
            | Instruction::Goto(target) => self.emit_u32(*target),
            Instruction::New(class)
            | Instruction::CheckCast(class)
            | Instruction::InstanceOf(class) => self.emit_u32(pool.add_string(class)),
            Instruction::GetField(field) | Instruction::PutField(field) => {
                self.emit_u32(pool.add_string(&field.owner));
                self.emit_u32(pool.add_string(&field.name));
                self.emit_u32(pool.add_string(&field.ty.to_string()));
            }
            Instruction::Invoke(_, method) => {
                self.emit_u32(pool.add_string(&method.owner));
                self.emit_u32(pool.add_string(&method.name));
                self.emit_u32(pool.add_string(&method.descriptor.to_string()));
                self.emit_u8(method.interface as u8);
            }
            Instruction::Nop
            | Instruction::Pop
            | Instruction::Pop2
            | Instruction::Dup
            | Instruction::DupX1
            | Instruction::Dup2
            | Instruction::Dup2X1
            | Instruction::Swap
            | Instruction::ConstNull
            | Instruction::LongCmp
            | Instruction::ReturnVoid
            | Instruction::Throw => {}
        }
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytecode reader for decoding instructions
///
/// Provides methods for reading opcodes and their operands from a binary buffer.
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the remaining bytes in the buffer
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    // ===== Basic Reading =====

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let buffer: &'a [u8] = self.buffer;
        let slice = &buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Read a 32-bit float (little-endian)
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(len)?.to_vec())
    }

    /// Advance past `len` bytes without copying them
    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8(start))
    }

    // ===== Instruction Reading =====

    /// Read an opcode
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let offset = self.position;
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))
    }

    fn read_kind(&mut self) -> Result<Kind, DecodeError> {
        let offset = self.position;
        Kind::from_u8(self.read_u8()?).ok_or(DecodeError::InvalidOperand {
            what: "kind",
            offset,
        })
    }

    fn read_cond(&mut self) -> Result<Cond, DecodeError> {
        let offset = self.position;
        Cond::from_u8(self.read_u8()?).ok_or(DecodeError::InvalidOperand {
            what: "condition",
            offset,
        })
    }

    fn read_name(&mut self, pool: &ConstantPool) -> Result<String, DecodeError> {
        let offset = self.position;
        let index = self.read_u32()?;
        Ok(pool.resolve(index, offset)?.to_string())
    }

    fn read_field(&mut self, pool: &ConstantPool) -> Result<FieldRef, DecodeError> {
        let owner = self.read_name(pool)?;
        let name = self.read_name(pool)?;
        let ty = ValueType::parse(&self.read_name(pool)?)?;
        Ok(FieldRef { owner, name, ty })
    }

    fn read_method(&mut self, pool: &ConstantPool) -> Result<MethodRef, DecodeError> {
        let owner = self.read_name(pool)?;
        let name = self.read_name(pool)?;
        let descriptor = MethodDescriptor::parse(&self.read_name(pool)?)?;
        let interface = self.read_u8()? != 0;
        Ok(MethodRef {
            owner,
            name,
            descriptor,
            interface,
        })
    }

    /// Read one instruction, resolving symbolic operands through `pool`
    pub fn read_instruction(&mut self, pool: &ConstantPool) -> Result<Instruction, DecodeError> {
        let inst = match self.read_opcode()? {
            Opcode::Nop => Instruction::Nop,
            Opcode::Pop => Instruction::Pop,
            Opcode::Pop2 => Instruction::Pop2,
            Opcode::Dup => Instruction::Dup,
            Opcode::DupX1 => Instruction::DupX1,
            Opcode::Dup2 => Instruction::Dup2,
            Opcode::Dup2X1 => Instruction::Dup2X1,
            Opcode::Swap => Instruction::Swap,
            Opcode::ConstNull => Instruction::ConstNull,
            Opcode::ConstInt => Instruction::ConstInt(self.read_i32()?),
            Opcode::ConstLong => Instruction::ConstLong(self.read_i64()?),
            Opcode::ConstFloat => Instruction::ConstFloat(self.read_f32()?),
            Opcode::ConstDouble => Instruction::ConstDouble(self.read_f64()?),
            Opcode::Load => {
                let kind = self.read_kind()?;
                Instruction::Load(kind, self.read_u16()?)
            }
            Opcode::Store => {
                let kind = self.read_kind()?;
                Instruction::Store(kind, self.read_u16()?)
            }
            Opcode::Add => Instruction::Add(self.read_kind()?),
            Opcode::Sub => Instruction::Sub(self.read_kind()?),
            Opcode::Mul => Instruction::Mul(self.read_kind()?),
            Opcode::Div => Instruction::Div(self.read_kind()?),
            Opcode::Rem => Instruction::Rem(self.read_kind()?),
            Opcode::Neg => Instruction::Neg(self.read_kind()?),
            Opcode::LongCmp => Instruction::LongCmp,
            Opcode::If => {
                let cond = self.read_cond()?;
                Instruction::If(cond, self.read_u32()?)
            }
            Opcode::IfCmp => {
                let cond = self.read_cond()?;
                Instruction::IfCmp(cond, self.read_u32()?)
            }
            Opcode::IfNull => Instruction::IfNull(self.read_u32()?),
            Opcode::IfNonNull => Instruction::IfNonNull(self.read_u32()?),
            Opcode::Goto => Instruction::Goto(self.read_u32()?),
            Opcode::New => Instruction::New(self.read_name(pool)?),
            Opcode::GetField => Instruction::GetField(self.read_field(pool)?),
            Opcode::PutField => Instruction::PutField(self.read_field(pool)?),
            Opcode::CheckCast => Instruction::CheckCast(self.read_name(pool)?),
            Opcode::InstanceOf => Instruction::InstanceOf(self.read_name(pool)?),
            Opcode::InvokeVirtual => Instruction::Invoke(InvokeKind::Virtual, self.read_method(pool)?),
            Opcode::InvokeInterface => {
                Instruction::Invoke(InvokeKind::Interface, self.read_method(pool)?)
            }
            Opcode::InvokeSpecial => Instruction::Invoke(InvokeKind::Special, self.read_method(pool)?),
            Opcode::InvokeStatic => Instruction::Invoke(InvokeKind::Static, self.read_method(pool)?),
            Opcode::Return => Instruction::Return(self.read_kind()?),
            Opcode::ReturnVoid => Instruction::ReturnVoid,
            Opcode::Throw => Instruction::Throw,
        };
        Ok(inst)
    }
}
