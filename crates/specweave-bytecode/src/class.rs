//! Class file format

use crate::constants::ConstantPool;
use crate::descriptor::{MethodDescriptor, ValueType};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::instruction::Instruction;
use std::fmt::Write as _;
use thiserror::Error;

/// Magic number for class files: "WCLS"
pub const MAGIC: [u8; 4] = *b"WCLS";

/// Current class file version
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 16;
const NONE_INDEX: u32 = u32::MAX;

/// Class encoding/decoding errors
#[derive(Debug, Error)]
pub enum ClassError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected WCLS, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {})", VERSION)]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Checksum of the payload as read
        actual: u32,
    },
}

/// Access and property flags
pub mod access {
    /// Visible everywhere
    pub const PUBLIC: u16 = 0x0001;
    /// Visible in the declaring class only
    pub const PRIVATE: u16 = 0x0002;
    /// Visible to subclasses
    pub const PROTECTED: u16 = 0x0004;
    /// No receiver
    pub const STATIC: u16 = 0x0008;
    /// Cannot be overridden or subclassed
    pub const FINAL: u16 = 0x0010;
    /// Implemented by the host
    pub const NATIVE: u16 = 0x0100;
    /// Class is an interface
    pub const INTERFACE: u16 = 0x0200;
    /// No body
    pub const ABSTRACT: u16 = 0x0400;
    /// Generated, not present in source
    pub const SYNTHETIC: u16 = 0x1000;
    /// Visibility bits
    pub const VISIBILITY: u16 = PUBLIC | PRIVATE | PROTECTED;
}

/// Options controlling how much of a class file is materialized
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Skip method bodies; every `Method::code` is left `None`
    pub skip_code: bool,
}

/// A compiled class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Class file version
    pub version: u32,
    /// Access flags
    pub access: u16,
    /// Internal name, `/`-separated
    pub name: String,
    /// Superclass, `None` only for the root class
    pub super_name: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Class-level marker annotations (internal names)
    pub annotations: Vec<String>,
    /// Declared fields
    pub fields: Vec<Field>,
    /// Declared methods
    pub methods: Vec<Method>,
}

/// Field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Access flags
    pub access: u16,
    /// Field name
    pub name: String,
    /// Field type
    pub ty: ValueType,
}

/// Method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    /// Access flags
    pub access: u16,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: MethodDescriptor,
    /// Body, absent for abstract/native methods or when decoded with `skip_code`
    pub code: Option<Code>,
}

impl Method {
    /// True if the method has no receiver
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    /// True for instance initializers
    pub fn is_constructor(&self) -> bool {
        self.name == crate::CONSTRUCTOR_NAME
    }

    /// True if the method is implemented by the host
    pub fn is_native(&self) -> bool {
        self.access & access::NATIVE != 0
    }

    /// Slots taken by the receiver (if any) and the parameters
    pub fn arg_slots(&self) -> u16 {
        let receiver = if self.is_static() { 0 } else { 1 };
        receiver + self.descriptor.param_slots()
    }
}

/// Method body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Code {
    /// Maximum operand stack depth in slots
    pub max_stack: u16,
    /// Number of local slots, including receiver and parameters
    pub max_locals: u16,
    /// Instructions; branch targets are indices into this list
    pub instructions: Vec<Instruction>,
    /// Exception handlers, searched in order
    pub handlers: Vec<Handler>,
}

/// Exception handler covering instructions `start..end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    /// First covered instruction
    pub start: u32,
    /// One past the last covered instruction
    pub end: u32,
    /// Handler entry point
    pub target: u32,
    /// Caught class, `None` catches everything
    pub catch_type: Option<String>,
}

impl ClassFile {
    /// Create an empty class
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            version: VERSION,
            access: access::PUBLIC,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// True if the class is an interface
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    /// True if the class carries the given marker annotation
    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a == name)
    }

    /// Find a declared method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name == name && &m.descriptor == descriptor)
    }

    /// Encode the class to binary format (.wclass)
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Constant pool
    /// - Class body (names are pool indices)
    pub fn encode(&self) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let mut body = BytecodeWriter::new();
        self.encode_body(&mut body, &mut pool);

        let mut writer = BytecodeWriter::with_capacity(HEADER_LEN + body.offset() * 2);
        writer.emit_bytes(&MAGIC);
        writer.emit_u32(self.version);
        writer.emit_u32(0);
        let checksum_offset = writer.reserve_u32();

        pool.encode(&mut writer);
        writer.emit_bytes(body.buffer());

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer()[HEADER_LEN..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    fn encode_body(&self, writer: &mut BytecodeWriter, pool: &mut ConstantPool) {
        writer.emit_u16(self.access);
        writer.emit_u32(pool.add_string(&self.name));
        match &self.super_name {
            Some(name) => writer.emit_u32(pool.add_string(name)),
            None => writer.emit_u32(NONE_INDEX),
        }

        writer.emit_u32(self.interfaces.len() as u32);
        for name in &self.interfaces {
            writer.emit_u32(pool.add_string(name));
        }

        writer.emit_u32(self.annotations.len() as u32);
        for name in &self.annotations {
            writer.emit_u32(pool.add_string(name));
        }

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_u16(field.access);
            writer.emit_u32(pool.add_string(&field.name));
            writer.emit_u32(pool.add_string(&field.ty.to_string()));
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            writer.emit_u16(method.access);
            writer.emit_u32(pool.add_string(&method.name));
            writer.emit_u32(pool.add_string(&method.descriptor.to_string()));
            match &method.code {
                Some(code) => {
                    writer.emit_u8(1);
                    // Length prefix lets structure-only readers skip the body
                    let len_offset = writer.reserve_u32();
                    let start = writer.offset();
                    code.encode(writer, pool);
                    let len = (writer.offset() - start) as u32;
                    writer.patch_u32(len_offset, len);
                }
                None => writer.emit_u8(0),
            }
        }
    }

    /// Decode a class from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ClassError> {
        Self::decode_with(data, DecodeOptions::default())
    }

    /// Decode a class, optionally skipping method bodies
    pub fn decode_with(data: &[u8], options: DecodeOptions) -> Result<Self, ClassError> {
        let mut reader = BytecodeReader::new(data);

        let magic: [u8; 4] = reader
            .read_bytes(4)?
            .try_into()
            .map_err(|_| DecodeError::UnexpectedEnd(0))?;
        if magic != MAGIC {
            return Err(ClassError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ClassError::UnsupportedVersion(version));
        }

        let _flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_LEN..]);
        if stored_checksum != calculated_checksum {
            return Err(ClassError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let pool = ConstantPool::decode(&mut reader)?;
        let name_at = |reader: &mut BytecodeReader<'_>| -> Result<String, DecodeError> {
            let offset = reader.position();
            let index = reader.read_u32()?;
            Ok(pool.resolve(index, offset)?.to_string())
        };

        let access = reader.read_u16()?;
        let name = name_at(&mut reader)?;
        let super_offset = reader.position();
        let super_index = reader.read_u32()?;
        let super_name = if super_index == NONE_INDEX {
            None
        } else {
            Some(pool.resolve(super_index, super_offset)?.to_string())
        };

        let interface_count = reader.read_u32()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count.min(64));
        for _ in 0..interface_count {
            interfaces.push(name_at(&mut reader)?);
        }

        let annotation_count = reader.read_u32()? as usize;
        let mut annotations = Vec::with_capacity(annotation_count.min(64));
        for _ in 0..annotation_count {
            annotations.push(name_at(&mut reader)?);
        }

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(256));
        for _ in 0..field_count {
            let access = reader.read_u16()?;
            let name = name_at(&mut reader)?;
            let ty = ValueType::parse(&name_at(&mut reader)?).map_err(DecodeError::from)?;
            fields.push(Field { access, name, ty });
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(256));
        for _ in 0..method_count {
            let access = reader.read_u16()?;
            let name = name_at(&mut reader)?;
            let descriptor =
                MethodDescriptor::parse(&name_at(&mut reader)?).map_err(DecodeError::from)?;
            let code = if reader.read_u8()? != 0 {
                let len = reader.read_u32()? as usize;
                if options.skip_code {
                    reader.skip(len)?;
                    None
                } else {
                    Some(Code::decode(&mut reader, &pool)?)
                }
            } else {
                None
            };
            methods.push(Method {
                access,
                name,
                descriptor,
                code,
            });
        }

        Ok(Self {
            version,
            access,
            name,
            super_name,
            interfaces,
            annotations,
            fields,
            methods,
        })
    }

    /// Human-readable listing of the class
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let kind = if self.is_interface() { "interface" } else { "class" };
        let _ = write!(out, "{} {}", kind, self.name);
        if let Some(parent) = &self.super_name {
            let _ = write!(out, " extends {}", parent);
        }
        if !self.interfaces.is_empty() {
            let _ = write!(out, " implements {}", self.interfaces.join(", "));
        }
        out.push('\n');
        for annotation in &self.annotations {
            let _ = writeln!(out, "  @{}", annotation);
        }
        for field in &self.fields {
            let _ = writeln!(out, "  field {}:{} [{:#06x}]", field.name, field.ty, field.access);
        }
        for method in &self.methods {
            let _ = writeln!(
                out,
                "  method {}{} [{:#06x}]",
                method.name, method.descriptor, method.access
            );
            if let Some(code) = &method.code {
                let _ = writeln!(
                    out,
                    "    max_stack={} max_locals={}",
                    code.max_stack, code.max_locals
                );
                for (idx, inst) in code.instructions.iter().enumerate() {
                    let _ = writeln!(out, "    {:4}: {}", idx, inst);
                }
                for handler in &code.handlers {
                    let _ = writeln!(
                        out,
                        "    catch {} [{}, {}) -> {}",
                        handler.catch_type.as_deref().unwrap_or("*"),
                        handler.start,
                        handler.end,
                        handler.target
                    );
                }
            }
        }
        out
    }
}

impl Code {
    fn encode(&self, writer: &mut BytecodeWriter, pool: &mut ConstantPool) {
        writer.emit_u16(self.max_stack);
        writer.emit_u16(self.max_locals);
        writer.emit_u32(self.instructions.len() as u32);
        for inst in &self.instructions {
            writer.emit_instruction(inst, pool);
        }
        writer.emit_u32(self.handlers.len() as u32);
        for handler in &self.handlers {
            writer.emit_u32(handler.start);
            writer.emit_u32(handler.end);
            writer.emit_u32(handler.target);
            match &handler.catch_type {
                Some(name) => writer.emit_u32(pool.add_string(name)),
                None => writer.emit_u32(NONE_INDEX),
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>, pool: &ConstantPool) -> Result<Self, DecodeError> {
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;
        let count = reader.read_u32()? as usize;
        let mut instructions = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            instructions.push(reader.read_instruction(pool)?);
        }
        let handler_count = reader.read_u32()? as usize;
        let mut handlers = Vec::with_capacity(handler_count.min(64));
        for _ in 0..handler_count {
            let start = reader.read_u32()?;
            let end = reader.read_u32()?;
            let target = reader.read_u32()?;
            let offset = reader.position();
            let catch_index = reader.read_u32()?;
            let catch_type = if catch_index == NONE_INDEX {
                None
            } else {
                Some(pool.resolve(catch_index, offset)?.to_string())
            };
            handlers.push(Handler {
                start,
                end,
                target,
                catch_type,
            });
        }
        Ok(Self {
            max_stack,
            max_locals,
            instructions,
            handlers,
        })
    }
}
