//! Specweave class file definitions
//!
//! This crate provides the compiled class representation the weaving engine
//! consumes and produces: descriptors, the typed instruction IR, the binary
//! `.wclass` format, builders, and frame-size verification.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod class;
pub mod constants;
pub mod descriptor;
pub mod encoder;
pub mod instruction;
pub mod opcode;
pub mod verify;

pub use builder::{BuildError, ClassBuilder, CodeBuilder, Label};
pub use class::{access, ClassError, ClassFile, Code, DecodeOptions, Field, Handler, Method};
pub use constants::ConstantPool;
pub use descriptor::{DescriptorError, MethodDescriptor, ReturnType, ValueType};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instruction::{Cond, FieldRef, Instruction, InvokeKind, Kind, MethodRef};
pub use opcode::Opcode;
pub use verify::{compute_frame_sizes, verify_class, FrameSizes, VerifyError};

/// Universal root of every class hierarchy.
pub const ROOT_CLASS: &str = "lang/Object";
/// Name of instance initializers.
pub const CONSTRUCTOR_NAME: &str = "<init>";
