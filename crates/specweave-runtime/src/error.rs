//! Interpreter errors

use crate::contracts::ContractViolation;
use crate::value::ObjRef;
use specweave_bytecode::{BuildError, ClassError, DescriptorError};
use specweave_engine::{SourceError, WeaveError};

/// VM execution errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// A contract check failed; never caught by bytecode handlers
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    /// The weaver rejected a class while it was being loaded
    #[error("Weaving failed: {0}")]
    Weave(#[from] WeaveError),

    /// Class bytes could not be read
    #[error("Class source error: {0}")]
    Source(#[from] SourceError),

    /// Class bytes could not be decoded
    #[error("Invalid class {class}: {source}")]
    Decode {
        /// Class being loaded
        class: String,
        /// Decoder error
        #[source]
        source: ClassError,
    },

    /// A built-in class could not be assembled
    #[error("Bootstrap class failed to build: {0}")]
    Bootstrap(#[from] BuildError),

    /// A descriptor passed to the host API is malformed
    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    /// No class with this name in the bootstrap or application scope
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Method lookup failed
    #[error("No such method: {class}.{name}{descriptor}")]
    NoSuchMethod {
        /// Class where lookup started
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// Field lookup failed
    #[error("No such field: {class}.{name}")]
    NoSuchField {
        /// Class of the object
        class: String,
        /// Field name
        name: String,
    },

    /// A native method has no host implementation
    #[error("Missing native implementation: {0}")]
    MissingNative(String),

    /// A method without a body was selected for execution
    #[error("Abstract method invoked: {0}")]
    AbstractMethod(String),

    /// Null dereference
    #[error("Null pointer exception")]
    NullPointer,

    /// Integer division or remainder by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Failed checked cast
    #[error("Class cast: {found} is not a {expected}")]
    ClassCast {
        /// Target type
        expected: String,
        /// Actual class
        found: String,
    },

    /// Operand of the wrong kind
    #[error("Type error: {0}")]
    TypeError(String),

    /// Too many nested calls
    #[error("Stack overflow (call depth {0})")]
    StackOverflow(usize),

    /// A frame pushed more than its declared `max_stack`
    #[error("Operand stack overflow in {method} (max_stack {max})")]
    OperandOverflow {
        /// Executing method
        method: String,
        /// Declared maximum
        max: u16,
    },

    /// Pop from an empty operand stack
    #[error("Stack underflow in {0}")]
    StackUnderflow(String),

    /// Local slot outside the frame's `max_locals`
    #[error("Local slot {slot} out of range in {method} (max_locals {max})")]
    LocalOutOfRange {
        /// Executing method
        method: String,
        /// Accessed slot
        slot: u16,
        /// Declared number of locals
        max: u16,
    },

    /// Execution ran past the last instruction
    #[error("Execution fell off the end of {0}")]
    FellOffEnd(String),

    /// A thrown object no handler caught
    #[error("Uncaught exception: {class}")]
    Thrown {
        /// Class of the thrown object
        class: String,
        /// The thrown object
        object: ObjRef,
    },
}

impl VmError {
    /// The contract violation, if this is one
    pub fn violation(&self) -> Option<&ContractViolation> {
        match self {
            VmError::Contract(violation) => Some(violation),
            _ => None,
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
