//! Runtime values
//!
//! Values are typed by their computational kind. Booleans, bytes, chars and
//! shorts are ints; longs and doubles take two stack and local slots.

use crate::error::{VmError, VmResult};
use specweave_bytecode::{Kind, ValueType};
use std::fmt;

/// Handle to a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub(crate) usize);

impl ObjRef {
    /// Index of the object in the heap
    pub fn index(self) -> usize {
        self.0
    }
}

/// A runtime value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// 32-bit int (also booleans, bytes, chars, shorts)
    Int(i32),
    /// 64-bit int
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Null reference
    Null,
    /// Object reference
    Ref(ObjRef),
}

impl Value {
    /// Boolean as an int
    pub fn bool(b: bool) -> Self {
        Value::Int(i32::from(b))
    }

    /// Zero value of a field or local of type `ty`
    pub fn default_for(ty: &ValueType) -> Self {
        match ty.kind() {
            Kind::Int => Value::Int(0),
            Kind::Long => Value::Long(0),
            Kind::Float => Value::Float(0.0),
            Kind::Double => Value::Double(0.0),
            Kind::Ref => Value::Null,
        }
    }

    /// Computational kind
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Long(_) => Kind::Long,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
            Value::Null | Value::Ref(_) => Kind::Ref,
        }
    }

    /// Slots taken on the stack
    pub fn slots(&self) -> u16 {
        self.kind().slots()
    }

    /// True for the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, expected: &str) -> VmError {
        VmError::TypeError(format!("expected {}, found {}", expected, self))
    }

    /// Int payload
    pub fn as_int(&self) -> VmResult<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.mismatch("int")),
        }
    }

    /// Int payload read as a boolean
    pub fn as_bool(&self) -> VmResult<bool> {
        Ok(self.as_int()? != 0)
    }

    /// Long payload
    pub fn as_long(&self) -> VmResult<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(other.mismatch("long")),
        }
    }

    /// Float payload
    pub fn as_float(&self) -> VmResult<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(other.mismatch("float")),
        }
    }

    /// Double payload
    pub fn as_double(&self) -> VmResult<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(other.mismatch("double")),
        }
    }

    /// Reference payload, `None` for null
    pub fn as_reference(&self) -> VmResult<Option<ObjRef>> {
        match self {
            Value::Null => Ok(None),
            Value::Ref(r) => Ok(Some(*r)),
            other => Err(other.mismatch("reference")),
        }
    }

    /// Non-null reference payload
    pub fn as_object(&self) -> VmResult<ObjRef> {
        self.as_reference()?.ok_or(VmError::NullPointer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Null => f.write_str("null"),
            Value::Ref(r) => write!(f, "@{}", r.0),
        }
    }
}
