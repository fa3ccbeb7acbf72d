//! Object heap
//!
//! Objects live for the lifetime of the VM; there is no collector.

use crate::error::{VmError, VmResult};
use crate::value::{ObjRef, Value};
use rustc_hash::FxHashMap;

/// Host-side payload of built-in objects
#[derive(Debug, Clone, PartialEq)]
pub enum NativeData {
    /// Boxed primitive
    Boxed(Value),
    /// Deferred check over a result, built by `Contracts.ensures(Predicate)`
    Check {
        /// The `contracts/Predicate` to test the result with
        predicate: Value,
        /// Method that stated the postcondition
        site: String,
    },
    /// Deferred check without a result, built by `Contracts.ensures(Condition)`
    Runnable {
        /// The `contracts/Condition` to evaluate
        condition: Value,
        /// Method that stated the postcondition
        site: String,
    },
}

/// Object instance
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Internal name of the object's class
    pub class: String,
    /// Instance fields by name
    pub fields: FxHashMap<String, Value>,
    /// Payload of built-in objects
    pub native: Option<NativeData>,
}

impl Object {
    /// Create an object with the given field defaults
    pub fn new(class: impl Into<String>, fields: FxHashMap<String, Value>) -> Self {
        Self {
            class: class.into(),
            fields,
            native: None,
        }
    }

    /// Create a built-in object without fields
    pub fn native(class: impl Into<String>, data: NativeData) -> Self {
        Self {
            class: class.into(),
            fields: FxHashMap::default(),
            native: Some(data),
        }
    }

    /// Read a field
    pub fn get_field(&self, name: &str) -> VmResult<Value> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| VmError::NoSuchField {
                class: self.class.clone(),
                name: name.to_string(),
            })
    }

    /// Write a field
    pub fn set_field(&mut self, name: &str, value: Value) -> VmResult<()> {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::NoSuchField {
                class: self.class.clone(),
                name: name.to_string(),
            }),
        }
    }
}

/// Append-only object store
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return its handle
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        self.objects.push(object);
        ObjRef(self.objects.len() - 1)
    }

    /// Look up an object
    pub fn get(&self, obj: ObjRef) -> VmResult<&Object> {
        self.objects
            .get(obj.0)
            .ok_or_else(|| VmError::TypeError(format!("dangling reference @{}", obj.0)))
    }

    /// Look up an object for writing
    pub fn get_mut(&mut self, obj: ObjRef) -> VmResult<&mut Object> {
        self.objects
            .get_mut(obj.0)
            .ok_or_else(|| VmError::TypeError(format!("dangling reference @{}", obj.0)))
    }

    /// Number of allocated objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing has been allocated
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
