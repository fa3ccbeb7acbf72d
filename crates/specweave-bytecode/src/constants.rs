//! String constant pool
//!
//! Class names, member names and descriptors are stored once per class file
//! and referenced by index from the class body and instruction operands.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;

/// Interned strings of one class file
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// Strings in index order
    pub strings: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its index
    pub fn add_string(&mut self, value: &str) -> u32 {
        if let Some(&idx) = self.index.get(value) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), idx);
        idx
    }

    /// Look up a string by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Look up a string by index, failing with a decode error at `offset`
    pub fn resolve(&self, index: u32, offset: usize) -> Result<&str, DecodeError> {
        self.get_string(index)
            .ok_or(DecodeError::InvalidConstant { index, offset })
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// True if nothing has been interned
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encode the pool
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    /// Decode a pool
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut pool = Self::new();
        for _ in 0..count {
            let s = reader.read_string()?;
            pool.add_string(&s);
        }
        Ok(pool)
    }
}
