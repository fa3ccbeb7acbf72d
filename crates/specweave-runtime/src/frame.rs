//! Activation records
//!
//! A frame owns its locals and operand stack, both sized from the method's
//! declared `max_locals` and `max_stack`. Wide values occupy a value slot
//! followed by an upper-half marker, so slot-level instructions (`dup2`,
//! `swap`, `pop2`) behave the same for one wide value as for two narrow ones.
//!
//! ```text
//! stack:  [ Int(1) | Long(5) | upper ]   depth 3
//!                    ^ one long, two slots
//! ```

use crate::error::{VmError, VmResult};
use crate::value::Value;
use specweave_bytecode::Kind;

/// One stack or local slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// A value, or the lower half of a wide value
    Value(Value),
    /// Upper half of the wide value below
    Upper,
    /// Never written
    Empty,
}

/// Call frame for one method activation
#[derive(Debug)]
pub struct Frame {
    method: String,
    locals: Vec<Slot>,
    stack: Vec<Slot>,
    max_stack: u16,
}

impl Frame {
    /// Create a frame with `args` (receiver first) in the leading locals
    pub fn new(method: impl Into<String>, max_locals: u16, max_stack: u16, args: &[Value]) -> VmResult<Self> {
        let mut frame = Self {
            method: method.into(),
            locals: vec![Slot::Empty; max_locals as usize],
            stack: Vec::with_capacity(max_stack as usize),
            max_stack,
        };
        let mut slot = 0u16;
        for arg in args {
            frame.store(slot, *arg)?;
            slot += arg.slots();
        }
        Ok(frame)
    }

    /// Method this frame executes, as `owner.name`
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Operand stack depth in slots
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop every operand, e.g. on entry to an exception handler
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Push a raw slot
    pub fn push_slot(&mut self, slot: Slot) -> VmResult<()> {
        if self.stack.len() >= self.max_stack as usize {
            return Err(VmError::OperandOverflow {
                method: self.method.clone(),
                max: self.max_stack,
            });
        }
        self.stack.push(slot);
        Ok(())
    }

    /// Pop a raw slot
    pub fn pop_slot(&mut self) -> VmResult<Slot> {
        self.stack
            .pop()
            .ok_or_else(|| VmError::StackUnderflow(self.method.clone()))
    }

    /// Push a value, taking two slots if it is wide
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        self.push_slot(Slot::Value(value))?;
        if value.slots() == 2 {
            self.push_slot(Slot::Upper)?;
        }
        Ok(())
    }

    /// Pop a whole value
    pub fn pop(&mut self) -> VmResult<Value> {
        match self.pop_slot()? {
            Slot::Value(value) if value.slots() == 1 => Ok(value),
            Slot::Upper => match self.pop_slot()? {
                Slot::Value(value) if value.slots() == 2 => Ok(value),
                other => Err(self.torn(other)),
            },
            other => Err(self.torn(other)),
        }
    }

    /// Pop a value of the given kind
    pub fn pop_kind(&mut self, kind: Kind) -> VmResult<Value> {
        let value = self.pop()?;
        if value.kind() != kind {
            return Err(VmError::TypeError(format!(
                "{}: expected {:?} operand, found {}",
                self.method, kind, value
            )));
        }
        Ok(value)
    }

    fn torn(&self, slot: Slot) -> VmError {
        VmError::TypeError(format!("{}: torn wide value ({:?})", self.method, slot))
    }

    fn check_local(&self, slot: u16, width: u16) -> VmResult<()> {
        if slot as usize + width as usize > self.locals.len() {
            return Err(VmError::LocalOutOfRange {
                method: self.method.clone(),
                slot,
                max: self.locals.len() as u16,
            });
        }
        Ok(())
    }

    /// Read local `slot`, which must hold a value of `kind`
    pub fn load(&self, kind: Kind, slot: u16) -> VmResult<Value> {
        self.check_local(slot, kind.slots())?;
        match self.locals[slot as usize] {
            Slot::Value(value) if value.kind() == kind => Ok(value),
            other => Err(VmError::TypeError(format!(
                "{}: local {} holds {:?}, expected {:?}",
                self.method, slot, other, kind
            ))),
        }
    }

    /// Write `value` to local `slot`
    pub fn store(&mut self, slot: u16, value: Value) -> VmResult<()> {
        let width = value.slots();
        self.check_local(slot, width)?;
        let index = slot as usize;
        self.locals[index] = Slot::Value(value);
        if width == 2 {
            self.locals[index + 1] = Slot::Upper;
        }
        Ok(())
    }
}
