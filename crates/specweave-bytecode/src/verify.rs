//! Frame sizing and verification
//!
//! Stack depth is tracked by abstract interpretation over the control-flow
//! graph: every reachable instruction must be entered with the same depth on
//! all incoming edges. The largest depth seen is the method's `max_stack`;
//! `max_locals` covers the receiver, parameters and every slot touched by a
//! load or store.

use crate::class::{access, ClassFile, Method};
use crate::descriptor::ReturnType;
use crate::instruction::Instruction;

/// Bytecode verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Stack underflow
    #[error("Stack underflow at instruction {0}")]
    StackUnderflow(usize),

    /// Two control-flow paths reach an instruction with different depths
    #[error("Inconsistent stack depth at instruction {index}: {expected} vs {found}")]
    InconsistentDepth {
        /// Instruction index
        index: usize,
        /// Depth recorded first
        expected: u16,
        /// Depth on the conflicting path
        found: u16,
    },

    /// Invalid jump target
    #[error("Invalid jump target {target} at instruction {index}")]
    InvalidJumpTarget {
        /// Target index
        target: u32,
        /// Branch instruction index
        index: usize,
    },

    /// Exception handler range or target out of bounds
    #[error("Invalid exception handler #{0}")]
    InvalidHandler(usize),

    /// Execution falls off end
    #[error("Execution falls off end of method at instruction {0}")]
    FallOffEnd(usize),

    /// Return instruction does not match the descriptor
    #[error("Return kind does not match method descriptor at instruction {0}")]
    ReturnMismatch(usize),

    /// Concrete method without a body
    #[error("Method has no body")]
    MissingBody,

    /// Declared `max_stack` is smaller than required
    #[error("Declared max_stack {declared} is below required {required}")]
    StackTooSmall {
        /// Declared value
        declared: u16,
        /// Computed value
        required: u16,
    },

    /// Declared `max_locals` is smaller than required
    #[error("Declared max_locals {declared} is below required {required}")]
    LocalsTooSmall {
        /// Declared value
        declared: u16,
        /// Computed value
        required: u16,
    },

    /// Error located in a specific method
    #[error("in method {method}: {error}")]
    InMethod {
        /// `name` + descriptor
        method: String,
        /// Underlying error
        error: Box<VerifyError>,
    },
}

/// Computed frame requirements of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSizes {
    /// Maximum operand stack depth in slots
    pub max_stack: u16,
    /// Local slots needed
    pub max_locals: u16,
}

/// Compute `max_stack`/`max_locals` for a method from its instructions
///
/// Methods without a body need no stack and exactly their argument slots.
pub fn compute_frame_sizes(method: &Method) -> Result<FrameSizes, VerifyError> {
    let arg_slots = method.arg_slots();
    let code = match &method.code {
        Some(code) => code,
        None => {
            return Ok(FrameSizes {
                max_stack: 0,
                max_locals: arg_slots,
            })
        }
    };

    let instructions = &code.instructions;
    let len = instructions.len();
    if len == 0 {
        return Err(VerifyError::FallOffEnd(0));
    }

    let mut depth: Vec<Option<u16>> = vec![None; len];
    let mut worklist = Vec::new();
    let mut max_stack = 0u16;

    propagate(&mut depth, &mut worklist, 0, 0)?;
    for (idx, handler) in code.handlers.iter().enumerate() {
        let in_bounds = handler.start < handler.end
            && (handler.end as usize) <= len
            && (handler.target as usize) < len;
        if !in_bounds {
            return Err(VerifyError::InvalidHandler(idx));
        }
        // Handlers are entered with only the thrown reference on the stack
        propagate(&mut depth, &mut worklist, handler.target as usize, 1)?;
    }

    while let Some(idx) = worklist.pop() {
        let entry = depth[idx].unwrap_or(0);
        let inst = &instructions[idx];
        let (pops, pushes) = inst.stack_effect();
        if entry < pops {
            return Err(VerifyError::StackUnderflow(idx));
        }
        let exit = entry - pops + pushes;
        max_stack = max_stack.max(entry).max(exit);

        check_return(inst, &method.descriptor.ret, idx)?;

        if let Some(target) = inst.branch_target() {
            if target as usize >= len {
                return Err(VerifyError::InvalidJumpTarget { target, index: idx });
            }
            propagate(&mut depth, &mut worklist, target as usize, exit)?;
        }
        if !inst.is_terminator() {
            if idx + 1 >= len {
                return Err(VerifyError::FallOffEnd(idx));
            }
            propagate(&mut depth, &mut worklist, idx + 1, exit)?;
        }
    }

    let max_locals = instructions
        .iter()
        .filter_map(Instruction::local_access)
        .map(|(slot, width)| slot.saturating_add(width))
        .fold(arg_slots, u16::max);

    Ok(FrameSizes {
        max_stack,
        max_locals,
    })
}

fn propagate(
    depth: &mut [Option<u16>],
    worklist: &mut Vec<usize>,
    index: usize,
    incoming: u16,
) -> Result<(), VerifyError> {
    match depth[index] {
        None => {
            depth[index] = Some(incoming);
            worklist.push(index);
            Ok(())
        }
        Some(existing) if existing == incoming => Ok(()),
        Some(existing) => Err(VerifyError::InconsistentDepth {
            index,
            expected: existing,
            found: incoming,
        }),
    }
}

fn check_return(inst: &Instruction, ret: &ReturnType, index: usize) -> Result<(), VerifyError> {
    let matches = match (inst, ret) {
        (Instruction::ReturnVoid, ReturnType::Void) => true,
        (Instruction::Return(kind), ReturnType::Value(ty)) => *kind == ty.kind(),
        (Instruction::ReturnVoid, _) | (Instruction::Return(_), _) => false,
        _ => true,
    };
    if matches {
        Ok(())
    } else {
        Err(VerifyError::ReturnMismatch(index))
    }
}

/// Verify every method of a class
///
/// Checks control flow and that each declared `max_stack`/`max_locals`
/// covers what the body actually needs.
pub fn verify_class(class: &ClassFile) -> Result<(), VerifyError> {
    for method in &class.methods {
        verify_method(method).map_err(|error| VerifyError::InMethod {
            method: format!("{}{}", method.name, method.descriptor),
            error: Box::new(error),
        })?;
    }
    Ok(())
}

fn verify_method(method: &Method) -> Result<(), VerifyError> {
    let code = match &method.code {
        Some(code) => code,
        None if method.access & (access::ABSTRACT | access::NATIVE) != 0 => return Ok(()),
        None => return Err(VerifyError::MissingBody),
    };
    let sizes = compute_frame_sizes(method)?;
    if code.max_stack < sizes.max_stack {
        return Err(VerifyError::StackTooSmall {
            declared: code.max_stack,
            required: sizes.max_stack,
        });
    }
    if code.max_locals < sizes.max_locals {
        return Err(VerifyError::LocalsTooSmall {
            declared: code.max_locals,
            required: sizes.max_locals,
        });
    }
    Ok(())
}
