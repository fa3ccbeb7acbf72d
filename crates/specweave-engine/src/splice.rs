//! Instruction-list splicing
//!
//! Rewrites never patch a body in place. Each pass decides an `Edit` per
//! original instruction and `splice` builds a fresh body, remapping branch
//! targets and handler ranges from old indices to new ones.
//!
//! A jump to an original instruction lands on the first instruction emitted
//! for it, so code inserted `Before` a return runs on every path reaching
//! that return. The prologue has no original index: a jump back to the first
//! original instruction skips it.

use specweave_bytecode::{Code, Handler, Instruction};

/// What to do with one original instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Keep it unchanged
    Keep,
    /// Insert a branch-free sequence before it
    Before(Vec<Instruction>),
    /// Replace it with a branch-free sequence
    Replace(Vec<Instruction>),
}

/// Build a new body from `code`, a prologue and per-instruction edits
///
/// `max_stack`/`max_locals` are copied unchanged; callers recompute them.
pub fn splice<F>(code: &Code, prologue: Vec<Instruction>, mut edit: F) -> Code
where
    F: FnMut(usize, &Instruction) -> Edit,
{
    let len = code.instructions.len();
    let mut out = Vec::with_capacity(prologue.len() + len);
    let mut original = Vec::with_capacity(prologue.len() + len);
    let mut new_index = vec![0u32; len + 1];

    original.resize(prologue.len(), false);
    out.extend(prologue);

    for (idx, inst) in code.instructions.iter().enumerate() {
        new_index[idx] = out.len() as u32;
        match edit(idx, inst) {
            Edit::Keep => {
                out.push(inst.clone());
                original.push(true);
            }
            Edit::Before(seq) => {
                original.resize(original.len() + seq.len(), false);
                out.extend(seq);
                out.push(inst.clone());
                original.push(true);
            }
            Edit::Replace(seq) => {
                original.resize(original.len() + seq.len(), false);
                out.extend(seq);
            }
        }
    }
    new_index[len] = out.len() as u32;

    let remap = |old: u32| new_index.get(old as usize).copied().unwrap_or(old);
    for (inst, is_original) in out.iter_mut().zip(&original) {
        if !*is_original {
            continue;
        }
        if let Some(target) = inst.branch_target_mut() {
            *target = remap(*target);
        }
    }

    let handlers = code
        .handlers
        .iter()
        .map(|h| Handler {
            start: remap(h.start),
            end: remap(h.end),
            target: remap(h.target),
            catch_type: h.catch_type.clone(),
        })
        .collect();

    Code {
        max_stack: code.max_stack,
        max_locals: code.max_locals,
        instructions: out,
        handlers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specweave_bytecode::{Cond, Kind};

    fn looped() -> Code {
        // 0: iload 1; 1: ifeq @4; 2: iconst 1; 3: ireturn; 4: goto @0
        Code {
            max_stack: 1,
            max_locals: 2,
            instructions: vec![
                Instruction::Load(Kind::Int, 1),
                Instruction::If(Cond::Eq, 4),
                Instruction::ConstInt(1),
                Instruction::Return(Kind::Int),
                Instruction::Goto(0),
            ],
            handlers: vec![Handler {
                start: 0,
                end: 3,
                target: 4,
                catch_type: None,
            }],
        }
    }

    #[test]
    fn test_keep_everything_is_identity() {
        let code = looped();
        let out = splice(&code, Vec::new(), |_, _| Edit::Keep);
        assert_eq!(out, code);
    }

    #[test]
    fn test_prologue_is_skipped_by_back_edges() {
        let code = looped();
        let out = splice(&code, vec![Instruction::Nop, Instruction::Nop], |_, _| Edit::Keep);
        assert_eq!(out.instructions.len(), 7);
        assert_eq!(out.instructions[3], Instruction::If(Cond::Eq, 6));
        assert_eq!(out.instructions[6], Instruction::Goto(2));
        assert_eq!(out.handlers[0].start, 2);
        assert_eq!(out.handlers[0].end, 5);
        assert_eq!(out.handlers[0].target, 6);
    }

    #[test]
    fn test_before_return_is_jump_target() {
        let code = Code {
            max_stack: 1,
            max_locals: 2,
            instructions: vec![
                Instruction::Load(Kind::Int, 1),
                Instruction::If(Cond::Eq, 3),
                Instruction::ReturnVoid,
                Instruction::ReturnVoid,
            ],
            handlers: Vec::new(),
        };
        let out = splice(&code, Vec::new(), |_, inst| {
            if inst.is_return() {
                Edit::Before(vec![Instruction::Nop])
            } else {
                Edit::Keep
            }
        });
        // 0 iload, 1 ifeq, 2 nop, 3 return, 4 nop, 5 return
        assert_eq!(out.instructions[1], Instruction::If(Cond::Eq, 4));
        assert_eq!(out.instructions[4], Instruction::Nop);
        assert_eq!(out.instructions[5], Instruction::ReturnVoid);
    }

    #[test]
    fn test_replace_shifts_following_targets() {
        let code = looped();
        let out = splice(&code, Vec::new(), |idx, _| {
            if idx == 2 {
                Edit::Replace(vec![Instruction::ConstInt(0), Instruction::Neg(Kind::Int)])
            } else {
                Edit::Keep
            }
        });
        assert_eq!(out.instructions[1], Instruction::If(Cond::Eq, 5));
        assert_eq!(out.instructions[5], Instruction::Goto(0));
        assert_eq!(out.handlers[0].end, 4);
    }
}
