//! Call-site rewriting
//!
//! Every dynamically dispatched call whose static receiver type resolves to
//! a contract owner becomes a static call to that owner's wrapper, with the
//! receiver passed as the first argument. The stack shape is unchanged.

use crate::config::WeaverConfig;
use crate::error::WeaveResult;
use crate::resolver::{Resolver, SpecBinding};
use crate::splice::{splice, Edit};
use crate::wrapper::wrapper_ref;
use specweave_bytecode::{Code, Instruction, InvokeKind, MethodRef};
use tracing::debug;

/// A rewritten call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenCall {
    /// Index of the call in the original body
    pub index: usize,
    /// Original target
    pub original: MethodRef,
    /// Wrapper now called instead
    pub wrapper: MethodRef,
    /// Contract the wrapper applies
    pub binding: SpecBinding,
}

/// Rewrite the dispatched calls of one body
///
/// Returns `None` when no call site resolves to a contract.
pub fn rewrite_call_sites(
    code: &Code,
    resolver: &Resolver<'_>,
    config: &WeaverConfig,
) -> WeaveResult<Option<(Code, Vec<RewrittenCall>)>> {
    let mut rewritten = Vec::new();
    for (index, inst) in code.instructions.iter().enumerate() {
        let target = match inst {
            Instruction::Invoke(kind, target) if kind.is_dispatched() => target,
            _ => continue,
        };
        // Array receivers have no companion
        if target.owner.starts_with('[') {
            continue;
        }
        let binding = match resolver.resolve_owner(&target.owner, &target.name, &target.descriptor)? {
            Some(binding) => binding,
            None => continue,
        };
        let wrapper = wrapper_ref(
            config,
            &binding.owner,
            binding.owner_is_interface,
            &target.name,
            &target.descriptor,
        );
        debug!(
            receiver = %target.owner,
            method = %target.name,
            owner = %wrapper.owner,
            "rewriting call site"
        );
        rewritten.push(RewrittenCall {
            index,
            original: target.clone(),
            wrapper,
            binding,
        });
    }

    if rewritten.is_empty() {
        return Ok(None);
    }

    let mut pending = rewritten.iter().peekable();
    let new_code = splice(code, Vec::new(), |idx, _| {
        if pending.peek().map_or(false, |call| call.index == idx) {
            if let Some(call) = pending.next() {
                return Edit::Replace(vec![Instruction::Invoke(
                    InvokeKind::Static,
                    call.wrapper.clone(),
                )]);
            }
        }
        Edit::Keep
    });
    Ok(Some((new_code, rewritten)))
}
