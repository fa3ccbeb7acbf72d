//! Wrapper generation
//!
//! A wrapper is a static function on the contract owner that performs
//! "dispatch, then check" for one method:
//!
//! ```text
//! static R m$contract(Owner self, P1..Pn):
//!     aload 0; <load args>; invokestatic OwnerSpec.mSpec; astore N
//!     aload 0; <load args>; invokevirtual|invokeinterface Owner.m
//!     <hand result to the deferred check, as in a woven body>
//!     return
//! ```
//!
//! Requests are collected while a class is visited and drained once after
//! every method has been seen, so each (name, descriptor) yields one wrapper.

use crate::body::{exit_sequence, load_params};
use crate::config::WeaverConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::resolver::SpecBinding;
use rustc_hash::FxHashSet;
use specweave_bytecode::{
    access, compute_frame_sizes, Code, Instruction, InvokeKind, Kind, Method, MethodDescriptor,
    MethodRef, ReturnType,
};

/// One wrapper to emit on the class being woven
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperRequest {
    /// Original method name
    pub name: String,
    /// Original method descriptor
    pub descriptor: MethodDescriptor,
    /// Visibility of the wrapper
    pub visibility: u16,
    /// Contract to apply
    pub binding: SpecBinding,
}

/// Deduplicated set of wrapper requests for one class, in request order
#[derive(Debug, Default)]
pub struct PendingWrappers {
    order: Vec<WrapperRequest>,
    seen: FxHashSet<(String, MethodDescriptor)>,
}

impl PendingWrappers {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a request; returns false if it was already scheduled
    pub fn schedule(&mut self, request: WrapperRequest) -> bool {
        let key = (request.name.clone(), request.descriptor.clone());
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push(request);
        true
    }

    /// True if a wrapper for the method is scheduled
    pub fn contains(&self, name: &str, descriptor: &MethodDescriptor) -> bool {
        self.seen
            .iter()
            .any(|(n, d)| n == name && d == descriptor)
    }

    /// Number of scheduled wrappers
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Consume the set, yielding each request once
    pub fn drain(self) -> Vec<WrapperRequest> {
        self.order
    }
}

/// Call-site target of the wrapper for `name` owned by `owner`
pub fn wrapper_ref(
    config: &WeaverConfig,
    owner: &str,
    owner_is_interface: bool,
    name: &str,
    descriptor: &MethodDescriptor,
) -> MethodRef {
    MethodRef::new(
        owner,
        config.wrapper_name(name),
        config.wrapper_descriptor(owner, descriptor),
        owner_is_interface,
    )
}

/// Synthesize the wrapper function for `request`
pub fn generate_wrapper(config: &WeaverConfig, request: &WrapperRequest) -> WeaveResult<Method> {
    let owner = request.binding.owner.as_str();
    let descriptor = config.wrapper_descriptor(owner, &request.descriptor);
    let arg_slots = descriptor.param_slots();
    let slot = arg_slots;

    let dispatch_kind = if request.binding.owner_is_interface {
        InvokeKind::Interface
    } else {
        InvokeKind::Virtual
    };

    let mut instructions = Vec::new();
    instructions.push(Instruction::Load(Kind::Ref, 0));
    instructions.extend(load_params(&request.descriptor, 1));
    instructions.push(Instruction::Invoke(
        InvokeKind::Static,
        request.binding.spec.clone(),
    ));
    instructions.push(Instruction::Store(Kind::Ref, slot));

    instructions.push(Instruction::Load(Kind::Ref, 0));
    instructions.extend(load_params(&request.descriptor, 1));
    instructions.push(Instruction::Invoke(
        dispatch_kind,
        MethodRef::new(
            owner,
            request.name.as_str(),
            request.descriptor.clone(),
            request.binding.owner_is_interface,
        ),
    ));
    instructions.extend(exit_sequence(config, &request.descriptor.ret, slot));
    instructions.push(match &request.descriptor.ret {
        ReturnType::Void => Instruction::ReturnVoid,
        ReturnType::Value(ty) => Instruction::Return(ty.kind()),
    });

    let mut method = Method {
        access: (request.visibility & access::VISIBILITY) | access::STATIC | access::SYNTHETIC,
        name: config.wrapper_name(&request.name),
        descriptor,
        code: Some(Code {
            max_stack: 0,
            max_locals: 0,
            instructions,
            handlers: Vec::new(),
        }),
    };
    let sizes = compute_frame_sizes(&method).map_err(|e| WeaveError::InvalidMethod {
        class: owner.to_string(),
        method: format!("{}{}", method.name, method.descriptor),
        reason: e.to_string(),
    })?;
    if let Some(code) = method.code.as_mut() {
        code.max_stack = sizes.max_stack;
        code.max_locals = sizes.max_locals;
    }
    Ok(method)
}
