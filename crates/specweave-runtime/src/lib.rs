//! Specweave runtime
//!
//! Hosts woven classes: a class loader that passes every application class
//! through the [`specweave_engine::Weaver`], a small interpreter, and the
//! contract primitives woven code calls into.
//!
//! # Contract primitives
//!
//! `contracts/Contracts.requires(Z)V` raises a precondition violation when
//! its argument is false. The two `ensures` overloads capture a predicate
//! (or an argument-free condition) in a deferred check object, which the
//! woven method body runs at every return with the result. The same
//! primitives are available to host code as [`requires`], [`ensures`] and
//! [`ensures_that`].
//!
//! # Example
//!
//! ```ignore
//! let source = Arc::new(DirectorySource::new("classes"));
//! let mut vm = Vm::new(source, Arc::new(Weaver::default()))?;
//! let account = vm.new_instance("bank/Account", "(I)V", &[Value::Int(0)])?;
//! vm.invoke_virtual(account, "deposit", "(I)V", &[Value::Int(5)])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bootstrap;
pub mod contracts;
pub mod error;
pub mod frame;
pub mod heap;
pub mod interpreter;
pub mod loader;
pub mod natives;
pub mod value;

pub use contracts::{ensures, ensures_that, requires, ContractViolation, Postcondition, PostconditionRunnable};
pub use error::{VmError, VmResult};
pub use frame::{Frame, Slot};
pub use heap::{Heap, NativeData, Object};
pub use interpreter::{Vm, DEFAULT_MAX_CALL_DEPTH};
pub use loader::ClassLoader;
pub use natives::{NativeFn, NativeRegistry};
pub use value::{ObjRef, Value};
