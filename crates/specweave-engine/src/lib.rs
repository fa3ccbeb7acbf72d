//! Specweave weaving engine
//!
//! Augments compiled classes with runtime-checked contracts at load time:
//!
//! - **metadata**: per-scope cache of class structure (marker, ancestor,
//!   method signatures), decoded without method bodies
//! - **resolver**: finds the contract owner for a dispatched call by walking
//!   marked ancestors of the static receiver type
//! - **body**: weaves a class's own specifications into its method and
//!   constructor bodies
//! - **wrapper**: synthesizes static "dispatch, then check" functions on
//!   contract owners
//! - **callsite**: redirects dispatched calls to the wrapper of the static
//!   receiver type's contract owner
//! - **weaver**: drives the two-phase transformation of one class
//!
//! ```text
//! bytes ─▶ decode ─▶ phase 1 (call sites, bodies, wrapper requests)
//!                 ─▶ phase 2 (emit wrappers) ─▶ verify ─▶ encode
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod body;
pub mod callsite;
pub mod config;
pub mod error;
pub mod metadata;
pub mod resolver;
pub mod source;
pub mod splice;
pub mod weaver;
pub mod wrapper;

pub use callsite::RewrittenCall;
pub use config::{ConfigError, WeaverConfig};
pub use error::{SourceError, WeaveError, WeaveResult};
pub use metadata::{ClassMetadata, MetadataCache};
pub use resolver::{Resolver, SpecBinding};
pub use source::{ClassSource, DirectorySource, MemorySource, ScopeId, CLASS_EXTENSION};
pub use weaver::{WeaveOutcome, WeaveReport, Weaver};
pub use wrapper::{PendingWrappers, WrapperRequest};
