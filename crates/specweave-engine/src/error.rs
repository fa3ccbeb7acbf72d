//! Engine error types

use specweave_bytecode::{ClassError, VerifyError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures reading class bytes from a class source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read a class file
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Class name cannot be mapped to a location
    #[error("Invalid class name: {0:?}")]
    InvalidName(String),
}

/// Transformation failures
///
/// These are engine faults, never contract violations. The class that
/// triggered one must not be loaded.
#[derive(Debug, Error)]
pub enum WeaveError {
    /// The class source failed while looking up a class
    #[error("Failed to load class {class}: {source}")]
    Source {
        /// Class being looked up
        class: String,
        /// Underlying error
        #[source]
        source: SourceError,
    },

    /// Class bytes could not be decoded
    #[error("Failed to decode class {class}: {source}")]
    Decode {
        /// Class being decoded
        class: String,
        /// Underlying error
        #[source]
        source: ClassError,
    },

    /// The ancestor chain loops back on itself
    #[error("Inheritance cycle through {0}")]
    InheritanceCycle(String),

    /// A marked class has no companion specification class
    #[error("Class {class} is marked but its companion {companion} cannot be found")]
    MissingCompanion {
        /// Marked class
        class: String,
        /// Expected companion name
        companion: String,
    },

    /// A method selected for weaving has no body to weave into
    #[error("Cannot weave {class}.{method}: {reason}")]
    InvalidMethod {
        /// Declaring class
        class: String,
        /// `name` + descriptor
        method: String,
        /// What is wrong
        reason: String,
    },

    /// The woven class fails verification
    #[error("Woven class {class} failed verification: {source}")]
    Verify {
        /// Woven class
        class: String,
        /// Underlying error
        #[source]
        source: VerifyError,
    },
}

impl WeaveError {
    /// Name of the class the failure is about
    pub fn class_name(&self) -> &str {
        match self {
            Self::Source { class, .. }
            | Self::Decode { class, .. }
            | Self::MissingCompanion { class, .. }
            | Self::InvalidMethod { class, .. }
            | Self::Verify { class, .. } => class,
            Self::InheritanceCycle(class) => class,
        }
    }
}

/// Result alias for engine operations
pub type WeaveResult<T> = Result<T, WeaveError>;
