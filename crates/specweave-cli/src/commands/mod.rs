//! Subcommand implementations

pub mod dump;
pub mod verify;
pub mod weave;

use anyhow::Context;
use specweave_bytecode::ClassFile;
use std::path::Path;

/// Read and decode a class file
pub fn read_class(path: &Path) -> anyhow::Result<ClassFile> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    ClassFile::decode(&bytes).with_context(|| format!("cannot decode {}", path.display()))
}
