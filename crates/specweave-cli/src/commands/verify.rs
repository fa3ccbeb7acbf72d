//! `specweave verify`: Decode a class file and check its frame sizes.

use crate::output::{StyledOutput, Tone};
use anyhow::Context;
use specweave_bytecode::verify_class;
use std::path::Path;
use termcolor::ColorChoice;

pub fn execute(file: &Path, color: ColorChoice) -> anyhow::Result<()> {
    let class = super::read_class(file)?;
    verify_class(&class).with_context(|| format!("{} failed verification", class.name))?;

    let mut out = StyledOutput::new(color);
    out.tag("ok", Tone::Changed);
    out.line(&format!(": {} ({} methods)", class.name, class.methods.len()));
    out.flush();
    Ok(())
}
