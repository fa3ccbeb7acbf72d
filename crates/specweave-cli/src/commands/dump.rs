//! `specweave dump`: Disassemble a class file.

use std::path::Path;

pub fn execute(file: &Path) -> anyhow::Result<()> {
    let class = super::read_class(file)?;
    print!("{}", class.disassemble());
    Ok(())
}
