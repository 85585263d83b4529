//! Version command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("tapply {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
