//! `utica version`: prints the tool's own version.

use clap::Args;
use utica_util::UticaResult;

#[derive(Debug, Args)]
pub struct Command;

pub fn exec(_command: Command) -> UticaResult<()> {
    println!("{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
