//! `utica` command-line shell: subcommand dispatch over the `utica` core library.

mod backend;
mod cli;
mod commands;
mod shell_builder;

use utica_util::UticaCliResult;

fn main() -> UticaCliResult<()> {
    cli::run_cli().into()
}
