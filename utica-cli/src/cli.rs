use crate::commands::{bootstrap, build, checkout, update, validate, version};
use clap::{Parser, Subcommand};
use utica_util::UticaResult;

pub use bootstrap::Command as BootstrapCommand;
pub use build::Command as BuildCommand;
pub use checkout::Command as CheckoutCommand;
pub use update::Command as UpdateCommand;
pub use validate::Command as ValidateCommand;
pub use version::Command as VersionCommand;

#[derive(Debug, Parser)]
#[clap(name = "utica", about = "A dependency manager for frameworks", version)]
struct Opt {
    #[clap(subcommand)]
    command: Utica,
}

#[derive(Debug, Subcommand)]
enum Utica {
    Bootstrap(BootstrapCommand),
    Build(BuildCommand),
    Checkout(CheckoutCommand),
    Update(UpdateCommand),
    Validate(ValidateCommand),
    Version(VersionCommand),
}

pub(crate) fn run_cli() -> UticaResult<()> {
    let opt = Opt::parse();
    match opt.command {
        Utica::Bootstrap(command) => bootstrap::exec(command),
        Utica::Build(command) => build::exec(command),
        Utica::Checkout(command) => checkout::exec(command),
        Utica::Update(command) => update::exec(command),
        Utica::Validate(command) => validate::exec(command),
        Utica::Version(command) => version::exec(command),
    }
}
