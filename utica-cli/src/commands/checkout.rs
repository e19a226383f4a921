//! `utica checkout`: materializes the dependencies already pinned in `Cartfile.resolved`,
//! without building them.

use super::common::{
    build_backend, direct_dependencies, filter_by_names, load_lockfile, log_events, resolve_config,
    run_checkout, CommonOptions,
};
use clap::Args;
use utica::ProjectEvent;
use utica_util::UticaResult;

#[derive(Debug, Args)]
pub struct Command {
    #[clap(flatten)]
    common: CommonOptions,

    /// Restrict checkout to exactly these dependencies (no transitive expansion).
    dependencies: Vec<String>,
}

pub fn exec(command: Command) -> UticaResult<()> {
    let config = resolve_config(&command.common)?;
    let backend = build_backend(&config);

    let Some(lockfile) = load_lockfile(&config) else {
        return Err("no Cartfile.resolved found; run bootstrap or update first".into());
    };
    let resolved = filter_by_names(lockfile.to_map(), &command.dependencies);
    let direct = direct_dependencies(&resolved, &backend)?;

    let mut events: Vec<ProjectEvent> = Vec::new();
    run_checkout(&config, &resolved, &direct, &mut events)?;
    log_events(events);
    Ok(())
}
