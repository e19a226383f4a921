//! `utica build`: builds the dependencies already materialized by a prior checkout, without
//! touching resolution.

use super::common::{
    build_backend, build_options, direct_dependencies, load_lockfile, log_events, resolve_config,
    run_build, to_update_set, CommonOptions,
};
use clap::Args;
use utica::ProjectEvent;
use utica_util::UticaResult;

#[derive(Debug, Args)]
pub struct Command {
    #[clap(flatten)]
    common: CommonOptions,

    /// Restrict the build to these dependencies and their transitive dependencies.
    dependencies: Vec<String>,
}

pub fn exec(command: Command) -> UticaResult<()> {
    let config = resolve_config(&command.common)?;
    let backend = build_backend(&config);

    let Some(lockfile) = load_lockfile(&config) else {
        return Err("no Cartfile.resolved found; run bootstrap or update first".into());
    };
    let resolved = lockfile.to_map();
    let direct = direct_dependencies(&resolved, &backend)?;

    let mut events: Vec<ProjectEvent> = Vec::new();
    let name_filter = to_update_set(&command.dependencies);
    run_build(
        &config,
        backend.binary(),
        &resolved,
        &direct,
        build_options(&command.common),
        name_filter.as_ref(),
        &mut events,
    )?;

    log_events(events);
    Ok(())
}
