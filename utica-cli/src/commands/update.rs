//! `utica update`: re-resolves the `Cartfile` against its constraints, optionally pinning
//! unlisted dependencies to their last-resolved version (§4.5 partial update).

use super::common::{
    build_backend, build_options, direct_dependencies, load_manifest, log_events, resolve_and_lock,
    resolve_config, run_build, run_checkout, to_update_set, CommonOptions,
};
use clap::Args;
use utica::ProjectEvent;
use utica_util::UticaResult;

#[derive(Debug, Args)]
pub struct Command {
    #[clap(flatten)]
    common: CommonOptions,

    /// Dependency names to update; others are pinned to their last-resolved version when one
    /// exists and still satisfies the manifest (§4.5). Empty means update everything.
    dependencies: Vec<String>,
}

pub fn exec(command: Command) -> UticaResult<()> {
    let config = resolve_config(&command.common)?;
    let manifest = load_manifest(&config)?;
    let backend = build_backend(&config);

    let to_update = to_update_set(&command.dependencies);
    let resolved = resolve_and_lock(&config, &manifest, &backend, to_update.as_ref())?;

    let mut events: Vec<ProjectEvent> = Vec::new();
    let direct = direct_dependencies(&resolved, &backend)?;

    if !command.common.no_checkout {
        run_checkout(&config, &resolved, &direct, &mut events)?;
    }

    if !command.common.no_build {
        run_build(
            &config,
            backend.binary(),
            &resolved,
            &direct,
            build_options(&command.common),
            to_update.as_ref(),
            &mut events,
        )?;
    }

    log_events(events);
    Ok(())
}
