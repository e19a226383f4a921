//! `utica bootstrap`: checks out and builds the versions already pinned in
//! `Cartfile.resolved`, resolving from the `Cartfile` only when no lockfile exists (§4.7).

use super::common::{
    build_backend, build_options, direct_dependencies, filter_by_names, load_lockfile,
    load_manifest, log_events, resolve_config, run_build, run_checkout, to_update_set,
    CommonOptions,
};
use clap::Args;
use std::collections::BTreeMap;
use utica::ProjectEvent;
use utica_util::UticaResult;

#[derive(Debug, Args)]
pub struct Command {
    #[clap(flatten)]
    common: CommonOptions,

    /// Restrict checkout to exactly these dependencies, and the build to these dependencies
    /// plus their transitive dependencies (checkout and build apply the restriction
    /// differently — see `common::filter_by_names` vs. `BuildGraph::build_order`).
    dependencies: Vec<String>,
}

pub fn exec(command: Command) -> UticaResult<()> {
    let config = resolve_config(&command.common)?;
    let manifest = load_manifest(&config)?;
    let backend = build_backend(&config);

    let resolved = match load_lockfile(&config) {
        Some(lock) => lock.to_map(),
        None => {
            let to_update = to_update_set(&command.dependencies);
            super::common::resolve_and_lock(&config, &manifest, &backend, to_update.as_ref())?
        }
    };

    let mut events: Vec<ProjectEvent> = Vec::new();
    let direct = direct_dependencies(&resolved, &backend)?;

    if !command.common.no_checkout {
        // Restrict the actual checkout to the named dependencies, matching `checkout`'s own
        // filtering (checkout.rs) — `resolved`/`direct` stay unfiltered for the build step
        // below, which expands the same names to their full transitive closure itself.
        let checkout_targets = filter_by_names(resolved.clone(), &command.dependencies);
        let checkout_direct: BTreeMap<_, _> = direct
            .iter()
            .filter(|(dep, _)| checkout_targets.contains_key(dep))
            .map(|(dep, children)| (dep.clone(), children.clone()))
            .collect();
        run_checkout(&config, &checkout_targets, &checkout_direct, &mut events)?;
    }

    if !command.common.no_build {
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
    }

    log_events(events);
    Ok(())
}
