//! `utica validate`: checks that `Cartfile`/`Cartfile.private` parse and that, when a
//! `Cartfile.resolved` exists, every pinned version still satisfies its manifest specifier.

use super::common::{load_lockfile, load_manifest, resolve_config, ue, CommonOptions};
use clap::Args;
use utica_tracing::println_action_green;
use utica_util::UticaResult;

#[derive(Debug, Args)]
pub struct Command {
    #[clap(flatten)]
    common: CommonOptions,
}

pub fn exec(command: Command) -> UticaResult<()> {
    let config = resolve_config(&command.common)?;
    let manifest = load_manifest(&config)?;

    let Some(lockfile) = load_lockfile(&config) else {
        println_action_green("Validated", "Cartfile (no lock file to cross-check)");
        return Ok(());
    };
    let pinned = lockfile.to_map();

    let mut mismatches = Vec::new();
    for entry in &manifest.entries {
        match pinned.get(&entry.id) {
            Some(version) if entry.specifier.is_satisfied_by(version) => {}
            Some(version) => mismatches.push(format!(
                "{} is pinned to {version}, which does not satisfy {}",
                entry.id, entry.specifier
            )),
            None => mismatches.push(format!("{} has no entry in Cartfile.resolved", entry.id)),
        }
    }

    if mismatches.is_empty() {
        println_action_green("Validated", "Cartfile and Cartfile.resolved agree");
        Ok(())
    } else {
        Err(ue(mismatches.join("\n")))
    }
}
