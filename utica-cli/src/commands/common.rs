//! Shared plumbing for subcommands: config resolution, manifest/lockfile I/O, and the
//! resolve/checkout/build pipeline they all drive.

use crate::backend::CliBackend;
use clap::Args;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use crate::shell_builder::{ShellBinaryInstaller, ShellBuilder};
use utica::build::{BuildGraph, BuildOptions, BuildScheduler};
use utica::checkout::{CheckoutEngine, SubmoduleMode};
use utica::config::{Config, ConfigOverrides};
use utica::dependency::{DependencyId, Host};
use utica::error::Warning;
use utica::events::{EventSink, ProjectEvent};
use utica::manifest::{merge_manifests, parse_lockfile, parse_manifest};
use utica::source::{BinaryBackend, GitBackend};
use utica::{DependencyBackend, Lockfile, Manifest, ResolvedGraph};
use utica_tracing::{println_action_green, println_warning};
use utica_util::{UticaError, UticaResult};

/// Flags shared by every subcommand that touches the provisioning pipeline (§6).
#[derive(Debug, Args, Default)]
pub struct CommonOptions {
    /// Platform to build for (e.g. iOS, macOS); may be repeated. Empty means "all".
    #[clap(long)]
    pub platform: Vec<String>,

    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub use_binaries: bool,

    #[clap(long)]
    pub use_xcframeworks: bool,

    #[clap(long)]
    pub cache_builds: bool,

    #[clap(long)]
    pub no_checkout: bool,

    #[clap(long)]
    pub no_build: bool,

    #[clap(long)]
    pub use_netrc: bool,

    #[clap(long)]
    pub jobs: Option<usize>,

    #[clap(long)]
    pub log_path: Option<PathBuf>,

    #[clap(long)]
    pub project_directory: Option<PathBuf>,

    #[clap(long)]
    pub valid_simulator_archs: Vec<String>,

    #[clap(long)]
    pub toolchain: Option<String>,

    #[clap(long)]
    pub derived_data: Option<PathBuf>,
}

/// Lifts any displayable error into a [`UticaError`], the common currency subcommands return.
pub fn ue<E: std::fmt::Display>(e: E) -> UticaError {
    anyhow::anyhow!("{e}").into()
}

pub fn resolve_config(common: &CommonOptions) -> UticaResult<Config> {
    let overrides = ConfigOverrides {
        project_root: common.project_directory.clone(),
        use_netrc: Some(common.use_netrc),
        jobs: common.jobs,
        ..Default::default()
    };
    Config::resolve(overrides).map_err(ue)
}

pub fn load_manifest(config: &Config) -> UticaResult<Manifest> {
    let primary_path = config.project_root.join("Cartfile");
    let primary_text = std::fs::read_to_string(&primary_path)
        .map_err(|e| ue(format!("could not read {}: {e}", primary_path.display())))?;
    let primary = parse_manifest(&primary_text, Some(&config.project_root)).map_err(ue)?;

    let private_path = config.project_root.join("Cartfile.private");
    let private = match std::fs::read_to_string(&private_path) {
        Ok(text) => Some(parse_manifest(&text, Some(&config.project_root)).map_err(ue)?),
        Err(_) => None,
    };

    merge_manifests(primary, private).map_err(ue)
}

pub fn lockfile_path(config: &Config) -> PathBuf {
    config.project_root.join("Cartfile.resolved")
}

/// Reads and parses `Cartfile.resolved`, warning (not failing) when it is absent or unreadable
/// as a lockfile — the caller falls back to full resolution either way.
pub fn load_lockfile(config: &Config) -> Option<Lockfile> {
    let path = lockfile_path(config);
    if !path.exists() {
        println_warning(&Warning::MissingLockFile.to_string());
        return None;
    }
    let text = std::fs::read_to_string(&path).ok()?;
    match parse_lockfile(&text) {
        Ok(lockfile) => Some(lockfile),
        Err(_) => {
            println_warning(&Warning::LockDidNotMatchManifest.to_string());
            None
        }
    }
}

pub fn build_backend(config: &Config) -> CliBackend {
    CliBackend::new(
        GitBackend::new(config.mirrors_dir()),
        BinaryBackend::new(config.binaries_cache_dir(), config.use_netrc),
    )
}

/// Resolves the manifest's declared constraints into a pinned graph, optionally honoring a
/// partial update (§4.5), and writes the resulting lockfile.
pub fn resolve_and_lock(
    config: &Config,
    manifest: &Manifest,
    backend: &CliBackend,
    dependencies_to_update: Option<&BTreeSet<String>>,
) -> UticaResult<ResolvedGraph> {
    let roots = manifest.to_roots();
    let last_resolved = load_lockfile(config).map(|lock| lock.to_map());

    let resolved = utica::resolve(
        &roots,
        last_resolved.as_ref(),
        dependencies_to_update,
        backend,
    )
    .map_err(ue)?;

    let lockfile = Lockfile::from_resolved(&resolved);
    lockfile.write_atomic(&lockfile_path(config)).map_err(ue)?;
    Ok(resolved)
}

/// Re-derives each resolved dependency's direct dependencies, needed by both the checkout
/// engine's symlink pass and the build scheduler's graph.
pub fn direct_dependencies(
    resolved: &ResolvedGraph,
    backend: &CliBackend,
) -> UticaResult<BTreeMap<DependencyId, Vec<DependencyId>>> {
    let mut map = BTreeMap::new();
    for (dep, version) in resolved {
        let children = backend.dependencies_of(dep, version).map_err(ue)?;
        map.insert(dep.clone(), children.into_iter().map(|(c, _)| c).collect());
    }
    Ok(map)
}

fn git_url_for(dep: &DependencyId) -> String {
    match dep {
        DependencyId::Hosted {
            host: Host::Primary,
            owner,
            name,
        } => format!("https://github.com/{owner}/{name}.git"),
        DependencyId::Hosted {
            host: Host::Enterprise { base_url },
            owner,
            name,
        } => format!("{base_url}/{owner}/{name}.git"),
        DependencyId::Git { url } => url.clone(),
        DependencyId::Binary { .. } => unreachable!("binary dependencies are never checked out"),
    }
}

/// Materializes every source dependency's working tree and wires the nested checkouts
/// symlink tree (§4.6).
pub fn run_checkout(
    config: &Config,
    resolved: &ResolvedGraph,
    direct: &BTreeMap<DependencyId, Vec<DependencyId>>,
    sink: &mut dyn EventSink,
) -> UticaResult<()> {
    let git = GitBackend::new(config.mirrors_dir());
    let engine = CheckoutEngine::new(&git, config.checkouts_dir());

    for (dep, version) in resolved {
        if matches!(dep, DependencyId::Binary { .. }) {
            continue;
        }
        let url = git_url_for(dep);

        sink.emit(ProjectEvent::Fetching(dep.clone()));
        let mirror = git
            .clone_or_fetch(&dep.name(), &url, Some(&version.raw()))
            .map_err(ue)?;
        let revision = git.resolve_ref(&mirror, &version.raw()).map_err(ue)?;

        sink.emit(ProjectEvent::CheckingOut {
            dep: dep.clone(),
            revision: revision.clone(),
        });
        engine
            .checkout_dependency(dep, &mirror, &revision, SubmoduleMode::PlainTree)
            .map_err(ue)?;
    }

    let names: Vec<String> = resolved.keys().map(DependencyId::name).collect();
    let direct_by_name: BTreeMap<String, Vec<String>> = direct
        .iter()
        .map(|(dep, children)| (dep.name(), children.iter().map(DependencyId::name).collect()))
        .collect();
    engine
        .link_nested_checkouts(&names, &direct_by_name)
        .map_err(ue)?;
    Ok(())
}

/// Reduces `dependencies_to_update` positional args to dependency *names*, the unit the
/// resolver's partial-update filter operates on (§4.5).
pub fn to_update_set(names: &[String]) -> Option<BTreeSet<String>> {
    if names.is_empty() {
        None
    } else {
        Some(names.iter().cloned().collect())
    }
}

/// Restricts a resolved graph to exactly the named dependencies, with no transitive expansion
/// (an empty `names` means "no restriction"). Used by subcommands that let the user name which
/// dependencies to check out.
pub fn filter_by_names(resolved: ResolvedGraph, names: &[String]) -> ResolvedGraph {
    if names.is_empty() {
        return resolved;
    }
    resolved
        .into_iter()
        .filter(|(dep, _)| names.contains(&dep.name()))
        .collect()
}

/// The full platform set built when `--platform` is never passed.
const ALL_PLATFORMS: &[&str] = &["iOS", "macOS", "tvOS", "watchOS"];

pub fn build_options(common: &CommonOptions) -> BuildOptions {
    let platforms = if common.platform.is_empty() {
        ALL_PLATFORMS.iter().map(|p| p.to_string()).collect()
    } else {
        common.platform.clone()
    };
    BuildOptions {
        platforms,
        configuration: "Release".to_string(),
        toolchain_identifier: common.toolchain.clone().unwrap_or_else(|| "default".to_string()),
        swift_toolchain_version: "unknown".to_string(),
        cache_builds: common.cache_builds,
        use_binaries: common.use_binaries,
        use_xcframeworks: common.use_xcframeworks,
    }
}

/// Builds every dependency that needs it (§4.7): constructs the build graph, runs the
/// scheduler with the real shell-based builder and binary installer, and drains its events
/// into action-line logging.
pub fn run_build(
    config: &Config,
    binary: &BinaryBackend,
    resolved: &ResolvedGraph,
    direct: &BTreeMap<DependencyId, Vec<DependencyId>>,
    options: BuildOptions,
    name_filter: Option<&BTreeSet<String>>,
    sink: &mut dyn EventSink,
) -> UticaResult<()> {
    let graph = BuildGraph::new(resolved, direct);
    let order = graph.build_order(name_filter).map_err(ue)?;

    let builder = ShellBuilder::new(config, "utica-build-tool".to_string());
    let installer = ShellBinaryInstaller::new(config, binary);
    let scheduler = BuildScheduler::new(config, options);
    let result = scheduler.run(&graph, &order, &builder, &installer, sink);

    for warning in binary.drain_warnings() {
        println_warning(&warning.to_string());
    }

    result.map_err(ue)
}

/// Drains a `Vec<ProjectEvent>` sink into the tracing action-line helpers, the CLI's only
/// place that turns core events into user-facing output.
pub fn log_events(events: Vec<ProjectEvent>) {
    for event in events {
        let dep = event.dependency();
        let text = match &event {
            ProjectEvent::CheckingOut { revision, .. } => format!("{dep} at {revision}"),
            ProjectEvent::DownloadingBinaries { rev_label, .. } => format!("{dep} binary {rev_label}"),
            ProjectEvent::SkippedDownloadingBinaries { reason, .. }
            | ProjectEvent::SkippedBuilding { reason, .. } => format!("{dep}: {reason}"),
            ProjectEvent::SkippedInstallingBinaries { error, .. } => format!("{dep}: {error}"),
            _ => dep.to_string(),
        };
        if event.is_nominal() {
            println_action_green(event.action(), &text);
        } else {
            utica_tracing::println_action_red(event.action(), &text);
        }
    }
}
