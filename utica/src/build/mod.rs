//! The build scheduler (§4.7): orders resolved dependencies topologically, consults the
//! version-file cache, installs binaries ahead of source builds, and dispatches remaining
//! builds with bounded concurrency.

pub mod versionfile;

use crate::config::Config;
use crate::dependency::DependencyId;
use crate::error::{Error, ResolutionError};
use crate::events::{EventSink, ProjectEvent};
use crate::version::PinnedVersion;
use crate::ResolvedGraph;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use versionfile::{PlatformArtifact, VersionFile};

/// Build-time options threaded through from the CLI (§4.11, §6).
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub platforms: Vec<String>,
    pub configuration: String,
    pub toolchain_identifier: String,
    pub swift_toolchain_version: String,
    pub cache_builds: bool,
    pub use_binaries: bool,
    pub use_xcframeworks: bool,
}

/// One entry in the build graph: a resolved dependency and the direct dependencies its
/// declaration names at its pinned version.
#[derive(Clone, Debug)]
pub struct BuildNode {
    pub dep: DependencyId,
    pub version: PinnedVersion,
    pub direct_dependencies: Vec<DependencyId>,
}

pub struct BuildGraph {
    nodes: BTreeMap<DependencyId, BuildNode>,
}

impl BuildGraph {
    pub fn new(
        resolved: &ResolvedGraph,
        direct_dependencies: &BTreeMap<DependencyId, Vec<DependencyId>>,
    ) -> Self {
        let nodes = resolved
            .iter()
            .map(|(dep, version)| {
                let direct_dependencies = direct_dependencies.get(dep).cloned().unwrap_or_default();
                (
                    dep.clone(),
                    BuildNode {
                        dep: dep.clone(),
                        version: version.clone(),
                        direct_dependencies,
                    },
                )
            })
            .collect();
        BuildGraph { nodes }
    }

    pub fn node(&self, dep: &DependencyId) -> Option<&BuildNode> {
        self.nodes.get(dep)
    }

    /// Topologically sorts the graph (dependencies before dependents) and restricts to nodes
    /// reachable from `name_filter` (and their transitive dependencies). `None` means build
    /// everything.
    pub fn build_order(&self, name_filter: Option<&BTreeSet<String>>) -> Result<Vec<DependencyId>, Error> {
        let mut graph = DiGraph::<DependencyId, ()>::new();
        let mut index_of: HashMap<DependencyId, NodeIndex> = HashMap::new();
        for dep in self.nodes.keys() {
            index_of.insert(dep.clone(), graph.add_node(dep.clone()));
        }
        for node in self.nodes.values() {
            for child in &node.direct_dependencies {
                if let (Some(&from), Some(&to)) = (index_of.get(child), index_of.get(&node.dep)) {
                    // Edge points dependency -> dependent, so a toposort yields dependencies
                    // before the nodes that need them.
                    graph.add_edge(from, to, ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            Error::Resolution(ResolutionError::DependencyCycle(vec![
                graph[cycle.node_id()].clone()
            ]))
        })?;
        let full_order: Vec<DependencyId> = order.into_iter().map(|idx| graph[idx].clone()).collect();

        let Some(name_filter) = name_filter else {
            return Ok(full_order);
        };
        if name_filter.is_empty() {
            return Ok(full_order);
        }

        let mut reachable: BTreeSet<DependencyId> = BTreeSet::new();
        let mut stack: Vec<DependencyId> = full_order
            .iter()
            .filter(|dep| name_filter.contains(&dep.name()))
            .cloned()
            .collect();
        while let Some(dep) = stack.pop() {
            if !reachable.insert(dep.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&dep) {
                stack.extend(node.direct_dependencies.iter().cloned());
            }
        }

        Ok(full_order
            .into_iter()
            .filter(|dep| reachable.contains(dep))
            .collect())
    }
}

/// Builds one node for one platform, producing its fingerprint artifact. The external build
/// tool itself is out of scope (§1); this trait is the seam an embedder implements.
pub trait Builder {
    fn build(
        &self,
        node: &BuildNode,
        platform: &str,
        options: &BuildOptions,
    ) -> Result<PlatformArtifact, Error>;
}

/// Attempts to install a prebuilt binary in place of a source build.
pub trait BinaryInstaller {
    /// `Ok(Some(_))` on a successful install, `Ok(None)` when no matching asset exists (the
    /// caller falls through to source build for `Hosted`, or treats it as a hard error for
    /// `Binary`), `Err` on an I/O failure.
    fn try_install(
        &self,
        node: &BuildNode,
        platform: &str,
        options: &BuildOptions,
    ) -> Result<Option<PlatformArtifact>, Error>;
}

pub struct BuildScheduler<'a> {
    config: &'a Config,
    options: BuildOptions,
}

impl<'a> BuildScheduler<'a> {
    pub fn new(config: &'a Config, options: BuildOptions) -> Self {
        BuildScheduler { config, options }
    }

    /// Runs the full scheduler pipeline (§4.7, steps 2-6) over an already-ordered node list.
    pub fn run(
        &self,
        graph: &BuildGraph,
        order: &[DependencyId],
        builder: &dyn Builder,
        installer: &dyn BinaryInstaller,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let mut rebuild: BTreeSet<DependencyId> = BTreeSet::new();
        let mut completed: BTreeSet<DependencyId> = BTreeSet::new();

        // Step 3: per-node cache check.
        for dep in order {
            let node = graph.node(dep).expect("order only contains graph nodes");
            let ancestor_rebuilding = node
                .direct_dependencies
                .iter()
                .any(|child| rebuild.contains(child));

            if ancestor_rebuilding || !self.options.cache_builds {
                rebuild.insert(dep.clone());
                sink.emit(ProjectEvent::RebuildingCached(dep.clone()));
                continue;
            }

            match self.check_cache(node) {
                Some(_) => {
                    sink.emit(ProjectEvent::SkippedBuildingCached(dep.clone()));
                    completed.insert(dep.clone());
                }
                None => {
                    rebuild.insert(dep.clone());
                }
            }
        }

        // Step 4: binary installation pass, before source builds.
        let mut still_needs_source_build: BTreeSet<DependencyId> = BTreeSet::new();
        for dep in order {
            if !rebuild.contains(dep) {
                continue;
            }
            let node = graph.node(dep).expect("order only contains graph nodes");
            let is_binary = matches!(dep, DependencyId::Binary { .. });
            let wants_binary_install = is_binary || self.options.use_binaries;

            if !wants_binary_install {
                still_needs_source_build.insert(dep.clone());
                continue;
            }

            match self.install_binary(node, installer, sink)? {
                true => {
                    completed.insert(dep.clone());
                }
                false if is_binary => {
                    return Err(Error::BinaryArchive(
                        crate::error::BinaryArchiveError::NoFrameworkFound(dep.clone()),
                    ));
                }
                false => {
                    still_needs_source_build.insert(dep.clone());
                }
            }
        }

        // Step 5: concurrent source build, respecting readiness order. `order` is already
        // topologically sorted, so a simple left-to-right pass already respects readiness;
        // true concurrency is delegated to the embedder's Builder, which may itself run the
        // external build tool on a worker pool bounded by `Config::effective_jobs`.
        for dep in order {
            if !still_needs_source_build.contains(dep) {
                continue;
            }
            let node = graph.node(dep).expect("order only contains graph nodes");
            sink.emit(ProjectEvent::BuildingUncached(dep.clone()));

            let mut platforms = BTreeMap::new();
            let mut no_shared_schemes = false;
            for platform in &self.options.platforms {
                match builder.build(node, platform, &self.options) {
                    Ok(artifact) => {
                        platforms.insert(platform.clone(), vec![artifact]);
                    }
                    Err(Error::NoSharedSchemes(_)) => {
                        no_shared_schemes = true;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            // "No shared schemes" is always a downgrade, never a terminal error (§7).
            if no_shared_schemes {
                sink.emit(ProjectEvent::SkippedBuilding {
                    dep: dep.clone(),
                    reason: "no shared schemes to build".to_string(),
                });
                continue;
            }

            self.write_version_file(node, &platforms)?;
            completed.insert(dep.clone());
        }

        Ok(())
    }

    fn check_cache(&self, node: &BuildNode) -> Option<VersionFile> {
        let path = self.config.version_file_path(&node.dep.name());
        let version_file = VersionFile::read(&path)?;

        let mut current = BTreeMap::new();
        for platform in &self.options.platforms {
            let bundle_dir = self
                .config
                .build_dir()
                .join(platform)
                .join(format!("{}.framework", node.dep.name()));
            if !bundle_dir.exists() {
                return None;
            }
            let hash = versionfile::hash_bundle(&bundle_dir).ok()?;
            current.insert(
                platform.clone(),
                vec![PlatformArtifact {
                    name: node.dep.name(),
                    hash,
                }],
            );
        }

        version_file
            .matches(
                &node.version.raw(),
                &self.options.configuration,
                &self.options.toolchain_identifier,
                &self.options.swift_toolchain_version,
                &current,
            )
            .then_some(version_file)
    }

    fn install_binary(
        &self,
        node: &BuildNode,
        installer: &dyn BinaryInstaller,
        sink: &mut dyn EventSink,
    ) -> Result<bool, Error> {
        sink.emit(ProjectEvent::DownloadingBinaries {
            dep: node.dep.clone(),
            rev_label: node.version.raw(),
        });

        let mut platforms = BTreeMap::new();
        for platform in &self.options.platforms {
            match installer.try_install(node, platform, &self.options) {
                Ok(Some(artifact)) => {
                    platforms.insert(platform.clone(), vec![artifact]);
                }
                Ok(None) => {
                    sink.emit(ProjectEvent::SkippedDownloadingBinaries {
                        dep: node.dep.clone(),
                        reason: "no matching release asset".to_string(),
                    });
                    return Ok(false);
                }
                Err(e) => {
                    sink.emit(ProjectEvent::SkippedInstallingBinaries {
                        dep: node.dep.clone(),
                        error: e.to_string(),
                    });
                    return Ok(false);
                }
            }
        }
        self.write_version_file(node, &platforms)?;
        Ok(true)
    }

    fn write_version_file(
        &self,
        node: &BuildNode,
        platforms: &BTreeMap<String, Vec<PlatformArtifact>>,
    ) -> Result<(), Error> {
        let version_file = VersionFile {
            commitish: node.version.raw(),
            platforms: platforms.clone(),
            configuration: self.options.configuration.clone(),
            toolchain_identifier: self.options.toolchain_identifier.clone(),
            swift_toolchain_version: self.options.swift_toolchain_version.clone(),
        };
        version_file.write_atomic(&self.config.version_file_path(&node.dep.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::dependency::Host;

    fn dep(name: &str) -> DependencyId {
        DependencyId::Hosted {
            host: Host::Primary,
            owner: "acme".to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn build_order_places_dependencies_before_dependents() {
        let a = dep("A");
        let b = dep("B");
        let mut resolved = ResolvedGraph::new();
        resolved.insert(a.clone(), PinnedVersion::parse("1.0.0"));
        resolved.insert(b.clone(), PinnedVersion::parse("1.0.0"));

        let mut direct = BTreeMap::new();
        direct.insert(a.clone(), vec![b.clone()]);

        let graph = BuildGraph::new(&resolved, &direct);
        let order = graph.build_order(None).unwrap();
        let pos_a = order.iter().position(|d| d == &a).unwrap();
        let pos_b = order.iter().position(|d| d == &b).unwrap();
        assert!(pos_b < pos_a);
    }

    #[test]
    fn build_order_restricts_to_filter_and_its_dependencies() {
        let a = dep("A");
        let b = dep("B");
        let c = dep("C");
        let mut resolved = ResolvedGraph::new();
        for d in [&a, &b, &c] {
            resolved.insert(d.clone(), PinnedVersion::parse("1.0.0"));
        }
        let mut direct = BTreeMap::new();
        direct.insert(a.clone(), vec![b.clone()]);

        let graph = BuildGraph::new(&resolved, &direct);
        let mut filter = BTreeSet::new();
        filter.insert("A".to_string());
        let order = graph.build_order(Some(&filter)).unwrap();
        assert!(order.contains(&a));
        assert!(order.contains(&b));
        assert!(!order.contains(&c));
    }

    #[test]
    fn cycle_is_reported_as_dependency_cycle() {
        let a = dep("A");
        let b = dep("B");
        let mut resolved = ResolvedGraph::new();
        resolved.insert(a.clone(), PinnedVersion::parse("1.0.0"));
        resolved.insert(b.clone(), PinnedVersion::parse("1.0.0"));
        let mut direct = BTreeMap::new();
        direct.insert(a.clone(), vec![b.clone()]);
        direct.insert(b.clone(), vec![a.clone()]);

        let graph = BuildGraph::new(&resolved, &direct);
        let err = graph.build_order(None).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution(ResolutionError::DependencyCycle(_))
        ));
    }

    struct AlwaysBuild;
    impl Builder for AlwaysBuild {
        fn build(
            &self,
            node: &BuildNode,
            _platform: &str,
            _options: &BuildOptions,
        ) -> Result<PlatformArtifact, Error> {
            Ok(PlatformArtifact {
                name: node.dep.name(),
                hash: "deadbeef".to_string(),
            })
        }
    }

    struct NeverInstall;
    impl BinaryInstaller for NeverInstall {
        fn try_install(
            &self,
            _node: &BuildNode,
            _platform: &str,
            _options: &BuildOptions,
        ) -> Result<Option<PlatformArtifact>, Error> {
            Ok(None)
        }
    }

    struct NoSharedSchemesBuild;
    impl Builder for NoSharedSchemesBuild {
        fn build(
            &self,
            node: &BuildNode,
            _platform: &str,
            _options: &BuildOptions,
        ) -> Result<PlatformArtifact, Error> {
            Err(Error::NoSharedSchemes(node.dep.clone()))
        }
    }

    #[test]
    fn no_shared_schemes_is_downgraded_to_skipped_event() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::resolve(ConfigOverrides {
            project_root: Some(root.path().to_path_buf()),
            cache_root: Some(root.path().join("cache")),
            ..Default::default()
        })
        .unwrap();

        let a = dep("A");
        let mut resolved = ResolvedGraph::new();
        resolved.insert(a.clone(), PinnedVersion::parse("1.0.0"));
        let graph = BuildGraph::new(&resolved, &BTreeMap::new());
        let order = graph.build_order(None).unwrap();

        let options = BuildOptions {
            platforms: vec!["iOS".to_string()],
            configuration: "Release".to_string(),
            toolchain_identifier: "swift-5".to_string(),
            swift_toolchain_version: "5.9".to_string(),
            cache_builds: false,
            use_binaries: false,
            use_xcframeworks: false,
        };
        let scheduler = BuildScheduler::new(&config, options);

        let mut events = Vec::new();
        scheduler
            .run(&graph, &order, &NoSharedSchemesBuild, &NeverInstall, &mut events)
            .expect("no shared schemes must not abort the run");
        assert!(events
            .iter()
            .any(|e| matches!(e, ProjectEvent::SkippedBuilding { .. }) && !e.is_nominal()));
        assert!(!config.version_file_path(&a.name()).exists());
    }

    #[test]
    fn runs_end_to_end_without_binaries() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::resolve(ConfigOverrides {
            project_root: Some(root.path().to_path_buf()),
            cache_root: Some(root.path().join("cache")),
            ..Default::default()
        })
        .unwrap();

        let a = dep("A");
        let mut resolved = ResolvedGraph::new();
        resolved.insert(a.clone(), PinnedVersion::parse("1.0.0"));
        let graph = BuildGraph::new(&resolved, &BTreeMap::new());
        let order = graph.build_order(None).unwrap();

        let options = BuildOptions {
            platforms: vec!["iOS".to_string()],
            configuration: "Release".to_string(),
            toolchain_identifier: "swift-5".to_string(),
            swift_toolchain_version: "5.9".to_string(),
            cache_builds: true,
            use_binaries: false,
            use_xcframeworks: false,
        };
        let scheduler = BuildScheduler::new(&config, options);

        let mut events = Vec::new();
        scheduler
            .run(&graph, &order, &AlwaysBuild, &NeverInstall, &mut events)
            .unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, ProjectEvent::BuildingUncached(_))));
        assert!(config.version_file_path(&a.name()).exists());
    }
}
