//! The three-phase resolution fixpoint (§4.5): from a root constraint set, determine a map
//! `DependencyId -> PinnedVersion` satisfying every transitive constraint.

use crate::dependency::DependencyId;
use crate::error::{Error, ResolutionError};
use crate::version::{intersection, PinnedVersion, VersionSpecifier};
use crate::ResolvedGraph;
use std::collections::{BTreeMap, BTreeSet};

/// Abstracts the Source/Binary backends the resolver needs: available versions for a
/// dependency, and the dependency declarations at a pinned version. Kept as a trait so the
/// fixpoint itself can be exercised without real git/network I/O.
pub trait DependencyBackend {
    fn available_versions(&self, dep: &DependencyId) -> Result<Vec<PinnedVersion>, Error>;

    fn dependencies_of(
        &self,
        dep: &DependencyId,
        version: &PinnedVersion,
    ) -> Result<Vec<(DependencyId, VersionSpecifier)>, Error>;

    /// Resolves a `GitReference`'s ref (branch, tag, or SHA) to the commit SHA it currently
    /// names, so that SHA can be stored as the pinned reference for the rest of this run.
    fn resolve_git_reference(&self, dep: &DependencyId, reference: &str) -> Result<String, Error>;
}

#[derive(Clone, Debug)]
struct Requirement {
    specifier: VersionSpecifier,
    /// The dependency that contributed the current specifier, or `None` for a root.
    required_by: Option<DependencyId>,
}

/// The pin predicate driving a partial update (§4.5): dependencies outside
/// `dependencies_to_update` stay pinned to their `last_resolved` version as long as that
/// version still satisfies the current specifier.
struct Filter {
    pins: BTreeMap<DependencyId, PinnedVersion>,
    exempt: BTreeSet<String>,
}

impl Filter {
    fn none() -> Self {
        Filter {
            pins: BTreeMap::new(),
            exempt: BTreeSet::new(),
        }
    }

    fn apply(
        &self,
        dep: &DependencyId,
        specifier: &VersionSpecifier,
        candidates: Vec<PinnedVersion>,
    ) -> Vec<PinnedVersion> {
        if self.exempt.contains(&dep.name()) {
            return candidates;
        }
        match self.pins.get(dep) {
            Some(pinned) if specifier.is_satisfied_by(pinned) => vec![pinned.clone()],
            _ => candidates,
        }
    }
}

/// Resolves `roots` into a pinned version for every transitively reachable dependency.
///
/// `last_resolved`/`dependencies_to_update` implement "update only these; keep everything
/// else" partial updates; pass `None` for a full resolution.
pub fn resolve(
    roots: &BTreeMap<DependencyId, VersionSpecifier>,
    last_resolved: Option<&ResolvedGraph>,
    dependencies_to_update: Option<&BTreeSet<String>>,
    backend: &dyn DependencyBackend,
) -> Result<ResolvedGraph, Error> {
    let (restricted_roots, filter) = build_filter(roots, last_resolved, dependencies_to_update);

    let mut requirements: BTreeMap<DependencyId, Requirement> = restricted_roots
        .into_iter()
        .map(|(dep, specifier)| {
            (
                dep,
                Requirement {
                    specifier,
                    required_by: None,
                },
            )
        })
        .collect();
    let mut resolved: ResolvedGraph = BTreeMap::new();

    loop {
        // 1. Select candidates.
        let mut candidates: BTreeMap<DependencyId, PinnedVersion> = BTreeMap::new();
        for (dep, req) in &requirements {
            if resolved.contains_key(dep) {
                continue;
            }
            let available = available_versions(dep, &req.specifier, backend)?;
            let satisfying: Vec<PinnedVersion> = available
                .into_iter()
                .filter(|v| req.specifier.is_satisfied_by(v))
                .collect();
            let filtered = filter.apply(dep, &req.specifier, satisfying);
            let highest = filtered.into_iter().max().ok_or_else(|| {
                Error::Resolution(ResolutionError::RequiredVersionNotFound {
                    dep: dep.clone(),
                    specifier: req.specifier.clone(),
                })
            })?;
            candidates.insert(dep.clone(), highest);
        }

        if candidates.is_empty() {
            break;
        }

        // 2. Expand.
        for (dep, version) in &candidates {
            for (child, child_spec) in backend.dependencies_of(dep, version)? {
                let child_spec = pin_git_reference(&child, child_spec, backend)?;
                merge_requirement(&mut requirements, child, child_spec, dep.clone())?;
            }
        }

        // 3. Commit: fold in this round's candidates, then drop any resolved entry that no
        // longer satisfies its (possibly since-tightened) requirement so it gets reselected.
        resolved.extend(candidates);
        resolved.retain(|dep, version| {
            requirements
                .get(dep)
                .map(|req| req.specifier.is_satisfied_by(version))
                .unwrap_or(true)
        });
    }

    Ok(resolved)
}

fn build_filter(
    roots: &BTreeMap<DependencyId, VersionSpecifier>,
    last_resolved: Option<&ResolvedGraph>,
    dependencies_to_update: Option<&BTreeSet<String>>,
) -> (BTreeMap<DependencyId, VersionSpecifier>, Filter) {
    let (Some(last_resolved), Some(to_update)) = (last_resolved, dependencies_to_update) else {
        return (roots.clone(), Filter::none());
    };
    if last_resolved.is_empty() || to_update.is_empty() {
        return (roots.clone(), Filter::none());
    }

    let restricted = roots
        .iter()
        .filter(|(dep, _)| last_resolved.contains_key(*dep) || to_update.contains(&dep.name()))
        .map(|(dep, spec)| (dep.clone(), spec.clone()))
        .collect();
    let filter = Filter {
        pins: last_resolved.clone(),
        exempt: to_update.clone(),
    };
    (restricted, filter)
}

fn available_versions(
    dep: &DependencyId,
    specifier: &VersionSpecifier,
    backend: &dyn DependencyBackend,
) -> Result<Vec<PinnedVersion>, Error> {
    if let VersionSpecifier::GitReference(reference) = specifier {
        let sha = backend.resolve_git_reference(dep, reference)?;
        return Ok(vec![PinnedVersion::Opaque(sha)]);
    }
    backend.available_versions(dep)
}

/// When a child's specifier is `GitReference`, resolve the ref to a commit SHA up front and
/// store the SHA as the specifier, so two parents requiring the same branch don't race a
/// moving ref within one resolution run.
fn pin_git_reference(
    dep: &DependencyId,
    specifier: VersionSpecifier,
    backend: &dyn DependencyBackend,
) -> Result<VersionSpecifier, Error> {
    match specifier {
        VersionSpecifier::GitReference(reference) => {
            let sha = backend.resolve_git_reference(dep, &reference)?;
            Ok(VersionSpecifier::GitReference(sha))
        }
        other => Ok(other),
    }
}

fn merge_requirement(
    requirements: &mut BTreeMap<DependencyId, Requirement>,
    child: DependencyId,
    child_spec: VersionSpecifier,
    parent: DependencyId,
) -> Result<(), Error> {
    match requirements.get(&child) {
        None => {
            requirements.insert(
                child,
                Requirement {
                    specifier: child_spec,
                    required_by: Some(parent),
                },
            );
        }
        Some(existing) => {
            let merged = intersection(&existing.specifier, &child_spec).ok_or_else(|| {
                Error::Resolution(ResolutionError::IncompatibleRequirements {
                    dep: child.clone(),
                    existing: existing.specifier.clone(),
                    existing_parent: existing.required_by.clone(),
                    new: child_spec.clone(),
                    new_parent: Some(parent.clone()),
                })
            })?;
            requirements.insert(
                child,
                Requirement {
                    specifier: merged,
                    required_by: Some(parent),
                },
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SemanticVersion;
    use std::str::FromStr;

    /// A fully in-memory backend over a fixed `dep -> version -> deps` table, for exercising
    /// the fixpoint without real I/O.
    struct FakeBackend {
        versions: BTreeMap<DependencyId, Vec<&'static str>>,
        deps: BTreeMap<(DependencyId, &'static str), Vec<(DependencyId, VersionSpecifier)>>,
    }

    impl DependencyBackend for FakeBackend {
        fn available_versions(&self, dep: &DependencyId) -> Result<Vec<PinnedVersion>, Error> {
            Ok(self
                .versions
                .get(dep)
                .into_iter()
                .flatten()
                .map(|v| PinnedVersion::parse(v))
                .collect())
        }

        fn dependencies_of(
            &self,
            dep: &DependencyId,
            version: &PinnedVersion,
        ) -> Result<Vec<(DependencyId, VersionSpecifier)>, Error> {
            let raw = version.raw();
            let key = self
                .deps
                .keys()
                .find(|(d, v)| d == dep && *v == raw.as_str())
                .cloned();
            Ok(key
                .and_then(|k| self.deps.get(&k))
                .cloned()
                .unwrap_or_default())
        }

        fn resolve_git_reference(&self, _dep: &DependencyId, reference: &str) -> Result<String, Error> {
            Ok(reference.to_string())
        }
    }

    fn dep(name: &str) -> DependencyId {
        DependencyId::Hosted {
            host: crate::dependency::Host::Primary,
            owner: "acme".to_string(),
            name: name.to_string(),
        }
    }

    fn at_least(v: &str) -> VersionSpecifier {
        VersionSpecifier::AtLeast(SemanticVersion::from_str(v).unwrap())
    }

    fn compatible(v: &str) -> VersionSpecifier {
        VersionSpecifier::CompatibleWith(SemanticVersion::from_str(v).unwrap())
    }

    #[test]
    fn resolves_transitive_dependency_to_tightened_version() {
        let a = dep("A");
        let b = dep("B");

        let mut versions = BTreeMap::new();
        versions.insert(a.clone(), vec!["1.0.0", "1.2.0"]);
        versions.insert(b.clone(), vec!["2.0.0", "2.1.0", "2.2.0"]);

        let mut deps = BTreeMap::new();
        deps.insert((a.clone(), "1.2.0"), vec![(b.clone(), at_least("2.1.0"))]);
        deps.insert((a.clone(), "1.0.0"), vec![]);

        let backend = FakeBackend { versions, deps };

        let mut roots = BTreeMap::new();
        roots.insert(a.clone(), compatible("1.0.0"));
        roots.insert(b.clone(), at_least("2.0.0"));

        let resolved = resolve(&roots, None, None, &backend).unwrap();
        assert_eq!(resolved.get(&a).unwrap().raw(), "1.2.0");
        assert_eq!(resolved.get(&b).unwrap().raw(), "2.2.0");
    }

    #[test]
    fn partial_update_keeps_unlisted_dependencies_pinned() {
        let a = dep("A");
        let b = dep("B");

        let mut versions = BTreeMap::new();
        versions.insert(a.clone(), vec!["1.0.0", "1.2.0"]);
        versions.insert(b.clone(), vec!["2.0.0", "2.1.0", "2.2.0"]);

        let mut deps = BTreeMap::new();
        deps.insert((a.clone(), "1.2.0"), vec![(b.clone(), at_least("2.0.0"))]);
        deps.insert((a.clone(), "1.0.0"), vec![(b.clone(), at_least("2.0.0"))]);

        let backend = FakeBackend { versions, deps };

        let mut roots = BTreeMap::new();
        roots.insert(a.clone(), compatible("1.0.0"));
        roots.insert(b.clone(), at_least("2.0.0"));

        let mut last_resolved = ResolvedGraph::new();
        last_resolved.insert(a.clone(), PinnedVersion::parse("1.0.0"));
        last_resolved.insert(b.clone(), PinnedVersion::parse("2.0.0"));

        let mut to_update = BTreeSet::new();
        to_update.insert("A".to_string());

        let resolved = resolve(&roots, Some(&last_resolved), Some(&to_update), &backend).unwrap();
        assert_eq!(resolved.get(&a).unwrap().raw(), "1.2.0");
        assert_eq!(resolved.get(&b).unwrap().raw(), "2.0.0");
    }

    #[test]
    fn conflicting_requirements_cite_both_parents() {
        let a = dep("A");
        let b = dep("B");
        let c = dep("C");

        let mut versions = BTreeMap::new();
        versions.insert(a.clone(), vec!["1.0.0"]);
        versions.insert(b.clone(), vec!["1.0.0"]);
        versions.insert(c.clone(), vec!["1.0.0", "2.0.0"]);

        let mut deps = BTreeMap::new();
        deps.insert((a.clone(), "1.0.0"), vec![(c.clone(), compatible("1.0.0"))]);
        deps.insert((b.clone(), "1.0.0"), vec![(c.clone(), compatible("2.0.0"))]);

        let backend = FakeBackend { versions, deps };

        let mut roots = BTreeMap::new();
        roots.insert(a.clone(), VersionSpecifier::Any);
        roots.insert(b.clone(), VersionSpecifier::Any);

        let err = resolve(&roots, None, None, &backend).unwrap_err();
        match err {
            Error::Resolution(ResolutionError::IncompatibleRequirements { dep, .. }) => {
                assert_eq!(dep, c);
            }
            other => panic!("expected IncompatibleRequirements, got {other:?}"),
        }
    }

    #[test]
    fn unsatisfiable_root_reports_required_version_not_found() {
        let a = dep("A");
        let mut versions = BTreeMap::new();
        versions.insert(a.clone(), vec!["1.0.0"]);
        let backend = FakeBackend {
            versions,
            deps: BTreeMap::new(),
        };

        let mut roots = BTreeMap::new();
        roots.insert(a.clone(), at_least("2.0.0"));

        let err = resolve(&roots, None, None, &backend).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution(ResolutionError::RequiredVersionNotFound { .. })
        ));
    }

    #[test]
    fn idempotent_reresolution_reproduces_the_same_lockfile() {
        let a = dep("A");
        let mut versions = BTreeMap::new();
        versions.insert(a.clone(), vec!["1.0.0", "1.1.0"]);
        let backend = FakeBackend {
            versions,
            deps: BTreeMap::new(),
        };

        let mut roots = BTreeMap::new();
        roots.insert(a.clone(), compatible("1.0.0"));

        let first = resolve(&roots, None, None, &backend).unwrap();
        let second = resolve(&roots, Some(&first), Some(&BTreeSet::new()), &backend).unwrap();
        assert_eq!(first, second);
    }
}
