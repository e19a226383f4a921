//! Wires the resolver's [`utica::DependencyBackend`] seam to the real Source/Binary backends,
//! so the CLI is the only place that knows how to turn a `DependencyId` into a git URL.

use utica::dependency::{DependencyId, Host};
use utica::error::Error;
use utica::manifest::parse_manifest;
use utica::source::{BinaryBackend, GitBackend};
use utica::version::{PinnedVersion, VersionSpecifier};
use utica::DependencyBackend;

pub struct CliBackend {
    git: GitBackend,
    binary: BinaryBackend,
}

impl CliBackend {
    pub fn new(git: GitBackend, binary: BinaryBackend) -> Self {
        CliBackend { git, binary }
    }

    pub fn binary(&self) -> &BinaryBackend {
        &self.binary
    }
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
        DependencyId::Binary { .. } => {
            unreachable!("binary dependencies never go through the git backend")
        }
    }
}

impl DependencyBackend for CliBackend {
    fn available_versions(&self, dep: &DependencyId) -> Result<Vec<PinnedVersion>, Error> {
        match dep {
            DependencyId::Binary { url, .. } => {
                Ok(self.binary.fetch_manifest(url)?.into_keys().collect())
            }
            _ => {
                let url = git_url_for(dep);
                let mirror = self.git.clone_or_fetch(&dep.name(), &url, None)?;
                let tags = self.git.list_tags(&mirror)?;
                Ok(tags
                    .into_iter()
                    .map(|tag| PinnedVersion::parse(&tag))
                    .filter(|pinned| matches!(pinned, PinnedVersion::Semantic(_)))
                    .collect())
            }
        }
    }

    fn dependencies_of(
        &self,
        dep: &DependencyId,
        version: &PinnedVersion,
    ) -> Result<Vec<(DependencyId, VersionSpecifier)>, Error> {
        if matches!(dep, DependencyId::Binary { .. }) {
            return Ok(Vec::new());
        }
        let url = git_url_for(dep);
        let mirror = self
            .git
            .clone_or_fetch(&dep.name(), &url, Some(&version.raw()))?;
        let revision = self.git.resolve_ref(&mirror, &version.raw())?;
        match self.git.read_file_at_revision(&mirror, "Cartfile", &revision) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let manifest = parse_manifest(&text, None)?;
                Ok(manifest.to_roots().into_iter().collect())
            }
            // No Cartfile at this revision: a leaf with no further dependencies.
            Err(_) => Ok(Vec::new()),
        }
    }

    fn resolve_git_reference(&self, dep: &DependencyId, reference: &str) -> Result<String, Error> {
        let url = git_url_for(dep);
        let mirror = self.git.clone_or_fetch(&dep.name(), &url, Some(reference))?;
        self.git.resolve_ref(&mirror, reference)
    }
}
