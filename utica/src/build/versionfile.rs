//! The version-file protocol (§4.8): a small JSON fingerprint stored next to each built
//! artifact, consulted by the build scheduler to decide whether a cached artifact is stale.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One built framework bundle: its name and a content hash stable across repeated builds of
/// the same inputs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlatformArtifact {
    pub name: String,
    pub hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionFile {
    pub commitish: String,
    /// Platform identifier (e.g. "iOS", "macOS") to the artifacts built for it.
    pub platforms: BTreeMap<String, Vec<PlatformArtifact>>,
    pub configuration: String,
    pub toolchain_identifier: String,
    pub swift_toolchain_version: String,
}

impl VersionFile {
    pub fn read(path: &Path) -> Option<VersionFile> {
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn write_atomic(&self, path: &Path) -> Result<(), Error> {
        let parent = path.parent().unwrap_or(path);
        std::fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
            verb: "create",
            path: parent.to_path_buf(),
            cause: e.to_string(),
        })?;
        let body = serde_json::to_string_pretty(self).expect("version file always serializes");
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::Filesystem {
            verb: "create a temp file in",
            path: parent.to_path_buf(),
            cause: e.to_string(),
        })?;
        use std::io::Write;
        tmp.write_all(body.as_bytes()).map_err(|e| Error::Filesystem {
            verb: "write",
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        tmp.persist(path).map_err(|e| Error::Filesystem {
            verb: "persist",
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        Ok(())
    }

    /// `true` iff this version file matches the current invocation: commitish, configuration
    /// and toolchain fields are equal, and for every platform the set of `(name, hash)`
    /// entries equals `current`'s (§4.8). Any mismatch, missing platform, or extra platform
    /// marks the node stale.
    pub fn matches(
        &self,
        commitish: &str,
        configuration: &str,
        toolchain_identifier: &str,
        swift_toolchain_version: &str,
        current: &BTreeMap<String, Vec<PlatformArtifact>>,
    ) -> bool {
        self.commitish == commitish
            && self.configuration == configuration
            && self.toolchain_identifier == toolchain_identifier
            && self.swift_toolchain_version == swift_toolchain_version
            && self.platforms.len() == current.len()
            && self.platforms.iter().all(|(platform, artifacts)| {
                current
                    .get(platform)
                    .map(|other| as_set(artifacts) == as_set(other))
                    .unwrap_or(false)
            })
    }
}

fn as_set(artifacts: &[PlatformArtifact]) -> BTreeSet<(String, String)> {
    artifacts
        .iter()
        .map(|a| (a.name.clone(), a.hash.clone()))
        .collect()
}

/// Hashes a built bundle directory (`.framework`/`.xcframework`) by walking its files in
/// sorted-path order and feeding their contents into one digest, so moving mtimes or
/// directory-entry order never perturbs the fingerprint.
pub fn hash_bundle(bundle_dir: &Path) -> Result<String, Error> {
    let mut paths: Vec<_> = walkdir::WalkDir::new(bundle_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    let mut hasher = Sha256::new();
    for path in paths {
        let bytes = std::fs::read(&path).map_err(|e| Error::Filesystem {
            verb: "read",
            path: path.clone(),
            cause: e.to_string(),
        })?;
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str, hash: &str) -> PlatformArtifact {
        PlatformArtifact {
            name: name.to_string(),
            hash: hash.to_string(),
        }
    }

    #[test]
    fn matches_is_order_independent_within_a_platform() {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            "iOS".to_string(),
            vec![artifact("A", "h1"), artifact("B", "h2")],
        );
        let vf = VersionFile {
            commitish: "1.0.0".to_string(),
            platforms,
            configuration: "Release".to_string(),
            toolchain_identifier: "swift-5".to_string(),
            swift_toolchain_version: "5.9".to_string(),
        };

        let mut current = BTreeMap::new();
        current.insert(
            "iOS".to_string(),
            vec![artifact("B", "h2"), artifact("A", "h1")],
        );
        assert!(vf.matches("1.0.0", "Release", "swift-5", "5.9", &current));
    }

    #[test]
    fn mismatched_commitish_invalidates() {
        let vf = VersionFile {
            commitish: "1.0.0".to_string(),
            platforms: BTreeMap::new(),
            configuration: "Release".to_string(),
            toolchain_identifier: "swift-5".to_string(),
            swift_toolchain_version: "5.9".to_string(),
        };
        assert!(!vf.matches("1.1.0", "Release", "swift-5", "5.9", &BTreeMap::new()));
    }

    #[test]
    fn missing_platform_invalidates() {
        let mut platforms = BTreeMap::new();
        platforms.insert("iOS".to_string(), vec![artifact("A", "h1")]);
        let vf = VersionFile {
            commitish: "1.0.0".to_string(),
            platforms,
            configuration: "Release".to_string(),
            toolchain_identifier: "swift-5".to_string(),
            swift_toolchain_version: "5.9".to_string(),
        };
        assert!(!vf.matches("1.0.0", "Release", "swift-5", "5.9", &BTreeMap::new()));
    }
}
