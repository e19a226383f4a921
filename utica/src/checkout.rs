//! The checkout engine (§4.6): materializes resolved dependencies into working trees and
//! wires the per-dependency checkouts symlink tree.

use crate::dependency::DependencyId;
use crate::error::Error;
use crate::source::git::{GitBackend, Submodule};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Whether a source dependency's checkout is added as a git submodule of the host project,
/// or materialized as a plain (non-submodule) working tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmoduleMode {
    AsSubmodule,
    PlainTree,
}

pub struct CheckoutEngine<'a> {
    git: &'a GitBackend,
    checkouts_dir: PathBuf,
}

impl<'a> CheckoutEngine<'a> {
    pub fn new(git: &'a GitBackend, checkouts_dir: PathBuf) -> Self {
        CheckoutEngine { git, checkouts_dir }
    }

    fn checkout_path(&self, name: &str) -> PathBuf {
        self.checkouts_dir.join(name)
    }

    /// Populates the working tree for a single `Hosted`/`Git` dependency at `revision`, then
    /// recursively clones its recorded submodules at their pinned SHAs.
    pub fn checkout_dependency(
        &self,
        dep: &DependencyId,
        mirror_dir: &Path,
        revision: &str,
        mode: SubmoduleMode,
    ) -> Result<(), Error> {
        let work_dir = self.checkout_path(&dep.name());
        self.git.checkout_to(&work_dir, mirror_dir, revision)?;

        if mode == SubmoduleMode::AsSubmodule {
            // The host project's own git metadata tracks submodule membership; the working
            // tree contents are identical either way, so checkout_to already did the work.
        }

        for submodule in self.git.submodules_in(mirror_dir, revision)? {
            self.checkout_submodule(&work_dir, &submodule)?;
        }
        Ok(())
    }

    fn checkout_submodule(&self, parent_work_dir: &Path, submodule: &Submodule) -> Result<(), Error> {
        let Some(sha) = &submodule.head_sha else {
            return Ok(());
        };
        let mirror_name = crate::dependency::sanitize_git_name(&submodule.url);
        let mirror_dir = self
            .git
            .mirrors_dir_for(&mirror_name);
        self.git.clone_or_fetch(&mirror_name, &submodule.url, Some(sha))?;
        let sub_work_dir = parent_work_dir.join(&submodule.path);
        self.git.checkout_to(&sub_work_dir, &mirror_dir, sha)
    }

    /// Ensures `<root>/<checkoutsDir>/<name>/<checkoutsDir>/<subDepName>` is a symlink back
    /// to `<root>/<checkoutsDir>/<subDepName>`, for every (dep, sub-dependency) edge in the
    /// resolved graph. Idempotent: reruns converge to the same on-disk state and overwrite
    /// stale symlinks, but never clobber a real file the dependency itself committed, nor a
    /// real (non-symlink) directory.
    pub fn link_nested_checkouts(
        &self,
        dependency_names: &[String],
        direct_dependencies: &BTreeMap<String, Vec<String>>,
    ) -> Result<(), Error> {
        for name in dependency_names {
            let Some(children) = direct_dependencies.get(name) else {
                continue;
            };
            let nested_checkouts_dir = self
                .checkout_path(name)
                .join(self.checkouts_dir.file_name().unwrap_or_default());
            std::fs::create_dir_all(&nested_checkouts_dir).map_err(|e| Error::Filesystem {
                verb: "create",
                path: nested_checkouts_dir.clone(),
                cause: e.to_string(),
            })?;

            for child in children {
                self.link_one(&nested_checkouts_dir, child)?;
            }
        }
        Ok(())
    }

    fn link_one(&self, nested_checkouts_dir: &Path, child_name: &str) -> Result<(), Error> {
        let link_path = nested_checkouts_dir.join(child_name);
        let target = self.checkout_path(child_name);

        match std::fs::symlink_metadata(&link_path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                std::fs::remove_file(&link_path).map_err(|e| Error::Filesystem {
                    verb: "remove",
                    path: link_path.clone(),
                    cause: e.to_string(),
                })?;
            }
            Ok(meta) if meta.is_dir() => {
                // A real directory already occupies this name (e.g. committed into the
                // dependency's own checkouts dir): leave it alone.
                return Ok(());
            }
            Ok(_) => return Ok(()),
            Err(_) => {}
        }

        symlink(&target, &link_path).map_err(|e| Error::Filesystem {
            verb: "symlink",
            path: link_path,
            cause: e.to_string(),
        })
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_one_skips_existing_real_directory() {
        let root = tempfile::tempdir().unwrap();
        let checkouts = root.path().join("Checkouts");
        std::fs::create_dir_all(&checkouts).unwrap();
        let git = GitBackend::new(root.path().join("mirrors"));
        let engine = CheckoutEngine::new(&git, checkouts.clone());

        let nested = checkouts.join("Parent").join("Checkouts");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(nested.join("Sibling")).unwrap();

        engine.link_one(&nested, "Sibling").unwrap();
        assert!(std::fs::symlink_metadata(nested.join("Sibling"))
            .unwrap()
            .is_dir());
        assert!(!std::fs::symlink_metadata(nested.join("Sibling"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn link_one_creates_symlink_when_absent() {
        let root = tempfile::tempdir().unwrap();
        let checkouts = root.path().join("Checkouts");
        std::fs::create_dir_all(checkouts.join("Sibling")).unwrap();
        let git = GitBackend::new(root.path().join("mirrors"));
        let engine = CheckoutEngine::new(&git, checkouts.clone());

        let nested = checkouts.join("Parent").join("Checkouts");
        std::fs::create_dir_all(&nested).unwrap();

        engine.link_one(&nested, "Sibling").unwrap();
        let meta = std::fs::symlink_metadata(nested.join("Sibling")).unwrap();
        assert!(meta.file_type().is_symlink());
    }
}
