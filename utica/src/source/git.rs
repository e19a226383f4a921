//! The VCS source backend (§4.3): bare mirrors under the cache root, fetched at most once
//! per remote URL per run and checked out into working trees on demand.

use crate::error::Error;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A submodule recorded in a repository at a given revision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Submodule {
    pub name: String,
    pub url: String,
    pub path: PathBuf,
    /// The commit the superproject pins this submodule to, if recorded.
    pub head_sha: Option<String>,
}

/// Process-wide set of remote URLs already fetched this run, so a dependency reachable
/// through multiple paths in the graph is only fetched once (§4.3).
static FETCHED_THIS_RUN: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Clones and fetches bare mirrors of git repositories into `<cacheRoot>/dependencies/<name>`.
pub struct GitBackend {
    mirrors_dir: PathBuf,
}

impl GitBackend {
    pub fn new(mirrors_dir: PathBuf) -> Self {
        GitBackend { mirrors_dir }
    }

    fn mirror_path(&self, dep_name: &str) -> PathBuf {
        self.mirrors_dir.join(dep_name)
    }

    /// Public accessor for a dependency's mirror directory, used by the checkout engine to
    /// locate a submodule's mirror once it has been fetched.
    pub fn mirrors_dir_for(&self, dep_name: &str) -> PathBuf {
        self.mirror_path(dep_name)
    }

    /// Ensures a bare mirror for `dep_name`/`url` exists, fetching new refs if it already
    /// does. Skips the network round trip when `commitish` is already present locally and
    /// is not a branch name, and at most once per URL within this process (§4.3).
    pub fn clone_or_fetch(
        &self,
        dep_name: &str,
        url: &str,
        commitish: Option<&str>,
    ) -> Result<PathBuf, Error> {
        let path = self.mirror_path(dep_name);

        if let Some(commitish) = commitish {
            if path.exists() && !looks_like_branch_name(commitish) {
                if let Ok(repo) = git2::Repository::open_bare(&path) {
                    if git2::Oid::from_str(commitish)
                        .ok()
                        .and_then(|oid| repo.find_commit(oid).ok())
                        .is_some()
                    {
                        return Ok(path);
                    }
                }
            }
        }

        let mut fetched = FETCHED_THIS_RUN.lock().unwrap();
        if fetched.contains(url) {
            return Ok(path);
        }
        self.fetch_mirror(&path, url)?;
        fetched.insert(url.to_string());
        Ok(path)
    }

    fn fetch_mirror(&self, path: &Path, url: &str) -> Result<(), Error> {
        let repo = if path.exists() {
            git2::Repository::open_bare(path).map_err(|e| git_error("open", path, e))?
        } else {
            std::fs::create_dir_all(path).map_err(|e| Error::Filesystem {
                verb: "create",
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;
            git2::Repository::init_bare(path).map_err(|e| git_error("initialize", path, e))?
        };

        let mut remote = repo
            .remote_anonymous(url)
            .map_err(|e| network_error(url, e))?;
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|url, username_from_url, allowed_types| {
            default_credentials(url, username_from_url, allowed_types)
        });
        let mut fetch_opts = git2::FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks);
        fetch_opts.download_tags(git2::AutotagOption::All);

        remote
            .fetch(
                &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
                Some(&mut fetch_opts),
                None,
            )
            .map_err(|e| network_error(url, e))
    }

    /// Enumerates tag refs in the mirror.
    pub fn list_tags(&self, repo_dir: &Path) -> Result<Vec<String>, Error> {
        let repo = git2::Repository::open_bare(repo_dir).map_err(|e| git_error("open", repo_dir, e))?;
        let tags = repo
            .tag_names(None)
            .map_err(|e| git_error("list tags in", repo_dir, e))?;
        Ok(tags.iter().flatten().map(str::to_string).collect())
    }

    /// Resolves `reference` to a commit SHA, preferring an exact tag match.
    pub fn resolve_ref(&self, repo_dir: &Path, reference: &str) -> Result<String, Error> {
        let repo = git2::Repository::open_bare(repo_dir).map_err(|e| git_error("open", repo_dir, e))?;

        let tag_ref = format!("refs/tags/{reference}");
        if let Ok(oid) = repo.refname_to_id(&tag_ref) {
            if let Ok(obj) = repo.find_object(oid, None) {
                if let Ok(peeled) = obj.peel(git2::ObjectType::Commit) {
                    return Ok(peeled.id().to_string());
                }
            }
        }

        let branch_ref = format!("refs/heads/{reference}");
        let revspec = if repo.refname_to_id(&branch_ref).is_ok() {
            branch_ref
        } else {
            reference.to_string()
        };
        let obj = repo
            .revparse_single(&revspec)
            .map_err(|e| git_error("resolve reference in", repo_dir, e))?;
        let commit = obj
            .peel(git2::ObjectType::Commit)
            .map_err(|e| git_error("resolve reference in", repo_dir, e))?;
        Ok(commit.id().to_string())
    }

    /// Extracts a single file's blob content at `revision` without checking anything out.
    pub fn read_file_at_revision(
        &self,
        repo_dir: &Path,
        path: &str,
        revision: &str,
    ) -> Result<Vec<u8>, Error> {
        let repo = git2::Repository::open_bare(repo_dir).map_err(|e| git_error("open", repo_dir, e))?;
        let commit = repo
            .revparse_single(revision)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| git_error("resolve revision in", repo_dir, e))?;
        let tree = commit
            .tree()
            .map_err(|e| git_error("read tree of", repo_dir, e))?;
        let entry = tree
            .get_path(Path::new(path))
            .map_err(|e| git_error("read file at revision in", repo_dir, e))?;
        let blob = entry
            .to_object(&repo)
            .and_then(|obj| obj.peel_to_blob())
            .map_err(|e| git_error("read blob from", repo_dir, e))?;
        Ok(blob.content().to_vec())
    }

    /// Populates `work_dir` with a full working tree checked out at `revision`.
    pub fn checkout_to(&self, work_dir: &Path, repo_dir: &Path, revision: &str) -> Result<(), Error> {
        if work_dir.exists() {
            std::fs::remove_dir_all(work_dir).map_err(|e| Error::Filesystem {
                verb: "remove",
                path: work_dir.to_path_buf(),
                cause: e.to_string(),
            })?;
        }
        std::fs::create_dir_all(work_dir).map_err(|e| Error::Filesystem {
            verb: "create",
            path: work_dir.to_path_buf(),
            cause: e.to_string(),
        })?;

        let mirror_url = format!("file://{}", repo_dir.display());
        let repo = git2::build::RepoBuilder::new()
            .clone(&mirror_url, work_dir)
            .map_err(|e| git_error("clone into", work_dir, e))?;

        let oid = repo
            .revparse_single(revision)
            .map_err(|e| git_error("resolve revision in", work_dir, e))?
            .id();
        repo.set_head_detached(oid)
            .map_err(|e| git_error("checkout", work_dir, e))?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        repo.checkout_head(Some(&mut checkout))
            .map_err(|e| git_error("checkout", work_dir, e))
    }

    /// Enumerates submodules recorded at `revision` without requiring a prior checkout.
    pub fn submodules_in(&self, repo_dir: &Path, revision: &str) -> Result<Vec<Submodule>, Error> {
        let repo = git2::Repository::open_bare(repo_dir).map_err(|e| git_error("open", repo_dir, e))?;
        let commit = repo
            .revparse_single(revision)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| git_error("resolve revision in", repo_dir, e))?;
        let tree = commit
            .tree()
            .map_err(|e| git_error("read tree of", repo_dir, e))?;

        let gitmodules = match tree.get_path(Path::new(".gitmodules")) {
            Ok(entry) => entry,
            Err(_) => return Ok(Vec::new()),
        };
        let blob = gitmodules
            .to_object(&repo)
            .and_then(|obj| obj.peel_to_blob())
            .map_err(|e| git_error("read .gitmodules in", repo_dir, e))?;
        let contents = String::from_utf8_lossy(blob.content()).into_owned();
        let mut modules = parse_gitmodules(&contents);
        for module in &mut modules {
            module.head_sha = tree
                .get_path(&module.path)
                .ok()
                .map(|entry| entry.id().to_string());
        }
        Ok(modules)
    }
}

/// A minimal `.gitmodules` INI-style parser: enough for `[submodule "name"]` sections with
/// `path` and `url` keys.
fn parse_gitmodules(contents: &str) -> Vec<Submodule> {
    let mut modules = Vec::new();
    let mut name: Option<String> = None;
    let mut path: Option<String> = None;
    let mut url: Option<String> = None;

    let flush = |name: &mut Option<String>, path: &mut Option<String>, url: &mut Option<String>, out: &mut Vec<Submodule>| {
        if let (Some(n), Some(p), Some(u)) = (name.take(), path.take(), url.take()) {
            out.push(Submodule {
                name: n,
                path: PathBuf::from(p),
                url: u,
                head_sha: None,
            });
        }
    };

    for line in contents.lines() {
        let line = line.trim();
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            flush(&mut name, &mut path, &mut url, &mut modules);
            if let Some(rest) = section.strip_prefix("submodule ") {
                name = Some(rest.trim_matches('"').to_string());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().to_string();
            match key {
                "path" => path = Some(value),
                "url" => url = Some(value),
                _ => {}
            }
        }
    }
    flush(&mut name, &mut path, &mut url, &mut modules);
    modules
}

fn looks_like_branch_name(commitish: &str) -> bool {
    !(commitish.len() >= 7 && commitish.chars().all(|c| c.is_ascii_hexdigit()))
}

fn git_error(verb: &'static str, path: &Path, cause: git2::Error) -> Error {
    Error::Filesystem {
        verb,
        path: path.to_path_buf(),
        cause: cause.to_string(),
    }
}

fn network_error(url: &str, cause: git2::Error) -> Error {
    Error::Network {
        url: url.to_string(),
        cause: cause.to_string(),
    }
}

fn default_credentials(
    _url: &str,
    username_from_url: Option<&str>,
    allowed_types: git2::CredentialType,
) -> Result<git2::Cred, git2::Error> {
    if allowed_types.contains(git2::CredentialType::SSH_KEY) {
        if let Some(username) = username_from_url {
            return git2::Cred::ssh_key_from_agent(username);
        }
    }
    git2::Cred::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha_like_strings_are_not_branches() {
        assert!(!looks_like_branch_name("a1b2c3d4e5f6"));
        assert!(looks_like_branch_name("main"));
        assert!(looks_like_branch_name("release/1.0"));
    }

    #[test]
    fn parses_simple_gitmodules() {
        let contents = r#"
[submodule "Vendor/Foo"]
    path = Vendor/Foo
    url = https://example.com/foo.git
"#;
        let modules = parse_gitmodules(contents);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "Vendor/Foo");
        assert_eq!(modules[0].path, PathBuf::from("Vendor/Foo"));
        assert_eq!(modules[0].url, "https://example.com/foo.git");
    }
}
