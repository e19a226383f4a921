//! The error and warning taxonomy (§7). Hard errors abort the run; warnings are collected
//! and printed but never propagated.

use crate::dependency::DependencyId;
use crate::version::VersionSpecifier;
use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("the following dependencies are declared in both the Cartfile and its private manifest: {}", .0.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "))]
    DuplicateDependencies(Vec<DependencyId>),

    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    #[error("could not fetch {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("could not {verb} {path}: {cause}")]
    Filesystem {
        verb: &'static str,
        path: PathBuf,
        cause: String,
    },

    #[error("`{command}` exited with status {status}\n{output}")]
    Subprocess {
        command: String,
        status: i32,
        output: String,
    },

    #[error("{0}")]
    BinaryArchive(#[from] BinaryArchiveError),

    /// The project at this dependency's checkout has no scheme shared for building. Always
    /// downgraded to a `SkippedBuilding` event rather than propagated (§7).
    #[error("{0} has no shared schemes to build")]
    NoSharedSchemes(DependencyId),
}

/// A bad manifest line, bad version string, or bad URL. Always carries the offending line
/// verbatim so the user can find it.
#[derive(ThisError, Debug, Clone)]
pub enum ParseError {
    #[error("expected string after dependency type")]
    ExpectedStringAfterKind { line: String },

    #[error("empty or unterminated string after dependency type")]
    UnterminatedString { line: String },

    #[error("invalid GitHub repository identifier \"{identifier}\"")]
    InvalidGitHubIdentifier { identifier: String, line: String },

    #[error("invalid URL found for dependency type `binary`")]
    InvalidBinaryUrl { line: String },

    #[error("unrecognized dependency type \"{kind}\"")]
    UnrecognizedKind { kind: String, line: String },

    #[error("\"{0}\" is not a valid semantic version")]
    InvalidVersion(String),

    #[error("could not parse specifier\n  {0}")]
    InvalidSpecifier(String),
}

/// Failures from the three-phase resolution fixpoint (§4.5).
#[derive(ThisError, Debug)]
pub enum ResolutionError {
    #[error("no available version of {dep} satisfies {specifier}")]
    RequiredVersionNotFound {
        dep: DependencyId,
        specifier: VersionSpecifier,
    },

    #[error(
        "incompatible requirements on {dep}: {existing} (from {}) vs. {new} (from {})",
        parent_label(existing_parent),
        parent_label(new_parent)
    )]
    IncompatibleRequirements {
        dep: DependencyId,
        existing: VersionSpecifier,
        /// `None` when the existing requirement came straight from the root manifest.
        existing_parent: Option<DependencyId>,
        new: VersionSpecifier,
        /// `None` when the new requirement came straight from the root manifest.
        new_parent: Option<DependencyId>,
    },

    #[error("no tagged version found for {0}")]
    TaggedVersionNotFound(DependencyId),

    #[error("dependency cycle detected: {}", .0.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(" -> "))]
    DependencyCycle(Vec<DependencyId>),
}

fn parent_label(parent: &Option<DependencyId>) -> String {
    match parent {
        Some(dep) => dep.to_string(),
        None => "the manifest".to_string(),
    }
}

/// An archive contained duplicate destination paths, or no recognizable framework (§4.4).
#[derive(ThisError, Debug)]
pub enum BinaryArchiveError {
    #[error("archive for {dep} contains more than one file destined for {path}")]
    DuplicateDestination { dep: DependencyId, path: PathBuf },

    #[error("archive for {0} contains no recognizable framework")]
    NoFrameworkFound(DependencyId),
}

/// A soft problem surfaced to the user but not propagated as a failure. Per-dependency
/// downgrades (no shared schemes, failed binary install) go through [`crate::events::ProjectEvent`]
/// instead, since the CLI already renders those as skipped-action lines; `Warning` is reserved
/// for run-level conditions that aren't tied to one node in the build graph.
#[derive(ThisError, Debug, Clone)]
pub enum Warning {
    #[error("lock file did not exist")]
    MissingLockFile,

    #[error("lock file did not match manifest; re-resolving")]
    LockDidNotMatchManifest,

    #[error("falling back to an anonymous request for {0} after an authenticated request failed")]
    FellBackToAnonymousRequest(String),
}
