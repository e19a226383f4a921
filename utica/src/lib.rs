//! Resolution, checkout, and build-scheduling core for Utica, a dependency manager for
//! frameworks.
//!
//! This crate is UI-agnostic: it never prints and never exits the process. It parses
//! manifests, resolves version constraints, drives VCS and HTTP backends, materializes
//! working trees, and schedules builds, reporting progress as a stream of
//! [`events::ProjectEvent`]s and failures as [`error::Error`].

pub mod build;
pub mod checkout;
pub mod config;
pub mod dependency;
pub mod error;
pub mod events;
pub mod manifest;
pub mod resolver;
pub mod source;
pub mod version;

pub use config::Config;
pub use dependency::{DependencyId, Host};
pub use error::{Error, Warning};
pub use events::{EventSink, ProjectEvent};
pub use manifest::{Lockfile, Manifest};
pub use resolver::{resolve, DependencyBackend};
pub use version::{PinnedVersion, SemanticVersion, VersionSpecifier};

/// `DependencyId -> PinnedVersion`, as produced by the resolver and written as the lockfile.
pub type ResolvedGraph = std::collections::BTreeMap<DependencyId, PinnedVersion>;
