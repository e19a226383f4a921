//! Backends that resolve a [`DependencyId`](crate::dependency::DependencyId) into available
//! versions and on-disk artifacts (§4.3, §4.4).

pub mod binary;
pub mod git;

pub use binary::BinaryBackend;
pub use git::{GitBackend, Submodule};
