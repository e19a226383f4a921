//! Small utilities shared between the `utica` core and the `utica-cli` shell:
//! a CLI-facing error wrapper carrying a process exit code, and the default
//! on-disk directory layout (§6 of the design doc).

use anyhow::Result;
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    process::Termination,
};
use utica_tracing::println_error;

pub const DEFAULT_ERROR_EXIT_CODE: u8 = 1;
pub const DEFAULT_SUCCESS_EXIT_CODE: u8 = 0;

/// A result type for utica operations. Entry points should return [UticaCliResult] instead, so
/// that the process exits with the right code.
pub type UticaResult<T, E = UticaError> = Result<T, E>;

/// A wrapper around `anyhow::Error` that carries a process exit code.
#[derive(Debug)]
pub struct UticaError {
    error: anyhow::Error,
    exit_code: u8,
}

impl UticaError {
    pub fn new(error: anyhow::Error, exit_code: u8) -> Self {
        Self { error, exit_code }
    }

    pub fn exit_code(self, exit_code: u8) -> Self {
        Self { exit_code, ..self }
    }
}

impl AsRef<anyhow::Error> for UticaError {
    fn as_ref(&self) -> &anyhow::Error {
        &self.error
    }
}

impl From<&str> for UticaError {
    fn from(value: &str) -> Self {
        Self {
            error: anyhow::anyhow!("{value}"),
            exit_code: DEFAULT_ERROR_EXIT_CODE,
        }
    }
}

impl From<anyhow::Error> for UticaError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            error: value,
            exit_code: DEFAULT_ERROR_EXIT_CODE,
        }
    }
}

impl From<std::io::Error> for UticaError {
    fn from(value: std::io::Error) -> Self {
        Self {
            error: value.into(),
            exit_code: DEFAULT_ERROR_EXIT_CODE,
        }
    }
}

impl Display for UticaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

/// Wraps a [UticaResult] so it can be returned directly from `main`, printing the error and
/// exiting with the carried code rather than panicking or always exiting `1`.
#[derive(Debug)]
pub struct UticaCliResult<T>(UticaResult<T>);

impl<T> From<UticaResult<T>> for UticaCliResult<T> {
    fn from(value: UticaResult<T>) -> Self {
        Self(value)
    }
}

impl<T> Termination for UticaCliResult<T> {
    fn report(self) -> std::process::ExitCode {
        match self.0 {
            Ok(_) => DEFAULT_SUCCESS_EXIT_CODE.into(),
            Err(e) => {
                println_error(&format!("{}", e.error));
                e.exit_code.into()
            }
        }
    }
}

/// Default name of the checkouts directory under the project root, kept for on-disk
/// compatibility with the ambient layout described in the design doc.
pub const DEFAULT_CHECKOUTS_DIR_NAME: &str = "Carthage/Checkouts";
/// Default name of the build output directory under the project root.
pub const DEFAULT_BUILD_DIR_NAME: &str = "Carthage/Build";

/// Resolves the process-wide cache root: `$XDG_CACHE_HOME/utica`, falling back to the
/// platform cache directory, overridable by the caller (e.g. from a CLI flag or env var).
pub fn default_cache_root() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("utica"))
        .ok_or_else(|| anyhow::anyhow!("could not determine a platform cache directory"))
}

/// Joins the canonical checkouts directory name onto a project root.
pub fn checkouts_dir(project_root: &Path) -> PathBuf {
    project_root.join(DEFAULT_CHECKOUTS_DIR_NAME)
}

/// Joins the canonical build output directory name onto a project root.
pub fn build_dir(project_root: &Path) -> PathBuf {
    project_root.join(DEFAULT_BUILD_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkouts_dir_is_nested_under_project_root() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            checkouts_dir(root),
            Path::new("/tmp/project/Carthage/Checkouts")
        );
    }
}
