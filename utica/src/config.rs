//! Project configuration, resolved once per invocation (§4.11).
//!
//! Mirrors the teacher's `PkgOpts`/`BuildOpts` option records: plain data constructed once
//! at the edge and threaded through, rather than read ad hoc from globals.

use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root, checked before falling back to the
/// platform cache directory.
pub const CACHE_ROOT_ENV: &str = "UTICA_CACHE_ROOT";
/// Environment variable overriding the concurrency bound for fetches and builds.
pub const JOBS_ENV: &str = "UTICA_JOBS";

/// Resolved configuration for one invocation of the tool.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root of the working tree containing the `Cartfile`.
    pub project_root: PathBuf,
    /// Root of the process-wide cache (repository mirrors, binary assets).
    pub cache_root: PathBuf,
    /// Name of the checkouts directory under `project_root`.
    pub checkouts_dir_name: String,
    /// Name of the build output directory under `project_root`.
    pub build_dir_name: String,
    /// Whether to consult a netrc-style credentials file for HTTP auth.
    pub use_netrc: bool,
    /// Concurrency bound for fetches and builds; `0` means "use CPU count".
    pub jobs: usize,
}

/// Explicit overrides a caller (typically the CLI flag parser) may supply; anything left
/// `None` falls through to an environment variable, then a default.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub project_root: Option<PathBuf>,
    pub cache_root: Option<PathBuf>,
    pub checkouts_dir_name: Option<String>,
    pub build_dir_name: Option<String>,
    pub use_netrc: Option<bool>,
    pub jobs: Option<usize>,
}

impl Config {
    /// Resolves configuration in the order: explicit override, then environment variable,
    /// then a default.
    pub fn resolve(overrides: ConfigOverrides) -> anyhow::Result<Config> {
        let project_root = overrides
            .project_root
            .map(Ok)
            .unwrap_or_else(std::env::current_dir)?;

        let cache_root = overrides
            .cache_root
            .or_else(|| std::env::var_os(CACHE_ROOT_ENV).map(PathBuf::from))
            .map(Ok)
            .unwrap_or_else(utica_util::default_cache_root)?;

        let checkouts_dir_name = overrides
            .checkouts_dir_name
            .unwrap_or_else(|| utica_util::DEFAULT_CHECKOUTS_DIR_NAME.to_string());

        let build_dir_name = overrides
            .build_dir_name
            .unwrap_or_else(|| utica_util::DEFAULT_BUILD_DIR_NAME.to_string());

        let use_netrc = overrides.use_netrc.unwrap_or(false);

        let jobs = overrides
            .jobs
            .or_else(|| {
                std::env::var(JOBS_ENV)
                    .ok()
                    .and_then(|v| v.parse::<usize>().ok())
            })
            .unwrap_or(0);

        Ok(Config {
            project_root,
            cache_root,
            checkouts_dir_name,
            build_dir_name,
            use_netrc,
            jobs,
        })
    }

    pub fn checkouts_dir(&self) -> PathBuf {
        self.project_root.join(&self.checkouts_dir_name)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.project_root.join(&self.build_dir_name)
    }

    pub fn mirrors_dir(&self) -> PathBuf {
        self.cache_root.join("dependencies")
    }

    pub fn binaries_cache_dir(&self) -> PathBuf {
        self.cache_root.join("binaries")
    }

    /// Effective worker-pool size: `jobs` if positive, else the number of available CPUs.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Path to the per-dependency working tree under the checkouts directory.
    pub fn checkout_path(&self, name: &str) -> PathBuf {
        self.checkouts_dir().join(name)
    }

    /// Path to the version file for a built dependency.
    pub fn version_file_path(&self, name: &str) -> PathBuf {
        self.build_dir().join(format!(".{name}.version"))
    }
}

/// Path to the netrc-style credentials file consulted when `use_netrc` is set.
pub fn netrc_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".netrc"))
}

pub fn default_checkouts_dir_name() -> &'static str {
    utica_util::DEFAULT_CHECKOUTS_DIR_NAME
}

pub fn is_absolute_path(p: &Path) -> bool {
    p.is_absolute()
}

/// Looks up a `login`/`password` pair for `url`'s host in `~/.netrc` and renders it as a
/// `Basic` auth header value, or `None` if the file is absent or has no matching entry.
pub fn netrc_authorization_header(url: &str) -> Option<String> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_string();
    let contents = netrc_path().and_then(|p| std::fs::read_to_string(p).ok())?;
    let (login, password) = find_netrc_entry(&contents, &host)?;
    Some(format!(
        "Basic {}",
        base64_encode(&format!("{login}:{password}"))
    ))
}

fn find_netrc_entry(contents: &str, host: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = contents.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] == "machine" && tokens.get(i + 1) == Some(&host) {
            let mut login = None;
            let mut password = None;
            let mut j = i + 2;
            while j + 1 < tokens.len() && tokens[j] != "machine" {
                match tokens[j] {
                    "login" => login = Some(tokens[j + 1].to_string()),
                    "password" => password = Some(tokens[j + 1].to_string()),
                    _ => {}
                }
                j += 2;
            }
            return login.zip(password);
        }
        i += 1;
    }
    None
}

fn base64_encode(input: &str) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let bytes = input.as_bytes();
    let mut out = String::new();
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = *chunk.get(1).unwrap_or(&0) as u32;
        let b2 = *chunk.get(2).unwrap_or(&0) as u32;
        let n = (b0 << 16) | (b1 << 8) | b2;
        out.push(ALPHABET[(n >> 18 & 0x3f) as usize] as char);
        out.push(ALPHABET[(n >> 12 & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(n >> 6 & 0x3f) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(n & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_cpu_count_when_jobs_unset() {
        let cfg = Config::resolve(ConfigOverrides {
            project_root: Some(PathBuf::from("/tmp/proj")),
            cache_root: Some(PathBuf::from("/tmp/cache")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.jobs, 0);
        assert!(cfg.effective_jobs() >= 1);
    }

    #[test]
    fn netrc_entry_round_trips_through_base64() {
        let contents = "machine example.com login alice password hunter2";
        let (login, password) = find_netrc_entry(contents, "example.com").unwrap();
        assert_eq!((login.as_str(), password.as_str()), ("alice", "hunter2"));
        assert!(find_netrc_entry(contents, "other.com").is_none());
    }

    #[test]
    fn checkouts_and_build_dirs_nest_under_project_root() {
        let cfg = Config::resolve(ConfigOverrides {
            project_root: Some(PathBuf::from("/tmp/proj")),
            cache_root: Some(PathBuf::from("/tmp/cache")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.checkouts_dir(), PathBuf::from("/tmp/proj/Carthage/Checkouts"));
        assert_eq!(cfg.build_dir(), PathBuf::from("/tmp/proj/Carthage/Build"));
        assert_eq!(
            cfg.mirrors_dir(),
            PathBuf::from("/tmp/cache/dependencies")
        );
    }
}
