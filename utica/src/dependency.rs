//! Dependency identities and the filesystem-safe names derived from them (§3, §4.1).

use std::fmt;

/// The host a [`DependencyId::Hosted`] repository lives on.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Host {
    Primary,
    Enterprise { base_url: String },
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Primary => write!(f, "github.com"),
            Host::Enterprise { base_url } => write!(f, "{base_url}"),
        }
    }
}

/// A dependency identity: a hosted repository, an arbitrary git URL, or a binary-artifact
/// manifest URL (§3).
///
/// A `Git` whose URL is recognizable as a primary-host repository is canonicalized to
/// `Hosted` at parse time (§4.1), so two `DependencyId`s referring to the same GitHub
/// repository by different surface syntax compare equal.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum DependencyId {
    Hosted {
        host: Host,
        owner: String,
        name: String,
    },
    Git {
        url: String,
    },
    Binary {
        url: String,
        display_url: String,
    },
}

impl DependencyId {
    /// Derives the filesystem-safe [`DependencyName`] for this identity (§3).
    pub fn name(&self) -> String {
        match self {
            DependencyId::Hosted { name, .. } => name.clone(),
            DependencyId::Git { url } => sanitize_git_name(url),
            DependencyId::Binary { url, .. } => binary_name(url),
        }
    }

    /// Canonical textual form used for lockfile sort order (§4.1) and as the quoted
    /// identifier written to the manifest/lockfile.
    pub fn canonical_text(&self) -> String {
        match self {
            DependencyId::Hosted {
                host: Host::Primary,
                owner,
                name,
            } => format!("{owner}/{name}"),
            DependencyId::Hosted {
                host: Host::Enterprise { base_url },
                owner,
                name,
            } => format!("{base_url}/{owner}/{name}"),
            DependencyId::Git { url } => url.clone(),
            DependencyId::Binary { display_url, .. } => display_url.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DependencyId::Hosted { .. } => "github",
            DependencyId::Git { .. } => "git",
            DependencyId::Binary { .. } => "binary",
        }
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.kind(), self.canonical_text())
    }
}

/// If `url` is recognizable as one of the primary-host repository forms (§4.1), returns
/// the owner and repository name; otherwise `None`.
///
/// Recognized forms: `ssh://git@<host>:<o>/<n>`, `https://<host>/<o>/<n>`,
/// `git@<host>:<o>/<n>`, all against the fixed primary host.
pub fn recognize_primary_host_repo(url: &str) -> Option<(String, String)> {
    const PRIMARY_HOST: &str = "github.com";

    let strip_dot_git = |s: &str| s.strip_suffix(".git").unwrap_or(s).to_string();

    let owner_name_from_path = |path: &str| -> Option<(String, String)> {
        let mut parts = path.trim_matches('/').splitn(2, '/');
        let owner = parts.next()?;
        let rest = parts.next()?;
        if owner.is_empty() || rest.is_empty() {
            return None;
        }
        Some((owner.to_string(), strip_dot_git(rest)))
    };

    if let Some(rest) = url.strip_prefix("ssh://git@") {
        let (host, path) = rest.split_once('/')?;
        let host = host.split_once(':').map(|(h, _)| h).unwrap_or(host);
        if host != PRIMARY_HOST {
            return None;
        }
        return owner_name_from_path(path);
    }
    if let Some(rest) = url.strip_prefix("https://") {
        let (host, path) = rest.split_once('/')?;
        if host != PRIMARY_HOST {
            return None;
        }
        return owner_name_from_path(path);
    }
    if let Some(rest) = url.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        if host != PRIMARY_HOST {
            return None;
        }
        return owner_name_from_path(path);
    }
    None
}

/// Sanitizes the computed name for a `git` dependency so it can never escape the checkout
/// root: extracts the last non-empty path component, strips a trailing `.git`, then
/// neutralizes anything that would read as a filesystem traversal token or embed a NUL
/// byte (§4.1).
pub fn sanitize_git_name(url: &str) -> String {
    let mut component = url
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .unwrap_or("")
        .to_string();

    if let Some(stripped) = component.strip_suffix(".git") {
        if !stripped.is_empty() {
            component = stripped.to_string();
        }
    }

    if !component.is_empty() && component.chars().all(|c| c == '.') {
        component.chars().map(|_| '\u{FF0E}').collect()
    } else {
        component.chars().map(sanitize_char).collect()
    }
}

fn sanitize_char(c: char) -> char {
    if c == '\u{0000}' {
        '\u{2400}'
    } else {
        c
    }
}

/// The name derived from a `binary` dependency's URL: the last path component with its
/// final extension stripped (§3).
fn binary_name(url: &str) -> String {
    let last = url
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .unwrap_or(url);
    match last.rfind('.') {
        Some(0) | None => last.to_string(),
        Some(idx) => last[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_dot_git_suffix() {
        assert_eq!(sanitize_git_name("ssh://server.com/myproject.git"), "myproject");
        assert_eq!(sanitize_git_name("ssh://server.com/myproject"), "myproject");
    }

    #[test]
    fn bare_string_with_no_slash() {
        assert_eq!(sanitize_git_name("whatisthisurleven"), "whatisthisurleven");
    }

    #[test]
    fn replaces_lone_nul() {
        assert_eq!(sanitize_git_name("\u{0000}"), "\u{2400}");
        assert_eq!(sanitize_git_name("/\u{0000}/"), "\u{2400}");
    }

    #[test]
    fn strips_traversal_prefix_and_keeps_nul_substitution() {
        assert_eq!(
            sanitize_git_name("./../../../../../\u{0000}myproject"),
            "\u{2400}myproject"
        );
    }

    #[test]
    fn dot_only_components_become_fullwidth() {
        assert_eq!(sanitize_git_name("."), "\u{FF0E}");
        assert_eq!(sanitize_git_name("./myproject"), "myproject");
        assert_eq!(sanitize_git_name(".."), "\u{FF0E}\u{FF0E}");
        assert_eq!(sanitize_git_name("...git"), "\u{FF0E}\u{FF0E}");
        assert_eq!(sanitize_git_name("../myproject"), "myproject");
        assert_eq!(sanitize_git_name("../myproject/.."), "\u{FF0E}\u{FF0E}");
    }

    #[test]
    fn binary_name_strips_final_extension() {
        assert_eq!(binary_name("https://example.com/assets/MyFramework.json"), "MyFramework");
        assert_eq!(binary_name("https://example.com/assets/framework.zip"), "framework");
    }

    #[test]
    fn recognizes_ssh_git_at_form() {
        assert_eq!(
            recognize_primary_host_repo("git@github.com:owner/name"),
            Some(("owner".to_string(), "name".to_string()))
        );
    }

    #[test]
    fn recognizes_ssh_scheme_form() {
        assert_eq!(
            recognize_primary_host_repo("ssh://git@github.com:owner/name"),
            Some(("owner".to_string(), "name".to_string()))
        );
    }

    #[test]
    fn recognizes_https_form() {
        assert_eq!(
            recognize_primary_host_repo("https://github.com/owner/name"),
            Some(("owner".to_string(), "name".to_string()))
        );
    }

    #[test]
    fn rejects_non_primary_host() {
        assert_eq!(
            recognize_primary_host_repo("https://gitlab.com/owner/name"),
            None
        );
    }

    #[test]
    fn name_safety_invariant_holds() {
        let cases = [
            "ssh://server.com/myproject",
            "ssh://server.com/myproject.git",
            "whatisthisurleven",
            "\u{0000}",
            "/\u{0000}/",
            "./../../../../../\u{0000}myproject",
            ".",
            "./myproject",
            "..",
            "...git",
            "../myproject",
            "../myproject/..",
        ];
        for case in cases {
            let name = sanitize_git_name(case);
            assert!(!name.contains('/'));
            assert!(!name.contains('\u{0000}'));
            assert_ne!(name, ".");
            assert_ne!(name, "..");
        }
    }
}
