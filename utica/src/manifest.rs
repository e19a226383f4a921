//! The manifest and lockfile grammar (§4.1, §6): `Cartfile`, `Cartfile.private`, and
//! `Cartfile.resolved` all share one line-oriented format.

use crate::dependency::{recognize_primary_host_repo, DependencyId, Host};
use crate::error::{Error, ParseError};
use crate::version::{PinnedVersion, SemanticVersion, VersionSpecifier};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

/// One `<kind> "<identifier>" [<specifier>]` line from a `Cartfile`/`Cartfile.private`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestEntry {
    pub id: DependencyId,
    pub specifier: VersionSpecifier,
}

/// A parsed `Cartfile` or `Cartfile.private`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

/// One `<kind> "<identifier>" "<version-or-sha>"` line from `Cartfile.resolved`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockEntry {
    pub id: DependencyId,
    pub pinned: PinnedVersion,
}

/// A parsed `Cartfile.resolved`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Lockfile {
    pub entries: Vec<LockEntry>,
}

enum Trailer {
    Operator { op: String, version: String },
    QuotedRef(String),
}

struct RawEntry {
    kind: String,
    identifier: String,
    trailer: Option<Trailer>,
}

/// Strips a trailing `#` comment that is not inside a quoted span.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn scan_quoted(rest: &str) -> Option<(String, &str)> {
    let after_open = rest.strip_prefix('"')?;
    let close = after_open.find('"')?;
    if close == 0 {
        return None;
    }
    Some((after_open[..close].to_string(), after_open[close + 1..].trim()))
}

fn parse_raw_entry(raw_line: &str) -> Result<Option<RawEntry>, ParseError> {
    let line = strip_comment(raw_line).trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut split = line.splitn(2, char::is_whitespace);
    let kind = split.next().unwrap_or("").to_string();
    let rest = split.next().unwrap_or("").trim_start();

    if rest.is_empty() || !rest.starts_with('"') {
        return Err(ParseError::ExpectedStringAfterKind {
            line: raw_line.to_string(),
        });
    }

    let (identifier, remainder) = scan_quoted(rest).ok_or_else(|| ParseError::UnterminatedString {
        line: raw_line.to_string(),
    })?;

    let trailer = if remainder.is_empty() {
        None
    } else if let Some(version) = remainder.strip_prefix("~>") {
        Some(Trailer::Operator {
            op: "~>".to_string(),
            version: version.trim().to_string(),
        })
    } else if let Some(version) = remainder.strip_prefix(">=") {
        Some(Trailer::Operator {
            op: ">=".to_string(),
            version: version.trim().to_string(),
        })
    } else if let Some(version) = remainder.strip_prefix("==") {
        Some(Trailer::Operator {
            op: "==".to_string(),
            version: version.trim().to_string(),
        })
    } else if remainder.starts_with('"') {
        let (reference, trailing) =
            scan_quoted(remainder).ok_or_else(|| ParseError::UnterminatedString {
                line: raw_line.to_string(),
            })?;
        if !trailing.is_empty() {
            return Err(ParseError::InvalidSpecifier(raw_line.to_string()));
        }
        Some(Trailer::QuotedRef(reference))
    } else {
        return Err(ParseError::InvalidSpecifier(raw_line.to_string()));
    };

    Ok(Some(RawEntry {
        kind,
        identifier,
        trailer,
    }))
}

fn parse_version(raw: &str, line: &str) -> Result<SemanticVersion, ParseError> {
    SemanticVersion::from_str(raw).map_err(|_| ParseError::InvalidVersion(line.to_string()))
}

fn resolve_github_identifier(identifier: &str, line: &str) -> Result<DependencyId, ParseError> {
    let invalid = || ParseError::InvalidGitHubIdentifier {
        identifier: identifier.to_string(),
        line: line.to_string(),
    };

    if let Ok(url) = url::Url::parse(identifier) {
        let host = url.host_str().ok_or_else(invalid)?;
        let mut segments = url
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|s| !s.is_empty());
        let owner = segments.next().ok_or_else(invalid)?.to_string();
        let name = segments.next().ok_or_else(invalid)?.to_string();
        if segments.next().is_some() {
            return Err(invalid());
        }
        let port_suffix = url.port().map(|p| format!(":{p}")).unwrap_or_default();
        let base_url = format!("{}://{host}{port_suffix}", url.scheme());
        return Ok(DependencyId::Hosted {
            host: Host::Enterprise { base_url },
            owner,
            name: strip_dot_git(&name),
        });
    }

    let parts: Vec<&str> = identifier.split('/').collect();
    if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
        return Ok(DependencyId::Hosted {
            host: Host::Primary,
            owner: parts[0].to_string(),
            name: strip_dot_git(parts[1]),
        });
    }

    Err(invalid())
}

fn strip_dot_git(name: &str) -> String {
    name.strip_suffix(".git").unwrap_or(name).to_string()
}

fn resolve_git_identifier(identifier: &str) -> DependencyId {
    match recognize_primary_host_repo(identifier) {
        Some((owner, name)) => DependencyId::Hosted {
            host: Host::Primary,
            owner,
            name,
        },
        None => DependencyId::Git {
            url: identifier.to_string(),
        },
    }
}

fn resolve_binary_identifier(
    identifier: &str,
    line: &str,
    base_dir: Option<&Path>,
) -> Result<DependencyId, ParseError> {
    let invalid = || ParseError::InvalidBinaryUrl {
        line: line.to_string(),
    };

    if let Ok(url) = url::Url::parse(identifier) {
        if url.scheme() == "https" || url.scheme() == "file" {
            return Ok(DependencyId::Binary {
                url: url.to_string(),
                display_url: identifier.to_string(),
            });
        }
        return Err(invalid());
    }

    let base = base_dir.ok_or_else(invalid)?;
    let resolved = base.join(identifier);
    let url = url::Url::from_file_path(&resolved).map_err(|_| invalid())?;
    Ok(DependencyId::Binary {
        url: url.to_string(),
        display_url: identifier.to_string(),
    })
}

fn resolve_identifier(
    kind: &str,
    identifier: &str,
    line: &str,
    base_dir: Option<&Path>,
) -> Result<DependencyId, ParseError> {
    match kind {
        "github" => resolve_github_identifier(identifier, line),
        "git" => Ok(resolve_git_identifier(identifier)),
        "binary" => resolve_binary_identifier(identifier, line, base_dir),
        other => Err(ParseError::UnrecognizedKind {
            kind: other.to_string(),
            line: line.to_string(),
        }),
    }
}

fn resolve_manifest_specifier(
    trailer: Option<Trailer>,
    line: &str,
) -> Result<VersionSpecifier, ParseError> {
    match trailer {
        None => Ok(VersionSpecifier::Any),
        Some(Trailer::QuotedRef(reference)) => Ok(VersionSpecifier::GitReference(reference)),
        Some(Trailer::Operator { op, version }) => {
            let v = parse_version(&version, line)?;
            match op.as_str() {
                "~>" => Ok(VersionSpecifier::CompatibleWith(v)),
                ">=" => Ok(VersionSpecifier::AtLeast(v)),
                "==" => Ok(VersionSpecifier::Exactly(v)),
                _ => unreachable!("only these three operators are ever scanned"),
            }
        }
    }
}

/// Parses a `Cartfile`/`Cartfile.private`. `base_dir` resolves bare-path `binary` entries;
/// pass `None` to reject them.
pub fn parse_manifest(text: &str, base_dir: Option<&Path>) -> Result<Manifest, Error> {
    let mut entries = Vec::new();
    for raw_line in text.lines() {
        if let Some(raw) = parse_raw_entry(raw_line)? {
            let id = resolve_identifier(&raw.kind, &raw.identifier, raw_line, base_dir)?;
            let specifier = resolve_manifest_specifier(raw.trailer, raw_line)?;
            entries.push(ManifestEntry { id, specifier });
        }
    }
    let manifest = Manifest { entries };
    check_no_duplicates(&manifest.entries)?;
    Ok(manifest)
}

/// Parses a `Cartfile.resolved`.
pub fn parse_lockfile(text: &str) -> Result<Lockfile, Error> {
    let mut entries = Vec::new();
    for raw_line in text.lines() {
        if let Some(raw) = parse_raw_entry(raw_line)? {
            let id = resolve_identifier(&raw.kind, &raw.identifier, raw_line, None)?;
            let pinned = match raw.trailer {
                Some(Trailer::QuotedRef(s)) => PinnedVersion::parse(&s),
                _ => return Err(Error::Parse(ParseError::InvalidSpecifier(raw_line.to_string()))),
            };
            entries.push(LockEntry { id, pinned });
        }
    }
    Ok(Lockfile { entries })
}

fn check_no_duplicates(entries: &[ManifestEntry]) -> Result<(), Error> {
    let mut seen: Vec<&DependencyId> = Vec::new();
    let mut dups: Vec<DependencyId> = Vec::new();
    for entry in entries {
        if seen.contains(&&entry.id) {
            if !dups.contains(&entry.id) {
                dups.push(entry.id.clone());
            }
        } else {
            seen.push(&entry.id);
        }
    }
    if dups.is_empty() {
        Ok(())
    } else {
        Err(Error::DuplicateDependencies(dups))
    }
}

/// Merges a primary manifest with an optional private one, failing if any DependencyId is
/// declared in both (§3 invariant).
pub fn merge_manifests(primary: Manifest, private: Option<Manifest>) -> Result<Manifest, Error> {
    let mut entries = primary.entries;
    if let Some(private) = private {
        entries.extend(private.entries);
    }
    check_no_duplicates(&entries)?;
    Ok(Manifest { entries })
}

fn specifier_suffix(specifier: &VersionSpecifier) -> String {
    match specifier {
        VersionSpecifier::Any => String::new(),
        VersionSpecifier::AtLeast(v) => format!(" >= {v}"),
        VersionSpecifier::CompatibleWith(v) => format!(" ~> {v}"),
        VersionSpecifier::Exactly(v) => format!(" == {v}"),
        VersionSpecifier::GitReference(r) => format!(" \"{r}\""),
    }
}

impl Manifest {
    /// `roots` for the resolver: the version specifier declared for each DependencyId.
    pub fn to_roots(&self) -> BTreeMap<DependencyId, VersionSpecifier> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), e.specifier.clone()))
            .collect()
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(out, "{}{}", entry.id, specifier_suffix(&entry.specifier));
        }
        out
    }
}

impl Lockfile {
    pub fn from_resolved(resolved: &BTreeMap<DependencyId, PinnedVersion>) -> Lockfile {
        let entries = resolved
            .iter()
            .map(|(id, pinned)| LockEntry {
                id: id.clone(),
                pinned: pinned.clone(),
            })
            .collect();
        Lockfile { entries }
    }

    pub fn to_map(&self) -> BTreeMap<DependencyId, PinnedVersion> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), e.pinned.clone()))
            .collect()
    }

    /// Serializes in canonical sort order (by DependencyId textual form, §4.1).
    pub fn serialize(&self) -> String {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        let mut out = String::new();
        for entry in &sorted {
            let _ = writeln!(out, "{} \"{}\"", entry.id, entry.pinned);
        }
        out
    }

    /// Writes the lockfile atomically: a temp file in the same directory, then a rename.
    pub fn write_atomic(&self, path: &Path) -> Result<(), Error> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::Filesystem {
            verb: "create a temp file in",
            path: dir.to_path_buf(),
            cause: e.to_string(),
        })?;
        use std::io::Write;
        tmp.write_all(self.serialize().as_bytes())
            .map_err(|e| Error::Filesystem {
                verb: "write",
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;
        tmp.persist(path).map_err(|e| Error::Filesystem {
            verb: "rename into place",
            path: path.to_path_buf(),
            cause: e.error.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_bare_owner_name() {
        let m = parse_manifest(r#"github "ReactiveCocoa/ReactiveCocoa""#, None).unwrap();
        assert_eq!(
            m.entries[0].id,
            DependencyId::Hosted {
                host: Host::Primary,
                owner: "ReactiveCocoa".into(),
                name: "ReactiveCocoa".into(),
            }
        );
        assert_eq!(m.entries[0].specifier, VersionSpecifier::Any);
    }

    #[test]
    fn github_enterprise_url() {
        let m = parse_manifest(r#"github "http://ghe.example.com/o/n""#, None).unwrap();
        assert_eq!(
            m.entries[0].id,
            DependencyId::Hosted {
                host: Host::Enterprise {
                    base_url: "http://ghe.example.com".into()
                },
                owner: "o".into(),
                name: "n".into(),
            }
        );
    }

    #[test]
    fn github_invalid_identifier() {
        let err = parse_manifest(r#"github "Whatsthis""#, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid GitHub repository identifier \"Whatsthis\""
        );
    }

    #[test]
    fn git_canonicalizes_primary_host() {
        let git = parse_manifest(r#"git "ssh://git@github.com:owner/name""#, None).unwrap();
        let github = parse_manifest(r#"github "owner/name""#, None).unwrap();
        assert_eq!(git.entries[0].id, github.entries[0].id);
    }

    #[test]
    fn operators_parse_into_specifiers() {
        let m = parse_manifest(
            "github \"a/b\" ~> 1.2.0\ngithub \"c/d\" >= 2.0.0\ngithub \"e/f\" == 3.0.0\n",
            None,
        )
        .unwrap();
        assert!(matches!(m.entries[0].specifier, VersionSpecifier::CompatibleWith(_)));
        assert!(matches!(m.entries[1].specifier, VersionSpecifier::AtLeast(_)));
        assert!(matches!(m.entries[2].specifier, VersionSpecifier::Exactly(_)));
    }

    #[test]
    fn comment_stripping_ignores_hash_in_quotes() {
        let m = parse_manifest("github \"a/b\" # trailing comment\n", None).unwrap();
        assert_eq!(m.entries.len(), 1);
        let m2 = parse_manifest("github \"a/#b\"\n", None).unwrap();
        assert_eq!(m2.entries[0].id.name(), "#b");
    }

    #[test]
    fn missing_identifier_is_expected_string_error() {
        let err = parse_manifest("github\n", None).unwrap_err();
        assert_eq!(err.to_string(), "expected string after dependency type");
    }

    #[test]
    fn unterminated_string_is_reported() {
        let err = parse_manifest("github \"a/b\n", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "empty or unterminated string after dependency type"
        );
    }

    #[test]
    fn duplicate_across_primary_and_private_is_rejected() {
        let primary = parse_manifest(r#"github "a/b""#, None).unwrap();
        let private = parse_manifest(r#"github "a/b" >= 1.0.0"#, None).unwrap();
        let err = merge_manifests(primary, private.into()).unwrap_err();
        assert!(matches!(err, Error::DuplicateDependencies(_)));
    }

    #[test]
    fn round_trip_manifest() {
        let text = "github \"a/b\" ~> 1.2.0\ngit \"https://example.com/x/y\"\nbinary \"https://example.com/z.json\" == 1.0.0\n";
        let parsed = parse_manifest(text, None).unwrap();
        let serialized = parsed.serialize();
        let reparsed = parse_manifest(&serialized, None).unwrap();
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn lockfile_round_trip_and_sort_order() {
        let text = "github \"b/b\" \"1.0.0\"\ngithub \"a/a\" \"2.0.0\"\n";
        let lock = parse_lockfile(text).unwrap();
        let serialized = lock.serialize();
        let lines: Vec<&str> = serialized.lines().collect();
        assert!(lines[0].starts_with("github \"a/a\""));
        assert!(lines[1].starts_with("github \"b/b\""));
        let reparsed = parse_lockfile(&serialized).unwrap();
        assert_eq!(reparsed.to_map(), lock.to_map());
    }
}
