//! Semantic versions, pinned versions, and the specifier algebra (§4.2).
//!
//! `SemanticVersion` wraps [`semver::Version`] rather than hand-rolling a parser: the upstream
//! crate already enforces SemVer 2.0.0 strictly (no leading zeros, ASCII digits only, exactly
//! three numeric components), which is exactly what the grammar in the design doc calls for.

use semver::{BuildMetadata, Prerelease};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// `(major, minor, patch, preRelease?, buildMetadata?)` conforming strictly to SemVer 2.0.0.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SemanticVersion(pub semver::Version);

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemanticVersion(semver::Version::new(major, minor, patch))
    }

    pub fn core_triple(&self) -> (u64, u64, u64) {
        (self.0.major, self.0.minor, self.0.patch)
    }

    pub fn has_pre_release(&self) -> bool {
        !self.0.pre.is_empty()
    }

    pub fn pre_release(&self) -> &Prerelease {
        &self.0.pre
    }

    pub fn build_metadata(&self) -> &BuildMetadata {
        &self.0.build
    }

    /// Equality per the `Exactly` specifier: core triple, pre-release, *and* build metadata
    /// must all match (§4.2) — unlike `Ord`, which ignores build metadata per the SemVer spec.
    pub fn exactly_eq(&self, other: &SemanticVersion) -> bool {
        self.core_triple() == other.core_triple()
            && self.0.pre == other.0.pre
            && self.0.build == other.0.build
    }

    /// Ordering over the core triple only, ignoring pre-release and build metadata.
    pub fn core_cmp(&self, other: &SemanticVersion) -> Ordering {
        self.core_triple().cmp(&other.core_triple())
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse error for [`SemanticVersion::from_str`] / [`PinnedVersion::parse`].
#[derive(Clone, Debug, thiserror::Error)]
#[error("\"{0}\" is not a valid semantic version")]
pub struct SemanticVersionParseError(pub String);

impl FromStr for SemanticVersion {
    type Err = SemanticVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix(['v', 'V']).unwrap_or(s);
        semver::Version::parse(trimmed)
            .map(SemanticVersion)
            .map_err(|_| SemanticVersionParseError(s.to_string()))
    }
}

/// An opaque string of the form written in the lockfile: either a [`SemanticVersion`] or an
/// opaque commit identifier (a branch name, tag, or SHA that did not parse as semantic).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PinnedVersion {
    Semantic(SemanticVersion),
    Opaque(String),
}

impl PinnedVersion {
    pub fn parse(raw: &str) -> Self {
        match SemanticVersion::from_str(raw) {
            Ok(v) => PinnedVersion::Semantic(v),
            Err(_) => PinnedVersion::Opaque(raw.to_string()),
        }
    }

    pub fn as_semantic(&self) -> Option<&SemanticVersion> {
        match self {
            PinnedVersion::Semantic(v) => Some(v),
            PinnedVersion::Opaque(_) => None,
        }
    }

    /// The literal string as it would be written in the lockfile.
    pub fn raw(&self) -> String {
        match self {
            PinnedVersion::Semantic(v) => v.to_string(),
            PinnedVersion::Opaque(s) => s.clone(),
        }
    }
}

impl fmt::Display for PinnedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// Ordering among `PinnedVersion`s: semantic ordering is preferred; an unparseable value
/// collates as if it were `0.0.0` (i.e. sorts below every semantic version).
impl PartialOrd for PinnedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PinnedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let zero = SemanticVersion::new(0, 0, 0);
        let a = self.as_semantic().unwrap_or(&zero);
        let b = other.as_semantic().unwrap_or(&zero);
        a.core_cmp(b).then_with(|| a.0.pre.cmp(&b.0.pre))
    }
}

/// A constraint describing which pinned versions are acceptable.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum VersionSpecifier {
    Any,
    AtLeast(SemanticVersion),
    CompatibleWith(SemanticVersion),
    Exactly(SemanticVersion),
    GitReference(String),
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpecifier::Any => write!(f, ""),
            VersionSpecifier::AtLeast(v) => write!(f, ">= {v}"),
            VersionSpecifier::CompatibleWith(v) => write!(f, "~> {v}"),
            VersionSpecifier::Exactly(v) => write!(f, "== {v}"),
            VersionSpecifier::GitReference(r) => write!(f, "\"{r}\""),
        }
    }
}

/// The partial order used to attribute blame on a resolution conflict (§4.2).
///
/// `GitReference` is incomparable to every other variant, including a different
/// `GitReference`; it is only ever equal to itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
enum Strictness {
    Any,
    AtLeast,
    CompatibleWith,
    Exactly,
}

impl VersionSpecifier {
    fn strictness(&self) -> Option<Strictness> {
        match self {
            VersionSpecifier::Any => Some(Strictness::Any),
            VersionSpecifier::AtLeast(_) => Some(Strictness::AtLeast),
            VersionSpecifier::CompatibleWith(_) => Some(Strictness::CompatibleWith),
            VersionSpecifier::Exactly(_) => Some(Strictness::Exactly),
            VersionSpecifier::GitReference(_) => None,
        }
    }

    /// Compares strictness. Returns `None` when the two specifiers are incomparable (any
    /// `GitReference` pairing other than two identical references).
    pub fn stricter_than(&self, other: &VersionSpecifier) -> Option<Ordering> {
        match (self, other) {
            (VersionSpecifier::GitReference(a), VersionSpecifier::GitReference(b)) => {
                if a == b {
                    Some(Ordering::Equal)
                } else {
                    None
                }
            }
            (VersionSpecifier::GitReference(_), _) | (_, VersionSpecifier::GitReference(_)) => {
                None
            }
            _ => self.strictness().partial_cmp(&other.strictness()),
        }
    }

    /// `true` iff `pinned` satisfies this specifier (§4.2).
    pub fn is_satisfied_by(&self, pinned: &PinnedVersion) -> bool {
        let semantic = match pinned.as_semantic() {
            Some(v) => v,
            // A non-semantic (opaque) pinned version always satisfies every version
            // specifier except `GitReference`, which compares the raw commitish instead.
            None => {
                return match self {
                    VersionSpecifier::GitReference(r) => pinned.raw() == *r,
                    _ => true,
                }
            }
        };
        match self {
            VersionSpecifier::Any => !semantic.has_pre_release(),
            VersionSpecifier::AtLeast(v) => {
                !semantic.has_pre_release() && semantic.core_cmp(v) != Ordering::Less
            }
            VersionSpecifier::CompatibleWith(v) => compatible_with(semantic, v),
            VersionSpecifier::Exactly(v) => semantic.exactly_eq(v),
            VersionSpecifier::GitReference(r) => pinned.raw() == *r,
        }
    }
}

fn compatible_with(pinned: &SemanticVersion, target: &SemanticVersion) -> bool {
    if pinned.0.major != target.0.major {
        return false;
    }
    if pinned.has_pre_release() {
        return false;
    }
    if target.0.major == 0 {
        // Below 1.0.0 minor acts like a major: tighten to an exact minor match.
        return pinned.0.minor == target.0.minor && pinned.0.patch >= target.0.patch;
    }
    match pinned.0.minor.cmp(&target.0.minor) {
        Ordering::Less => false,
        Ordering::Equal => pinned.0.patch >= target.0.patch,
        Ordering::Greater => true,
    }
}

/// Picks the "larger" of two target versions for an `AtLeast`/`CompatibleWith` merge: the
/// bigger core triple wins; on a tied core triple a release always wins over its own
/// pre-release (open question #3 — preserved literally from the source).
fn merge_larger(x: &SemanticVersion, y: &SemanticVersion) -> SemanticVersion {
    match x.core_cmp(y) {
        Ordering::Greater => x.clone(),
        Ordering::Less => y.clone(),
        Ordering::Equal => {
            if !x.has_pre_release() {
                x.clone()
            } else {
                y.clone()
            }
        }
    }
}

/// `intersection(a, b)`: a single specifier satisfied by exactly the intersection of the two
/// input satisfaction sets, or `None` if that intersection is empty (§4.2).
pub fn intersection(a: &VersionSpecifier, b: &VersionSpecifier) -> Option<VersionSpecifier> {
    use VersionSpecifier::*;
    match (a, b) {
        (Any, x) | (x, Any) => Some(x.clone()),
        (AtLeast(x), AtLeast(y)) => Some(AtLeast(merge_larger(x, y))),
        (AtLeast(x), CompatibleWith(y)) | (CompatibleWith(y), AtLeast(x)) => {
            let as_pinned = PinnedVersion::Semantic(y.clone());
            AtLeast(x.clone())
                .is_satisfied_by(&as_pinned)
                .then(|| CompatibleWith(y.clone()))
        }
        (AtLeast(x), Exactly(y)) | (Exactly(y), AtLeast(x)) => {
            let as_pinned = PinnedVersion::Semantic(y.clone());
            AtLeast(x.clone())
                .is_satisfied_by(&as_pinned)
                .then(|| Exactly(y.clone()))
        }
        (CompatibleWith(x), CompatibleWith(y)) => {
            if x.0.major != y.0.major {
                return None;
            }
            if x.0.major == 0 && x.0.minor != y.0.minor {
                return None;
            }
            Some(CompatibleWith(merge_larger(x, y)))
        }
        (CompatibleWith(x), Exactly(y)) | (Exactly(y), CompatibleWith(x)) => {
            let as_pinned = PinnedVersion::Semantic(y.clone());
            CompatibleWith(x.clone())
                .is_satisfied_by(&as_pinned)
                .then(|| Exactly(y.clone()))
        }
        (Exactly(x), Exactly(y)) => x.exactly_eq(y).then(|| Exactly(x.clone())),
        (GitReference(r1), GitReference(r2)) => {
            (r1 == r2).then(|| GitReference(r1.clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::from_str(s).unwrap()
    }

    fn spec_at_least(s: &str) -> VersionSpecifier {
        VersionSpecifier::AtLeast(v(s))
    }

    fn spec_compatible(s: &str) -> VersionSpecifier {
        VersionSpecifier::CompatibleWith(v(s))
    }

    fn spec_exactly(s: &str) -> VersionSpecifier {
        VersionSpecifier::Exactly(v(s))
    }

    #[test]
    fn parses_multi_segment_prerelease() {
        assert!(SemanticVersion::from_str("2.8.2-alpha.2.1.0").is_ok());
    }

    #[test]
    fn rejects_leading_zero_in_prerelease_numeric_identifier() {
        assert!(SemanticVersion::from_str("2.8.2-alpha.2.01.0").is_err());
    }

    #[test]
    fn rejects_four_components() {
        assert!(SemanticVersion::from_str("1.8.0.1").is_err());
    }

    #[test]
    fn rejects_non_ascii_digit() {
        assert!(SemanticVersion::from_str("1.\u{ff14}.5").is_err());
    }

    #[test]
    fn strips_leading_v() {
        assert_eq!(SemanticVersion::from_str("v1.2.3").unwrap(), v("1.2.3"));
    }

    #[test]
    fn compatible_with_rejects_different_major() {
        assert_eq!(
            intersection(&spec_compatible("1.3.2"), &spec_compatible("2.1.1")),
            None
        );
    }

    #[test]
    fn compatible_with_zero_major_tightens_to_exact_minor() {
        assert_eq!(
            intersection(&spec_compatible("0.1.0"), &spec_compatible("0.2.0")),
            None
        );
    }

    #[test]
    fn at_least_intersect_exactly_keeps_build_metadata() {
        assert_eq!(
            intersection(&spec_at_least("2.2.0"), &spec_exactly("2.2.0+b421")),
            Some(spec_exactly("2.2.0+b421"))
        );
    }

    #[test]
    fn exactly_rejects_different_build_metadata() {
        assert_eq!(
            intersection(&spec_exactly("2.2.0+b421"), &spec_exactly("2.2.0+b422")),
            None
        );
        assert!(!spec_exactly("2.2.0+b421").is_satisfied_by(&PinnedVersion::parse("2.2.0+b422")));
    }

    #[test]
    fn exactly_prerelease_never_matches_release() {
        assert_eq!(
            intersection(&spec_exactly("2.2.0-alpha"), &spec_exactly("2.2.0")),
            None
        );
    }

    #[test]
    fn intersection_is_commutative() {
        let specs = [
            VersionSpecifier::Any,
            spec_at_least("1.0.0"),
            spec_compatible("1.2.0"),
            spec_exactly("1.2.3"),
            VersionSpecifier::GitReference("main".into()),
        ];
        for a in &specs {
            for b in &specs {
                assert_eq!(intersection(a, b), intersection(b, a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn any_rejects_prerelease_pinned_version() {
        let pinned = PinnedVersion::parse("1.0.0-beta");
        assert!(!VersionSpecifier::Any.is_satisfied_by(&pinned));
    }

    #[test]
    fn unparseable_pinned_version_collates_as_zero() {
        let opaque = PinnedVersion::parse("deadbeef");
        let semantic = PinnedVersion::parse("0.0.1");
        assert!(opaque < semantic);
    }
}
