//! Semantic versions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version: {0}")]
pub struct VersionError(String);

/// `(major, minor, patch)` with an optional prerelease sequence, ordered as
/// standard semver. Thin wrapper over [`semver::Version`] so the rest of the
/// crate works with a type local to the naming/identity model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(semver::Version);

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version(semver::Version::new(major, minor, patch))
    }

    pub fn parse(s: &str) -> Result<Version, VersionError> {
        semver::Version::parse(s)
            .map(Version)
            .map_err(|e| VersionError(e.to_string()))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// The version with `(major, minor, patch)` incremented per the `@`
    /// shorthand's upper bound: `[X.Y.Z, (X+1).0.0)`.
    pub fn next_major(&self) -> Version {
        Version::new(self.major() + 1, 0, 0)
    }

    /// Upper bound for the `~` shorthand: `[X.Y.Z, X.(Y+1).0)`.
    pub fn next_minor(&self) -> Version {
        Version::new(self.major(), self.minor() + 1, 0)
    }

    /// Upper bound for the `=` shorthand: `[X.Y.Z, X.Y.(Z+1))`.
    pub fn next_patch(&self) -> Version {
        Version::new(self.major(), self.minor(), self.patch() + 1)
    }

    /// A version greater than every representable version, used as the open
    /// upper bound of the `+` shorthand.
    pub fn infinity() -> Version {
        Version::new(u64::MAX, u64::MAX, u64::MAX)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.0.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_semver() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 2, 3));
    }

    #[test]
    fn rejects_partial_version() {
        // Scenario F: "1.2" is not full semver and must be rejected.
        assert!(Version::parse("1.2").is_err());
    }

    #[test]
    fn ordering_is_semver_ordering() {
        assert!(Version::new(1, 2, 3) < Version::new(1, 3, 0));
        assert!(Version::new(1, 2, 3) < Version::new(2, 0, 0));
    }

    #[test]
    fn next_bounds_match_shorthand_operators() {
        let v = Version::new(1, 2, 3);
        assert_eq!(v.next_major(), Version::new(2, 0, 0));
        assert_eq!(v.next_minor(), Version::new(1, 3, 0));
        assert_eq!(v.next_patch(), Version::new(1, 2, 4));
    }
}
