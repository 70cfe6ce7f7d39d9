//! Package identifiers.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::version::Version;

/// `(Name, Version, revision)`. Revision disambiguates metadata records that
/// share the same `(name, version)`; higher revision is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    pub name: Name,
    pub version: Version,
    pub revision: u32,
}

impl PackageId {
    pub fn new(name: Name, version: Version, revision: u32) -> Self {
        assert!(revision >= 1, "revision must be >= 1");
        PackageId { name, version, revision }
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then(other.version.cmp(&self.version)) // version desc
            .then(other.revision.cmp(&self.revision)) // revision desc
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}~{}", self.name, self.version, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: &str, rev: u32) -> PackageId {
        PackageId::new(Name::parse("foo").unwrap(), Version::parse(v).unwrap(), rev)
    }

    #[test]
    fn sorts_version_desc_then_revision_desc() {
        let mut ids = vec![id("1.0.0", 1), id("2.0.0", 1), id("2.0.0", 2), id("1.5.0", 1)];
        ids.sort();
        assert_eq!(ids[0], id("2.0.0", 2));
        assert_eq!(ids[1], id("2.0.0", 1));
        assert_eq!(ids[2], id("1.5.0", 1));
        assert_eq!(ids[3], id("1.0.0", 1));
    }

    #[test]
    fn display_round_trips_fields() {
        assert_eq!(id("1.2.3", 4).to_string(), "foo@1.2.3~4");
    }
}
