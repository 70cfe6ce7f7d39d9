//! Full package metadata as stored in the catalog and embedded in sdists.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::PackageId;
use crate::library::LibraryInfo;
use crate::name::Name;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("library '{library}' of package '{package}' references unknown sibling library '{missing}'")]
pub struct UnknownSiblingLibrary {
    pub package: Name,
    pub library: Name,
    pub missing: Name,
}

/// `(id, libraries, meta, extra)`. `meta`/`extra` are opaque JSON blobs the
/// core does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub id: PackageId,
    pub libraries: Vec<LibraryInfo>,
    #[serde(default)]
    pub meta: serde_json::Value,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl PackageMeta {
    /// Every name referenced by any `intra_uses`/`intra_test_uses` edge must
    /// name another library within `libraries`. Acyclicity is *not* checked
    /// here — the resolver and build planner detect cycles once libraries
    /// are actually pulled into a build.
    pub fn check_sibling_references(&self) -> Result<(), UnknownSiblingLibrary> {
        let known: std::collections::BTreeSet<&Name> =
            self.libraries.iter().map(|l| &l.name).collect();
        for lib in &self.libraries {
            for used in lib.intra_uses.iter().chain(lib.intra_test_uses.iter()) {
                if !known.contains(used) {
                    return Err(UnknownSiblingLibrary {
                        package: self.id.name.clone(),
                        library: lib.name.clone(),
                        missing: used.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn library(&self, name: &Name) -> Option<&LibraryInfo> {
        self.libraries.iter().find(|l| &l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn pkg(libs: Vec<LibraryInfo>) -> PackageMeta {
        PackageMeta {
            id: PackageId::new(Name::parse("foo").unwrap(), Version::new(1, 0, 0), 1),
            libraries: libs,
            meta: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn rejects_unknown_sibling_reference() {
        let mut lib = LibraryInfo::new(Name::parse("a").unwrap(), "a".into());
        lib.intra_uses.insert(Name::parse("missing").unwrap());
        let meta = pkg(vec![lib]);
        assert!(meta.check_sibling_references().is_err());
    }

    #[test]
    fn accepts_valid_sibling_reference() {
        let a = LibraryInfo::new(Name::parse("a").unwrap(), "a".into());
        let mut b = LibraryInfo::new(Name::parse("b").unwrap(), "b".into());
        b.intra_uses.insert(Name::parse("a").unwrap());
        let meta = pkg(vec![a, b]);
        assert!(meta.check_sibling_references().is_ok());
    }
}
