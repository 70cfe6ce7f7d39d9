//! Per-library metadata within a package.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dependency::Dependency;
use crate::name::Name;

/// Metadata for a single library inside a [`crate::package::PackageMeta`].
/// `intra_uses`/`intra_test_uses` refer to sibling libraries of the same
/// package and are resolved locally, not through the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub name: Name,
    pub path: PathBuf,
    #[serde(default)]
    pub intra_uses: BTreeSet<Name>,
    #[serde(default)]
    pub intra_test_uses: BTreeSet<Name>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub test_dependencies: Vec<Dependency>,
}

impl LibraryInfo {
    pub fn new(name: Name, path: PathBuf) -> Self {
        LibraryInfo {
            name,
            path,
            intra_uses: BTreeSet::new(),
            intra_test_uses: BTreeSet::new(),
            dependencies: Vec::new(),
            test_dependencies: Vec::new(),
        }
    }
}
