//! The read-only view of the local catalog the resolver consults.
//!
//! Kept as a trait (rather than a direct dependency on
//! [`bpt_lockfile::CatalogDb`]) so the resolver can be driven from a plain
//! in-memory fixture in tests without a SQLite connection.

use bpt_types::{Name, PackageMeta};

pub trait Catalog {
    /// Every known record for `name`, ordered `(version desc, revision
    /// desc)` — the same tie-break the resolver picks a winner with.
    fn candidates(&self, name: &Name) -> Result<Vec<PackageMeta>, CatalogLookupError>;

    /// Every package name the catalog has ever seen, for "did you mean"
    /// suggestions when a dependency names an unknown package.
    fn known_names(&self) -> Result<Vec<Name>, CatalogLookupError>;
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct CatalogLookupError(#[from] pub bpt_lockfile::CatalogError);

impl Catalog for bpt_lockfile::CatalogDb {
    fn candidates(&self, name: &Name) -> Result<Vec<PackageMeta>, CatalogLookupError> {
        Ok(self.by_name(name)?)
    }

    fn known_names(&self) -> Result<Vec<Name>, CatalogLookupError> {
        let all = self.all()?;
        let mut names: Vec<Name> = all.into_iter().map(|m| m.id.name).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// A fixed, in-memory catalog for tests and for resolving against a
/// manifest's own local path-dependency siblings.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    packages: Vec<PackageMeta>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        MemoryCatalog::default()
    }

    pub fn insert(&mut self, meta: PackageMeta) {
        self.packages.push(meta);
    }
}

impl Catalog for MemoryCatalog {
    fn candidates(&self, name: &Name) -> Result<Vec<PackageMeta>, CatalogLookupError> {
        let mut found: Vec<PackageMeta> =
            self.packages.iter().filter(|m| &m.id.name == name).cloned().collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    fn known_names(&self) -> Result<Vec<Name>, CatalogLookupError> {
        let mut names: Vec<Name> = self.packages.iter().map(|m| m.id.name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
