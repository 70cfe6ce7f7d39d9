//! The [`pubgrub::DependencyProvider`] implementation: turns catalog lookups
//! into the version/uses-set terms PubGrub solves over.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use bpt_diagnostics::Cancellation;
use bpt_types::{Dependency, Name, PackageMeta, UsesSpec, Version};
use pubgrub::{Dependencies, DependencyProvider, Map, PackageResolutionStatistics, VersionSet};

use crate::catalog::Catalog;
use crate::requirement::Requirement;

/// A node in the resolution graph: either the project being resolved, or a
/// named catalog package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BptPackage {
    Root,
    Named(Name),
}

impl fmt::Display for BptPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BptPackage::Root => write!(f, "<root>"),
            BptPackage::Named(name) => write!(f, "{name}"),
        }
    }
}

/// The version under which the root project is solved. Never shown to
/// users and never compared against a real catalog entry.
pub fn root_version() -> Version {
    Version::new(0, 0, 0)
}

/// Adapts a [`Catalog`] plus the root project's own direct requirements
/// into a [`pubgrub::DependencyProvider`].
pub struct CatalogProvider<'c, C: Catalog> {
    catalog: &'c C,
    root_dependencies: Vec<Dependency>,
    /// `choose_version` sees the uses-set PubGrub has accumulated for a
    /// package (via `Requirement::intersection` unioning every requirer's
    /// uses-set); `get_dependencies` only receives `(package, version)`, not
    /// that accumulated term. This cache bridges the gap: the uses-set a
    /// version was chosen under is recorded here so the edges generated for
    /// it close over the right set of libraries, not the whole package.
    uses_at_selection: RefCell<HashMap<(Name, Version), UsesSpec>>,
    cancellation: Cancellation,
}

impl<'c, C: Catalog> CatalogProvider<'c, C> {
    pub fn new(catalog: &'c C, root_dependencies: Vec<Dependency>) -> Self {
        CatalogProvider::with_cancellation(catalog, root_dependencies, Cancellation::new())
    }

    pub fn with_cancellation(catalog: &'c C, root_dependencies: Vec<Dependency>, cancellation: Cancellation) -> Self {
        CatalogProvider {
            catalog,
            root_dependencies,
            uses_at_selection: RefCell::new(HashMap::new()),
            cancellation,
        }
    }

    fn record_uses(&self, name: &Name, version: &Version, uses: &UsesSpec) {
        let mut cache = self.uses_at_selection.borrow_mut();
        cache
            .entry((name.clone(), version.clone()))
            .and_modify(|existing| *existing = existing.union(uses))
            .or_insert_with(|| uses.clone());
    }

    fn uses_for(&self, name: &Name, version: &Version) -> UsesSpec {
        self.uses_at_selection
            .borrow()
            .get(&(name.clone(), version.clone()))
            .cloned()
            .unwrap_or(UsesSpec::ImplicitAll)
    }

    /// Whether `meta` declares a library for every name `uses` resolves to.
    fn provides_uses(meta: &PackageMeta, uses: &UsesSpec) -> bool {
        let all: Vec<Name> = meta.libraries.iter().map(|l| l.name.clone()).collect();
        uses.resolve(&all).iter().all(|n| meta.library(n).is_some())
    }
}

impl<C: Catalog> DependencyProvider for CatalogProvider<'_, C> {
    type P = BptPackage;
    type V = Version;
    type VS = Requirement;
    type M = String;
    type Err = crate::error::ResolveError;
    type Priority = u32;

    fn prioritize(
        &self,
        package: &Self::P,
        range: &Self::VS,
        _stats: &PackageResolutionStatistics,
    ) -> Self::Priority {
        match package {
            BptPackage::Root => 0,
            BptPackage::Named(name) => {
                let count = self.catalog.candidates(name).map(|v| v.len()).unwrap_or(0);
                let _ = range;
                // Fewer candidates means fewer branches to explore — resolve
                // the most constrained packages first.
                1_000u32.saturating_sub(count.min(1_000) as u32)
            }
        }
    }

    fn choose_version(&self, package: &Self::P, range: &Self::VS) -> Result<Option<Self::V>, Self::Err> {
        if self.cancellation.is_cancelled() {
            return Err(crate::error::ResolveError::Cancelled);
        }
        match package {
            BptPackage::Root => Ok(Some(root_version())),
            BptPackage::Named(name) => {
                let candidates = self.catalog.candidates(name)?;
                for meta in &candidates {
                    if range.contains(&meta.id.version) && Self::provides_uses(meta, &range.uses) {
                        self.record_uses(name, &meta.id.version, &range.uses);
                        return Ok(Some(meta.id.version.clone()));
                    }
                }
                Ok(None)
            }
        }
    }

    fn get_dependencies(&self, package: &Self::P, version: &Self::V) -> Result<Dependencies<Self::P, Self::VS, Self::M>, Self::Err> {
        if self.cancellation.is_cancelled() {
            return Err(crate::error::ResolveError::Cancelled);
        }
        match package {
            BptPackage::Root => {
                let map = merge_dependencies(self.root_dependencies.iter());
                Ok(Dependencies::Available(map))
            }
            BptPackage::Named(name) => {
                let candidates = self.catalog.candidates(name)?;
                let Some(meta) = candidates.iter().find(|m| &m.id.version == version) else {
                    return Ok(Dependencies::Unavailable(format!("no catalog record for {name}@{version}")));
                };
                let uses = self.uses_for(name, version);
                let closed = closed_library_dependencies(meta, &uses);
                Ok(Dependencies::Available(merge_dependencies(closed.iter())))
            }
        }
    }
}

/// Merges a flat list of [`Dependency`] edges (possibly repeating the same
/// target package from different libraries) into the one-entry-per-package
/// map PubGrub wants, intersecting terms for the same package.
fn merge_dependencies<'a>(deps: impl Iterator<Item = &'a Dependency>) -> Map<BptPackage, Requirement> {
    let mut merged: Map<BptPackage, Requirement> = Map::default();
    for dep in deps {
        let term = Requirement::new(dep.acceptable.clone(), dep.uses.clone());
        merged
            .entry(BptPackage::Named(dep.name.clone()))
            .and_modify(|existing| *existing = existing.intersection(&term))
            .or_insert(term);
    }
    merged
}

/// The closed set of a package's own libraries reachable from `uses` via
/// `intra_uses`, and the flattened external dependencies of that closure.
fn closed_library_dependencies(meta: &PackageMeta, uses: &UsesSpec) -> Vec<Dependency> {
    let all: Vec<Name> = meta.libraries.iter().map(|l| l.name.clone()).collect();
    let mut closure = uses.resolve(&all);
    loop {
        let mut grew = false;
        for lib in &meta.libraries {
            if !closure.contains(&lib.name) {
                continue;
            }
            for used in &lib.intra_uses {
                if closure.insert(used.clone()) {
                    grew = true;
                }
            }
        }
        if !grew {
            break;
        }
    }
    closure
        .iter()
        .filter_map(|name| meta.library(name))
        .flat_map(|lib| lib.dependencies.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use bpt_types::{LibraryInfo, PackageId, UsesSpec, VersionRangeSet};

    use super::*;
    use crate::catalog::MemoryCatalog;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn pkg_with_libs(name: &str, version: &str, libs: Vec<LibraryInfo>) -> PackageMeta {
        PackageMeta {
            id: PackageId::new(n(name), v(version), 1),
            libraries: libs,
            meta: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn closed_dependencies_follow_intra_uses_but_not_unrelated_libraries() {
        let mut core = LibraryInfo::new(n("core"), PathBuf::from("core"));
        core.dependencies.push(Dependency::new(
            n("zlib"),
            VersionRangeSet::single_range(v("1.0.0"), v("2.0.0")),
            UsesSpec::ImplicitAll,
        ));
        let mut extra = LibraryInfo::new(n("extra"), PathBuf::from("extra"));
        extra.intra_uses.insert(n("core"));
        extra.dependencies.push(Dependency::new(
            n("curl"),
            VersionRangeSet::single_range(v("7.0.0"), v("8.0.0")),
            UsesSpec::ImplicitAll,
        ));
        let meta = pkg_with_libs("net", "1.0.0", vec![core, extra]);

        let only_core = closed_library_dependencies(&meta, &UsesSpec::explicit([n("core")]));
        assert_eq!(only_core.len(), 1);
        assert_eq!(only_core[0].name.as_str(), "zlib");

        let via_extra = closed_library_dependencies(&meta, &UsesSpec::explicit([n("extra")]));
        let names: Vec<&str> = via_extra.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"zlib"));
        assert!(names.contains(&"curl"));
    }

    #[test]
    fn choose_version_skips_candidates_missing_requested_library() {
        let lib_a = LibraryInfo::new(n("a"), PathBuf::from("a"));
        let meta = pkg_with_libs("foo", "1.0.0", vec![lib_a]);
        let mut catalog = MemoryCatalog::new();
        catalog.insert(meta);

        let provider = CatalogProvider::new(&catalog, vec![]);
        let requirement = Requirement::new(VersionRangeSet::full(), UsesSpec::explicit([n("missing")]));
        let chosen = provider.choose_version(&BptPackage::Named(n("foo")), &requirement).unwrap();
        assert!(chosen.is_none());
    }
}
