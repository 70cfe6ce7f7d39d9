//! PubGrub-style dependency resolution over `(name, version-range,
//! uses-set)` requirements.
//!
//! The core algorithm is [`pubgrub`]'s incremental version-solving SAT
//! search; this crate supplies the problem-specific pieces: the
//! [`Requirement`] version-set type that rides a used-libraries set
//! alongside the usual version range, and a [`catalog::Catalog`]-backed
//! [`DependencyProvider`](pubgrub::DependencyProvider) that expands a
//! resolved package into only the dependency edges its requested libraries
//! actually pull in.

mod catalog;
mod error;
mod provider;
mod requirement;

pub use bpt_diagnostics::Cancellation;
pub use catalog::{Catalog, CatalogLookupError, MemoryCatalog};
pub use error::ResolveError;
pub use provider::{root_version, BptPackage};
pub use requirement::Requirement;

use bpt_types::{Dependency, Name, PackageId};

/// A single resolved package: the catalog record PubGrub picked, pinned to
/// a specific version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub id: PackageId,
}

/// Resolves `root_dependencies` against `catalog`, returning the winning
/// `(name, version)` for every package reachable from them — the root
/// project itself is not included.
pub fn resolve<C: Catalog>(
    catalog: &C,
    root_dependencies: Vec<Dependency>,
) -> Result<Vec<ResolvedPackage>, ResolveError> {
    resolve_with_cancellation(catalog, root_dependencies, Cancellation::new())
}

pub fn resolve_with_cancellation<C: Catalog>(
    catalog: &C,
    root_dependencies: Vec<Dependency>,
    cancellation: Cancellation,
) -> Result<Vec<ResolvedPackage>, ResolveError> {
    let provider =
        provider::CatalogProvider::with_cancellation(catalog, root_dependencies.clone(), cancellation);

    let solution = pubgrub::resolve(&provider, BptPackage::Root, root_version())
        .map_err(|err| error::explain(err, catalog, &root_dependencies))?;

    let mut out = Vec::new();
    for (package, version) in solution {
        let BptPackage::Named(name) = package else { continue };
        let revision = revision_for(catalog, &name, &version)?;
        out.push(ResolvedPackage { id: PackageId::new(name, version, revision) });
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

fn revision_for<C: Catalog>(catalog: &C, name: &Name, version: &bpt_types::Version) -> Result<u32, ResolveError> {
    let candidates = catalog.candidates(name)?;
    Ok(candidates.iter().find(|m| &m.id.version == version).map(|m| m.id.revision).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use bpt_types::{LibraryInfo, PackageMeta, UsesSpec, Version, VersionRangeSet};

    use super::*;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn leaf(name: &str, version: &str) -> PackageMeta {
        PackageMeta {
            id: PackageId::new(n(name), v(version), 1),
            libraries: vec![LibraryInfo::new(n(name), PathBuf::from(name))],
            meta: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn resolves_a_simple_chain() {
        let mut catalog = MemoryCatalog::new();
        let mut a = leaf("a", "1.0.0");
        a.libraries[0].dependencies.push(Dependency::new(
            n("b"),
            VersionRangeSet::single_range(v("1.0.0"), v("2.0.0")),
            UsesSpec::ImplicitAll,
        ));
        catalog.insert(a);
        catalog.insert(leaf("b", "1.5.0"));
        catalog.insert(leaf("b", "0.9.0"));

        let root_deps = vec![Dependency::new(
            n("a"),
            VersionRangeSet::single_range(v("1.0.0"), v("2.0.0")),
            UsesSpec::ImplicitAll,
        )];

        let resolved = resolve(&catalog, root_deps).unwrap();
        let names: Vec<&str> = resolved.iter().map(|r| r.id.name.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"b"));
        let b = resolved.iter().find(|r| r.id.name.as_str() == "b").unwrap();
        assert_eq!(b.id.version, v("1.5.0"));
    }

    #[test]
    fn reports_missing_package_with_suggestion() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(leaf("fmtlib", "1.0.0"));
        let root_deps = vec![Dependency::new(
            n("fmtlibb"),
            VersionRangeSet::single_range(v("1.0.0"), v("2.0.0")),
            UsesSpec::ImplicitAll,
        )];
        let err = resolve(&catalog, root_deps).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("fmtlib"), "expected a suggestion in: {message}");
    }

    #[test]
    fn no_two_versions_of_the_same_package_are_selected() {
        let mut catalog = MemoryCatalog::new();
        let mut a = leaf("a", "1.0.0");
        a.libraries[0].dependencies.push(Dependency::new(
            n("shared"),
            VersionRangeSet::single_range(v("2.0.0"), v("3.0.0")),
            UsesSpec::ImplicitAll,
        ));
        let mut b = leaf("b", "1.0.0");
        b.libraries[0].dependencies.push(Dependency::new(
            n("shared"),
            VersionRangeSet::single_range(v("1.0.0"), v("3.0.0")),
            UsesSpec::ImplicitAll,
        ));
        catalog.insert(a);
        catalog.insert(b);
        catalog.insert(leaf("shared", "2.5.0"));
        catalog.insert(leaf("shared", "1.0.0"));

        let root_deps = vec![
            Dependency::new(n("a"), VersionRangeSet::single_range(v("1.0.0"), v("2.0.0")), UsesSpec::ImplicitAll),
            Dependency::new(n("b"), VersionRangeSet::single_range(v("1.0.0"), v("2.0.0")), UsesSpec::ImplicitAll),
        ];
        let resolved = resolve(&catalog, root_deps).unwrap();
        let shared_versions: Vec<_> =
            resolved.iter().filter(|r| r.id.name.as_str() == "shared").map(|r| r.id.version.clone()).collect();
        assert_eq!(shared_versions.len(), 1);
        assert_eq!(shared_versions[0], v("2.5.0"));
    }
}
