//! The version-set type PubGrub solves over: a version range paired with
//! the set of libraries the depender actually uses.
//!
//! Plain version ranges are not expressive enough on their own: two
//! dependants can agree on a version range for the same package while
//! wanting different subsets of its libraries, and PubGrub needs to treat
//! that as one joint constraint rather than two separate ones. A
//! [`Requirement`] bundles both so the solver's usual range algebra (union,
//! intersection, complement) carries the uses-set along for the ride.
//!
//! The uses-set algebra is *not* the textbook De Morgan dual of the range
//! algebra: intersecting two requirements (both must hold) unions their
//! uses-sets (a superset of libraries is needed), while union (either may
//! hold) intersects them (only the libraries both could need are
//! guaranteed). This means [`pubgrub::VersionSet::union`],
//! [`pubgrub::VersionSet::is_disjoint`], and
//! [`pubgrub::VersionSet::subset_of`] cannot be derived from `complement`
//! and `intersection` the way the trait's provided-method defaults do; all
//! three are overridden here.

use std::fmt;

use bpt_types::{Name, UsesSpec, Version, VersionRangeSet};
use pubgrub::VersionSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub versions: VersionRangeSet,
    pub uses: UsesSpec,
}

impl Requirement {
    pub fn new(versions: VersionRangeSet, uses: UsesSpec) -> Self {
        Requirement { versions, uses }
    }

    pub fn exact(version: Version, uses: UsesSpec) -> Self {
        Requirement { versions: VersionRangeSet::single_version(version), uses }
    }

    /// The set-difference of two requirements: versions satisfying `self`
    /// but not `other`, with uses-sets unioned. Null (empty) iff the range
    /// difference is empty *and* the uses-sets don't actually differ —
    /// mirroring `VersionRangeSet::difference` but accounting for the
    /// uses axis too.
    pub fn difference(&self, other: &Requirement) -> Requirement {
        Requirement {
            versions: self.versions.difference(&other.versions),
            uses: self.uses.union(&other.uses),
        }
    }

    pub fn is_null(&self) -> bool {
        self.versions.is_empty() && (self.uses_is_trivial())
    }

    fn uses_is_trivial(&self) -> bool {
        matches!(&self.uses, UsesSpec::Explicit(set) if set.is_empty())
    }

    /// Whether every version+uses-set satisfying `other` also satisfies
    /// `self` — i.e. `self` is implied whenever `other` holds.
    pub fn implied_by(&self, other: &Requirement) -> bool {
        self.versions.contains_range(&other.versions) && self.uses.subset_of(&other.uses)
    }

    pub fn excludes(&self, other: &Requirement) -> bool {
        self.versions.disjoint(&other.versions)
    }

    pub fn uses_names<'a>(&'a self, all: &'a [Name]) -> std::collections::BTreeSet<Name> {
        self.uses.resolve(all)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uses {
            UsesSpec::ImplicitAll => write!(f, "{}", self.versions),
            UsesSpec::Explicit(set) if set.is_empty() => write!(f, "{}", self.versions),
            UsesSpec::Explicit(set) => {
                let names: Vec<_> = set.iter().map(Name::as_str).collect();
                write!(f, "{} using {}", self.versions, names.join(", "))
            }
        }
    }
}

impl VersionSet for Requirement {
    type V = Version;

    fn empty() -> Self {
        Requirement { versions: VersionRangeSet::empty(), uses: UsesSpec::explicit([]) }
    }

    fn singleton(v: Version) -> Self {
        Requirement { versions: VersionRangeSet::single_version(v), uses: UsesSpec::ImplicitAll }
    }

    fn complement(&self) -> Self {
        Requirement { versions: self.versions.complement(), uses: self.uses.clone() }
    }

    /// Both requirements must hold: narrower range, wider uses-set.
    fn intersection(&self, other: &Self) -> Self {
        Requirement {
            versions: self.versions.intersection(&other.versions),
            uses: self.uses.union(&other.uses),
        }
    }

    fn contains(&self, v: &Version) -> bool {
        self.versions.contains(v)
    }

    /// Either requirement may hold: wider range, narrower (shared) uses-set.
    /// Not derivable from `complement`+`intersection` — see the module docs.
    fn union(&self, other: &Self) -> Self {
        Requirement {
            versions: self.versions.union(&other.versions),
            uses: self.uses.intersection(&other.uses),
        }
    }

    fn full() -> Self {
        Requirement { versions: VersionRangeSet::full(), uses: UsesSpec::ImplicitAll }
    }

    fn is_disjoint(&self, other: &Self) -> bool {
        self.versions.disjoint(&other.versions)
    }

    fn subset_of(&self, other: &Self) -> bool {
        other.versions.contains_range(&self.versions) && self.uses.subset_of(&other.uses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn range(lo: &str, hi: &str) -> VersionRangeSet {
        VersionRangeSet::single_range(v(lo), v(hi))
    }

    #[test]
    fn intersection_unions_uses() {
        let a = Requirement::new(range("1.0.0", "3.0.0"), UsesSpec::explicit([n("x")]));
        let b = Requirement::new(range("2.0.0", "4.0.0"), UsesSpec::explicit([n("y")]));
        let i = VersionSet::intersection(&a, &b);
        assert_eq!(i.versions, range("2.0.0", "3.0.0"));
        assert_eq!(i.uses, UsesSpec::explicit([n("x"), n("y")]));
    }

    #[test]
    fn union_intersects_uses() {
        let a = Requirement::new(range("1.0.0", "2.0.0"), UsesSpec::explicit([n("x"), n("y")]));
        let b = Requirement::new(range("5.0.0", "6.0.0"), UsesSpec::explicit([n("y")]));
        let u = VersionSet::union(&a, &b);
        assert_eq!(u.versions, a.versions.union(&b.versions));
        assert_eq!(u.uses, UsesSpec::explicit([n("y")]));
    }

    #[test]
    fn excludes_checks_version_disjointness_only() {
        let a = Requirement::new(range("1.0.0", "2.0.0"), UsesSpec::explicit([n("x")]));
        let b = Requirement::new(range("2.0.0", "3.0.0"), UsesSpec::explicit([n("y")]));
        assert!(a.excludes(&b));
        let c = Requirement::new(range("1.5.0", "2.5.0"), UsesSpec::explicit([n("z")]));
        assert!(!a.excludes(&c));
    }

    #[test]
    fn implied_by_requires_wider_versions_and_narrower_uses() {
        // `weaker` accepts any version in [1.0, 2.0) and only needs `x`; it
        // is automatically satisfied whenever the pickier `stronger`
        // requirement holds (a single version, needing both `x` and `y`).
        let weaker = Requirement::new(range("1.0.0", "2.0.0"), UsesSpec::explicit([n("x")]));
        let stronger = Requirement::exact(v("1.5.0"), UsesSpec::explicit([n("x"), n("y")]));
        assert!(weaker.implied_by(&stronger));
        assert!(!stronger.implied_by(&weaker));
    }

    #[test]
    fn empty_is_null() {
        assert!(Requirement::empty().is_null());
    }
}
