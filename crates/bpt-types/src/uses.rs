//! The subset of a dependency's libraries that a depender actually uses.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::name::Name;

/// Either "every library the dependency exposes" or an explicit, named
/// subset. Used libraries must be a subset of the dependency's declared
/// libraries; `ImplicitAll` stands for all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsesSpec {
    ImplicitAll,
    Explicit(BTreeSet<Name>),
}

impl UsesSpec {
    pub fn explicit(names: impl IntoIterator<Item = Name>) -> Self {
        UsesSpec::Explicit(names.into_iter().collect())
    }

    pub fn is_implicit_all(&self) -> bool {
        matches!(self, UsesSpec::ImplicitAll)
    }

    /// The concrete set of names this spec resolves to, given the full list
    /// of libraries a package declares.
    pub fn resolve<'a>(&'a self, all: &'a [Name]) -> BTreeSet<Name> {
        match self {
            UsesSpec::ImplicitAll => all.iter().cloned().collect(),
            UsesSpec::Explicit(set) => set.clone(),
        }
    }

    /// Union of two specs: `ImplicitAll` absorbs anything.
    pub fn union(&self, other: &UsesSpec) -> UsesSpec {
        match (self, other) {
            (UsesSpec::ImplicitAll, _) | (_, UsesSpec::ImplicitAll) => UsesSpec::ImplicitAll,
            (UsesSpec::Explicit(a), UsesSpec::Explicit(b)) => {
                UsesSpec::Explicit(a.union(b).cloned().collect())
            }
        }
    }

    /// Intersection of two specs: `ImplicitAll` is the identity.
    pub fn intersection(&self, other: &UsesSpec) -> UsesSpec {
        match (self, other) {
            (UsesSpec::ImplicitAll, x) | (x, UsesSpec::ImplicitAll) => x.clone(),
            (UsesSpec::Explicit(a), UsesSpec::Explicit(b)) => {
                UsesSpec::Explicit(a.intersection(b).cloned().collect())
            }
        }
    }

    /// Whether `self` is a subset of `other` (used for pubgrub's `implied_by`).
    pub fn subset_of(&self, other: &UsesSpec) -> bool {
        match (self, other) {
            (_, UsesSpec::ImplicitAll) => true,
            (UsesSpec::ImplicitAll, UsesSpec::Explicit(_)) => false,
            (UsesSpec::Explicit(a), UsesSpec::Explicit(b)) => a.is_subset(b),
        }
    }
}

impl Default for UsesSpec {
    fn default() -> Self {
        UsesSpec::ImplicitAll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn implicit_all_absorbs_union() {
        let a = UsesSpec::explicit([n("x")]);
        assert_eq!(a.union(&UsesSpec::ImplicitAll), UsesSpec::ImplicitAll);
    }

    #[test]
    fn implicit_all_is_identity_for_intersection() {
        let a = UsesSpec::explicit([n("x")]);
        assert_eq!(a.intersection(&UsesSpec::ImplicitAll), a);
    }

    #[test]
    fn explicit_subset_check() {
        let a = UsesSpec::explicit([n("x")]);
        let b = UsesSpec::explicit([n("x"), n("y")]);
        assert!(a.subset_of(&b));
        assert!(!b.subset_of(&a));
    }
}
