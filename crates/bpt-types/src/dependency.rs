//! A single package dependency: name, acceptable version set, used libraries.

use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::range::VersionRangeSet;
use crate::uses::UsesSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: Name,
    pub acceptable: VersionRangeSet,
    pub uses: UsesSpec,
}

impl Dependency {
    pub fn new(name: Name, acceptable: VersionRangeSet, uses: UsesSpec) -> Self {
        Dependency { name, acceptable, uses }
    }
}
