//! A finite union of half-open version intervals, closed under the set
//! algebra the resolver needs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// A half-open interval `[low, high)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub low: Version,
    pub high: Version,
}

/// A finite union of disjoint, sorted half-open intervals over [`Version`].
/// An empty set means "unsatisfiable".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionRangeSet {
    intervals: Vec<Interval>,
}

impl VersionRangeSet {
    pub fn empty() -> Self {
        VersionRangeSet { intervals: Vec::new() }
    }

    pub fn single_range(low: Version, high: Version) -> Self {
        if low >= high {
            return VersionRangeSet::empty();
        }
        VersionRangeSet { intervals: vec![Interval { low, high }] }
    }

    pub fn single_version(v: Version) -> Self {
        let high = Version::new(v.major(), v.minor(), v.patch() + 1);
        VersionRangeSet::single_range(v, high)
    }

    /// Every representable version. `0.0.0` through (exclusive)
    /// [`Version::infinity`].
    pub fn full() -> Self {
        VersionRangeSet::single_range(Version::new(0, 0, 0), Version::infinity())
    }

    pub fn complement(&self) -> Self {
        VersionRangeSet::full().difference(self)
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn contains(&self, v: &Version) -> bool {
        self.intervals.iter().any(|iv| *v >= iv.low && *v < iv.high)
    }

    /// Builds a normalized set from arbitrary (possibly overlapping,
    /// unsorted) intervals: drops empty intervals, sorts by low bound, and
    /// merges any pair of intervals that touch or overlap.
    fn normalize(mut raw: Vec<Interval>) -> Self {
        raw.retain(|iv| iv.low < iv.high);
        raw.sort_by(|a, b| a.low.cmp(&b.low));
        let mut merged: Vec<Interval> = Vec::with_capacity(raw.len());
        for iv in raw {
            match merged.last_mut() {
                Some(last) if iv.low <= last.high => {
                    if iv.high > last.high {
                        last.high = iv.high;
                    }
                }
                _ => merged.push(iv),
            }
        }
        VersionRangeSet { intervals: merged }
    }

    pub fn union(&self, other: &VersionRangeSet) -> VersionRangeSet {
        let mut raw = self.intervals.clone();
        raw.extend(other.intervals.iter().cloned());
        VersionRangeSet::normalize(raw)
    }

    pub fn intersection(&self, other: &VersionRangeSet) -> VersionRangeSet {
        let mut raw = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                let low = if a.low > b.low { a.low.clone() } else { b.low.clone() };
                let high = if a.high < b.high { a.high.clone() } else { b.high.clone() };
                if low < high {
                    raw.push(Interval { low, high });
                }
            }
        }
        VersionRangeSet::normalize(raw)
    }

    pub fn difference(&self, other: &VersionRangeSet) -> VersionRangeSet {
        let mut raw = Vec::new();
        for a in &self.intervals {
            // Carve every interval of `other` out of `a`, left to right.
            let mut cursor = a.low.clone();
            let mut subs: Vec<&Interval> = other.intervals.iter().collect();
            subs.sort_by(|x, y| x.low.cmp(&y.low));
            for b in subs {
                if b.high <= a.low || b.low >= a.high {
                    continue;
                }
                if b.low > cursor {
                    raw.push(Interval { low: cursor.clone(), high: b.low.clone() });
                }
                if b.high > cursor {
                    cursor = b.high.clone();
                }
            }
            if cursor < a.high {
                raw.push(Interval { low: cursor, high: a.high.clone() });
            }
        }
        VersionRangeSet::normalize(raw)
    }

    pub fn disjoint(&self, other: &VersionRangeSet) -> bool {
        self.intersection(other).is_empty()
    }

    /// Whether every version satisfying `other` also satisfies `self`.
    pub fn contains_range(&self, other: &VersionRangeSet) -> bool {
        other.difference(self).is_empty()
    }
}

impl fmt::Display for VersionRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "<empty>");
        }
        let parts: Vec<String> =
            self.intervals.iter().map(|iv| format!("[{}, {})", iv.low, iv.high)).collect();
        write!(f, "{}", parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(lo: &str, hi: &str) -> VersionRangeSet {
        VersionRangeSet::single_range(v(lo), v(hi))
    }

    #[test]
    fn contains_agrees_with_interval_membership() {
        let r = range("1.0.0", "2.0.0");
        assert!(r.contains(&v("1.0.0")));
        assert!(r.contains(&v("1.9.9")));
        assert!(!r.contains(&v("2.0.0")));
        assert!(!r.contains(&v("0.9.0")));
    }

    #[test]
    fn intersection_is_subset_of_both() {
        let a = range("1.0.0", "3.0.0");
        let b = range("2.0.0", "4.0.0");
        let i = a.intersection(&b);
        assert!(i.contains_range(&i)); // reflexive sanity check
        assert_eq!(i, range("2.0.0", "3.0.0"));
        assert!(a.contains_range(&i));
        assert!(b.contains_range(&i));
    }

    #[test]
    fn union_is_superset_of_both() {
        let a = range("1.0.0", "2.0.0");
        let b = range("5.0.0", "6.0.0");
        let u = a.union(&b);
        assert!(u.contains_range(&a));
        assert!(u.contains_range(&b));
    }

    #[test]
    fn difference_is_disjoint_from_subtrahend() {
        let a = range("1.0.0", "5.0.0");
        let b = range("2.0.0", "3.0.0");
        let d = a.difference(&b);
        assert!(d.disjoint(&b));
        assert!(d.contains(&v("1.0.0")));
        assert!(d.contains(&v("4.0.0")));
        assert!(!d.contains(&v("2.5.0")));
    }

    #[test]
    fn empty_set_is_unsatisfiable() {
        let empty = VersionRangeSet::empty();
        assert!(empty.is_empty());
        assert!(!empty.contains(&v("1.0.0")));
    }

    #[test]
    fn complement_of_full_is_empty() {
        assert!(VersionRangeSet::full().complement().is_empty());
    }

    #[test]
    fn complement_excludes_original_range() {
        let r = range("1.0.0", "2.0.0");
        let c = r.complement();
        assert!(c.disjoint(&r));
        assert!(c.contains(&v("0.0.0")));
        assert!(c.contains(&v("5.0.0")));
    }

    #[test]
    fn overlapping_union_merges_into_one_interval() {
        let a = range("1.0.0", "3.0.0");
        let b = range("2.0.0", "5.0.0");
        let u = a.union(&b);
        assert_eq!(u.intervals().len(), 1);
        assert_eq!(u, range("1.0.0", "5.0.0"));
    }
}
