//! Parses the shorthand dependency strings accepted in `depends`/`dependencies`.

use std::collections::BTreeSet;

use bpt_types::{Dependency, Name, NameError, UsesSpec, Version, VersionError, VersionRangeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShorthandError {
    #[error("empty dependency string")]
    Empty,
    #[error("missing version operator (expected one of @ ~ = +): {0}")]
    MissingOperator(String),
    #[error("invalid package name: {0}")]
    Name(#[from] NameError),
    #[error("invalid version: {0}")]
    Version(#[from] VersionError),
}

/// Parses `"name@1.2.3"`, `"name~1.2.3"`, `"name=1.2.3"`, `"name+1.2.3"`, and
/// the `using a, b` suffix that names explicit `uses` libraries.
pub fn parse_shorthand(s: &str) -> Result<Dependency, ShorthandError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ShorthandError::Empty);
    }

    let (spec, uses_part) = match s.split_once(" using ") {
        Some((spec, uses)) => (spec, Some(uses)),
        None => (s, None),
    };

    let op_pos = spec
        .find(['@', '~', '=', '+'])
        .ok_or_else(|| ShorthandError::MissingOperator(spec.to_string()))?;
    let (name_part, rest) = spec.split_at(op_pos);
    let op = rest.chars().next().expect("op_pos points at a char");
    let version_part = &rest[op.len_utf8()..];

    let name = Name::parse(name_part.trim())?;
    let version = Version::parse(version_part.trim())?;

    let acceptable = match op {
        '@' => VersionRangeSet::single_range(version.clone(), version.next_major()),
        '~' => VersionRangeSet::single_range(version.clone(), version.next_minor()),
        '=' => VersionRangeSet::single_range(version.clone(), version.next_patch()),
        '+' => VersionRangeSet::single_range(version.clone(), Version::infinity()),
        _ => unreachable!("find() only matched one of @~=+"),
    };

    let uses = match uses_part {
        None => UsesSpec::ImplicitAll,
        Some(list) => {
            let names: Result<BTreeSet<Name>, NameError> =
                list.split(',').map(|n| Name::parse(n.trim())).collect();
            UsesSpec::Explicit(names?)
        }
    };

    Ok(Dependency::new(name, acceptable, uses))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn at_operator_is_next_major() {
        let dep = parse_shorthand("foo@1.2.3").unwrap();
        assert_eq!(dep.name, Name::parse("foo").unwrap());
        assert_eq!(dep.acceptable, VersionRangeSet::single_range(v("1.2.3"), v("2.0.0")));
    }

    #[test]
    fn tilde_operator_is_next_minor() {
        let dep = parse_shorthand("foo~1.2.3").unwrap();
        assert_eq!(dep.acceptable, VersionRangeSet::single_range(v("1.2.3"), v("1.3.0")));
    }

    #[test]
    fn equals_operator_is_exact_patch() {
        let dep = parse_shorthand("foo=1.2.3").unwrap();
        assert_eq!(dep.acceptable, VersionRangeSet::single_range(v("1.2.3"), v("1.2.4")));
    }

    #[test]
    fn plus_operator_is_unbounded() {
        let dep = parse_shorthand("foo+1.2.3").unwrap();
        assert!(dep.acceptable.contains(&v("99.0.0")));
    }

    #[test]
    fn using_suffix_sets_explicit_uses() {
        let dep = parse_shorthand("foo@1.2.3 using bar, baz").unwrap();
        assert_eq!(
            dep.uses,
            UsesSpec::explicit([Name::parse("bar").unwrap(), Name::parse("baz").unwrap()])
        );
        assert_eq!(dep.name, Name::parse("foo").unwrap());
        assert_eq!(dep.acceptable, VersionRangeSet::single_range(v("1.2.3"), v("2.0.0")));
    }

    #[test]
    fn missing_operator_is_an_error() {
        assert!(matches!(parse_shorthand("foo1.2.3"), Err(ShorthandError::MissingOperator(_))));
    }
}
