//! Manifest-level errors.

use thiserror::Error;

use crate::shorthand::ShorthandError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("missing required key '{0}'")]
    MissingKey(String),

    #[error("unknown key '{key}'{suggestion}")]
    UnknownKey { key: String, suggestion: String },

    #[error("key '{key}' has the wrong shape: {reason}")]
    WrongShape { key: String, reason: String },

    #[error("invalid dependency: {0}")]
    Dependency(#[from] ShorthandError),

    #[error("invalid name: {0}")]
    Name(#[from] bpt_types::NameError),

    #[error("invalid version: {0}")]
    Version(#[from] bpt_types::VersionError),

    #[error("unrecognized schema-version {found}, expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("cyclic library usage: {0}")]
    CyclicUses(String),

    #[error("could not parse manifest: {0}")]
    Syntax(String),
}

impl ManifestError {
    pub fn unknown_key(key: impl Into<String>, known: &[&str]) -> Self {
        let key = key.into();
        let suggestion = closest_match(&key, known)
            .map(|s| format!(" (did you mean '{s}'?)"))
            .unwrap_or_default();
        ManifestError::UnknownKey { key, suggestion }
    }
}

/// Smallest-edit-distance suggestion over a fixed set of known keys/names.
pub fn closest_match<'a>(needle: &str, haystack: &[&'a str]) -> Option<&'a str> {
    haystack
        .iter()
        .map(|candidate| (*candidate, edit_distance(needle, candidate)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(candidate, _)| candidate)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_nearby_key() {
        assert_eq!(closest_match("dependancies", &["dependencies", "depends"]), Some("dependencies"));
    }

    #[test]
    fn no_suggestion_when_too_far() {
        assert_eq!(closest_match("xyzzy", &["dependencies", "depends"]), None);
    }
}
