//! Resolution failures, with the catalog consulted again afterwards to turn
//! PubGrub's generic "no solution" into a message that names the actual
//! typo or the actual missing library.

use bpt_types::{Dependency, Name};
use pubgrub::{DefaultStringReporter, PubGrubError, Reporter};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogLookupError};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("catalog lookup failed: {0}")]
    Catalog(#[from] CatalogLookupError),

    #[error("{0}")]
    NoSolution(String),

    #[error("dependency resolution cancelled")]
    Cancelled,
}

/// Smallest-edit-distance "did you mean" suggestion, duplicated locally
/// rather than pulled in from `bpt-manifest` to keep this crate's own
/// dependency graph free of a manifest-parsing dependency.
fn closest_match<'a>(needle: &str, haystack: &'a [Name]) -> Option<&'a Name> {
    fn edit_distance(a: &str, b: &str) -> usize {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let mut row: Vec<usize> = (0..=b.len()).collect();
        for i in 1..=a.len() {
            let mut prev = row[0];
            row[0] = i;
            for j in 1..=b.len() {
                let tmp = row[j];
                row[j] =
                    if a[i - 1] == b[j - 1] { prev } else { 1 + prev.min(row[j]).min(row[j - 1]) };
                prev = tmp;
            }
        }
        row[b.len()]
    }

    haystack
        .iter()
        .map(|candidate| (candidate, edit_distance(needle, candidate.as_str())))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(candidate, _)| candidate)
}

/// Turns a [`PubGrubError`] into a [`ResolveError`], enriching PubGrub's own
/// explanation with catalog-specific notes: an unknown package name gets a
/// "did you mean" suggestion, and a named-but-absent library gets called
/// out by name instead of folding into a generic "no version found".
pub fn explain<C: Catalog>(
    err: PubGrubError<crate::provider::CatalogProvider<'_, C>>,
    catalog: &C,
    root_dependencies: &[Dependency],
) -> ResolveError {
    match err {
        PubGrubError::NoSolution(tree) => {
            let mut message = DefaultStringReporter::report(&tree);
            if let Ok(known) = catalog.known_names() {
                for note in supplementary_notes(root_dependencies, catalog, &known) {
                    message.push_str("\n\n");
                    message.push_str(&note);
                }
            }
            ResolveError::NoSolution(message)
        }
        other => ResolveError::NoSolution(format!("{other:?}")),
    }
}

fn supplementary_notes<C: Catalog>(root_dependencies: &[Dependency], catalog: &C, known: &[Name]) -> Vec<String> {
    let mut notes = Vec::new();
    for dep in root_dependencies {
        let candidates = match catalog.candidates(&dep.name) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if candidates.is_empty() {
            if let Some(suggestion) = closest_match(dep.name.as_str(), known) {
                notes.push(format!("note: no package named '{}' — did you mean '{suggestion}'?", dep.name));
            } else {
                notes.push(format!("note: no package named '{}' is known to the catalog", dep.name));
            }
            continue;
        }
        let all_names: Vec<Name> =
            candidates.iter().flat_map(|m| m.libraries.iter().map(|l| l.name.clone())).collect();
        for wanted in dep.uses.resolve(&all_names) {
            if !all_names.contains(&wanted) {
                notes.push(format!(
                    "note: no version of '{}' declares a library named '{wanted}'",
                    dep.name
                ));
            }
        }
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_match_suggests_within_edit_distance_three() {
        let known = vec![Name::parse("fmtlib").unwrap(), Name::parse("range-v3").unwrap()];
        let suggestion = closest_match("fmtlibb", &known);
        assert_eq!(suggestion.map(Name::as_str), Some("fmtlib"));
    }

    #[test]
    fn closest_match_gives_up_past_edit_distance_three() {
        let known = vec![Name::parse("zzzzzzzzzz").unwrap()];
        assert!(closest_match("fmtlib", &known).is_none());
    }
}
