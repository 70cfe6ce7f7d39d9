//! Per-toolchain dependency-file parsing (§4.5), grounded in
//! `original_source/src/dds/build/file_deps.cpp`'s `parse_mkfile_deps_str`
//! and `parse_msvc_output_for_deps`.

use std::path::{Path, PathBuf};

use crate::toolchain::split_shell_string;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepfileError {
    /// The first whitespace-separated token in a GNU Makefile-style depfile
    /// did not end with `:`. Reported as a critical diagnostic with no
    /// inputs recovered, rather than guessing.
    MissingOutputColon { leading_token: String },
}

/// Parses a GNU `-MD -MF` Makefile-style depfile: escaped newlines are
/// joined, the result is shell-split, the first token must end in `:` (the
/// rule's output, discarded — the caller already knows the output path) and
/// every remaining token is an input path.
pub fn parse_makefile_deps(content: &str) -> Result<Vec<PathBuf>, DepfileError> {
    let joined = content.replace("\\\n", " ");
    let tokens = split_shell_string(&joined);
    let Some(first) = tokens.first() else {
        return Ok(Vec::new());
    };
    if !first.ends_with(':') {
        return Err(DepfileError::MissingOutputColon { leading_token: first.clone() });
    }
    Ok(tokens[1..].iter().map(PathBuf::from).collect())
}

/// The default `/showIncludes` leader MSVC emits, e.g.
/// `Note: including file:  C:\foo\bar.h`.
pub const DEFAULT_MSVC_LEADER: &str = "Note: including file:";

/// Result of scanning a captured MSVC compiler invocation's stdout for
/// `/showIncludes` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsvcDeps {
    pub inputs: Vec<PathBuf>,
    /// The compiler output with every recognized include-note line removed
    /// — what should actually be shown to the user / stored as captured
    /// output.
    pub cleaned_output: String,
}

/// Scans `output` line by line: any line whose trimmed text starts with
/// `leader` is a recognized include note and becomes an input path; every
/// other line is kept in `cleaned_output`. If zero lines matched the
/// leader, the caller should discard the whole parse result rather than
/// record an incomplete dependency set.
pub fn parse_msvc_show_includes(output: &str, leader: &str) -> MsvcDeps {
    let mut inputs = Vec::new();
    let mut cleaned = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(leader) {
            let path = rest.trim();
            inputs.push(normalize_msvc_path(path));
        } else {
            cleaned.push(line);
        }
    }
    MsvcDeps { inputs, cleaned_output: cleaned.join("\n") }
}

fn normalize_msvc_path(p: &str) -> PathBuf {
    Path::new(p).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_makefile_depfile() {
        let content = "build/a.o: src/a.cpp include/a.hpp \\\n    include/b.hpp\n";
        let inputs = parse_makefile_deps(content).unwrap();
        assert_eq!(
            inputs,
            vec![PathBuf::from("src/a.cpp"), PathBuf::from("include/a.hpp"), PathBuf::from("include/b.hpp")]
        );
    }

    #[test]
    fn missing_colon_is_a_critical_error_with_no_inputs() {
        let err = parse_makefile_deps("not-a-rule src/a.cpp").unwrap_err();
        assert_eq!(err, DepfileError::MissingOutputColon { leading_token: "not-a-rule".to_string() });
    }

    #[test]
    fn empty_depfile_yields_no_inputs() {
        assert_eq!(parse_makefile_deps("").unwrap(), Vec::<PathBuf>::new());
    }

    #[test]
    fn msvc_show_includes_extracts_paths_and_cleans_output() {
        let output = "a.cpp\nNote: including file:  C:\\inc\\a.h\nNote: including file: C:\\inc\\b.h\nwarning C1234: ugh\n";
        let deps = parse_msvc_show_includes(output, DEFAULT_MSVC_LEADER);
        assert_eq!(deps.inputs, vec![PathBuf::from("C:\\inc\\a.h"), PathBuf::from("C:\\inc\\b.h")]);
        assert!(deps.cleaned_output.contains("warning C1234"));
        assert!(!deps.cleaned_output.contains("including file"));
    }

    #[test]
    fn msvc_show_includes_with_no_matches_yields_empty_inputs() {
        let deps = parse_msvc_show_includes("a.cpp\nwarning: x\n", DEFAULT_MSVC_LEADER);
        assert!(deps.inputs.is_empty());
    }
}
