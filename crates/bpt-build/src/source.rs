//! Classifies a source file by extension and filename stem, the way
//! `original_source/src/dds/source.hpp`'s `infer_source_kind` does: headers
//! and sources are told apart by extension, then a source whose stem ends
//! in `.test` or `.main` is reclassified as a test or app entry point.

use std::path::{Path, PathBuf};

const HEADER_EXTENSIONS: &[&str] =
    &["h", "H", "H++", "h++", "hh", "hpp", "hxx", "inl"];
const SOURCE_EXTENSIONS: &[&str] = &["C", "c", "c++", "cc", "cpp", "cxx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Header,
    Source,
    Test,
    App,
}

/// One classified file under a library's `include/` or `src/` root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

/// The stem of a path with its extension(s) stripped once, e.g.
/// `foo.test.cpp` -> `foo.test`.
fn stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Classifies a single file by extension, then stem suffix. Returns `None`
/// for files whose extension is neither a recognized header nor source
/// extension (unclassifiable — callers warn and skip these).
pub fn infer_source_kind(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?;
    if HEADER_EXTENSIONS.contains(&ext) {
        return Some(SourceKind::Header);
    }
    if !SOURCE_EXTENSIONS.contains(&ext) {
        return None;
    }
    let stem = stem(path);
    if stem.ends_with(".test") {
        Some(SourceKind::Test)
    } else if stem.ends_with(".main") {
        Some(SourceKind::App)
    } else {
        Some(SourceKind::Source)
    }
}

/// Classifies every relative path under a library's `include/` root.
/// Non-header files are dropped with a warning — public include directories
/// may only contain headers.
pub fn classify_public_headers(relpaths: &[PathBuf]) -> Vec<SourceFile> {
    let mut out = Vec::new();
    for rel in relpaths {
        match infer_source_kind(rel) {
            Some(SourceKind::Header) => out.push(SourceFile { path: rel.clone(), kind: SourceKind::Header }),
            Some(_) => {
                tracing::warn!(path = %rel.display(), "non-header file under include/ is ignored");
            }
            None => {
                tracing::warn!(path = %rel.display(), "unrecognized file extension under include/");
            }
        }
    }
    out
}

/// Classifies every relative path under a library's `src/` root. All
/// recognized kinds are kept; unclassifiable extensions are dropped with a
/// warning.
pub fn classify_private_sources(relpaths: &[PathBuf]) -> Vec<SourceFile> {
    let mut out = Vec::new();
    for rel in relpaths {
        match infer_source_kind(rel) {
            Some(kind) => out.push(SourceFile { path: rel.clone(), kind }),
            None => {
                tracing::warn!(path = %rel.display(), "unrecognized file extension under src/");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_extensions_are_recognized() {
        for ext in ["h", "hpp", "hh", "hxx", "inl"] {
            let p = PathBuf::from(format!("foo.{ext}"));
            assert_eq!(infer_source_kind(&p), Some(SourceKind::Header));
        }
    }

    #[test]
    fn test_stem_suffix_wins_over_plain_source() {
        assert_eq!(infer_source_kind(Path::new("widget.test.cpp")), Some(SourceKind::Test));
    }

    #[test]
    fn main_stem_suffix_is_an_app_entry_point() {
        assert_eq!(infer_source_kind(Path::new("cli.main.cpp")), Some(SourceKind::App));
    }

    #[test]
    fn plain_source_with_no_special_stem() {
        assert_eq!(infer_source_kind(Path::new("widget.cpp")), Some(SourceKind::Source));
    }

    #[test]
    fn unrecognized_extension_is_none() {
        assert_eq!(infer_source_kind(Path::new("readme.md")), None);
    }

    #[test]
    fn classify_public_headers_drops_non_headers() {
        let files = classify_public_headers(&[PathBuf::from("a.hpp"), PathBuf::from("a.cpp")]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, SourceKind::Header);
    }
}
