//! Source distributions: the canonical on-disk package layout, creation from
//! a project directory, loading, and tar.gz pack/unpack.
//!
//! An sdist is a directory containing `pkg.json` and, for each library, the
//! files under that library's `path` that fall under its `src/` and
//! `include/` roots. Files outside those roots are not part of the sdist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bpt_manifest::{parse_pkg_json, write_pkg_json, ManifestError};
use bpt_types::PackageMeta;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdistError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: io::Error },
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("sdist at {0} has no pkg.json")]
    MissingPkgJson(PathBuf),
}

fn io_err(path: &Path, source: io::Error) -> SdistError {
    SdistError::Io { path: path.to_path_buf(), source }
}

/// An sdist materialized on disk at `root`.
#[derive(Debug, Clone)]
pub struct SourceDist {
    pub root: PathBuf,
    pub meta: PackageMeta,
}

const ROOTS: &[&str] = &["src", "include"];

impl SourceDist {
    /// Loads an sdist that already exists on disk at `dir`.
    pub fn load(dir: &Path) -> Result<SourceDist, SdistError> {
        let pkg_json_path = dir.join("pkg.json");
        if !pkg_json_path.exists() {
            return Err(SdistError::MissingPkgJson(dir.to_path_buf()));
        }
        let contents = fs::read_to_string(&pkg_json_path).map_err(|e| io_err(&pkg_json_path, e))?;
        let meta = parse_pkg_json(&contents)?;
        Ok(SourceDist { root: dir.to_path_buf(), meta })
    }

    /// Creates an sdist from a project directory into a fresh temporary
    /// directory, copying only the `src/`/`include/` roots of every declared
    /// library, then renames the temp directory into `dest` (lifecycle rule:
    /// sdists are built in a scratch dir and atomically renamed into place).
    pub fn create(project_dir: &Path, meta: &PackageMeta, dest: &Path) -> Result<SourceDist, SdistError> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        let tmp = tempfile::Builder::new()
            .prefix(".tmp-import-")
            .tempdir_in(parent)
            .map_err(|e| io_err(parent, e))?;

        for lib in &meta.libraries {
            let lib_src = project_dir.join(&lib.path);
            let lib_dest = tmp.path().join(&lib.path);
            for root in ROOTS {
                let from = lib_src.join(root);
                if !from.exists() {
                    continue;
                }
                let to = lib_dest.join(root);
                copy_tree(&from, &to)?;
            }
        }

        let pkg_json = write_pkg_json(meta)?;
        fs::write(tmp.path().join("pkg.json"), pkg_json).map_err(|e| io_err(tmp.path(), e))?;

        if dest.exists() {
            fs::remove_dir_all(dest).map_err(|e| io_err(dest, e))?;
        }
        let tmp_path = tmp.into_path();
        fs::rename(&tmp_path, dest).map_err(|e| io_err(dest, e))?;

        tracing::debug!(pkg = %meta.id, dest = %dest.display(), "sdist created");
        Ok(SourceDist { root: dest.to_path_buf(), meta: meta.clone() })
    }

    /// Packs this sdist into a `.tar.gz` archive at `out_path`.
    pub fn pack_targz(&self, out_path: &Path) -> Result<(), SdistError> {
        let file = fs::File::create(out_path).map_err(|e| io_err(out_path, e))?;
        let enc = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(enc);
        builder
            .append_dir_all(".", &self.root)
            .map_err(|e| io_err(&self.root, e))?;
        builder.finish().map_err(|e| io_err(out_path, e))?;
        Ok(())
    }

    /// Unpacks a `.tar.gz` sdist archive into `dest` and loads it.
    pub fn unpack_targz(archive_path: &Path, dest: &Path) -> Result<SourceDist, SdistError> {
        fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
        let file = fs::File::open(archive_path).map_err(|e| io_err(archive_path, e))?;
        let dec = GzDecoder::new(file);
        let mut archive = tar::Archive::new(dec);
        archive.unpack(dest).map_err(|e| io_err(dest, e))?;
        SourceDist::load(dest)
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), SdistError> {
    fs::create_dir_all(to).map_err(|e| io_err(to, e))?;
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.map_err(|e| io_err(from, io::Error::new(io::ErrorKind::Other, e)))?;
        let rel = entry.path().strip_prefix(from).expect("entry is under from");
        let dest_path = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| io_err(&dest_path, e))?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            fs::copy(entry.path(), &dest_path).map_err(|e| io_err(&dest_path, e))?;
        }
    }
    Ok(())
}

/// BLAKE3 hex digest of every file under an sdist, combined in sorted
/// (path, hash) order so the result is independent of traversal order.
pub fn content_hash(root: &Path) -> Result<String, SdistError> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).expect("entry is under root").to_string_lossy().into_owned();
        let bytes = fs::read(entry.path()).map_err(|e| io_err(entry.path(), e))?;
        entries.push((rel, blake3::hash(&bytes).to_hex().to_string()));
    }
    entries.sort();
    let mut hasher = blake3::Hasher::new();
    for (path, hash) in entries {
        hasher.update(path.as_bytes());
        hasher.update(hash.as_bytes());
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpt_types::{LibraryInfo, Name, PackageId, Version};
    use std::fs;

    fn sample_meta() -> PackageMeta {
        PackageMeta {
            id: PackageId::new(Name::parse("foo").unwrap(), Version::new(1, 0, 0), 1),
            libraries: vec![LibraryInfo::new(Name::parse("foo").unwrap(), "foo".into())],
            meta: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn create_copies_only_src_and_include_roots() {
        let project = tempfile::tempdir().unwrap();
        let lib_dir = project.path().join("foo");
        fs::create_dir_all(lib_dir.join("src")).unwrap();
        fs::create_dir_all(lib_dir.join("include")).unwrap();
        fs::write(lib_dir.join("src/a.cpp"), "// a").unwrap();
        fs::write(lib_dir.join("include/a.hpp"), "// a").unwrap();
        fs::write(lib_dir.join("README.md"), "not part of the sdist").unwrap();

        let dest = project.path().join("_sdist");
        let sdist = SourceDist::create(project.path(), &sample_meta(), &dest).unwrap();

        assert!(sdist.root.join("foo/src/a.cpp").exists());
        assert!(sdist.root.join("foo/include/a.hpp").exists());
        assert!(!sdist.root.join("foo/README.md").exists());
        assert!(sdist.root.join("pkg.json").exists());
    }

    #[test]
    fn pack_and_unpack_round_trips() {
        let project = tempfile::tempdir().unwrap();
        fs::create_dir_all(project.path().join("foo/src")).unwrap();
        fs::write(project.path().join("foo/src/a.cpp"), "// a").unwrap();

        let dest = project.path().join("_sdist");
        let sdist = SourceDist::create(project.path(), &sample_meta(), &dest).unwrap();

        let archive = project.path().join("out.tar.gz");
        sdist.pack_targz(&archive).unwrap();

        let unpacked_dir = project.path().join("_unpacked");
        let unpacked = SourceDist::unpack_targz(&archive, &unpacked_dir).unwrap();
        assert_eq!(unpacked.meta.id, sdist.meta.id);
        assert!(unpacked.root.join("foo/src/a.cpp").exists());
    }

    #[test]
    fn content_hash_is_stable_across_traversal_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/1.txt"), "one").unwrap();
        fs::write(dir.path().join("a/2.txt"), "two").unwrap();
        let h1 = content_hash(dir.path()).unwrap();
        let h2 = content_hash(dir.path()).unwrap();
        assert_eq!(h1, h2);
    }
}
