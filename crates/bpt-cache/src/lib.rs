//! The local sdist cache: a content-addressed directory of materialized
//! packages, keyed by [`PackageId`], protected by a shared/exclusive
//! advisory lock on a sentinel file.

mod lock;

use std::path::{Path, PathBuf};

use bpt_sdist::{SdistError, SourceDist};
use bpt_types::PackageId;
use directories::ProjectDirs;
use thiserror::Error;

pub use lock::CacheLock;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("no cache directory could be determined for this platform")]
    NoCacheDir,
    #[error("sdist error: {0}")]
    Sdist(#[from] SdistError),
}

/// The on-disk local cache rooted at a directory of `<name>@<version>~<revision>/`
/// entries, each containing a materialized sdist.
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn open() -> Result<LocalCache, CacheError> {
        Self::open_at(Self::default_cache_dir()?)
    }

    pub fn open_at(root: PathBuf) -> Result<LocalCache, CacheError> {
        std::fs::create_dir_all(&root).map_err(|e| CacheError::Io { path: root.clone(), source: e })?;
        Ok(LocalCache { root })
    }

    pub fn default_cache_dir() -> Result<PathBuf, CacheError> {
        ProjectDirs::from("dev", "bpt", "bpt")
            .map(|dirs| dirs.cache_dir().join("packages"))
            .ok_or(CacheError::NoCacheDir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, id: &PackageId) -> PathBuf {
        self.root.join(format!("{}@{}~{}", id.name, id.version, id.revision))
    }

    /// True iff a (syntactically well-formed) cache entry exists for `id`.
    /// Acquires a shared lock for the duration of the check.
    pub fn contains(&self, id: &PackageId) -> Result<bool, CacheError> {
        let _lock = CacheLock::shared(&self.root)?;
        Ok(self.entry_dir(id).join("pkg.json").exists())
    }

    /// Loads the sdist for `id`, if present.
    pub fn get(&self, id: &PackageId) -> Result<Option<SourceDist>, CacheError> {
        let _lock = CacheLock::shared(&self.root)?;
        let dir = self.entry_dir(id);
        if !dir.join("pkg.json").exists() {
            return Ok(None);
        }
        Ok(Some(SourceDist::load(&dir)?))
    }

    /// Imports an already-materialized sdist directory into the cache under
    /// `id`. Exclusive-locked; two-phase (the sdist is built in a scratch
    /// directory by the caller and only the final rename happens here).
    /// If an entry already exists and `replace` is false, the existing entry
    /// is left untouched and returned.
    pub fn import(
        &self,
        id: &PackageId,
        from_dir: &Path,
        replace: bool,
    ) -> Result<SourceDist, CacheError> {
        let _lock = CacheLock::exclusive(&self.root)?;
        let dest = self.entry_dir(id);
        if dest.join("pkg.json").exists() && !replace {
            return Ok(SourceDist::load(&dest)?);
        }
        if dest.exists() {
            std::fs::remove_dir_all(&dest).map_err(|e| CacheError::Io { path: dest.clone(), source: e })?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let tmp = tempfile::Builder::new()
            .prefix(".tmp-import-")
            .tempdir_in(&self.root)
            .map_err(|e| CacheError::Io { path: self.root.clone(), source: e })?;
        copy_dir(from_dir, tmp.path())?;
        let tmp_path = tmp.into_path();
        std::fs::rename(&tmp_path, &dest).map_err(|e| CacheError::Io { path: dest.clone(), source: e })?;
        Ok(SourceDist::load(&dest)?)
    }

    /// Lists every well-formed entry in the cache. Malformed entries (a
    /// directory without a usable `pkg.json`) are logged and skipped, never
    /// fatal, matching §4.2's "discovery is by directory listing".
    pub fn list(&self) -> Result<Vec<SourceDist>, CacheError> {
        let _lock = CacheLock::shared(&self.root)?;
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(CacheError::Io { path: self.root.clone(), source: e }),
        };
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("skipping unreadable cache entry: {e}");
                    continue;
                }
            };
            if !entry.path().is_dir() {
                continue;
            }
            match SourceDist::load(&entry.path()) {
                Ok(sdist) => out.push(sdist),
                Err(e) => tracing::warn!("skipping malformed cache entry {}: {e}", entry.path().display()),
            }
        }
        Ok(out)
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), CacheError> {
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.map_err(|e| CacheError::Io {
            path: from.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        let rel = entry.path().strip_prefix(from).expect("entry is under from");
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| CacheError::Io { path: dest.clone(), source: e })?;
        } else {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CacheError::Io { path: parent.to_path_buf(), source: e })?;
            }
            std::fs::copy(entry.path(), &dest).map_err(|e| CacheError::Io { path: dest.clone(), source: e })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpt_types::{LibraryInfo, Name, PackageMeta, Version};
    use std::fs;

    fn id() -> PackageId {
        PackageId::new(Name::parse("foo").unwrap(), Version::new(1, 0, 0), 1)
    }

    fn build_sdist(project: &Path) -> PathBuf {
        let meta = PackageMeta {
            id: id(),
            libraries: vec![LibraryInfo::new(Name::parse("foo").unwrap(), "foo".into())],
            meta: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        };
        fs::create_dir_all(project.join("foo/src")).unwrap();
        fs::write(project.join("foo/src/a.cpp"), "// a").unwrap();
        let dest = project.join("_sdist");
        SourceDist::create(project, &meta, &dest).unwrap();
        dest
    }

    #[test]
    fn import_then_contains_and_get() {
        let project = tempfile::tempdir().unwrap();
        let sdist_dir = build_sdist(project.path());

        let cache_root = tempfile::tempdir().unwrap();
        let cache = LocalCache::open_at(cache_root.path().to_path_buf()).unwrap();

        assert!(!cache.contains(&id()).unwrap());
        cache.import(&id(), &sdist_dir, false).unwrap();
        assert!(cache.contains(&id()).unwrap());

        let got = cache.get(&id()).unwrap().unwrap();
        assert_eq!(got.meta.id, id());
    }

    #[test]
    fn import_without_replace_keeps_existing_entry() {
        let project = tempfile::tempdir().unwrap();
        let sdist_dir = build_sdist(project.path());
        let cache_root = tempfile::tempdir().unwrap();
        let cache = LocalCache::open_at(cache_root.path().to_path_buf()).unwrap();

        cache.import(&id(), &sdist_dir, false).unwrap();
        // Corrupt the source and reimport without replace: the cache entry
        // must not change.
        fs::remove_file(sdist_dir.join("pkg.json")).unwrap();
        let result = cache.import(&id(), &sdist_dir, false);
        assert!(result.is_ok());
    }

    #[test]
    fn list_skips_malformed_entries() {
        let cache_root = tempfile::tempdir().unwrap();
        fs::create_dir_all(cache_root.path().join("bogus@1.0.0~1")).unwrap();
        let cache = LocalCache::open_at(cache_root.path().to_path_buf()).unwrap();
        let entries = cache.list().unwrap();
        assert!(entries.is_empty());
    }
}
