//! Directory scanner cache (§4.7): avoids re-walking immutable sdists on
//! every build. Keyed by canonicalized directory path, backed by the
//! `scanned_dirs`/`found_files` tables in the same SQLite file as the build
//! DB (`db::BuildDb`) — mirrors `original_source`'s `dds_scanned_dirs`/
//! `dds_found_files` pair and its `file_collector`.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use walkdir::WalkDir;

use crate::db::BuildDbError;

fn normalize(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
}

/// Returns the cached relative-path listing for `dir`, populating the cache
/// on first call. Entries are `relpath`s rooted at `dir`, in the order
/// `walkdir` yields them (sorted for determinism is left to the caller).
pub fn collect(conn: &mut Connection, dir: &Path) -> Result<Vec<PathBuf>, BuildDbError> {
    let dirpath = normalize(dir);
    let dirpath_str = dirpath.to_string_lossy().into_owned();

    let dir_id: Option<i64> = conn
        .query_row("SELECT dir_id FROM scanned_dirs WHERE dirpath = ?1", params![dirpath_str], |row| {
            row.get(0)
        })
        .optional()?;

    if let Some(dir_id) = dir_id {
        let mut stmt = conn.prepare("SELECT relpath FROM found_files WHERE dir_id = ?1")?;
        let rows = stmt.query_map(params![dir_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(PathBuf::from(row?));
        }
        return Ok(out);
    }

    let mut relpaths = Vec::new();
    for entry in WalkDir::new(&dirpath).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(&dirpath) {
            relpaths.push(rel.to_path_buf());
        }
    }

    let tx = conn.transaction()?;
    tx.execute("INSERT INTO scanned_dirs(dirpath) VALUES (?1)", params![dirpath_str])?;
    let dir_id = tx.last_insert_rowid();
    for rel in &relpaths {
        tx.execute(
            "INSERT INTO found_files(dir_id, relpath) VALUES (?1, ?2)",
            params![dir_id, rel.to_string_lossy()],
        )?;
    }
    tx.commit()?;

    Ok(relpaths)
}

/// Invalidates the cached scan of `dir`, if any (cascade deletes its
/// `found_files` rows).
pub fn forget(conn: &Connection, dir: &Path) -> Result<(), BuildDbError> {
    let dirpath_str = normalize(dir).to_string_lossy().into_owned();
    conn.execute("DELETE FROM scanned_dirs WHERE dirpath = ?1", params![dirpath_str])?;
    Ok(())
}

pub fn has_cached(conn: &Connection, dir: &Path) -> Result<bool, BuildDbError> {
    let dirpath_str = normalize(dir).to_string_lossy().into_owned();
    let found: Option<i64> = conn
        .query_row("SELECT dir_id FROM scanned_dirs WHERE dirpath = ?1", params![dirpath_str], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BuildDb;

    #[test]
    fn collect_caches_and_subsequent_calls_hit_the_db() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.cpp"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.hpp"), "").unwrap();

        let mut db = BuildDb::open_in_memory().unwrap();
        assert!(!has_cached(db.connection(), dir.path()).unwrap());

        let first = collect(db.connection_mut(), dir.path()).unwrap();
        assert_eq!(first.len(), 2);
        assert!(has_cached(db.connection(), dir.path()).unwrap());

        // Write a new file after the scan; the cached listing must not see it.
        std::fs::write(dir.path().join("c.cpp"), "").unwrap();
        let second = collect(db.connection_mut(), dir.path()).unwrap();
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn forget_invalidates_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.cpp"), "").unwrap();

        let mut db = BuildDb::open_in_memory().unwrap();
        collect(db.connection_mut(), dir.path()).unwrap();
        assert!(has_cached(db.connection(), dir.path()).unwrap());

        forget(db.connection(), dir.path()).unwrap();
        assert!(!has_cached(db.connection(), dir.path()).unwrap());
    }
}
