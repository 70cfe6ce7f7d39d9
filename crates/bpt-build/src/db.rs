//! The per-project build database (§4.5): one SQLite file per build output
//! root, independent of the catalog DB in `bpt-lockfile`. Records, per
//! output path, the command that produced it, its captured compiler output,
//! the toolchain hash it was built with, and the `(path, mtime)` of every
//! input observed for it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::migrations::run_migrations;

#[derive(Error, Debug)]
pub enum BuildDbError {
    #[error("build DB error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

/// A previously recorded compilation for one output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCompilation {
    pub quoted_command: String,
    pub compiler_output: String,
    pub toolchain_hash: String,
    pub duration_ms: u64,
}

/// Millisecond-precision Unix timestamp. SQLite storage truncates to this
/// precision, so every mtime comparison (including a freshly-read on-disk
/// mtime) must go through this same truncation or two otherwise-equal
/// timestamps will spuriously differ in their sub-millisecond remainder.
pub(crate) fn mtime_to_ms(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn ms_to_mtime(ms: i64) -> SystemTime {
    if ms >= 0 {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(ms as u64)
    } else {
        SystemTime::UNIX_EPOCH
    }
}

pub(crate) fn insert_compilation(
    conn: &Connection,
    output: &Path,
    quoted_command: &str,
    compiler_output: &str,
    toolchain_hash: &str,
    duration_ms: u64,
    compile_start: SystemTime,
) -> Result<(), BuildDbError> {
    conn.execute(
        "INSERT INTO outputs(output, quoted_command, compiler_output, toolchain_hash, duration_ms, compile_start_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(output) DO UPDATE SET
             quoted_command   = excluded.quoted_command,
             compiler_output  = excluded.compiler_output,
             toolchain_hash   = excluded.toolchain_hash,
             duration_ms      = excluded.duration_ms,
             compile_start_ms = excluded.compile_start_ms",
        params![
            output.to_string_lossy(),
            quoted_command,
            compiler_output,
            toolchain_hash,
            duration_ms as i64,
            mtime_to_ms(compile_start),
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_inputs(conn: &Connection, output: &Path) -> Result<(), BuildDbError> {
    conn.execute("DELETE FROM output_inputs WHERE output = ?1", params![output.to_string_lossy()])?;
    Ok(())
}

pub(crate) fn insert_input(conn: &Connection, output: &Path, input_path: &Path, input_mtime: SystemTime) -> Result<(), BuildDbError> {
    conn.execute(
        "INSERT INTO output_inputs(output, input_path, mtime_ms) VALUES (?1, ?2, ?3)
         ON CONFLICT(output, input_path) DO UPDATE SET mtime_ms = excluded.mtime_ms",
        params![output.to_string_lossy(), input_path.to_string_lossy(), mtime_to_ms(input_mtime)],
    )?;
    Ok(())
}

pub struct BuildDb {
    conn: Connection,
}

impl BuildDb {
    pub fn open(path: &Path) -> Result<BuildDb, BuildDbError> {
        let mut conn = Connection::open(path)?;
        run_migrations(&mut conn)?;
        Ok(BuildDb { conn })
    }

    pub fn open_in_memory() -> Result<BuildDb, BuildDbError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(BuildDb { conn })
    }

    /// Records a completed compilation for `output`. Does not touch its
    /// input rows — callers follow with `forget_inputs_of` + `record_input`
    /// for every observed input.
    pub fn record_compilation(
        &mut self,
        output: &Path,
        quoted_command: &str,
        compiler_output: &str,
        toolchain_hash: &str,
        duration_ms: u64,
        compile_start: SystemTime,
    ) -> Result<(), BuildDbError> {
        insert_compilation(&self.conn, output, quoted_command, compiler_output, toolchain_hash, duration_ms, compile_start)
    }

    /// Deletes every recorded input of `output`. Called before re-inserting
    /// the fresh set a successful recompile observed.
    pub fn forget_inputs_of(&mut self, output: &Path) -> Result<(), BuildDbError> {
        delete_inputs(&self.conn, output)
    }

    /// Records one observed input for `output`. Callers are expected to
    /// clamp `input_mtime` to `min(input_mtime, compile_start_time)`
    /// themselves (the executor does this) — storing anything later than
    /// the moment the compile began would let a concurrent rewrite of the
    /// input slip past the next staleness check undetected.
    pub fn record_input(
        &mut self,
        output: &Path,
        input_path: &Path,
        input_mtime: SystemTime,
    ) -> Result<(), BuildDbError> {
        insert_input(&self.conn, output, input_path, input_mtime)
    }

    /// Runs `f` inside a single top-level SQLite transaction, committing on
    /// success and rolling back if `f` errors (§4.6/§5: build-DB writes are
    /// serialized through one transaction per executor run).
    pub fn in_transaction<T>(
        &mut self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, BuildDbError>,
    ) -> Result<T, BuildDbError> {
        let tx = self.conn.unchecked_transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn command_of(&self, output: &Path) -> Result<Option<CompletedCompilation>, BuildDbError> {
        self.conn
            .query_row(
                "SELECT quoted_command, compiler_output, toolchain_hash, duration_ms
                 FROM outputs WHERE output = ?1",
                params![output.to_string_lossy()],
                |row| {
                    Ok(CompletedCompilation {
                        quoted_command: row.get(0)?,
                        compiler_output: row.get(1)?,
                        toolchain_hash: row.get(2)?,
                        duration_ms: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()
            .map_err(BuildDbError::Sqlite)
    }

    pub fn inputs_of(&self, output: &Path) -> Result<Option<Vec<(PathBuf, SystemTime)>>, BuildDbError> {
        if self.command_of(output)?.is_none() {
            return Ok(None);
        }
        let mut stmt = self
            .conn
            .prepare("SELECT input_path, mtime_ms FROM output_inputs WHERE output = ?1")?;
        let rows = stmt.query_map(params![output.to_string_lossy()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (path, ms) = row?;
            out.push((PathBuf::from(path), ms_to_mtime(ms)));
        }
        Ok(Some(out))
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Cached recursive listing of `dir`'s files, relative to `dir` (§4.7).
    pub fn scan_dir(&mut self, dir: &Path) -> Result<Vec<PathBuf>, BuildDbError> {
        crate::dirscan::collect(&mut self.conn, dir)
    }

    pub fn forget_dir(&self, dir: &Path) -> Result<(), BuildDbError> {
        crate::dirscan::forget(&self.conn, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_fetch_a_compilation() {
        let mut db = BuildDb::open_in_memory().unwrap();
        let out = PathBuf::from("build/a.o");
        let now = SystemTime::now();
        db.record_compilation(&out, "gcc -c a.c -o a.o", "", "hash1", 42, now).unwrap();
        let got = db.command_of(&out).unwrap().unwrap();
        assert_eq!(got.quoted_command, "gcc -c a.c -o a.o");
        assert_eq!(got.toolchain_hash, "hash1");
    }

    #[test]
    fn inputs_round_trip_and_forget_clears_them() {
        let mut db = BuildDb::open_in_memory().unwrap();
        let out = PathBuf::from("build/a.o");
        let now = SystemTime::now();
        db.record_compilation(&out, "cc a.c", "", "hash1", 1, now).unwrap();
        db.record_input(&out, Path::new("src/a.c"), now).unwrap();
        db.record_input(&out, Path::new("src/a.h"), now).unwrap();

        let inputs = db.inputs_of(&out).unwrap().unwrap();
        assert_eq!(inputs.len(), 2);

        db.forget_inputs_of(&out).unwrap();
        let inputs = db.inputs_of(&out).unwrap().unwrap();
        assert!(inputs.is_empty());
    }

    #[test]
    fn unknown_output_has_no_command_or_inputs() {
        let db = BuildDb::open_in_memory().unwrap();
        assert!(db.command_of(Path::new("nope.o")).unwrap().is_none());
        assert!(db.inputs_of(Path::new("nope.o")).unwrap().is_none());
    }
}
