//! Ordered, numbered schema migrations for the per-project build DB. Mirrors
//! `bpt-lockfile::migrations`'s `(version, sql)` + `schema_meta` pattern, but
//! for a file scoped to one project's build output root rather than the
//! catalog.
//!
//! Both the build-record tables (§4.5) and the directory scanner cache
//! tables (§4.7) live in this one migration set so that a single SQLite file
//! backs both: the scanner is "backed by the same build DB connection".

use rusqlite::{Connection, Transaction};

use crate::db::BuildDbError;

pub const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "CREATE TABLE schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);

         CREATE TABLE outputs (
             output          TEXT PRIMARY KEY,
             quoted_command  TEXT NOT NULL,
             compiler_output TEXT NOT NULL,
             toolchain_hash  TEXT NOT NULL,
             duration_ms     INTEGER NOT NULL,
             compile_start_ms INTEGER NOT NULL
         );
         CREATE TABLE output_inputs (
             output       TEXT NOT NULL REFERENCES outputs(output) ON DELETE CASCADE,
             input_path   TEXT NOT NULL,
             mtime_ms     INTEGER NOT NULL,
             UNIQUE(output, input_path)
         );
         CREATE INDEX idx_output_inputs_output ON output_inputs(output);

         CREATE TABLE scanned_dirs (
             dir_id  INTEGER PRIMARY KEY,
             dirpath TEXT NOT NULL UNIQUE
         );
         CREATE TABLE found_files (
             file_id INTEGER PRIMARY KEY,
             dir_id  INTEGER NOT NULL REFERENCES scanned_dirs(dir_id) ON DELETE CASCADE,
             relpath TEXT NOT NULL,
             UNIQUE(dir_id, relpath)
         );",
    ),
];

pub fn current_version(tx: &Transaction<'_>) -> Result<i64, BuildDbError> {
    let exists: bool = tx
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_meta'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !exists {
        return Ok(0);
    }
    tx.query_row("SELECT value FROM schema_meta WHERE key = 'version'", [], |row| {
        let v: String = row.get(0)?;
        Ok(v.parse::<i64>().unwrap_or(0))
    })
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(0),
        other => Err(BuildDbError::Sqlite(other)),
    })
}

pub fn run_migrations(conn: &mut Connection) -> Result<(), BuildDbError> {
    let tx = conn.transaction().map_err(BuildDbError::Sqlite)?;
    let mut version = current_version(&tx)?;
    for (v, sql) in MIGRATIONS {
        if *v > version {
            tx.execute_batch(sql).map_err(BuildDbError::Sqlite)?;
            version = *v;
        }
    }
    tx.execute(
        "INSERT INTO schema_meta(key, value) VALUES ('version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [version.to_string()],
    )
    .map_err(BuildDbError::Sqlite)?;
    tx.commit().map_err(BuildDbError::Sqlite)?;
    Ok(())
}
