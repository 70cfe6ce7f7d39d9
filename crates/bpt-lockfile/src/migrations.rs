//! Ordered, numbered schema migrations. Applied inside a single transaction
//! at open; the current version is tracked in `schema_meta`.

use rusqlite::{Connection, Transaction};

use crate::CatalogError;

pub const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "CREATE TABLE schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
         CREATE TABLE remotes (
             name  TEXT PRIMARY KEY,
             url   TEXT NOT NULL,
             etag  TEXT,
             mtime TEXT
         );
         CREATE TABLE packages (
             pkg_id     TEXT PRIMARY KEY,
             name       TEXT NOT NULL,
             version    TEXT NOT NULL,
             revision   INTEGER NOT NULL,
             description TEXT,
             remote_url TEXT,
             remote_id  TEXT REFERENCES remotes(name) ON DELETE SET NULL,
             meta_json  TEXT NOT NULL
         );
         CREATE INDEX idx_packages_name ON packages(name);
         CREATE TABLE deps (
             dep_id   INTEGER PRIMARY KEY AUTOINCREMENT,
             pkg_id   TEXT NOT NULL REFERENCES packages(pkg_id) ON DELETE CASCADE,
             dep_name TEXT NOT NULL,
             low      TEXT NOT NULL,
             high     TEXT NOT NULL,
             uses_kind TEXT NOT NULL,
             uses_explicit_csv TEXT NOT NULL DEFAULT ''
         );
         CREATE INDEX idx_deps_pkg_id ON deps(pkg_id);",
    ),
];

pub fn current_version(tx: &Transaction<'_>) -> Result<i64, CatalogError> {
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
        other => Err(CatalogError::Sqlite(other)),
    })
}

pub fn run_migrations(conn: &mut Connection) -> Result<(), CatalogError> {
    let tx = conn.transaction().map_err(CatalogError::Sqlite)?;
    let mut version = current_version(&tx)?;
    for (v, sql) in MIGRATIONS {
        if *v > version {
            tx.execute_batch(sql).map_err(CatalogError::Sqlite)?;
            version = *v;
        }
    }
    tx.execute(
        "INSERT INTO schema_meta(key, value) VALUES ('version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [version.to_string()],
    )
    .map_err(CatalogError::Sqlite)?;
    tx.commit().map_err(CatalogError::Sqlite)?;
    Ok(())
}
