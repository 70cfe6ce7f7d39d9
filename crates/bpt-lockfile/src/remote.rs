//! Remote catalog refresh: each remote publishes `<base-url>/repo.db`, an
//! entire SQLite database. We fetch it conditionally, attach it alongside
//! our own connection, and replace that remote's rows inside one
//! transaction, integrity-checking before we commit.

use std::io::Write as _;

use rusqlite::params;
use tracing::{info, warn};

use crate::db::CatalogDb;
use crate::error::CatalogError;

/// Refreshes every configured remote, skipping ones that are unreachable or
/// unchanged. A single remote's failure does not abort the others.
pub async fn update_all_remotes(db: &mut CatalogDb) -> Result<(), CatalogError> {
    let client = reqwest::Client::new();
    for (name, url) in db.remotes()? {
        if let Err(e) = update_one_remote(db, &client, &name, &url).await {
            warn!(remote = %name, error = %e, "remote refresh failed");
        }
    }
    Ok(())
}

async fn update_one_remote(
    db: &mut CatalogDb,
    client: &reqwest::Client,
    name: &str,
    url: &str,
) -> Result<(), CatalogError> {
    let repo_url = format!("{}/repo.db", url.trim_end_matches('/'));
    let (etag, mtime) = db.remote_cache_headers(name)?.unwrap_or((None, None));

    let mut req = client.get(&repo_url);
    if let Some(etag) = &etag {
        req = req.header(reqwest::header::IF_NONE_MATCH, etag);
    }
    if let Some(mtime) = &mtime {
        req = req.header(reqwest::header::IF_MODIFIED_SINCE, mtime);
    }

    let resp = req.send().await.map_err(|e| CatalogError::Network {
        remote: name.to_string(),
        message: e.to_string(),
    })?;

    if resp.status() == reqwest::StatusCode::NOT_MODIFIED {
        info!(remote = %name, "catalog unchanged");
        return Ok(());
    }
    if !resp.status().is_success() {
        return Err(CatalogError::Network {
            remote: name.to_string(),
            message: format!("unexpected status {}", resp.status()),
        });
    }

    let new_etag = resp.headers().get(reqwest::header::ETAG).and_then(|v| v.to_str().ok()).map(String::from);
    let new_mtime =
        resp.headers().get(reqwest::header::LAST_MODIFIED).and_then(|v| v.to_str().ok()).map(String::from);

    let bytes = resp.bytes().await.map_err(|e| CatalogError::Network {
        remote: name.to_string(),
        message: e.to_string(),
    })?;

    let tmp = tempfile::Builder::new().suffix(".repo.db").tempfile().map_err(|e| CatalogError::Network {
        remote: name.to_string(),
        message: e.to_string(),
    })?;
    tmp.as_file().write_all(&bytes).map_err(|e| CatalogError::Network {
        remote: name.to_string(),
        message: e.to_string(),
    })?;
    let tmp_path = tmp.path().to_str().ok_or_else(|| CatalogError::Corrupted {
        remote: name.to_string(),
        reason: "downloaded catalog path is not valid UTF-8".to_string(),
    })?;

    apply_remote_snapshot(db, name, tmp_path)?;
    db.add_remote(name, url)?;
    set_cache_headers(db, name, new_etag.as_deref(), new_mtime.as_deref())?;
    Ok(())
}

/// Attaches the downloaded database, wipes this remote's existing rows,
/// reinserts from the snapshot, integrity-checks, and commits — or rolls
/// back and reports `Corrupted` on any failure.
fn apply_remote_snapshot(db: &mut CatalogDb, remote: &str, snapshot_path: &str) -> Result<(), CatalogError> {
    let conn = db.conn_mut();
    conn.execute("ATTACH DATABASE ?1 AS remote_snapshot", params![snapshot_path])
        .map_err(|e| corrupted(remote, e))?;

    let result = (|| -> Result<(), CatalogError> {
        let tx = conn.unchecked_transaction().map_err(CatalogError::Sqlite)?;

        tx.execute(
            "DELETE FROM deps WHERE pkg_id IN (SELECT pkg_id FROM packages WHERE remote_id = ?1)",
            params![remote],
        )?;
        tx.execute("DELETE FROM packages WHERE remote_id = ?1", params![remote])?;

        tx.execute(
            "INSERT INTO packages(pkg_id, name, version, revision, description, remote_url, remote_id, meta_json)
             SELECT pkg_id, name, version, revision, description, ?1, ?1, meta_json FROM remote_snapshot.packages",
            params![remote],
        )
        .map_err(|e| corrupted(remote, e))?;

        tx.execute(
            "INSERT INTO deps(pkg_id, dep_name, low, high, uses_kind, uses_explicit_csv)
             SELECT pkg_id, dep_name, low, high, uses_kind, uses_explicit_csv FROM remote_snapshot.deps
             WHERE pkg_id IN (SELECT pkg_id FROM packages WHERE remote_id = ?1)",
            params![remote],
        )
        .map_err(|e| corrupted(remote, e))?;

        let fk_violations: i64 =
            tx.query_row("SELECT count(*) FROM pragma_foreign_key_check", [], |row| row.get(0))?;
        if fk_violations > 0 {
            return Err(CatalogError::Corrupted {
                remote: remote.to_string(),
                reason: format!("{fk_violations} foreign key violation(s) after merge"),
            });
        }

        let integrity: String = tx.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(CatalogError::Corrupted { remote: remote.to_string(), reason: integrity });
        }

        tx.commit().map_err(CatalogError::Sqlite)?;
        Ok(())
    })();

    conn.execute("DETACH DATABASE remote_snapshot", []).map_err(|e| corrupted(remote, e))?;
    if result.is_ok() {
        conn.execute_batch("VACUUM").map_err(|e| corrupted(remote, e))?;
    }
    result
}

fn corrupted(remote: &str, e: rusqlite::Error) -> CatalogError {
    CatalogError::Corrupted { remote: remote.to_string(), reason: e.to_string() }
}

fn set_cache_headers(
    db: &mut CatalogDb,
    name: &str,
    etag: Option<&str>,
    mtime: Option<&str>,
) -> Result<(), CatalogError> {
    db.conn_mut()
        .execute("UPDATE remotes SET etag = ?1, mtime = ?2 WHERE name = ?3", params![etag, mtime, name])?;
    Ok(())
}
