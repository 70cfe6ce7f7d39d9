//! The catalog/cache database: `(name, version, revision) -> package
//! metadata`, remote origin, local extraction path.

use std::collections::BTreeSet;
use std::path::Path;

use bpt_types::{Dependency, Name, PackageId, PackageMeta, UsesSpec, Version, VersionRangeSet};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CatalogError;
use crate::migrations::run_migrations;

pub struct CatalogDb {
    conn: Connection,
}

fn pkg_id_str(id: &PackageId) -> String {
    id.to_string()
}

impl CatalogDb {
    pub fn open(path: &Path) -> Result<CatalogDb, CatalogError> {
        let mut conn = Connection::open(path)?;
        run_migrations(&mut conn)?;
        Ok(CatalogDb { conn })
    }

    pub fn open_in_memory() -> Result<CatalogDb, CatalogError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(CatalogDb { conn })
    }

    /// Upserts `meta`, replacing any previously stored dependency rows for
    /// this package id, flattened from every library's `dependencies`.
    pub fn store(&mut self, meta: &PackageMeta, remote_url: Option<&str>) -> Result<(), CatalogError> {
        let tx = self.conn.transaction()?;
        let pkg_id = pkg_id_str(&meta.id);
        let meta_json = serde_json::to_string(meta)?;

        tx.execute(
            "INSERT INTO packages(pkg_id, name, version, revision, description, remote_url, remote_id, meta_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)
             ON CONFLICT(pkg_id) DO UPDATE SET
                 description = excluded.description,
                 remote_url  = excluded.remote_url,
                 meta_json   = excluded.meta_json",
            params![
                pkg_id,
                meta.id.name.as_str(),
                meta.id.version.to_string(),
                meta.id.revision,
                Option::<String>::None,
                remote_url,
                meta_json,
            ],
        )?;

        tx.execute("DELETE FROM deps WHERE pkg_id = ?1", params![pkg_id])?;
        for lib in &meta.libraries {
            for dep in &lib.dependencies {
                insert_dep(&tx, &pkg_id, dep)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All packages, ordered `(version desc, revision desc)`.
    pub fn all(&self) -> Result<Vec<PackageMeta>, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT meta_json FROM packages")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    pub fn by_name(&self, name: &Name) -> Result<Vec<PackageMeta>, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT meta_json FROM packages WHERE name = ?1")?;
        let rows = stmt.query_map(params![name.as_str()], |row| row.get::<_, String>(0))?;
        let mut out: Vec<PackageMeta> = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Reconstructs the flattened dependency list for a package (not its
    /// libraries — library structure lives in the packaged metadata JSON).
    pub fn dependencies_of(&self, pkg_id: &PackageId) -> Result<Vec<Dependency>, CatalogError> {
        let key = pkg_id_str(pkg_id);
        let mut stmt = self
            .conn
            .prepare("SELECT dep_name, low, high, uses_kind, uses_explicit_csv FROM deps WHERE pkg_id = ?1")?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (name, low, high, kind, explicit_csv) = row?;
            let name = Name::parse(&name).map_err(|e| CatalogError::Corrupted {
                remote: String::new(),
                reason: e.to_string(),
            })?;
            let low = Version::parse(&low)
                .map_err(|e| CatalogError::Corrupted { remote: String::new(), reason: e.to_string() })?;
            let high = Version::parse(&high)
                .map_err(|e| CatalogError::Corrupted { remote: String::new(), reason: e.to_string() })?;
            let acceptable = VersionRangeSet::single_range(low, high);
            let uses = if kind == "implicit_all" {
                UsesSpec::ImplicitAll
            } else {
                let set: Result<BTreeSet<Name>, _> = explicit_csv
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(Name::parse)
                    .collect();
                UsesSpec::Explicit(set.map_err(|e| CatalogError::Corrupted {
                    remote: String::new(),
                    reason: e.to_string(),
                })?)
            };
            out.push(Dependency::new(name, acceptable, uses));
        }
        Ok(out)
    }

    /// Full metadata for `name`, optionally pinned to `version`; highest
    /// `(version, revision)` when unpinned.
    pub fn for_package(&self, name: &Name, version: Option<&Version>) -> Result<Option<PackageMeta>, CatalogError> {
        let candidates = self.by_name(name)?;
        let found = match version {
            Some(v) => candidates.into_iter().find(|m| &m.id.version == v),
            None => candidates.into_iter().next(),
        };
        Ok(found)
    }

    pub fn add_remote(&mut self, name: &str, url: &str) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT INTO remotes(name, url, etag, mtime) VALUES (?1, ?2, NULL, NULL)
             ON CONFLICT(name) DO UPDATE SET url = excluded.url",
            params![name, url],
        )?;
        Ok(())
    }

    pub fn remove_remote(&mut self, name: &str) -> Result<(), CatalogError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM deps WHERE pkg_id IN (SELECT pkg_id FROM packages WHERE remote_id = ?1)",
            params![name],
        )?;
        tx.execute("DELETE FROM packages WHERE remote_id = ?1", params![name])?;
        tx.execute("DELETE FROM remotes WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(())
    }

    pub fn remotes(&self) -> Result<Vec<(String, String)>, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT name, url FROM remotes")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The remote a package record came from, and that remote's base URL —
    /// `None` for a package with no recorded origin (e.g. a local path
    /// dependency imported directly into the cache).
    pub fn remote_of(&self, pkg_id: &PackageId) -> Result<Option<(String, String, String)>, CatalogError> {
        let key = pkg_id_str(pkg_id);
        self.conn
            .query_row(
                "SELECT packages.remote_url, remotes.name, remotes.url
                 FROM packages JOIN remotes ON packages.remote_id = remotes.name
                 WHERE packages.pkg_id = ?1",
                params![key],
                |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                },
            )
            .optional()
            .map_err(CatalogError::Sqlite)
    }

    pub fn remote_cache_headers(&self, name: &str) -> Result<Option<(Option<String>, Option<String>)>, CatalogError> {
        self.conn
            .query_row("SELECT etag, mtime FROM remotes WHERE name = ?1", params![name], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .optional()
            .map_err(CatalogError::Sqlite)
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn insert_dep(tx: &rusqlite::Transaction<'_>, pkg_id: &str, dep: &Dependency) -> Result<(), CatalogError> {
    let (kind, csv) = match &dep.uses {
        UsesSpec::ImplicitAll => ("implicit_all".to_string(), String::new()),
        UsesSpec::Explicit(set) => {
            ("explicit".to_string(), set.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(","))
        }
    };
    let (low, high) = dep
        .acceptable
        .intervals()
        .first()
        .map(|iv| (iv.low.to_string(), iv.high.to_string()))
        .unwrap_or_else(|| ("0.0.0".to_string(), "0.0.0".to_string()));
    tx.execute(
        "INSERT INTO deps(pkg_id, dep_name, low, high, uses_kind, uses_explicit_csv) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![pkg_id, dep.name.as_str(), low, high, kind, csv],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpt_types::LibraryInfo;

    fn meta(version: &str, revision: u32) -> PackageMeta {
        PackageMeta {
            id: PackageId::new(Name::parse("foo").unwrap(), Version::parse(version).unwrap(), revision),
            libraries: vec![LibraryInfo::new(Name::parse("foo").unwrap(), std::path::PathBuf::from("foo"))],
            meta: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn store_and_retrieve() {
        let mut db = CatalogDb::open_in_memory().unwrap();
        db.store(&meta("1.0.0", 1), None).unwrap();
        let all = db.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.version.to_string(), "1.0.0");
    }

    #[test]
    fn by_name_orders_version_desc_then_revision_desc() {
        let mut db = CatalogDb::open_in_memory().unwrap();
        db.store(&meta("1.0.0", 1), None).unwrap();
        db.store(&meta("2.0.0", 1), None).unwrap();
        db.store(&meta("2.0.0", 2), None).unwrap();
        let all = db.by_name(&Name::parse("foo").unwrap()).unwrap();
        assert_eq!(all[0].id.version.to_string(), "2.0.0");
        assert_eq!(all[0].id.revision, 2);
        assert_eq!(all[2].id.version.to_string(), "1.0.0");
    }

    #[test]
    fn dependencies_of_reconstructs_flattened_deps() {
        let mut db = CatalogDb::open_in_memory().unwrap();
        let mut m = meta("1.0.0", 1);
        let mut lib = m.libraries.pop().unwrap();
        lib.dependencies.push(Dependency::new(
            Name::parse("bar").unwrap(),
            VersionRangeSet::single_range(Version::new(1, 0, 0), Version::new(2, 0, 0)),
            UsesSpec::ImplicitAll,
        ));
        m.libraries.push(lib);
        db.store(&m, None).unwrap();

        let deps = db.dependencies_of(&m.id).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name.as_str(), "bar");
    }

    #[test]
    fn for_package_without_version_returns_highest() {
        let mut db = CatalogDb::open_in_memory().unwrap();
        db.store(&meta("1.0.0", 1), None).unwrap();
        db.store(&meta("2.0.0", 1), None).unwrap();
        let found = db.for_package(&Name::parse("foo").unwrap(), None).unwrap().unwrap();
        assert_eq!(found.id.version.to_string(), "2.0.0");
    }
}
