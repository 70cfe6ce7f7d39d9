//! `pkg.json`: the serialized form of [`bpt_types::PackageMeta`] stored at
//! the root of every sdist.

use bpt_types::PackageMeta;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

const SCHEMA_VERSION: i64 = 1;

/// The on-disk envelope: `schema-version` plus the fields of `PackageMeta`
/// flattened to the top level, matching the external interface named in §6.
#[derive(Debug, Serialize, Deserialize)]
struct PkgJsonEnvelope {
    #[serde(rename = "schema-version")]
    schema_version: i64,
    #[serde(flatten)]
    meta: PackageMeta,
}

pub fn parse_pkg_json(contents: &str) -> Result<PackageMeta, ManifestError> {
    let envelope: PkgJsonEnvelope =
        serde_json::from_str(contents).map_err(|e| ManifestError::Syntax(e.to_string()))?;
    if envelope.schema_version != SCHEMA_VERSION {
        return Err(ManifestError::SchemaVersion {
            found: envelope.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    envelope
        .meta
        .check_sibling_references()
        .map_err(|e| ManifestError::WrongShape { key: "libraries".into(), reason: e.to_string() })?;
    Ok(envelope.meta)
}

/// Serializes `meta` as `pkg.json`. The output never contains an
/// `implicit_uses_all` key — `UsesSpec` always serializes as one of
/// `implicit_all` / `explicit`, matching the spec's stability requirement.
pub fn write_pkg_json(meta: &PackageMeta) -> Result<String, ManifestError> {
    let envelope = PkgJsonEnvelope { schema_version: SCHEMA_VERSION, meta: meta.clone() };
    serde_json::to_string_pretty(&envelope).map_err(|e| ManifestError::Syntax(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpt_types::{LibraryInfo, Name, PackageId, Version};

    fn sample() -> PackageMeta {
        PackageMeta {
            id: PackageId::new(Name::parse("foo").unwrap(), Version::new(1, 0, 0), 1),
            libraries: vec![LibraryInfo::new(Name::parse("foo").unwrap(), "foo".into())],
            meta: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let meta = sample();
        let json = write_pkg_json(&meta).unwrap();
        let parsed = parse_pkg_json(&json).unwrap();
        assert_eq!(parsed.id, meta.id);
    }

    #[test]
    fn never_emits_implicit_uses_all_key() {
        let json = write_pkg_json(&sample()).unwrap();
        assert!(!json.contains("implicit_uses_all"));
    }

    #[test]
    fn rejects_wrong_schema_version() {
        let bad = r#"{"schema-version":2,"id":{"name":"foo","version":"1.0.0","revision":1},"libraries":[]}"#;
        assert!(matches!(parse_pkg_json(bad), Err(ManifestError::SchemaVersion { .. })));
    }
}
