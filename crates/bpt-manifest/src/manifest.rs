//! The project manifest (`bpt.yaml` / `pkg.json` on disk), and its in-memory
//! model.

use std::collections::BTreeSet;
use std::path::Path;

use bpt_types::{Dependency, LibraryInfo, Name, UsesSpec, Version, VersionRangeSet};
use serde_json::Value;

use crate::error::ManifestError;
use crate::shorthand::parse_shorthand;
use crate::walker::{walk, KeyHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestDriver {
    Catch,
    CatchMain,
}

impl TestDriver {
    fn parse(s: &str) -> Result<TestDriver, ManifestError> {
        match s {
            "Catch" => Ok(TestDriver::Catch),
            "Catch-Main" => Ok(TestDriver::CatchMain),
            other => Err(ManifestError::WrongShape {
                key: "test_driver".to_string(),
                reason: format!("unrecognized test driver '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectManifest {
    pub name: Option<Name>,
    pub version: Option<Version>,
    pub namespace: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub libraries: Vec<LibraryInfo>,
    pub test_driver: Option<TestDriver>,
}

const KEYS: &[&str] =
    &["name", "version", "namespace", "depends", "dependencies", "libraries", "test_driver"];

impl ProjectManifest {
    pub fn from_yaml_str(contents: &str) -> Result<ProjectManifest, ManifestError> {
        let value: Value =
            serde_yaml::from_str(contents).map_err(|e| ManifestError::Syntax(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_json_str(contents: &str) -> Result<ProjectManifest, ManifestError> {
        let value: Value =
            serde_json::from_str(contents).map_err(|e| ManifestError::Syntax(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn load(path: &Path) -> Result<ProjectManifest, ManifestError> {
        tracing::debug!(path = %path.display(), "loading project manifest");
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::Syntax(format!("reading {}: {e}", path.display())))?;
        let result = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        };
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "manifest failed to parse");
        }
        result
    }

    fn from_value(value: &Value) -> Result<ProjectManifest, ManifestError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ManifestError::Syntax("manifest root must be an object".to_string()))?;

        let table: &[KeyHandler<'_, ProjectManifest>] = &[
            KeyHandler { key: "name", required: true, apply: apply_name },
            KeyHandler { key: "version", required: true, apply: apply_version },
            KeyHandler { key: "namespace", required: false, apply: apply_namespace },
            KeyHandler { key: "depends", required: false, apply: apply_dependencies },
            KeyHandler { key: "dependencies", required: false, apply: apply_dependencies },
            KeyHandler { key: "libraries", required: false, apply: apply_libraries },
            KeyHandler { key: "test_driver", required: false, apply: apply_test_driver },
        ];

        let mut manifest = ProjectManifest::default();
        walk(obj, table, &mut manifest)?;
        Ok(manifest)
    }
}

fn apply_name(m: &mut ProjectManifest, v: &Value) -> Result<(), ManifestError> {
    let s = v
        .as_str()
        .ok_or_else(|| ManifestError::WrongShape { key: "name".into(), reason: "expected a string".into() })?;
    m.name = Some(Name::parse(s)?);
    Ok(())
}

fn apply_version(m: &mut ProjectManifest, v: &Value) -> Result<(), ManifestError> {
    let s = v
        .as_str()
        .ok_or_else(|| ManifestError::WrongShape { key: "version".into(), reason: "expected a string".into() })?;
    m.version = Some(Version::parse(s)?);
    Ok(())
}

fn apply_namespace(m: &mut ProjectManifest, v: &Value) -> Result<(), ManifestError> {
    m.namespace = v.as_str().map(str::to_string);
    Ok(())
}

fn apply_dependencies(m: &mut ProjectManifest, v: &Value) -> Result<(), ManifestError> {
    let items = v.as_array().ok_or_else(|| ManifestError::WrongShape {
        key: "dependencies".into(),
        reason: "expected an array".into(),
    })?;
    for item in items {
        m.dependencies.push(parse_dependency_entry(item)?);
    }
    Ok(())
}

fn parse_dependency_entry(item: &Value) -> Result<Dependency, ManifestError> {
    if let Some(s) = item.as_str() {
        return Ok(parse_shorthand(s)?);
    }
    let obj = item.as_object().ok_or_else(|| ManifestError::WrongShape {
        key: "dependencies[]".into(),
        reason: "expected a string or an object".into(),
    })?;
    let name = obj
        .get("dep")
        .and_then(Value::as_str)
        .ok_or_else(|| ManifestError::WrongShape { key: "dep".into(), reason: "required".into() })?;
    let name = Name::parse(name)?;

    let mut acceptable = VersionRangeSet::empty();
    if let Some(ranges) = obj.get("versions").and_then(Value::as_array) {
        for r in ranges {
            let low = r
                .get("low")
                .and_then(Value::as_str)
                .ok_or_else(|| ManifestError::WrongShape { key: "low".into(), reason: "required".into() })?;
            let high = r
                .get("high")
                .and_then(Value::as_str)
                .ok_or_else(|| ManifestError::WrongShape { key: "high".into(), reason: "required".into() })?;
            acceptable = acceptable.union(&VersionRangeSet::single_range(
                Version::parse(low)?,
                Version::parse(high)?,
            ));
        }
    }

    let uses = match obj.get("using").and_then(Value::as_array) {
        Some(names) => {
            let set: Result<BTreeSet<Name>, _> = names
                .iter()
                .map(|n| Name::parse(n.as_str().unwrap_or_default()))
                .collect();
            UsesSpec::Explicit(set?)
        }
        None => UsesSpec::ImplicitAll,
    };

    Ok(Dependency::new(name, acceptable, uses))
}

fn apply_libraries(m: &mut ProjectManifest, v: &Value) -> Result<(), ManifestError> {
    let items = v
        .as_array()
        .ok_or_else(|| ManifestError::WrongShape { key: "libraries".into(), reason: "expected an array".into() })?;
    for item in items {
        m.libraries.push(parse_library_entry(item)?);
    }
    Ok(())
}

fn parse_library_entry(item: &Value) -> Result<LibraryInfo, ManifestError> {
    let obj = item
        .as_object()
        .ok_or_else(|| ManifestError::WrongShape { key: "libraries[]".into(), reason: "expected an object".into() })?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ManifestError::WrongShape { key: "name".into(), reason: "required".into() })?;
    let name = Name::parse(name)?;
    let path = obj.get("path").and_then(Value::as_str).unwrap_or(name.as_str()).into();

    let mut lib = LibraryInfo::new(name, path);

    if let Some(using) = obj.get("using").and_then(Value::as_array) {
        for n in using {
            lib.intra_uses.insert(Name::parse(n.as_str().unwrap_or_default())?);
        }
    }
    if let Some(using) = obj.get("test-using").and_then(Value::as_array) {
        for n in using {
            lib.intra_test_uses.insert(Name::parse(n.as_str().unwrap_or_default())?);
        }
    }
    if let Some(deps) = obj.get("dependencies").and_then(Value::as_array) {
        for d in deps {
            lib.dependencies.push(parse_dependency_entry(d)?);
        }
    }
    if let Some(deps) = obj.get("test-dependencies").and_then(Value::as_array) {
        for d in deps {
            lib.test_dependencies.push(parse_dependency_entry(d)?);
        }
    }

    Ok(lib)
}

fn apply_test_driver(m: &mut ProjectManifest, v: &Value) -> Result<(), ManifestError> {
    let s = v.as_str().ok_or_else(|| ManifestError::WrongShape {
        key: "test_driver".into(),
        reason: "expected a string".into(),
    })?;
    m.test_driver = Some(TestDriver::parse(s)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let yaml = "name: foo\nversion: 1.2.3\n";
        let m = ProjectManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(m.name.unwrap().as_str(), "foo");
        assert_eq!(m.version.unwrap().to_string(), "1.2.3");
    }

    #[test]
    fn parses_shorthand_dependency_array() {
        let yaml = "name: foo\nversion: 1.0.0\ndepends:\n  - bar@1.2.3\n";
        let m = ProjectManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(m.dependencies.len(), 1);
        assert_eq!(m.dependencies[0].name.as_str(), "bar");
    }

    #[test]
    fn rejects_unknown_key() {
        let yaml = "name: foo\nversion: 1.0.0\nbogus: 1\n";
        assert!(matches!(
            ProjectManifest::from_yaml_str(yaml),
            Err(ManifestError::UnknownKey { .. })
        ));
    }

    #[test]
    fn scenario_f_rejects_partial_semver() {
        let json = r#"{"name":"foo","version":"1.2","depends":{}}"#;
        assert!(ProjectManifest::from_json_str(json).is_err());
        let json2 = r#"{"name":"foo","version":"1.2.3"}"#;
        assert!(ProjectManifest::from_json_str(json2).is_ok());
    }

    #[test]
    fn scenario_g_detects_intra_package_cycle() {
        let yaml = "name: foo\nversion: 1.0.0\nlibraries:\n  - name: a\n    using: [b]\n  - name: b\n    using: [a]\n";
        let m = ProjectManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(m.libraries.len(), 2);
        // Cycle detection itself is the resolver/planner's job; here we only
        // assert both edges parsed so the planner has what it needs to find it.
        assert!(m.libraries[0].intra_uses.contains(&Name::parse("b").unwrap()));
        assert!(m.libraries[1].intra_uses.contains(&Name::parse("a").unwrap()));
    }
}
