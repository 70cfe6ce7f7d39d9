//! Declarative schema ingestion: a data-driven table of `(key, required?,
//! action)` entries applied by one generic walker, rather than a templated
//! metaprogramming DSL (Design Note 6).

use serde_json::{Map, Value};

use crate::error::ManifestError;

/// One recognized key in a JSON/YAML object, and what to do with its value.
pub struct KeyHandler<'a, T> {
    pub key: &'a str,
    pub required: bool,
    pub apply: fn(&mut T, &Value) -> Result<(), ManifestError>,
}

/// Applies every handler in `table` to `obj`, writing into `target`.
/// Unknown top-level keys are rejected with a closest-match suggestion;
/// missing required keys are rejected by name.
pub fn walk<T>(
    obj: &Map<String, Value>,
    table: &[KeyHandler<'_, T>],
    target: &mut T,
) -> Result<(), ManifestError> {
    let known: Vec<&str> = table.iter().map(|h| h.key).collect();

    for key in obj.keys() {
        if !known.contains(&key.as_str()) {
            return Err(ManifestError::unknown_key(key.clone(), &known));
        }
    }

    for handler in table {
        match obj.get(handler.key) {
            Some(value) => (handler.apply)(target, value)?,
            None if handler.required => {
                return Err(ManifestError::MissingKey(handler.key.to_string()))
            }
            None => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Sink {
        name: String,
    }

    fn set_name(sink: &mut Sink, v: &Value) -> Result<(), ManifestError> {
        sink.name = v.as_str().unwrap_or_default().to_string();
        Ok(())
    }

    #[test]
    fn applies_known_key() {
        let table = [KeyHandler { key: "name", required: true, apply: set_name }];
        let obj: Map<String, Value> =
            serde_json::from_str(r#"{"name": "foo"}"#).unwrap();
        let mut sink = Sink::default();
        walk(&obj, &table, &mut sink).unwrap();
        assert_eq!(sink.name, "foo");
    }

    #[test]
    fn rejects_unknown_key_with_suggestion() {
        let table = [KeyHandler { key: "name", required: true, apply: set_name }];
        let obj: Map<String, Value> =
            serde_json::from_str(r#"{"nam": "foo"}"#).unwrap();
        let mut sink = Sink::default();
        let err = walk(&obj, &table, &mut sink).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownKey { .. }));
    }

    #[test]
    fn rejects_missing_required_key() {
        let table = [KeyHandler { key: "name", required: true, apply: set_name }];
        let obj: Map<String, Value> = serde_json::from_str(r#"{}"#).unwrap();
        let mut sink = Sink::default();
        assert!(matches!(
            walk(&obj, &table, &mut sink),
            Err(ManifestError::MissingKey(_))
        ));
    }
}
