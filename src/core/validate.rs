//! EV-006: Structural validation of a loaded schema cache.
//!
//! The JSON Schema is generated from the Rust cache types (`schemars`) and
//! checked with `jsonschema`, so the artifact contract cannot drift from the
//! serializer. Invariants the schema cannot express (non-empty composite
//! names) are checked afterwards. Failures name the violating field path as
//! a JSON pointer.

use super::error::CacheError;
use super::types::SchemaCache;
use serde_json::Value;
use std::path::Path;

/// One structural problem in a cache document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer into the document; empty for the root
    pub instance_path: String,
    pub message: String,
}

/// JSON Schema (draft-07) describing the cache artifact.
pub fn cache_json_schema() -> Value {
    let schema = schemars::schema_for!(SchemaCache);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

/// Rename legacy config keys so older artifacts validate.
pub fn upgrade_legacy(value: &mut Value) {
    let Some(config) = value.get_mut("config").and_then(Value::as_object_mut) else {
        return;
    };
    for (old, new) in [("entityConfigPaths", "sourcePatterns"), ("tsconfigPath", "aliasManifestPath")] {
        if !config.contains_key(new) {
            if let Some(v) = config.remove(old) {
                config.insert(new.to_string(), v);
            }
        }
    }
}

/// Every violation in `value`, structural ones first.
pub fn violations(value: &Value) -> Vec<Violation> {
    let mut opts = jsonschema::options();
    opts.with_draft(jsonschema::Draft::Draft7);
    let validator = match opts.build(&cache_json_schema()) {
        Ok(v) => v,
        Err(e) => {
            return vec![Violation {
                instance_path: String::new(),
                message: format!("cannot compile cache schema: {e}"),
            }]
        }
    };

    let mut found: Vec<Violation> = validator
        .iter_errors(value)
        .map(|e| Violation {
            instance_path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if found.is_empty() {
        found.extend(composite_violations(value));
    }
    found
}

/// Validate a cache document read from `path`.
pub fn validate_value(path: &Path, value: &Value) -> Result<(), CacheError> {
    let mut upgraded = value.clone();
    upgrade_legacy(&mut upgraded);
    match violations(&upgraded).into_iter().next() {
        None => Ok(()),
        Some(v) => Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            field_path: if v.instance_path.is_empty() { "/".to_string() } else { v.instance_path },
            reason: v.message,
        }),
    }
}

fn composite_violations(value: &Value) -> Vec<Violation> {
    let mut found = Vec::new();
    let entities = value.get("entities").and_then(Value::as_array);
    for (i, entity) in entities.into_iter().flatten().enumerate() {
        let indexes = entity.get("indexes").and_then(Value::as_object);
        for (name, idx) in indexes.into_iter().flatten() {
            for part in ["pk", "sk"] {
                let composite = idx.pointer(&format!("/{part}/composite")).and_then(Value::as_array);
                for (j, entry) in composite.into_iter().flatten().enumerate() {
                    if entry.as_str().is_some_and(str::is_empty) {
                        found.push(Violation {
                            instance_path: format!(
                                "/entities/{i}/indexes/{}/{part}/composite/{j}",
                                escape_pointer(name)
                            ),
                            message: "composite attribute name is empty".to_string(),
                        });
                    }
                }
            }
        }
    }
    found
}

fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_doc() -> Value {
        json!({
            "entities": [{
                "name": "company",
                "version": "1",
                "service": "model",
                "sourceFile": "entities/company.json",
                "indexes": {
                    "primary": {
                        "pk": {"field": "pk", "composite": []},
                        "sk": {"field": "sk", "composite": ["companyId"]}
                    }
                },
                "attributes": {
                    "companyId": {"type": "string", "required": true},
                    "tags": {"type": "list", "items": "string"}
                }
            }],
            "generatedAt": "2026-02-16T14:00:00.000Z",
            "config": {"sourcePatterns": ["entities/*.json"]}
        })
    }

    #[test]
    fn test_ev006_schema_generated() {
        let schema = cache_json_schema();
        assert!(schema.get("properties").unwrap().get("generatedAt").is_some());
    }

    #[test]
    fn test_ev006_valid_document() {
        assert!(violations(&valid_doc()).is_empty());
        assert!(validate_value(Path::new("schema.json"), &valid_doc()).is_ok());
    }

    #[test]
    fn test_ev006_wrong_type_names_path() {
        let mut doc = valid_doc();
        doc["entities"][0]["name"] = json!(42);
        let err = validate_value(Path::new("schema.json"), &doc).unwrap_err();
        match err {
            CacheError::Corrupt { field_path, .. } => assert_eq!(field_path, "/entities/0/name"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ev006_unknown_attribute_type() {
        let mut doc = valid_doc();
        doc["entities"][0]["attributes"]["companyId"]["type"] = json!("any");
        let v = violations(&doc);
        assert!(!v.is_empty());
        assert!(v[0].instance_path.starts_with("/entities/0/attributes/companyId"));
    }

    #[test]
    fn test_ev006_missing_required_field() {
        let mut doc = valid_doc();
        doc.as_object_mut().unwrap().remove("generatedAt");
        let err = validate_value(Path::new("schema.json"), &doc).unwrap_err();
        assert!(err.to_string().contains("generatedAt"));
    }

    #[test]
    fn test_ev006_empty_composite_rejected() {
        let mut doc = valid_doc();
        doc["entities"][0]["indexes"]["primary"]["sk"]["composite"] = json!(["companyId", ""]);
        let err = validate_value(Path::new("schema.json"), &doc).unwrap_err();
        match err {
            CacheError::Corrupt { field_path, .. } => {
                assert_eq!(field_path, "/entities/0/indexes/primary/sk/composite/1")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ev006_legacy_config_accepted() {
        let mut doc = valid_doc();
        doc["config"] = json!({"entityConfigPaths": ["a.ts"], "tsconfigPath": "tsconfig.json"});
        assert!(validate_value(Path::new("schema.json"), &doc).is_ok());
    }

    #[test]
    fn test_ev006_escape_pointer() {
        assert_eq!(escape_pointer("a/b~c"), "a~1b~0c");
    }
}
