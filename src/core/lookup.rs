//! EV-008: Lookup plans and item preparation for the storage client.
//!
//! The engine never talks to the store. It hands the caller either a plan
//! (exact get or partition query) or a fully keyed item ready to put.

use super::error::{Error, KeyShapeError};
use super::keys::{build_key, ValueSource};
use super::types::{EntitySchema, IndexDef};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Item attribute holding the entity name.
pub const ENTITY_ATTR: &str = "__edb_e__";

/// Item attribute holding the entity version.
pub const VERSION_ATTR: &str = "__edb_v__";

/// Equality condition on one physical key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCondition {
    pub field: String,
    pub value: String,
}

/// How the storage client should fetch items for one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum LookupPlan {
    /// Exact primary-key read
    Get { key: IndexMap<String, String> },
    /// Partition query, filtered to the entity
    #[serde(rename_all = "camelCase")]
    Query {
        #[serde(skip_serializing_if = "Option::is_none")]
        index_name: Option<String>,
        partition: KeyCondition,
        #[serde(skip_serializing_if = "Option::is_none")]
        sort: Option<KeyCondition>,
        entity_filter: KeyCondition,
    },
}

fn index_def<'a>(schema: &'a EntitySchema, index: &str) -> Result<&'a IndexDef, Error> {
    schema.indexes.get(index).ok_or_else(|| {
        Error::Lookup(format!(
            "index '{}' not found on entity '{}' (available: {})",
            index,
            schema.name,
            schema.indexes.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        ))
    })
}

fn has_value(values: &impl ValueSource, field: &str) -> bool {
    values.key_value(field).is_some_and(|v| !v.trim().is_empty())
}

/// Plan a lookup on `index`.
///
/// The sort key takes part when its composite is empty or any of its values
/// is non-blank. A primary-index lookup with a sort key is an exact get;
/// everything else is a partition query.
pub fn plan_lookup(
    schema: &EntitySchema,
    index: &str,
    pk_values: &impl ValueSource,
    sk_values: &impl ValueSource,
) -> Result<LookupPlan, Error> {
    let def = index_def(schema, index)?;
    let identity = schema.identity();

    let partition = KeyCondition {
        field: def.pk.field.clone(),
        value: build_key(true, &def.pk.composite, pk_values, &identity),
    };

    let sort = def
        .sk
        .as_ref()
        .filter(|sk| sk.is_static() || sk.composite.iter().any(|f| has_value(sk_values, f)))
        .map(|sk| KeyCondition {
            field: sk.field.clone(),
            value: build_key(false, &sk.composite, sk_values, &identity),
        });

    if schema.is_primary(index) {
        if let Some(sort) = &sort {
            let mut key = IndexMap::new();
            key.insert(partition.field, partition.value);
            key.insert(sort.field.clone(), sort.value.clone());
            return Ok(LookupPlan::Get { key });
        }
    }

    Ok(LookupPlan::Query {
        index_name: def.index_name.clone(),
        partition,
        sort,
        entity_filter: KeyCondition {
            field: ENTITY_ATTR.to_string(),
            value: schema.name.clone(),
        },
    })
}

/// Composite attributes of `index` that have no value yet, PK first.
pub fn missing_key_attributes(
    schema: &EntitySchema,
    index: &str,
    values: &impl ValueSource,
) -> Result<Vec<String>, Error> {
    let def = index_def(schema, index)?;
    let sk = def.sk.iter().flat_map(|sk| sk.composite.iter());
    Ok(def
        .pk
        .composite
        .iter()
        .chain(sk)
        .filter(|f| !has_value(values, f))
        .cloned()
        .collect())
}

/// Add identity markers and every index's key attributes to `item`.
///
/// Fails when a primary-index composite attribute has no value; secondary
/// keys render with empty segments for sparse attributes.
pub fn prepare_item(schema: &EntitySchema, item: &Map<String, Value>) -> Result<Map<String, Value>, KeyShapeError> {
    if let Some((primary, _)) = schema.primary_index() {
        let missing = missing_key_attributes(schema, primary, item).unwrap_or_default();
        if !missing.is_empty() {
            return Err(KeyShapeError {
                entity: schema.name.clone(),
                index: primary.to_string(),
                missing,
            });
        }
    }

    let identity = schema.identity();
    let mut out = item.clone();
    out.insert(ENTITY_ATTR.to_string(), Value::String(schema.name.clone()));
    out.insert(VERSION_ATTR.to_string(), Value::String(schema.version.clone()));

    for def in schema.indexes.values() {
        out.insert(
            def.pk.field.clone(),
            Value::String(build_key(true, &def.pk.composite, item, &identity)),
        );
        if let Some(sk) = &def.sk {
            out.insert(
                sk.field.clone(),
                Value::String(build_key(false, &sk.composite, item, &identity)),
            );
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttributeDef, AttributeType, KeyPart};
    use serde_json::json;
    use std::collections::HashMap;

    fn part(field: &str, composite: &[&str]) -> KeyPart {
        KeyPart {
            field: field.to_string(),
            composite: composite.iter().map(|s| s.to_string()).collect(),
            template: None,
        }
    }

    fn employee() -> EntitySchema {
        let mut indexes = IndexMap::new();
        indexes.insert(
            "employee".to_string(),
            IndexDef {
                index_name: None,
                pk: part("pk", &["employee"]),
                sk: Some(part("sk", &[])),
            },
        );
        indexes.insert(
            "coworkers".to_string(),
            IndexDef {
                index_name: Some("gsi1".to_string()),
                pk: part("gsi1pk", &["office"]),
                sk: Some(part("gsi1sk", &["team", "title"])),
            },
        );
        let mut attributes = IndexMap::new();
        for a in ["employee", "office", "team", "title"] {
            attributes.insert(a.to_string(), AttributeDef::of(AttributeType::String));
        }
        EntitySchema {
            name: "employee".to_string(),
            version: "1".to_string(),
            service: "TaskApp".to_string(),
            source_file: "employee.ts".to_string(),
            indexes,
            attributes,
            warnings: vec![],
        }
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_ev008_primary_with_static_sk_is_get() {
        let plan = plan_lookup(&employee(), "employee", &values(&[("employee", "e1")]), &values(&[])).unwrap();
        match plan {
            LookupPlan::Get { key } => {
                assert_eq!(key["pk"], "$taskapp#employee_e1");
                assert_eq!(key["sk"], "$employee_1");
            }
            other => panic!("expected get, got {other:?}"),
        }
    }

    #[test]
    fn test_ev008_secondary_is_query_with_filter() {
        let plan = plan_lookup(
            &employee(),
            "coworkers",
            &values(&[("office", "Portland")]),
            &values(&[("team", ""), ("title", "  ")]),
        )
        .unwrap();
        match plan {
            LookupPlan::Query {
                index_name,
                partition,
                sort,
                entity_filter,
            } => {
                assert_eq!(index_name.as_deref(), Some("gsi1"));
                assert_eq!(partition.field, "gsi1pk");
                assert_eq!(partition.value, "$taskapp#office_Portland");
                assert!(sort.is_none(), "blank sk values must not constrain the query");
                assert_eq!(entity_filter.field, "__edb_e__");
                assert_eq!(entity_filter.value, "employee");
            }
            other => panic!("expected query, got {other:?}"),
        }
    }

    #[test]
    fn test_ev008_partial_sk_renders_empty_segments() {
        let plan = plan_lookup(
            &employee(),
            "coworkers",
            &values(&[("office", "Portland")]),
            &values(&[("team", "dev")]),
        )
        .unwrap();
        let LookupPlan::Query { sort, .. } = plan else {
            panic!("expected query");
        };
        assert_eq!(sort.unwrap().value, "$employee_1#team_dev#title_");
    }

    #[test]
    fn test_ev008_unknown_index() {
        let err = plan_lookup(&employee(), "nope", &values(&[]), &values(&[])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'nope'"));
        assert!(msg.contains("employee, coworkers"));
    }

    #[test]
    fn test_ev008_plan_serializes_tagged() {
        let plan = plan_lookup(&employee(), "coworkers", &values(&[("office", "x")]), &values(&[])).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["operation"], "query");
        assert_eq!(json["indexName"], "gsi1");
        assert_eq!(json["entityFilter"]["field"], "__edb_e__");
    }

    #[test]
    fn test_ev008_missing_key_attributes() {
        let missing = missing_key_attributes(&employee(), "coworkers", &values(&[("title", "eng")])).unwrap();
        assert_eq!(missing, vec!["office", "team"]);
    }

    #[test]
    fn test_ev008_prepare_item_adds_keys() {
        let item = json!({"employee": "e1", "office": "Portland", "team": "dev", "title": "eng", "salary": 10});
        let out = prepare_item(&employee(), item.as_object().unwrap()).unwrap();
        assert_eq!(out["__edb_e__"], "employee");
        assert_eq!(out["__edb_v__"], "1");
        assert_eq!(out["pk"], "$taskapp#employee_e1");
        assert_eq!(out["sk"], "$employee_1");
        assert_eq!(out["gsi1pk"], "$taskapp#office_Portland");
        assert_eq!(out["gsi1sk"], "$employee_1#team_dev#title_eng");
        assert_eq!(out["salary"], 10);
    }

    #[test]
    fn test_ev008_prepare_item_sparse_secondary() {
        let item = json!({"employee": "e1"});
        let out = prepare_item(&employee(), item.as_object().unwrap()).unwrap();
        assert_eq!(out["gsi1pk"], "$taskapp#office_");
    }

    #[test]
    fn test_ev008_prepare_item_missing_primary_composite() {
        let item = json!({"office": "Portland", "employee": null});
        let err = prepare_item(&employee(), item.as_object().unwrap()).unwrap_err();
        assert_eq!(
            err,
            KeyShapeError {
                entity: "employee".to_string(),
                index: "employee".to_string(),
                missing: vec!["employee".to_string()],
            }
        );
    }
}
