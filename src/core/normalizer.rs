//! EV-003: Schema normalizer. Merged exports become canonical `EntitySchema`s.
//!
//! Exports are probed by capability rather than by type: anything carrying a
//! `model` descriptor with an index map and an attribute map is an entity.
//! Both the modeling library's runtime shape (`model.indexes`,
//! `model.schema.attributes`, `model.prefixes`) and the raw definition shape
//! (`model{entity,version,service}` beside top-level `indexes`/`attributes`)
//! are accepted. Service-shaped exports (`entities: {...}`) are expanded.
//!
//! Normalization never fails. Anomalies become warnings on the entity, and
//! exports that look like entities but cannot be identified are skipped with
//! a build warning.

use super::resolver::MergedExports;
use super::types::{
    AttributeDef, AttributeType, EntitySchema, IndexDef, ItemsDef, KeyPart, DEFAULT_SERVICE,
    DEFAULT_VERSION,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Normalizer output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub entities: Vec<EntitySchema>,
    /// Build-level warnings (skipped exports)
    pub warnings: Vec<String>,
}

/// Whether `value` declares an index map in either accepted shape.
pub fn has_indexes(value: &Value) -> bool {
    indexes_of(value).is_some()
}

/// Whether `value` declares an attribute map in either accepted shape.
pub fn has_attribute_map(value: &Value) -> bool {
    attributes_of(value).is_some()
}

/// Whether `value` looks like an entity definition.
pub fn is_entity(value: &Value) -> bool {
    value.get("model").is_some_and(Value::is_object) && has_indexes(value) && has_attribute_map(value)
}

fn indexes_of(value: &Value) -> Option<&Map<String, Value>> {
    value
        .pointer("/model/indexes")
        .and_then(Value::as_object)
        .or_else(|| value.get("indexes").and_then(Value::as_object))
}

fn attributes_of(value: &Value) -> Option<&Map<String, Value>> {
    value
        .pointer("/model/schema/attributes")
        .and_then(Value::as_object)
        .or_else(|| value.get("attributes").and_then(Value::as_object))
}

/// Normalize every entity found in the merged exports, in export order.
pub fn normalize(merged: &MergedExports) -> Normalized {
    let mut out = Normalized::default();

    for (export_name, export) in &merged.exports {
        let source_file = export.source_file.as_str();
        if is_entity(&export.value) {
            push_entity(&mut out, export_name, &export.value, source_file);
        } else if let Some(members) = export.value.get("entities").and_then(Value::as_object) {
            for (member, value) in members.iter().filter(|(_, v)| is_entity(v)) {
                let label = format!("{export_name}.{member}");
                push_entity(&mut out, &label, value, source_file);
            }
        }
    }

    tracing::info!(count = out.entities.len(), "parsed entities");
    out
}

fn push_entity(out: &mut Normalized, export_name: &str, value: &Value, source_file: &str) {
    match normalize_entity(value, source_file) {
        Some(entity) => {
            for w in &entity.warnings {
                tracing::warn!(entity = %entity.name, "{}", w);
            }
            // Entity names are unique in the cache; the later definition wins
            if let Some(pos) = out.entities.iter().position(|e| e.name == entity.name) {
                let previous = out.entities.remove(pos);
                let warning = format!(
                    "duplicate entity '{}' from export '{}' in {} overrides {}",
                    entity.name, export_name, source_file, previous.source_file
                );
                tracing::warn!("{}", warning);
                out.warnings.push(warning);
            }
            out.entities.push(entity);
        }
        None => {
            let warning = format!(
                "export '{export_name}' in {source_file} has no model.entity name; skipped"
            );
            tracing::warn!("{}", warning);
            out.warnings.push(warning);
        }
    }
}

/// Normalize one entity-shaped value. `None` when it carries no entity name.
pub fn normalize_entity(value: &Value, source_file: &str) -> Option<EntitySchema> {
    let model = value.get("model")?;
    let name = scalar_text(model.get("entity")?).filter(|n| !n.is_empty())?;
    let version = model
        .get("version")
        .and_then(scalar_text)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let service = model
        .get("service")
        .and_then(scalar_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVICE.to_string());

    let mut warnings = Vec::new();

    let mut attributes = IndexMap::new();
    if let Some(attrs) = attributes_of(value) {
        for (attr_name, def) in attrs {
            attributes.insert(attr_name.clone(), attribute_def(def, attr_name, &mut warnings));
        }
    }

    let prefixes = model.get("prefixes");
    let raw_indexes = indexes_of(value).cloned().unwrap_or_default();
    let unnamed = raw_indexes
        .iter()
        .filter(|(_, idx)| physical_index(idx).is_none())
        .count();

    let mut indexes = IndexMap::new();
    for (index_key, idx) in &raw_indexes {
        let index_name = physical_index(idx);
        // Field fallback follows the same primary rule the accessor uses
        let primary_like = index_name.is_none() && (index_key == "primary" || unnamed == 1);
        let prefix_for = |part: &str| template(prefixes, index_key, index_name.as_deref(), part);

        let field_stem = if primary_like {
            ""
        } else {
            index_name.as_deref().unwrap_or(index_key)
        };

        let pk = key_part(idx.get("pk"), format!("{field_stem}pk"), prefix_for("pk"));
        let sk = idx
            .get("sk")
            .filter(|v| v.is_object())
            .map(|sk| key_part(Some(sk), format!("{field_stem}sk"), prefix_for("sk")));

        indexes.insert(index_key.clone(), IndexDef { index_name, pk, sk });
    }

    let mut entity = EntitySchema {
        name,
        version,
        service,
        source_file: source_file.to_string(),
        indexes,
        attributes,
        warnings,
    };
    check_entity(&mut entity);
    Some(entity)
}

/// Record primary-index ambiguity and dangling composite references.
fn check_entity(entity: &mut EntitySchema) {
    let mut warnings = Vec::new();

    if entity.primary_index().is_none() {
        let candidates = entity.primary_candidates();
        if candidates.is_empty() {
            warnings.push("no primary index: every index declares a secondary-index name".to_string());
        } else {
            warnings.push(format!("ambiguous primary index: {}", candidates.join(", ")));
        }
    }

    for (index_key, idx) in &entity.indexes {
        let parts = std::iter::once(("pk", &idx.pk)).chain(idx.sk.as_ref().map(|sk| ("sk", sk)));
        for (label, part) in parts {
            for field in &part.composite {
                if !entity.attributes.contains_key(field) {
                    warnings.push(format!(
                        "index '{index_key}' {label} composite '{field}' is not a declared attribute"
                    ));
                }
            }
        }
    }

    entity.warnings.extend(warnings);
}

fn physical_index(idx: &Value) -> Option<String> {
    ["index", "indexName"]
        .iter()
        .find_map(|k| idx.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn key_part(raw: Option<&Value>, fallback_field: String, template: Option<String>) -> KeyPart {
    let field = raw
        .and_then(|v| v.get("field"))
        .and_then(Value::as_str)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .unwrap_or(fallback_field);
    let composite = raw
        .and_then(|v| v.get("facets").or_else(|| v.get("composite")))
        .and_then(Value::as_array)
        .map(|entries| composite_names(entries))
        .unwrap_or_default();
    KeyPart {
        field,
        composite,
        template,
    }
}

/// Composite entries as plain names. Accepts strings or objects with
/// `name`; null, unnamed, and empty entries are dropped.
pub fn composite_names(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("name").and_then(Value::as_str),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn template(prefixes: Option<&Value>, index_key: &str, physical: Option<&str>, part: &str) -> Option<String> {
    let prefixes = prefixes?.as_object()?;
    let lookup = |key: &str| {
        prefixes
            .get(key)
            .and_then(|p| p.get(part))
            .and_then(|p| p.get("prefix"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    lookup(index_key)
        .or_else(|| physical.and_then(lookup))
        .or_else(|| lookup(""))
        .map(str::to_string)
}

fn attribute_def(def: &Value, path: &str, warnings: &mut Vec<String>) -> AttributeDef {
    let attr_type = match def.get("type").or(def.as_str().map(|_| def)) {
        Some(Value::String(name)) => AttributeType::from_name(name).unwrap_or_else(|| {
            warnings.push(format!("attribute '{path}' has unknown type '{name}', treated as string"));
            AttributeType::String
        }),
        // Literal enums and missing types are plain strings
        _ => AttributeType::String,
    };

    let flag = |keys: &[&str]| keys.iter().find_map(|k| def.get(*k).and_then(Value::as_bool));

    let mut attr = AttributeDef::of(attr_type);
    attr.required = flag(&["required"]);
    attr.readonly = flag(&["readonly", "readOnly"]);
    attr.default = def.get("default").filter(|v| !v.is_null()).cloned();

    if attr_type == AttributeType::Map {
        let props = def.get("properties").and_then(|p| {
            p.get("attributes")
                .and_then(Value::as_object)
                .or_else(|| p.as_object())
        });
        if let Some(props) = props {
            attr.properties = Some(
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), attribute_def(v, &format!("{path}.{k}"), warnings)))
                    .collect(),
            );
        }
    }

    if attr_type.is_collection() {
        attr.items = def.get("items").and_then(|items| items_def(items, path, warnings));
    }

    attr
}

fn items_def(items: &Value, path: &str, warnings: &mut Vec<String>) -> Option<ItemsDef> {
    let item_path = format!("{path}[]");
    match items {
        Value::String(_) => Some(ItemsDef::Type(attribute_def(items, &item_path, warnings).attr_type)),
        Value::Object(obj) => {
            let nested = attribute_def(items, &item_path, warnings);
            let bare = obj.keys().all(|k| k == "type");
            Some(if bare {
                ItemsDef::Type(nested.attr_type)
            } else {
                ItemsDef::Nested(Box::new(nested))
            })
        }
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
