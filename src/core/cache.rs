//! EV-005: Schema cache build, atomic write, and load.
//!
//! The artifact lives at `<root>/.electro-viewer/schema.json`. Readers never
//! re-run resolution; they only `load()`. Writes go to a sibling temp file
//! that is then renamed over the artifact, so a concurrent reader sees the
//! old document or the new one, never a prefix.

use super::error::{CacheError, Error, ResolutionError};
use super::normalizer;
use super::resolver;
use super::types::{BuildRequest, SchemaCache, CACHE_DIR, CACHE_FILE};
use super::validate;
use crate::loader::ModuleLoader;
use chrono::{SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Canonical artifact location for a project root.
pub fn cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_DIR).join(CACHE_FILE)
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Resolve and normalize every entity for `request`.
pub fn build(request: &BuildRequest, loader: &dyn ModuleLoader) -> Result<SchemaCache, ResolutionError> {
    tracing::info!(patterns = %request.patterns.join(", "), "building entity schema cache");

    let merged = resolver::load_modules(request, loader)?;
    let normalized = normalizer::normalize(&merged);

    let mut warnings = merged.warnings;
    warnings.extend(normalized.warnings);

    Ok(SchemaCache {
        entities: normalized.entities,
        generated_at: timestamp(),
        config: request.cache_config(),
        warnings,
    })
}

/// Write the cache atomically (write to temp, then rename).
pub fn write(root: &Path, cache: &SchemaCache) -> Result<PathBuf, CacheError> {
    let path = cache_path(root);
    let dir = root.join(CACHE_DIR);
    std::fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut json = serde_json::to_string_pretty(cache)?;
    json.push('\n');

    // Each writer gets its own temp file, so concurrent builds never share one
    let mut tmp = tempfile::Builder::new()
        .prefix(".schema.")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|source| CacheError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;
    tmp.persist(&path).map_err(|e| CacheError::Io {
        path: path.clone(),
        source: e.error,
    })?;

    tracing::info!(path = %path.display(), "schema cache written");
    Ok(path)
}

/// Build and write in one step.
pub fn build_and_write(
    request: &BuildRequest,
    loader: &dyn ModuleLoader,
) -> Result<(PathBuf, SchemaCache), Error> {
    let cache = build(request, loader)?;
    let path = write(&resolver::absolute_root(&request.root), &cache)?;
    Ok((path, cache))
}

fn read_value(root: &Path) -> Result<(PathBuf, serde_json::Value), CacheError> {
    let path = cache_path(root);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CacheError::NotFound { path });
        }
        Err(source) => return Err(CacheError::Io { path, source }),
    };
    let value = serde_json::from_str(&content).map_err(|e| CacheError::Corrupt {
        path: path.clone(),
        field_path: "/".to_string(),
        reason: e.to_string(),
    })?;
    Ok((path, value))
}

fn decode(path: PathBuf, value: serde_json::Value) -> Result<SchemaCache, CacheError> {
    serde_json::from_value(value).map_err(|e| CacheError::Corrupt {
        path,
        field_path: "/".to_string(),
        reason: e.to_string(),
    })
}

/// Read the cache. Safe for any number of concurrent callers.
pub fn load(root: &Path) -> Result<SchemaCache, CacheError> {
    let (path, value) = read_value(root)?;
    decode(path, value)
}

/// Read the cache and check its structure before trusting it.
pub fn load_validated(root: &Path) -> Result<SchemaCache, CacheError> {
    let (path, value) = read_value(root)?;
    validate::validate_value(&path, &value)?;
    decode(path, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttributeDef, AttributeType, CacheConfig, EntitySchema, IndexDef, KeyPart};
    use crate::loader::manifest::ManifestLoader;
    use indexmap::IndexMap;

    fn sample_cache() -> SchemaCache {
        let mut indexes = IndexMap::new();
        for (name, id) in [("primary", None), ("byOwner", Some("gsi1")), ("alpha", Some("gsi2"))] {
            indexes.insert(
                name.to_string(),
                IndexDef {
                    index_name: id.map(str::to_string),
                    pk: KeyPart {
                        field: "pk".to_string(),
                        composite: vec!["companyId".to_string()],
                        template: None,
                    },
                    sk: None,
                },
            );
        }
        let mut attributes = IndexMap::new();
        attributes.insert("companyId".to_string(), AttributeDef::of(AttributeType::String));
        SchemaCache {
            entities: vec![EntitySchema {
                name: "company".to_string(),
                version: "1".to_string(),
                service: "model".to_string(),
                source_file: "entities/company.json".to_string(),
                indexes,
                attributes,
                warnings: vec![],
            }],
            generated_at: "2026-02-16T14:00:00.000Z".to_string(),
            config: CacheConfig {
                source_patterns: vec!["entities/*.json".to_string()],
                alias_manifest_path: None,
            },
            warnings: vec![],
        }
    }

    #[test]
    fn test_ev005_cache_path() {
        assert_eq!(
            cache_path(Path::new("/proj")),
            PathBuf::from("/proj/.electro-viewer/schema.json")
        );
    }

    #[test]
    fn test_ev005_timestamp_format() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'), "{ts}");
        // 2026-02-16T14:00:00.000Z
        assert_eq!(ts.len(), 24);
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_ev005_write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = sample_cache();
        let path = write(dir.path(), &cache).unwrap();
        assert_eq!(path, cache_path(dir.path()));

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded, cache);
        let order: Vec<_> = loaded.entities[0].indexes.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["primary", "byOwner", "alpha"]);

        assert_eq!(load_validated(dir.path()).unwrap(), cache);
    }

    #[test]
    fn test_ev005_atomic_write_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &sample_cache()).unwrap();
        write(dir.path(), &sample_cache()).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path().join(CACHE_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![CACHE_FILE.to_string()]);
    }

    #[test]
    fn test_ev005_concurrent_writers_never_expose_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write(&root, &sample_cache()).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        write(&root, &sample_cache()).unwrap();
                    }
                })
            })
            .collect();
        for _ in 0..50 {
            assert_eq!(load(&root).unwrap(), sample_cache());
        }
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(load_validated(&root).unwrap(), sample_cache());
    }

    #[test]
    fn test_ev005_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        match load(dir.path()).unwrap_err() {
            CacheError::NotFound { path } => assert_eq!(path, cache_path(dir.path())),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ev005_load_unparsable_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CACHE_DIR)).unwrap();
        std::fs::write(cache_path(dir.path()), "{\"entities\": [").unwrap();
        assert!(matches!(load(dir.path()).unwrap_err(), CacheError::Corrupt { .. }));
    }

    #[test]
    fn test_ev005_load_validated_names_field() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CACHE_DIR)).unwrap();
        let mut doc = serde_json::to_value(sample_cache()).unwrap();
        doc["entities"][0]["indexes"]["primary"]["pk"]["field"] = serde_json::json!(7);
        std::fs::write(cache_path(dir.path()), doc.to_string()).unwrap();
        match load_validated(dir.path()).unwrap_err() {
            CacheError::Corrupt { field_path, .. } => {
                assert_eq!(field_path, "/entities/0/indexes/primary/pk/field")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ev005_build_and_write_from_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("entities")).unwrap();
        std::fs::write(
            dir.path().join("entities/company.json"),
            r#"{
                "Company": {
                    "model": {"entity": "company", "version": "1", "service": "model"},
                    "attributes": {"companyId": {"type": "string"}},
                    "indexes": {"primary": {"pk": {"field": "pk", "composite": []},
                                            "sk": {"field": "sk", "composite": ["companyId"]}}}
                },
                "TABLE_NAME": "main"
            }"#,
        )
        .unwrap();

        let request = BuildRequest::new(dir.path(), vec!["entities/*.json".to_string()]);
        let (path, cache) = build_and_write(&request, &ManifestLoader).unwrap();
        assert!(path.exists());
        assert_eq!(cache.entities.len(), 1);
        assert_eq!(cache.entities[0].source_file, "entities/company.json");
        assert_eq!(cache.config.source_patterns, vec!["entities/*.json"]);
        assert_eq!(load_validated(dir.path()).unwrap(), cache);
    }

    #[test]
    fn test_ev005_colliding_export_later_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("entities")).unwrap();
        let foo = |service: &str| {
            format!(
                r#"{{"Foo": {{
                    "model": {{"entity": "foo", "version": "1", "service": "{service}"}},
                    "attributes": {{"id": {{"type": "string"}}}},
                    "indexes": {{"primary": {{"pk": {{"field": "pk", "composite": ["id"]}}}}}}
                }}}}"#
            )
        };
        std::fs::write(dir.path().join("entities/a.json"), foo("first")).unwrap();
        std::fs::write(dir.path().join("entities/b.json"), foo("second")).unwrap();

        let request = BuildRequest::new(dir.path(), vec!["entities/*.json".to_string()]);
        build_and_write(&request, &ManifestLoader).unwrap();

        let cache = load(dir.path()).unwrap();
        assert_eq!(cache.entities.len(), 1);
        let foo = cache.entity("foo").unwrap();
        assert_eq!(foo.service, "second");
        assert_eq!(foo.source_file, "entities/b.json");
        assert_eq!(cache.warnings.len(), 1);
        assert!(cache.warnings[0].contains("'Foo'"));
        assert!(cache.warnings[0].contains("entities/b.json overrides entities/a.json"));
    }

    #[test]
    fn test_ev005_build_propagates_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = BuildRequest::new(dir.path(), vec!["nothing/*.json".to_string()]);
        assert!(build(&request, &ManifestLoader).is_err());
        assert!(!cache_path(dir.path()).exists());
    }
}
