//! Benchmarks for electro-viewer core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use electro_viewer::core::keys::{build_key, KeyIdentity};
use electro_viewer::core::normalizer::normalize;
use electro_viewer::core::resolver::{LoadedExport, MergedExports};
use electro_viewer::core::types::SchemaCache;
use std::collections::HashMap;

fn bench_build_key(c: &mut Criterion) {
    let identity = KeyIdentity::new("employee", "1", "TaskApp");
    let mut group = c.benchmark_group("build_key");
    for fields in [0usize, 1, 4, 16] {
        let composite: Vec<String> = (0..fields).map(|i| format!("Field{i}")).collect();
        let values: HashMap<String, String> = composite
            .iter()
            .map(|f| (f.clone(), format!("value-of-{f}")))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(fields), &composite, |b, composite| {
            b.iter(|| {
                let key = build_key(false, black_box(composite), black_box(&values), &identity);
                black_box(key);
            });
        });
    }
    group.finish();
}

fn entity_export(i: usize) -> serde_json::Value {
    serde_json::json!({
        "model": {"entity": format!("entity{i}"), "version": "1", "service": "bench"},
        "attributes": {
            "id": {"type": "string", "required": true},
            "owner": {"type": "string"},
            "tags": {"type": "set", "items": "string"},
            "address": {"type": "map", "properties": {"attributes": {
                "city": {"type": "string"}, "zip": {"type": "string"}
            }}}
        },
        "indexes": {
            "primary": {"pk": {"field": "pk", "composite": ["id"]}, "sk": {"field": "sk", "composite": []}},
            "byOwner": {"index": "gsi1", "pk": {"field": "gsi1pk", "composite": ["owner"]},
                        "sk": {"field": "gsi1sk", "composite": ["id"]}}
        }
    })
}

fn merged(count: usize) -> MergedExports {
    let mut m = MergedExports::default();
    for i in 0..count {
        m.exports.insert(
            format!("Entity{i}"),
            LoadedExport {
                value: entity_export(i),
                source_file: format!("entities/e{i}.json"),
            },
        );
    }
    m
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for count in [1usize, 10, 100] {
        let exports = merged(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &exports, |b, exports| {
            b.iter(|| black_box(normalize(black_box(exports))));
        });
    }
    group.finish();
}

fn bench_cache_load(c: &mut Criterion) {
    let normalized = normalize(&merged(100));
    let cache = SchemaCache {
        entities: normalized.entities,
        generated_at: "2026-02-16T14:00:00.000Z".to_string(),
        config: electro_viewer::core::types::CacheConfig {
            source_patterns: vec!["entities/*.json".to_string()],
            alias_manifest_path: None,
        },
        warnings: vec![],
    };
    let json = serde_json::to_string_pretty(&cache).unwrap();

    c.bench_function("cache_deserialize_100", |b| {
        b.iter(|| {
            let parsed: SchemaCache = serde_json::from_str(black_box(&json)).unwrap();
            black_box(parsed);
        });
    });
}

fn bench_blake3_file(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();

    let mut group = c.benchmark_group("blake3_file");
    for size_kb in [1, 64, 1024] {
        let path = dir.path().join(format!("bench_{size_kb}k.ts"));
        std::fs::write(&path, vec![0xABu8; size_kb * 1024]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size_kb), &path, |b, path| {
            b.iter(|| black_box(electro_viewer::watch::hasher::hash_file(black_box(path)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_build_key,
    bench_normalize,
    bench_cache_load,
    bench_blake3_file
);
criterion_main!(benches);
