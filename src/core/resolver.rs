//! EV-002: Pattern expansion and merged module loading.
//!
//! Expands entity glob patterns against the project root into a sorted,
//! de-duplicated file list, loads each file through a `ModuleLoader` inside
//! a per-invocation scratch directory, and merges the named exports. On an
//! export-name collision the later file (in sorted order) wins and a
//! warning is recorded.

use super::error::{ResolutionError, ResolutionFailure};
use super::types::{BuildRequest, EnvOverlay, CACHE_DIR};
use crate::loader::{LoadContext, ModuleLoader};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One named export and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedExport {
    pub value: serde_json::Value,
    /// Origin file, relative to the project root
    pub source_file: String,
}

/// Exports merged across every matched file.
#[derive(Debug, Clone, Default)]
pub struct MergedExports {
    pub exports: IndexMap<String, LoadedExport>,
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Make `root` absolute without touching the filesystem.
pub fn absolute_root(root: &Path) -> PathBuf {
    std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf())
}

/// Expand patterns into matching regular files, lexicographically ordered.
/// The cache directory is never part of the result.
pub fn expand_patterns(patterns: &[String], root: &Path) -> Result<Vec<PathBuf>, ResolutionError> {
    let root = absolute_root(root);
    let cache_dir = root.join(CACHE_DIR);
    // The root is literal text; only the user's pattern carries glob syntax
    let glob_root = PathBuf::from(glob::Pattern::escape(&root.to_string_lossy()));
    let mut files = BTreeSet::new();

    for pattern in patterns {
        let full = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            glob_root.join(pattern.trim_start_matches("./"))
        };
        let full = full.to_string_lossy().to_string();
        let paths = glob::glob(&full).map_err(|e| {
            ResolutionError::new(
                ResolutionFailure::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                },
                patterns,
                &root,
            )
        })?;
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() && !path.starts_with(&cache_dir) => {
                    files.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "unreadable path while expanding {}", pattern),
            }
        }
    }

    if files.is_empty() {
        return Err(ResolutionError::new(ResolutionFailure::NoMatches, patterns, &root));
    }
    Ok(files.into_iter().collect())
}

/// Path of `file` relative to `root`, `/`-separated.
pub fn relative_source(file: &Path, root: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve the alias manifest: an explicit path must exist; otherwise
/// `tsconfig.json` in the root is used when present.
pub fn resolve_alias_manifest(
    request: &BuildRequest,
    root: &Path,
) -> Result<Option<PathBuf>, ResolutionError> {
    match &request.alias_manifest {
        Some(path) => {
            let full = root.join(path);
            if full.is_file() {
                Ok(Some(full))
            } else {
                Err(ResolutionError::new(
                    ResolutionFailure::AliasManifestMissing(full),
                    &request.patterns,
                    root,
                ))
            }
        }
        None => {
            let default = root.join("tsconfig.json");
            Ok(default.is_file().then_some(default))
        }
    }
}

/// Effective loader environment: `.env` in the root, overridden by the
/// process environment, overridden by the caller's overlay.
pub fn effective_env(root: &Path, overlay: &EnvOverlay) -> EnvOverlay {
    let mut env = EnvOverlay::new();
    let dotenv = root.join(".env");
    if dotenv.is_file() {
        tracing::debug!(path = %dotenv.display(), "loading .env");
        for (key, value) in read_dotenv(&dotenv) {
            if std::env::var_os(&key).is_none() {
                env.insert(key, value);
            }
        }
    }
    env.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Entries of a `.env` file. The process environment is left untouched.
/// Unparsable lines are logged and skipped.
pub fn read_dotenv(path: &Path) -> Vec<(String, String)> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read .env");
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| match entry {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping .env line");
                None
            }
        })
        .collect()
}

/// Expand, load, and merge every entity module for `request`.
pub fn load_modules(
    request: &BuildRequest,
    loader: &dyn ModuleLoader,
) -> Result<MergedExports, ResolutionError> {
    let root = absolute_root(&request.root);
    let files = expand_patterns(&request.patterns, &root)?;
    let alias_manifest = resolve_alias_manifest(request, &root)?;
    let env = effective_env(&root, &request.env);

    tracing::info!(count = files.len(), "found entity file(s)");

    let scratch = tempfile::Builder::new()
        .prefix("electro-viewer-")
        .tempdir()
        .map_err(|e| {
            ResolutionError::new(ResolutionFailure::Scratch(e.to_string()), &request.patterns, &root)
        })?;
    let scratch_path = scratch.path().to_path_buf();

    let result = merge_files(&files, &root, |idx, file| {
        let out = scratch_path.join(format!("{idx:04}"));
        std::fs::create_dir_all(&out).map_err(|e| ResolutionFailure::Scratch(e.to_string()))?;
        let ctx = LoadContext {
            root: &root,
            alias_manifest: alias_manifest.as_deref(),
            env: &env,
            scratch: &out,
        };
        loader.load(file, &ctx)
    });

    // Released on every path; cleanup failure is never fatal
    if let Err(e) = scratch.close() {
        tracing::warn!(path = %scratch_path.display(), error = %e, "failed to clean up scratch directory");
    }

    result.map_err(|failure| ResolutionError::new(failure, &request.patterns, &root))
}

fn merge_files<F>(files: &[PathBuf], root: &Path, mut load: F) -> Result<MergedExports, ResolutionFailure>
where
    F: FnMut(usize, &Path) -> Result<crate::loader::Exports, ResolutionFailure>,
{
    let mut merged = MergedExports {
        files: files.to_vec(),
        ..MergedExports::default()
    };

    for (idx, file) in files.iter().enumerate() {
        tracing::debug!(file = %file.display(), "loading entities");
        let exports = load(idx, file)?;
        let source_file = relative_source(file, root);

        for (name, value) in exports {
            if let Some(previous) = merged.exports.get(&name) {
                let warning = format!(
                    "duplicate export '{}' in {} overrides {}",
                    name, source_file, previous.source_file
                );
                tracing::warn!("{}", warning);
                merged.warnings.push(warning);
            }
            merged.exports.insert(
                name,
                LoadedExport {
                    value,
                    source_file: source_file.clone(),
                },
            );
        }
    }

    Ok(merged)
}
