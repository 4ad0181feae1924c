//! EV-011: Pre-compiled JSON/YAML export manifests.

use super::{exports_from_value, Exports, LoadContext, ModuleLoader};
use crate::core::error::ResolutionFailure;
use std::path::Path;

/// Extensions treated as export manifests.
const MANIFEST_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Whether `path` is an export manifest rather than source to bundle.
pub fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Reads a manifest file holding an object of named exports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ModuleLoader for ManifestLoader {
    fn load(&self, file: &Path, _ctx: &LoadContext<'_>) -> Result<Exports, ResolutionFailure> {
        let content = std::fs::read_to_string(file).map_err(|e| ResolutionFailure::Read {
            file: file.to_path_buf(),
            reason: e.to_string(),
        })?;
        let value = parse_manifest(file, &content)?;
        exports_from_value(file, value)
    }
}

fn parse_manifest(file: &Path, content: &str) -> Result<serde_json::Value, ResolutionFailure> {
    let is_json = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_yaml_ng::from_str(content).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| ResolutionFailure::InvalidExports {
        file: file.to_path_buf(),
        reason,
    })
}
