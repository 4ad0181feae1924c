//! EV-010: Module loaders turn one entity source file into named exports.
//!
//! Source files are never executed in-process. A file is either a
//! pre-compiled export manifest (JSON/YAML) or is handed to an isolated
//! bundler worker process whose stdout is the JSON export object.

pub mod command;
pub mod manifest;

use crate::core::error::ResolutionFailure;
use crate::core::types::{EnvOverlay, LoaderConfig, LoaderKind};
use std::path::Path;
use std::time::Duration;

/// Named exports of one loaded module, in export order.
pub type Exports = serde_json::Map<String, serde_json::Value>;

/// Per-invocation context shared by every file load.
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    /// Absolute project root; relative imports resolve from here
    pub root: &'a Path,
    /// Resolved path-alias manifest, if any
    pub alias_manifest: Option<&'a Path>,
    /// Environment injected into the worker process
    pub env: &'a EnvOverlay,
    /// Scratch directory for this file's build artifacts
    pub scratch: &'a Path,
}

/// Loads one source file as an isolated unit and captures its exports.
pub trait ModuleLoader {
    fn load(&self, file: &Path, ctx: &LoadContext<'_>) -> Result<Exports, ResolutionFailure>;
}

/// Output from running a loader worker process.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Dispatches manifests to the manifest loader and everything else to the
/// bundler command, when one is configured.
#[derive(Debug, Clone, Default)]
pub struct AutoLoader {
    command: Option<command::CommandLoader>,
}

impl AutoLoader {
    pub fn new(command: Option<command::CommandLoader>) -> Self {
        Self { command }
    }
}

impl ModuleLoader for AutoLoader {
    fn load(&self, file: &Path, ctx: &LoadContext<'_>) -> Result<Exports, ResolutionFailure> {
        if manifest::is_manifest(file) {
            return manifest::ManifestLoader.load(file, ctx);
        }
        match &self.command {
            Some(cmd) => cmd.load(file, ctx),
            None => Err(ResolutionFailure::UnsupportedSource(file.to_path_buf())),
        }
    }
}

/// Build the loader described by the project configuration.
pub fn from_config(config: &LoaderConfig) -> Box<dyn ModuleLoader + Send + Sync> {
    let command = if config.command.is_empty() {
        None
    } else {
        Some(command::CommandLoader::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    };
    match config.kind {
        LoaderKind::Manifest => Box::new(manifest::ManifestLoader),
        LoaderKind::Command => match command {
            Some(cmd) => Box::new(cmd),
            // Rejected by validate_config; every file reports as unsupported
            None => Box::new(AutoLoader::new(None)),
        },
        LoaderKind::Auto => Box::new(AutoLoader::new(command)),
    }
}

/// Require a loaded module value to be an export object.
pub(crate) fn exports_from_value(
    file: &Path,
    value: serde_json::Value,
) -> Result<Exports, ResolutionFailure> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ResolutionFailure::InvalidExports {
            file: file.to_path_buf(),
            reason: format!("expected an object of named exports, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
