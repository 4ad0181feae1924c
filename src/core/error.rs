//! EV-000: Error taxonomy.
//!
//! Resolution and cache failures propagate to the caller as typed errors.
//! Per-entity normalization anomalies are warnings on the schema, and the
//! key builder never fails at all.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error for CLI dispatch and the rebuild path.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    KeyShape(#[from] KeyShapeError),

    /// Lookup against a loaded cache failed (unknown entity or index).
    #[error("{0}")]
    Lookup(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Module resolution failed. Always names the searched patterns and root.
#[derive(Error, Debug)]
#[error("{failure}\n  patterns: {}\n  searched in: {}", .patterns.join(", "), .root.display())]
pub struct ResolutionError {
    pub failure: ResolutionFailure,
    pub patterns: Vec<String>,
    pub root: PathBuf,
}

impl ResolutionError {
    pub fn new(failure: ResolutionFailure, patterns: &[String], root: impl Into<PathBuf>) -> Self {
        Self {
            failure,
            patterns: patterns.to_vec(),
            root: root.into(),
        }
    }
}

/// What went wrong while expanding patterns or loading one file.
#[derive(Error, Debug)]
pub enum ResolutionFailure {
    #[error("no files found matching the entity patterns")]
    NoMatches,

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("alias manifest not found: {}", .0.display())]
    AliasManifestMissing(PathBuf),

    #[error("no loader for {}: configure loader.command to bundle this source type", .0.display())]
    UnsupportedSource(PathBuf),

    #[error("failed to spawn loader for {}: {reason}", .file.display())]
    Spawn { file: PathBuf, reason: String },

    #[error("loader failed for {} (exit {exit_code}): {stderr}", .file.display())]
    Execution {
        file: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    #[error("loader timed out after {:.1}s for {}", .timeout.as_secs_f64(), .file.display())]
    Timeout { file: PathBuf, timeout: Duration },

    #[error("invalid exports from {}: {reason}", .file.display())]
    InvalidExports { file: PathBuf, reason: String },

    #[error("cannot read {}: {reason}", .file.display())]
    Read { file: PathBuf, reason: String },

    #[error("cannot allocate scratch directory: {0}")]
    Scratch(String),
}

/// Schema cache read/write failures.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Read attempted before any successful build + write.
    #[error(
        "schema cache not found at {}\n  run `electro-viewer build` to generate it, \
         or check that the entity patterns in electro-viewer.yaml match your entity files",
        .path.display()
    )]
    NotFound { path: PathBuf },

    /// Artifact present but structurally invalid. Never coerced.
    #[error("schema cache at {} is corrupt at '{field_path}': {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        field_path: String,
        reason: String,
    },

    #[error("cache io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize schema cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Project configuration could not be read or parsed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("YAML parse error: {0}")]
    Parse(String),

    #[error("{count} validation error(s)")]
    Invalid { count: usize },

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
}

/// An item cannot be written because key attributes have no value.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("entity '{entity}' index '{index}' is missing key attribute(s): {}", .missing.join(", "))]
pub struct KeyShapeError {
    pub entity: String,
    pub index: String,
    pub missing: Vec<String>,
}
