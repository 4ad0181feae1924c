//! EV-009: Project configuration parsing and validation.
//!
//! Parses electro-viewer.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - At least one non-empty entity pattern, each a valid glob
//! - `loader.kind: command` requires a non-empty `loader.command`
//! - Loader timeout must be positive

use super::error::ConfigError;
use super::types::*;
use std::path::{Path, PathBuf};

/// Project configuration file name, looked up in the project root.
pub const CONFIG_FILE: &str = "electro-viewer.yaml";

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Config file location for a project root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Parse an electro-viewer.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_config(&content)
}

/// Parse an electro-viewer.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<ProjectConfig, ConfigError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &ProjectConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", config.version),
        });
    }

    if config.entities.is_empty() {
        errors.push(ValidationError {
            message: "entities must list at least one pattern".to_string(),
        });
    }

    for (i, pattern) in config.entities.iter().enumerate() {
        if pattern.trim().is_empty() {
            errors.push(ValidationError {
                message: format!("entities[{}] is empty", i),
            });
        } else if let Err(e) = glob::Pattern::new(pattern) {
            errors.push(ValidationError {
                message: format!("entities[{}] '{}' is not a valid glob: {}", i, pattern, e),
            });
        }
    }

    if matches!(&config.aliases, Some(a) if a.trim().is_empty()) {
        errors.push(ValidationError {
            message: "aliases must not be empty when set".to_string(),
        });
    }

    if config.loader.kind == LoaderKind::Command && config.loader.command.is_empty() {
        errors.push(ValidationError {
            message: "loader kind 'command' requires loader.command".to_string(),
        });
    }

    if config.loader.command.first().is_some_and(|p| p.trim().is_empty()) {
        errors.push(ValidationError {
            message: "loader.command program must not be empty".to_string(),
        });
    }

    if config.loader.timeout_secs == 0 {
        errors.push(ValidationError {
            message: "loader.timeout_secs must be greater than 0".to_string(),
        });
    }

    errors
}

/// Parse and validate in one step, logging each validation error.
pub fn load_project(root: &Path) -> Result<ProjectConfig, ConfigError> {
    let config = parse_config_file(&config_path(root))?;
    let errors = validate_config(&config);
    if !errors.is_empty() {
        for e in &errors {
            tracing::error!("{}", e);
        }
        return Err(ConfigError::Invalid { count: errors.len() });
    }
    Ok(config)
}

/// Starter configuration written by `init`.
pub fn starter_config() -> String {
    r#"# electro-viewer project configuration
version: "1.0"

# Entity source patterns, relative to the project root
entities:
  - "src/entities/**/*.ts"

# Path-alias manifest used when bundling (defaults to tsconfig.json if present)
# aliases: tsconfig.json

# Environment overlay applied while loading entity modules
env: {}

loader:
  # auto: .json/.yaml manifests are read directly, other files use `command`
  kind: auto
  # Worker run once per source file from the project root. It must import
  # the module and print its named exports as one JSON object on stdout,
  # exiting non-zero on failure. Placeholders: {file} {root} {aliases} {out}.
  # Replace the script below with your own bundler entry point.
  command: ["npx", "tsx", "scripts/export-entities.ts", "{file}"]
  timeout_secs: 60
"#
    .to_string()
}
