//! EV-001: Canonical schema types, cache artifact, and project configuration.
//!
//! The cache artifact (`SchemaCache`) is a human-inspectable JSON document and
//! its field names are part of the compatibility surface: downstream tooling
//! reads `.electro-viewer/schema.json` directly. All maps are order-preserving
//! so that index declaration order survives a write/load cycle.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory (under the project root) holding the cache artifact.
pub const CACHE_DIR: &str = ".electro-viewer";

/// Cache artifact file name.
pub const CACHE_FILE: &str = "schema.json";

/// Version used when an entity declares none.
pub const DEFAULT_VERSION: &str = "1";

/// Service used when an entity declares none.
pub const DEFAULT_SERVICE: &str = "service";

/// Environment-variable overlay handed to module loaders.
pub type EnvOverlay = BTreeMap<String, String>;

// ============================================================================
// Schema cache artifact
// ============================================================================

/// The serialized, pre-normalized snapshot of every discovered entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaCache {
    /// Entities in resolution order
    pub entities: Vec<EntitySchema>,

    /// RFC 3339 UTC timestamp of the build
    pub generated_at: String,

    /// Configuration the cache was built from
    pub config: CacheConfig,

    /// Build-level warnings (export collisions, skipped exports)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SchemaCache {
    /// Find an entity by its identity name.
    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// Resolved configuration recorded alongside the entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(alias = "entityConfigPaths")]
    pub source_patterns: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "tsconfigPath"
    )]
    pub alias_manifest_path: Option<String>,
}

// ============================================================================
// Entities
// ============================================================================

/// One normalized entity definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    pub name: String,
    pub version: String,
    pub service: String,

    /// Origin file, relative to the project root
    pub source_file: String,

    /// Indexes in declaration order
    pub indexes: IndexMap<String, IndexDef>,

    pub attributes: IndexMap<String, AttributeDef>,

    /// Normalization anomalies (ambiguous primary, dangling composites)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EntitySchema {
    /// Names of indexes that declare no secondary-index identifier.
    pub fn primary_candidates(&self) -> Vec<&str> {
        self.indexes
            .iter()
            .filter(|(_, idx)| idx.index_name.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The table's primary index.
    ///
    /// An index literally named `primary` (without a secondary-index id)
    /// wins; otherwise the unique index without an id. Returns `None` when
    /// there are zero candidates or several with no `primary` among them.
    pub fn primary_index(&self) -> Option<(&str, &IndexDef)> {
        if let Some((name, idx)) = self.indexes.get_key_value("primary") {
            if idx.index_name.is_none() {
                return Some((name.as_str(), idx));
            }
        }
        let candidates = self.primary_candidates();
        match candidates.as_slice() {
            [only] => self.indexes.get_key_value(*only).map(|(n, i)| (n.as_str(), i)),
            _ => None,
        }
    }

    /// Whether `index` is the table's primary index.
    pub fn is_primary(&self, index: &str) -> bool {
        self.primary_index().is_some_and(|(name, _)| name == index)
    }
}

/// One key index (primary or secondary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    /// Physical secondary-index identifier; absent for the primary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,

    pub pk: KeyPart,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sk: Option<KeyPart>,
}

/// One physical key attribute and the logical attributes composing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeyPart {
    pub field: String,

    /// Ordered composite attribute names (never empty strings)
    pub composite: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl KeyPart {
    /// Whether this key has no variable components.
    pub fn is_static(&self) -> bool {
        self.composite.is_empty()
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Closed set of attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Map,
    List,
    Set,
}

impl AttributeType {
    /// Parse a declared type name. Returns `None` for anything outside the set.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "map" => Some(Self::Map),
            "list" => Some(Self::List),
            "set" => Some(Self::Set),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::List | Self::Set)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Map => write!(f, "map"),
            Self::List => write!(f, "list"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// Attribute metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttributeDef {
    #[serde(rename = "type")]
    pub attr_type: AttributeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Nested shape (`map` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, AttributeDef>>,

    /// Element shape (`list` / `set` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemsDef>,
}

impl AttributeDef {
    /// A bare attribute of the given type with no metadata.
    pub fn of(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            required: None,
            readonly: None,
            default: None,
            properties: None,
            items: None,
        }
    }
}

/// List/set element type: a bare type name or a nested definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ItemsDef {
    Type(AttributeType),
    Nested(Box<AttributeDef>),
}

// ============================================================================
// Project configuration (electro-viewer.yaml)
// ============================================================================

/// Root project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Entity source patterns, relative to the project root
    pub entities: Vec<String>,

    /// Path-alias manifest (e.g. tsconfig.json)
    #[serde(default)]
    pub aliases: Option<String>,

    /// Environment overlay for loaders
    #[serde(default)]
    pub env: EnvOverlay,

    #[serde(default)]
    pub loader: LoaderConfig,
}

/// How entity source files are turned into export objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub kind: LoaderKind,

    /// Bundler argv template; `{file}`, `{root}`, `{aliases}`, `{out}` are substituted
    #[serde(default)]
    pub command: Vec<String>,

    /// Per-file wall-clock limit for the bundler process
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            kind: LoaderKind::default(),
            command: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

/// Loader selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    /// Manifest files by extension, bundler command for everything else
    #[default]
    Auto,
    Manifest,
    Command,
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manifest => write!(f, "manifest"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// Everything `build` needs, threaded explicitly (no process globals).
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub root: PathBuf,
    pub patterns: Vec<String>,
    pub alias_manifest: Option<String>,
    pub env: EnvOverlay,
}

impl BuildRequest {
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            patterns,
            alias_manifest: None,
            env: EnvOverlay::new(),
        }
    }

    /// Build request for a parsed project config rooted at `root`.
    pub fn from_config(root: &Path, config: &ProjectConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            patterns: config.entities.clone(),
            alias_manifest: config.aliases.clone(),
            env: config.env.clone(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            source_patterns: self.patterns.clone(),
            alias_manifest_path: self.alias_manifest.clone(),
        }
    }
}
