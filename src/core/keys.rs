//! EV-004: Key builder for the modeling library's key strings.
//!
//! Keys written by the modeling library look like:
//!
//! ```text
//! pk  $<service>                         (no composite)
//! pk  $<service>#<field>_<value>#...     (composite)
//! sk  $<entity>_<version>                (no composite)
//! sk  $<entity>_<version>#<field>_<value>#...
//! ```
//!
//! Service, entity, and field names are lowercased; values are verbatim.
//! Composite order is the declared order. Missing values render as an
//! empty string. This module does no I/O and never fails, so it can back
//! live previews on half-filled forms as well as real storage calls.

use super::types::{EntitySchema, DEFAULT_VERSION};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Entity identity needed to render keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyIdentity<'a> {
    pub name: &'a str,
    pub version: Option<&'a str>,
    pub service: &'a str,
}

impl<'a> KeyIdentity<'a> {
    pub fn new(name: &'a str, version: &'a str, service: &'a str) -> Self {
        Self {
            name,
            version: Some(version),
            service,
        }
    }

    fn version(&self) -> &'a str {
        match self.version {
            Some(v) if !v.is_empty() => v,
            _ => DEFAULT_VERSION,
        }
    }
}

impl EntitySchema {
    pub fn identity(&self) -> KeyIdentity<'_> {
        KeyIdentity::new(&self.name, &self.version, &self.service)
    }
}

/// Anything composite values can be read from.
pub trait ValueSource {
    /// The rendered value for `field`, or `None` when absent.
    fn key_value(&self, field: &str) -> Option<Cow<'_, str>>;
}

impl ValueSource for HashMap<String, String> {
    fn key_value(&self, field: &str) -> Option<Cow<'_, str>> {
        self.get(field).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl ValueSource for BTreeMap<String, String> {
    fn key_value(&self, field: &str) -> Option<Cow<'_, str>> {
        self.get(field).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl ValueSource for IndexMap<String, String> {
    fn key_value(&self, field: &str) -> Option<Cow<'_, str>> {
        self.get(field).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// JSON items: strings verbatim, numbers and booleans as text, null absent.
impl ValueSource for serde_json::Map<String, serde_json::Value> {
    fn key_value(&self, field: &str) -> Option<Cow<'_, str>> {
        match self.get(field)? {
            serde_json::Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            serde_json::Value::Number(n) => Some(Cow::Owned(n.to_string())),
            serde_json::Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }
}

impl<T: ValueSource + ?Sized> ValueSource for &T {
    fn key_value(&self, field: &str) -> Option<Cow<'_, str>> {
        (**self).key_value(field)
    }
}

/// Build a partition key (`is_partition`) or sort key string.
pub fn build_key<S: AsRef<str>>(
    is_partition: bool,
    composite: &[S],
    values: &impl ValueSource,
    identity: &KeyIdentity<'_>,
) -> String {
    let mut key = String::from("$");
    if is_partition {
        key.push_str(&identity.service.to_lowercase());
    } else {
        key.push_str(&identity.name.to_lowercase());
        key.push('_');
        key.push_str(identity.version());
    }

    for field in composite.iter().map(AsRef::as_ref).filter(|f| !f.is_empty()) {
        key.push('#');
        key.push_str(&field.to_lowercase());
        key.push('_');
        if let Some(value) = values.key_value(field) {
            key.push_str(&value);
        }
    }
    key
}

/// Partition key shorthand.
pub fn partition_key<S: AsRef<str>>(
    composite: &[S],
    values: &impl ValueSource,
    identity: &KeyIdentity<'_>,
) -> String {
    build_key(true, composite, values, identity)
}

/// Sort key shorthand.
pub fn sort_key<S: AsRef<str>>(
    composite: &[S],
    values: &impl ValueSource,
    identity: &KeyIdentity<'_>,
) -> String {
    build_key(false, composite, values, identity)
}
