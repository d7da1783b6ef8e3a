//! Dynamically typed configuration values
//!
//! Loaded configuration is represented as a tree of [`ConfigValue`]s.
//! Containers ([`ConfigObject`], [`ConfigArray`]) are immutable `Arc`
//! handles, and each one carries a [`Provenance`] record next to its data
//! rather than inside it: serializing a value never emits provenance, and
//! schema validation never sees it.
//!
//! Node identity is the `Arc` pointer, see [`ConfigValue::ptr_eq`].

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::provenance::Provenance;

/// A configuration value: the tagged union of JSON kinds
#[derive(Debug, Clone)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Arc<ConfigArray>),
    Object(Arc<ConfigObject>),
}

/// Keyed object node
#[derive(Debug)]
pub struct ConfigObject {
    entries: IndexMap<String, ConfigValue>,
    provenance: Provenance,
}

/// Ordered sequence node
#[derive(Debug)]
pub struct ConfigArray {
    items: Vec<ConfigValue>,
    provenance: Provenance,
}

impl ConfigValue {
    /// Convert plain JSON into an unannotated value
    ///
    /// Containers created this way carry an empty provenance record.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(*b),
            Value::Number(n) => ConfigValue::Number(n.clone()),
            Value::String(s) => ConfigValue::String(s.clone()),
            Value::Array(items) => ConfigValue::Array(Arc::new(ConfigArray::new(
                items.iter().map(ConfigValue::from_json).collect(),
                Provenance::default(),
            ))),
            Value::Object(map) => ConfigValue::Object(Arc::new(ConfigObject::new(
                map.iter()
                    .map(|(k, v)| (k.clone(), ConfigValue::from_json(v)))
                    .collect(),
                Provenance::default(),
            ))),
        }
    }

    /// Convert to plain JSON, dropping provenance
    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Number(n) => Value::Number(n.clone()),
            ConfigValue::String(s) => Value::String(s.clone()),
            ConfigValue::Array(array) => array.to_json(),
            ConfigValue::Object(object) => object.to_json(),
        }
    }

    /// Name of the value's kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::Number(_) => "number",
            ConfigValue::String(_) => "string",
            ConfigValue::Array(_) => "array",
            ConfigValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ConfigValue::Array(_) | ConfigValue::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<ConfigArray>> {
        match self {
            ConfigValue::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<ConfigObject>> {
        match self {
            ConfigValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Provenance of a container; primitives have none
    pub fn provenance(&self) -> Option<&Provenance> {
        match self {
            ConfigValue::Array(array) => Some(array.provenance()),
            ConfigValue::Object(object) => Some(object.provenance()),
            _ => None,
        }
    }

    /// File a container node was produced from
    pub fn source_file_path(&self) -> Option<&Path> {
        self.provenance().and_then(Provenance::source_file_path)
    }

    /// Identity comparison for containers
    ///
    /// Two primitives are never identical, even when equal.
    pub fn ptr_eq(&self, other: &ConfigValue) -> bool {
        match (self, other) {
            (ConfigValue::Array(a), ConfigValue::Array(b)) => Arc::ptr_eq(a, b),
            (ConfigValue::Object(a), ConfigValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl ConfigObject {
    pub(crate) fn new(entries: IndexMap<String, ConfigValue>, provenance: Provenance) -> Self {
        Self {
            entries,
            provenance,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.entries.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Pre-merge value recorded for `name`
    pub fn original_value(&self, name: &str) -> Option<&ConfigValue> {
        self.provenance.original_value(name)
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl ConfigArray {
    pub(crate) fn new(items: Vec<ConfigValue>, provenance: Provenance) -> Self {
        Self { items, provenance }
    }

    pub fn get(&self, index: usize) -> Option<&ConfigValue> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[ConfigValue] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigValue> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Pre-merge value recorded for the element at `index`
    pub fn original_value(&self, index: usize) -> Option<&ConfigValue> {
        self.provenance.original_value(&index.to_string())
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.items.iter().map(ConfigValue::to_json).collect())
    }
}

// Equality compares data only; provenance is ignored.
impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConfigValue::Null, ConfigValue::Null) => true,
            (ConfigValue::Bool(a), ConfigValue::Bool(b)) => a == b,
            (ConfigValue::Number(a), ConfigValue::Number(b)) => a == b,
            (ConfigValue::String(a), ConfigValue::String(b)) => a == b,
            (ConfigValue::Array(a), ConfigValue::Array(b)) => a.items == b.items,
            (ConfigValue::Object(a), ConfigValue::Object(b)) => a.entries == b.entries,
            _ => false,
        }
    }
}

impl PartialEq<Value> for ConfigValue {
    fn eq(&self, other: &Value) -> bool {
        self.to_json() == *other
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        ConfigValue::from_json(&value)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConfigValue::Null => serializer.serialize_unit(),
            ConfigValue::Bool(b) => serializer.serialize_bool(*b),
            ConfigValue::Number(n) => n.serialize(serializer),
            ConfigValue::String(s) => serializer.serialize_str(s),
            ConfigValue::Array(array) => array.serialize(serializer),
            ConfigValue::Object(object) => object.serialize(serializer),
        }
    }
}

impl Serialize for ConfigObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for ConfigArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}
