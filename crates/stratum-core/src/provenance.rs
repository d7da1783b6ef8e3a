//! Provenance tracking for loaded configuration
//!
//! Every container node produced by the loader carries a [`Provenance`]
//! record: the file the node came from and, per property, the value as it
//! was written before path rewriting or merging, plus the file that value
//! was written in. The annotator fills these in when a file is parsed; the
//! merger rebuilds them for merge results so that lookups still lead back to
//! the file that originally contributed a value.

use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::value::{ConfigArray, ConfigObject, ConfigValue};

/// Origin record attached to a container node
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    source_file_path: Option<PathBuf>,
    original_values: IndexMap<String, ConfigValue>,
    property_sources: IndexMap<String, PathBuf>,
}

impl Provenance {
    pub(crate) fn new(source_file_path: Option<PathBuf>) -> Self {
        Self {
            source_file_path,
            original_values: IndexMap::new(),
            property_sources: IndexMap::new(),
        }
    }

    /// File this node was produced from; `None` for nodes built by an
    /// `append` merge or created outside the loader
    pub fn source_file_path(&self) -> Option<&Path> {
        self.source_file_path.as_deref()
    }

    /// Pre-merge value of `name` (array elements use their index)
    pub fn original_value(&self, name: &str) -> Option<&ConfigValue> {
        self.original_values.get(name)
    }

    /// File that contributed the current value of `name`
    pub fn property_source_file_path(&self, name: &str) -> Option<&Path> {
        self.property_sources
            .get(name)
            .map(PathBuf::as_path)
            .or(self.source_file_path())
    }

    pub fn original_values(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.original_values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn record(
        &mut self,
        name: impl Into<String>,
        original: Option<ConfigValue>,
        source: Option<PathBuf>,
    ) {
        let name = name.into();
        if let Some(source) = source {
            self.property_sources.insert(name.clone(), source);
        }
        if let Some(original) = original {
            self.original_values.insert(name, original);
        }
    }
}

/// A node whose provenance can be queried
///
/// Implemented for objects, arrays and values, so lookups by property name
/// (or array index) work the same on every kind of node.
pub trait Annotated {
    /// `None` for primitives
    fn annotation(&self) -> Option<&Provenance>;
}

impl Annotated for ConfigObject {
    fn annotation(&self) -> Option<&Provenance> {
        Some(self.provenance())
    }
}

impl Annotated for ConfigArray {
    fn annotation(&self) -> Option<&Provenance> {
        Some(self.provenance())
    }
}

impl Annotated for ConfigValue {
    fn annotation(&self) -> Option<&Provenance> {
        self.provenance()
    }
}

impl<T: Annotated + ?Sized> Annotated for Arc<T> {
    fn annotation(&self) -> Option<&Provenance> {
        (**self).annotation()
    }
}

/// Build an annotated tree for a freshly parsed file
///
/// `node` is the document after path rewriting and `original` the document
/// exactly as parsed; both have the same shape. Each container records the
/// shallow, pre-rewrite copy of its properties. Nested containers are
/// recorded as the annotated node itself.
pub(crate) fn annotate_recursively(file_path: &Path, node: &Value, original: &Value) -> ConfigValue {
    match node {
        Value::Object(map) => {
            let original_map = original.as_object();
            let mut provenance = Provenance::new(Some(file_path.to_path_buf()));
            let mut entries = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                let original_child = original_map.and_then(|m| m.get(key)).unwrap_or(value);
                let annotated = annotate_recursively(file_path, value, original_child);
                provenance.record(
                    key.clone(),
                    Some(original_of(&annotated, original_child)),
                    Some(file_path.to_path_buf()),
                );
                entries.insert(key.clone(), annotated);
            }
            ConfigValue::Object(Arc::new(ConfigObject::new(entries, provenance)))
        }
        Value::Array(items) => {
            let original_items = original.as_array();
            let mut provenance = Provenance::new(Some(file_path.to_path_buf()));
            let mut annotated_items = Vec::with_capacity(items.len());
            for (index, value) in items.iter().enumerate() {
                let original_child = original_items.and_then(|a| a.get(index)).unwrap_or(value);
                let annotated = annotate_recursively(file_path, value, original_child);
                provenance.record(
                    index.to_string(),
                    Some(original_of(&annotated, original_child)),
                    Some(file_path.to_path_buf()),
                );
                annotated_items.push(annotated);
            }
            ConfigValue::Array(Arc::new(ConfigArray::new(annotated_items, provenance)))
        }
        primitive => ConfigValue::from_json(primitive),
    }
}

fn original_of(annotated: &ConfigValue, original: &Value) -> ConfigValue {
    if annotated.is_container() {
        annotated.clone()
    } else {
        ConfigValue::from_json(original)
    }
}

/// One leaf value of a loaded configuration and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenanceEntry {
    /// JSONPath-style location, e.g. `$.compiler.paths[1]`
    pub path: String,
    pub value: ConfigValue,
    /// Value as written in the source file, before path rewriting
    pub original_value: Option<ConfigValue>,
    pub source_file_path: Option<PathBuf>,
}

/// Flatten a configuration tree into leaf values with their origins
///
/// Empty containers are reported as leaves.
pub fn provenance_report(root: &ConfigObject) -> Vec<ProvenanceEntry> {
    let mut entries = Vec::new();
    collect_object(root, "$", &mut entries);
    entries
}

fn collect_object(object: &ConfigObject, path: &str, out: &mut Vec<ProvenanceEntry>) {
    for (key, value) in object.iter() {
        let child_path = if is_plain_identifier(key) {
            format!("{path}.{key}")
        } else {
            format!("{path}['{}']", key.replace('\'', "\\'"))
        };
        collect_value(
            value,
            child_path,
            object.provenance(),
            key,
            out,
        );
    }
}

fn collect_value(
    value: &ConfigValue,
    path: String,
    container: &Provenance,
    key: &str,
    out: &mut Vec<ProvenanceEntry>,
) {
    match value {
        ConfigValue::Object(object) if !object.is_empty() => collect_object(object, &path, out),
        ConfigValue::Array(array) if !array.is_empty() => {
            for (index, item) in array.iter().enumerate() {
                collect_value(
                    item,
                    format!("{path}[{index}]"),
                    array.provenance(),
                    &index.to_string(),
                    out,
                );
            }
        }
        leaf => out.push(ProvenanceEntry {
            path,
            value: leaf.clone(),
            original_value: container.original_value(key).cloned(),
            source_file_path: container.property_source_file_path(key).map(Path::to_path_buf),
        }),
    }
}

fn is_plain_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
