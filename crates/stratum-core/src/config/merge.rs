//! Merging a configuration file with the configuration it extends
//!
//! The merge walks the union of the parent's and the child's keys (parent
//! order first) and picks a policy per key:
//!
//! 1. a `"$<name>.mergeBehavior"` directive in the child file
//! 2. the `ConfigurationFileSpec` inheritance table (top level only)
//! 3. [`PropertyInheritanceDefaults`] when both sides are arrays or both
//!    are objects, `replace` otherwise
//!
//! A key defined on one side only takes that side's value whatever the
//! policy. Every produced container gets fresh provenance that still leads
//! back to the files that contributed each value.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use super::spec::{
    ConfigurationFileSpec, InheritanceType, PropertyInheritance, PropertyInheritanceDefaults,
};
use crate::error::ConfigFileError;
use crate::provenance::Provenance;
use crate::result::Result;
use crate::value::{ConfigArray, ConfigObject, ConfigValue};

const EXTENDS_PROPERTY: &str = "extends";
const SCHEMA_PROPERTY: &str = "$schema";
const MERGE_BEHAVIOR_SUFFIX: &str = ".mergeBehavior";

/// Properties that describe the file itself and never merge as data
const FILE_PROPERTIES: [&str; 2] = [EXTENDS_PROPERTY, SCHEMA_PROPERTY];

/// Merge a freshly parsed file over its resolved parent
///
/// `parent` is `None` when the file has no `extends`.
pub(crate) fn merge_configuration(
    file: &Path,
    parent: Option<&ConfigObject>,
    current: &ConfigObject,
    spec: &ConfigurationFileSpec,
) -> Result<Arc<ConfigObject>> {
    let empty = ConfigObject::new(IndexMap::new(), Provenance::default());
    let merger = Merger {
        file,
        defaults: spec.property_inheritance_defaults(),
    };
    merger.merge_objects(
        parent.unwrap_or(&empty),
        current,
        Some(spec.property_inheritance()),
        &FILE_PROPERTIES,
        "",
    )
}

struct Merger<'a> {
    file: &'a Path,
    defaults: PropertyInheritanceDefaults,
}

impl Merger<'_> {
    fn merge_objects(
        &self,
        parent: &ConfigObject,
        current: &ConfigObject,
        table: Option<&IndexMap<String, PropertyInheritance>>,
        ignored: &[&str],
        prefix: &str,
    ) -> Result<Arc<ConfigObject>> {
        let directives = self.parse_directives(current, prefix)?;

        let mut keys: Vec<&str> = parent.keys().collect();
        for key in current.keys() {
            if !parent.contains_key(key) && !is_directive_key(key) {
                keys.push(key);
            }
        }

        let mut entries = IndexMap::with_capacity(keys.len());
        let mut provenance = Provenance::new(Some(self.file.to_path_buf()));

        for key in keys {
            if ignored.contains(&key) {
                continue;
            }
            let property_path = join_property_path(prefix, key);

            let (value, original, source) = match (parent.get(key), current.get(key)) {
                (Some(parent_value), None) => winner(parent, key, parent_value),
                (None, Some(current_value)) => winner(current, key, current_value),
                (Some(parent_value), Some(current_value)) => {
                    let policy = directives
                        .get(key)
                        .map(|t| PropertyInheritance {
                            inheritance_type: *t,
                            inheritance_function: None,
                        })
                        .or_else(|| table.and_then(|t| t.get(key)).cloned())
                        .unwrap_or_else(|| self.default_policy(parent_value, current_value));
                    trace!(
                        "Property \"{}\" in {} uses {} inheritance",
                        property_path,
                        self.file.display(),
                        policy.inheritance_type
                    );

                    match policy.inheritance_type {
                        InheritanceType::Replace => winner(current, key, current_value),
                        _ => {
                            let merged =
                                self.apply_policy(&policy, parent_value, current_value, &property_path)?;
                            (
                                merged.clone(),
                                Some(merged),
                                Some(self.file.to_path_buf()),
                            )
                        }
                    }
                }
                (None, None) => continue,
            };

            provenance.record(key, original, source);
            entries.insert(key.to_string(), value);
        }

        Ok(Arc::new(ConfigObject::new(entries, provenance)))
    }

    fn default_policy(&self, parent: &ConfigValue, current: &ConfigValue) -> PropertyInheritance {
        let inheritance_type = match (parent, current) {
            (ConfigValue::Array(_), ConfigValue::Array(_)) => self.defaults.array,
            (ConfigValue::Object(_), ConfigValue::Object(_)) => self.defaults.object,
            _ => InheritanceType::Replace,
        };
        PropertyInheritance {
            inheritance_type,
            inheritance_function: None,
        }
    }

    fn apply_policy(
        &self,
        policy: &PropertyInheritance,
        parent: &ConfigValue,
        current: &ConfigValue,
        property_path: &str,
    ) -> Result<ConfigValue> {
        match policy.inheritance_type {
            InheritanceType::Replace => Ok(current.clone()),
            InheritanceType::Append => match (parent, current) {
                (ConfigValue::Array(parent), ConfigValue::Array(current)) => {
                    Ok(ConfigValue::Array(Arc::new(append_arrays(parent, current))))
                }
                _ => Err(ConfigFileError::inheritance_policy(
                    self.file,
                    property_path,
                    format!(
                        "the \"append\" inheritance type requires both values to be arrays, \
                         got {} and {}",
                        parent.kind_name(),
                        current.kind_name()
                    ),
                )),
            },
            InheritanceType::Merge => {
                if parent.is_null() || current.is_null() {
                    return Err(ConfigFileError::inheritance_policy(
                        self.file,
                        property_path,
                        "null values cannot be merged",
                    ));
                }
                if !parent.is_container() || !current.is_container() {
                    return Err(ConfigFileError::inheritance_policy(
                        self.file,
                        property_path,
                        "primitive values cannot be merged",
                    ));
                }
                match (parent, current) {
                    (ConfigValue::Object(parent), ConfigValue::Object(current)) => {
                        let merged = self.merge_objects(parent, current, None, &[], property_path)?;
                        Ok(ConfigValue::Object(merged))
                    }
                    _ => Err(ConfigFileError::inheritance_policy(
                        self.file,
                        property_path,
                        "arrays cannot be merged, use \"append\" or \"replace\"",
                    )),
                }
            }
            InheritanceType::Custom => match &policy.inheritance_function {
                Some(combine) => Ok(combine(current, parent)),
                None => Err(ConfigFileError::inheritance_policy(
                    self.file,
                    property_path,
                    "the \"custom\" inheritance type requires an inheritance function",
                )),
            },
        }
    }

    /// Collect and validate `$<name>.mergeBehavior` directives of `current`
    fn parse_directives(
        &self,
        current: &ConfigObject,
        prefix: &str,
    ) -> Result<IndexMap<String, InheritanceType>> {
        let mut directives = IndexMap::new();

        for (key, value) in current.iter() {
            let Some(name) = directive_target(key) else {
                continue;
            };
            let error = |reason: String| {
                ConfigFileError::merge_directive(self.file, join_property_path(prefix, key), reason)
            };

            let target = current.get(name).ok_or_else(|| {
                error(format!(
                    "a merge behavior is declared for \"{name}\", but that property does not exist"
                ))
            })?;
            let keyword = value.as_str().ok_or_else(|| {
                error(format!(
                    "the merge behavior must be a string, got {}",
                    value.kind_name()
                ))
            })?;
            if !matches!(target, ConfigValue::Object(_) | ConfigValue::Array(_)) {
                return Err(error(format!(
                    "a merge behavior can only be declared for an object or array, \
                     but \"{name}\" is {}",
                    target.kind_name()
                )));
            }
            let inheritance_type = InheritanceType::from_directive_keyword(keyword).ok_or_else(|| {
                error(format!(
                    "unsupported merge behavior \"{keyword}\", expected \"append\", \"merge\" or \"replace\""
                ))
            })?;

            directives.insert(name.to_string(), inheritance_type);
        }

        Ok(directives)
    }
}

/// A one-sided or replaced value keeps its side's own provenance
fn winner(
    side: &ConfigObject,
    key: &str,
    value: &ConfigValue,
) -> (ConfigValue, Option<ConfigValue>, Option<PathBuf>) {
    let original = side
        .original_value(key)
        .cloned()
        .unwrap_or_else(|| value.clone());
    let source = side
        .provenance()
        .property_source_file_path(key)
        .map(Path::to_path_buf);
    (value.clone(), Some(original), source)
}

fn append_arrays(parent: &ConfigArray, current: &ConfigArray) -> ConfigArray {
    let mut items = Vec::with_capacity(parent.len() + current.len());
    let mut provenance = Provenance::new(None);

    for (offset, side) in [(0, parent), (parent.len(), current)] {
        for (index, item) in side.iter().enumerate() {
            let key = index.to_string();
            let original = side
                .original_value(index)
                .cloned()
                .unwrap_or_else(|| item.clone());
            let source = side
                .provenance()
                .property_source_file_path(&key)
                .map(Path::to_path_buf);
            provenance.record((offset + index).to_string(), Some(original), source);
            items.push(item.clone());
        }
    }

    ConfigArray::new(items, provenance)
}

fn is_directive_key(key: &str) -> bool {
    directive_target(key).is_some()
}

/// `"$tags.mergeBehavior"` -> `Some("tags")`
fn directive_target(key: &str) -> Option<&str> {
    let name = key.strip_prefix('$')?.strip_suffix(MERGE_BEHAVIOR_SUFFIX)?;
    (!name.is_empty() && !name.contains('.')).then_some(name)
}

fn join_property_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provenance::annotate_recursively;
    use serde_json::{Value, json};

    const PARENT: &str = "/repo/base.json";
    const CHILD: &str = "/repo/config/tool.json";

    fn annotated(file: &str, doc: Value) -> Arc<ConfigObject> {
        annotate_recursively(Path::new(file), &doc, &doc)
            .as_object()
            .cloned()
            .unwrap()
    }

    fn merge_with(spec: &ConfigurationFileSpec, parent: Value, child: Value) -> Result<Arc<ConfigObject>> {
        let parent = annotated(PARENT, parent);
        let child = annotated(CHILD, child);
        merge_configuration(Path::new(CHILD), Some(&*parent), &child, spec)
    }

    fn merge(parent: Value, child: Value) -> Result<Arc<ConfigObject>> {
        merge_with(&ConfigurationFileSpec::builder("tool.json").build(), parent, child)
    }

    #[test]
    fn test_without_parent_drops_file_properties() {
        let child = annotated(
            CHILD,
            json!({"$schema": "s.json", "extends": "./base.json", "name": "x", "tags": ["a"],
                   "$tags.mergeBehavior": "append"}),
        );
        let spec = ConfigurationFileSpec::builder("tool.json").build();
        let merged = merge_configuration(Path::new(CHILD), None, &child, &spec).unwrap();

        assert_eq!(merged.to_json(), json!({"name": "x", "tags": ["a"]}));
        assert_eq!(merged.provenance().source_file_path(), Some(Path::new(CHILD)));
        assert_eq!(merged.original_value("name").unwrap(), &json!("x"));
    }

    #[test]
    fn test_replace_by_default_and_parent_fallback() {
        let merged = merge(json!({"a": 1, "b": "parent"}), json!({"b": "child", "c": true})).unwrap();
        assert_eq!(merged.to_json(), json!({"a": 1, "b": "child", "c": true}));
        assert_eq!(
            merged.keys().collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            merged.provenance().property_source_file_path("a"),
            Some(Path::new(PARENT))
        );
        assert_eq!(
            merged.provenance().property_source_file_path("b"),
            Some(Path::new(CHILD))
        );
    }

    #[test]
    fn test_objects_replace_by_default() {
        let merged = merge(json!({"o": {"a": 1, "b": 2}}), json!({"o": {"b": 3}})).unwrap();
        assert_eq!(merged.to_json(), json!({"o": {"b": 3}}));
    }

    #[test]
    fn test_arrays_append_by_default_with_per_index_originals() {
        let merged = merge(json!({"list": [1, 2]}), json!({"list": [3, 4]})).unwrap();
        assert_eq!(merged.to_json(), json!({"list": [1, 2, 3, 4]}));

        let list = merged.get("list").unwrap().as_array().unwrap();
        assert!(list.provenance().source_file_path().is_none());
        assert_eq!(list.original_value(0).unwrap(), &json!(1));
        assert_eq!(list.original_value(3).unwrap(), &json!(4));
        assert_eq!(
            list.provenance().property_source_file_path("1"),
            Some(Path::new(PARENT))
        );
        assert_eq!(
            list.provenance().property_source_file_path("2"),
            Some(Path::new(CHILD))
        );
        assert!(merged.original_value("list").unwrap().ptr_eq(merged.get("list").unwrap()));
    }

    #[test]
    fn test_inheritance_defaults_are_configurable() {
        let spec = ConfigurationFileSpec::builder("tool.json")
            .inheritance_defaults(PropertyInheritanceDefaults {
                array: InheritanceType::Replace,
                object: InheritanceType::Merge,
            })
            .build();
        let merged = merge_with(
            &spec,
            json!({"list": [1], "o": {"a": 1}}),
            json!({"list": [2], "o": {"b": 2}}),
        )
        .unwrap();
        assert_eq!(merged.to_json(), json!({"list": [2], "o": {"a": 1, "b": 2}}));
    }

    #[test]
    fn test_spec_merge_policy() {
        let spec = ConfigurationFileSpec::builder("tool.json")
            .inheritance("options", PropertyInheritance::merge())
            .build();
        let merged = merge_with(
            &spec,
            json!({"options": {"a": 1, "b": 2}}),
            json!({"options": {"b": 3, "c": 4}}),
        )
        .unwrap();
        assert_eq!(merged.to_json(), json!({"options": {"a": 1, "b": 3, "c": 4}}));

        let options = merged.get("options").unwrap().as_object().unwrap();
        assert_eq!(options.provenance().source_file_path(), Some(Path::new(CHILD)));
        assert_eq!(
            options.provenance().property_source_file_path("a"),
            Some(Path::new(PARENT))
        );
    }

    #[test]
    fn test_merge_rejects_null_and_arrays() {
        let spec = ConfigurationFileSpec::builder("tool.json")
            .inheritance("options", PropertyInheritance::merge())
            .build();

        let err = merge_with(&spec, json!({"options": null}), json!({"options": {"a": 1}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inheritance);
        assert!(err.to_string().contains("null"));

        let err = merge_with(&spec, json!({"options": [1]}), json!({"options": [2]})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inheritance);
        assert!(err.to_string().contains("arrays"));

        let err = merge_with(&spec, json!({"options": 1}), json!({"options": {"a": 1}})).unwrap_err();
        assert!(err.to_string().contains("primitive"));
    }

    #[test]
    fn test_append_requires_arrays() {
        let spec = ConfigurationFileSpec::builder("tool.json")
            .inheritance("tags", PropertyInheritance::append())
            .build();
        let err = merge_with(&spec, json!({"tags": "a"}), json!({"tags": ["b"]})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inheritance);
        assert!(err.to_string().contains("\"tags\""));
    }

    #[test]
    fn test_custom_policy() {
        let spec = ConfigurationFileSpec::builder("tool.json")
            .inheritance(
                "version",
                PropertyInheritance::custom(|child, parent| {
                    let sum = child.as_i64().unwrap_or(0) + parent.as_i64().unwrap_or(0);
                    ConfigValue::from_json(&json!(sum))
                }),
            )
            .build();
        let merged = merge_with(&spec, json!({"version": 2}), json!({"version": 3})).unwrap();
        assert_eq!(merged.to_json(), json!({"version": 5}));

        let missing = ConfigurationFileSpec::builder("tool.json")
            .inheritance(
                "version",
                PropertyInheritance {
                    inheritance_type: InheritanceType::Custom,
                    inheritance_function: None,
                },
            )
            .build();
        let err = merge_with(&missing, json!({"version": 2}), json!({"version": 3})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inheritance);
    }

    #[test]
    fn test_directive_overrides_spec_and_defaults() {
        let spec = ConfigurationFileSpec::builder("tool.json")
            .inheritance("tags", PropertyInheritance::replace())
            .build();
        let merged = merge_with(
            &spec,
            json!({"tags": ["b"]}),
            json!({"tags": ["a"], "$tags.mergeBehavior": "APPEND"}),
        )
        .unwrap();
        assert_eq!(merged.to_json(), json!({"tags": ["b", "a"]}));

        let merged = merge(
            json!({"list": [1]}),
            json!({"list": [2], "$list.mergeBehavior": "replace"}),
        )
        .unwrap();
        assert_eq!(merged.to_json(), json!({"list": [2]}));
    }

    #[test]
    fn test_directives_apply_in_nested_merges() {
        let spec = ConfigurationFileSpec::builder("tool.json")
            .inheritance("options", PropertyInheritance::merge())
            .build();
        let merged = merge_with(
            &spec,
            json!({"options": {"inner": {"a": 1}}}),
            json!({"options": {"inner": {"b": 2}, "$inner.mergeBehavior": "merge"}}),
        )
        .unwrap();
        assert_eq!(merged.to_json(), json!({"options": {"inner": {"a": 1, "b": 2}}}));
    }

    #[test]
    fn test_directive_errors() {
        let cases = [
            (json!({"$tags.mergeBehavior": "append"}), "does not exist"),
            (json!({"tags": ["a"], "$tags.mergeBehavior": 1}), "must be a string"),
            (json!({"tags": "a", "$tags.mergeBehavior": "append"}), "object or array"),
            (json!({"tags": null, "$tags.mergeBehavior": "append"}), "object or array"),
            (json!({"tags": ["a"], "$tags.mergeBehavior": "prepend"}), "unsupported"),
        ];
        for (child, message) in cases {
            let err = merge(json!({"tags": ["b"]}), child).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MergeDirective);
            assert!(err.to_string().contains(message), "{err} should mention {message}");
            assert!(err.to_string().contains("$tags.mergeBehavior"));
        }
    }

    #[test]
    fn test_directive_target_parsing() {
        assert_eq!(directive_target("$tags.mergeBehavior"), Some("tags"));
        assert_eq!(directive_target("tags.mergeBehavior"), None);
        assert_eq!(directive_target("$.mergeBehavior"), None);
        assert_eq!(directive_target("$a.b.mergeBehavior"), None);
        assert_eq!(directive_target("$schema"), None);
    }

    #[test]
    fn test_replaced_value_keeps_child_original() {
        let parent = annotated(PARENT, json!({"outDir": "/repo/lib"}));
        let raw = json!({"outDir": "lib"});
        let rewritten = json!({"outDir": "/repo/config/lib"});
        let child = annotate_recursively(Path::new(CHILD), &rewritten, &raw);
        let child = child.as_object().unwrap();

        let spec = ConfigurationFileSpec::builder("tool.json").build();
        let merged = merge_configuration(Path::new(CHILD), Some(&*parent), child, &spec).unwrap();
        assert_eq!(merged.get("outDir").unwrap(), &json!("/repo/config/lib"));
        assert_eq!(merged.original_value("outDir").unwrap(), &json!("lib"));
        assert_eq!(
            merged
                .provenance()
                .property_source_file_path("outDir")
                .map(Path::to_path_buf),
            Some(PathBuf::from(CHILD))
        );
    }
}
