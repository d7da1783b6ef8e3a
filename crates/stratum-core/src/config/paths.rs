//! Rewriting of path-valued properties
//!
//! Properties registered with a [`PathResolutionMethod`] are rewritten right
//! after parsing, before the file is merged with its parent, so relative
//! paths always resolve against the file that declared them.

use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use tracing::trace;

use super::spec::{PathResolutionMetadata, PathResolutionMethod};
use crate::error::ConfigFileError;
use crate::fs::{parent_dir, resolve_path};
use crate::module_resolver::{ModuleResolver, PackageJsonLookup};
use crate::result::Result;
use crate::selector::PathSelector;

pub(crate) struct PathPropertyResolver<'a> {
    pub file: &'a Path,
    pub selector: &'a dyn PathSelector,
    pub module_resolver: &'a dyn ModuleResolver,
    pub package_lookup: &'a PackageJsonLookup,
}

impl PathPropertyResolver<'_> {
    /// Rewrite every matched property of `document` in place
    pub fn resolve_all(
        &self,
        document: &mut Value,
        metadata: &IndexMap<String, PathResolutionMetadata>,
    ) -> Result<()> {
        for (selector, entry) in metadata {
            let Some(method) = entry.method else {
                continue;
            };

            let matches = self
                .selector
                .select(selector, document)
                .map_err(|source| ConfigFileError::Selector {
                    file: self.file.to_path_buf(),
                    source,
                })?;

            for matched in matches {
                if matched.property_key.is_none() {
                    return Err(ConfigFileError::path_resolution(
                        self.file,
                        &matched.path,
                        format!("selector \"{selector}\" matched the document root, not a property"),
                    ));
                }
                let Value::String(raw) = &matched.value else {
                    return Err(ConfigFileError::path_resolution(
                        self.file,
                        &matched.path,
                        format!("expected a string path, got {}", value_kind(&matched.value)),
                    ));
                };

                let resolved = self.resolve_value(method, entry, &matched.path, raw)?;
                trace!("Rewrote {} from \"{}\" to \"{}\"", matched.path, raw, resolved);

                let slot = document.pointer_mut(&matched.pointer).ok_or_else(|| {
                    ConfigFileError::path_resolution(
                        self.file,
                        &matched.path,
                        "matched property disappeared while rewriting",
                    )
                })?;
                *slot = Value::String(resolved);
            }
        }
        Ok(())
    }

    fn resolve_value(
        &self,
        method: PathResolutionMethod,
        entry: &PathResolutionMetadata,
        property_path: &str,
        value: &str,
    ) -> Result<String> {
        let folder = parent_dir(self.file);
        let resolved = match method {
            PathResolutionMethod::RelativeToConfigFile => resolve_path(folder, value),
            PathResolutionMethod::RelativeToProjectRoot => {
                let root = self
                    .package_lookup
                    .try_get_package_folder_for(self.file)
                    .ok_or_else(|| ConfigFileError::PackageRootNotFound {
                        path: self.file.to_path_buf(),
                    })?;
                resolve_path(&root, value)
            }
            PathResolutionMethod::NodeResolve => self
                .module_resolver
                .resolve_module(value, folder)
                .map_err(|source| ConfigFileError::ModuleResolution {
                    file: self.file.to_path_buf(),
                    source,
                })?,
            PathResolutionMethod::Custom => {
                let resolve = entry.custom_resolver.as_ref().ok_or_else(|| {
                    ConfigFileError::path_resolution(
                        self.file,
                        property_path,
                        "the \"custom\" resolution method requires a custom resolver",
                    )
                })?;
                return Ok(resolve(self.file, property_path, value));
            }
        };
        Ok(resolved.to_string_lossy().into_owned())
    }
}

pub(super) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::module_resolver::NodeModuleResolver;
    use crate::selector::JsonPathSelector;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn rewrite(file: &Path, document: &mut Value, metadata: &[(&str, PathResolutionMetadata)]) -> Result<()> {
        rewrite_with(&PackageJsonLookup::new(), file, document, metadata)
    }

    fn rewrite_with(
        lookup: &PackageJsonLookup,
        file: &Path,
        document: &mut Value,
        metadata: &[(&str, PathResolutionMetadata)],
    ) -> Result<()> {
        let resolver = PathPropertyResolver {
            file,
            selector: &JsonPathSelector,
            module_resolver: &NodeModuleResolver,
            package_lookup: lookup,
        };
        let metadata: IndexMap<String, PathResolutionMetadata> = metadata
            .iter()
            .map(|(selector, entry)| (selector.to_string(), entry.clone()))
            .collect();
        resolver.resolve_all(document, &metadata)
    }

    #[test]
    fn test_relative_to_config_file() {
        let mut document = json!({"outDir": "../lib", "paths": ["a", "./b"], "keep": "x"});
        rewrite(
            Path::new("/repo/config/tool.json"),
            &mut document,
            &[
                ("$.outDir", PathResolutionMetadata::new(PathResolutionMethod::RelativeToConfigFile)),
                ("$.paths[*]", PathResolutionMetadata::new(PathResolutionMethod::RelativeToConfigFile)),
                ("$.keep", PathResolutionMetadata::default()),
            ],
        )
        .unwrap();

        assert_eq!(
            document,
            json!({
                "outDir": "/repo/lib",
                "paths": ["/repo/config/a", "/repo/config/b"],
                "keep": "x"
            })
        );
    }

    #[test]
    fn test_relative_to_project_root() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(project.join("config")).unwrap();
        fs::write(project.join("package.json"), "{}").unwrap();
        let file = project.join("config/tool.json");
        fs::write(&file, "{}").unwrap();

        let mut document = json!({"outDir": "lib"});
        rewrite(
            &file,
            &mut document,
            &[("$.outDir", PathResolutionMetadata::new(PathResolutionMethod::RelativeToProjectRoot))],
        )
        .unwrap();
        assert_eq!(document["outDir"], json!(project.join("lib").to_string_lossy()));
    }

    #[test]
    fn test_missing_project_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("tool.json");
        let mut document = json!({"outDir": "lib"});

        // no package root at or above the temp folder
        let lookup = PackageJsonLookup::new();
        lookup.remember(temp_dir.path(), None);

        let err = rewrite_with(
            &lookup,
            &file,
            &mut document,
            &[("$.outDir", PathResolutionMetadata::new(PathResolutionMethod::RelativeToProjectRoot))],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigFileError::PackageRootNotFound { ref path } if path == &file));
        assert_eq!(document, json!({"outDir": "lib"}));
    }

    #[test]
    fn test_node_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let entry = root.join("node_modules/pkg/lib/entry.json");
        fs::create_dir_all(entry.parent().unwrap()).unwrap();
        fs::write(&entry, "{}").unwrap();
        fs::create_dir_all(root.join("config")).unwrap();
        let file = root.join("config/tool.json");

        let node_resolve = PathResolutionMetadata::new(PathResolutionMethod::NodeResolve);
        let mut document = json!({"entry": "pkg/lib/entry", "local": "../node_modules/pkg/lib/entry.json"});
        rewrite(
            &file,
            &mut document,
            &[("$.entry", node_resolve.clone()), ("$.local", node_resolve.clone())],
        )
        .unwrap();
        assert_eq!(document["entry"], json!(entry.to_string_lossy()));
        assert_eq!(document["local"], json!(entry.to_string_lossy()));

        let err = rewrite(&file, &mut json!({"entry": "./missing.json"}), &[("$.entry", node_resolve)])
            .unwrap_err();
        match err {
            ConfigFileError::ModuleResolution { file: failed, source } => {
                assert_eq!(failed, file);
                assert!(source.is_not_found());
            }
            other => panic!("expected a module resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_resolver() {
        let mut document = json!({"tool": {"bin": "run"}});
        rewrite(
            Path::new("/repo/tool.json"),
            &mut document,
            &[(
                "$.tool.bin",
                PathResolutionMetadata::custom(|file, property, value| {
                    format!("{}|{property}|{value}", file.display())
                }),
            )],
        )
        .unwrap();
        assert_eq!(document["tool"]["bin"], json!("/repo/tool.json|$['tool']['bin']|run"));

        let err = rewrite(
            Path::new("/repo/tool.json"),
            &mut document,
            &[(
                "$.tool.bin",
                PathResolutionMetadata {
                    method: Some(PathResolutionMethod::Custom),
                    custom_resolver: None,
                },
            )],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathResolution);
    }

    #[test]
    fn test_unsupported_matches_fail() {
        let file = Path::new("/repo/tool.json");
        let relative = PathResolutionMetadata::new(PathResolutionMethod::RelativeToConfigFile);

        let err = rewrite(file, &mut json!({"a": 1}), &[("$", relative.clone())]).unwrap_err();
        assert!(err.to_string().contains("document root"));

        let err = rewrite(file, &mut json!({"a": 1}), &[("$.a", relative.clone())]).unwrap_err();
        assert!(err.to_string().contains("got number"));

        let err = rewrite(file, &mut json!({}), &[("outDir", relative)]).unwrap_err();
        assert!(matches!(err, ConfigFileError::Selector { .. }));
    }
}
