//! Module-style reference resolution and package root lookup
//!
//! `extends` references and `NodeResolve` path properties are module
//! specifiers: `./base.json` and `../shared/base.json` resolve against the
//! referencing file's folder, while bare specifiers such as
//! `my-rig/profiles/default/tool.json` or `@scope/pkg` are looked up in
//! `node_modules` folders from the base folder upward.

use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

use crate::fs::resolve_path;

const PACKAGE_JSON: &str = "package.json";
const NODE_MODULES: &str = "node_modules";

/// Failure to turn a specifier into a path
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModuleResolutionError {
    /// Nothing exists at any candidate location
    #[error("Cannot find module \"{specifier}\" from '{}'", base_dir.display())]
    NotFound { specifier: String, base_dir: PathBuf },

    /// The specifier is empty or syntactically invalid
    #[error("Invalid module specifier \"{specifier}\": {reason}")]
    InvalidSpecifier { specifier: String, reason: String },

    /// A package's `package.json` could not be read
    #[error("Invalid package.json at '{}': {message}", path.display())]
    InvalidPackageJson { path: PathBuf, message: String },
}

impl ModuleResolutionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModuleResolutionError::NotFound { .. })
    }
}

/// Resolves module specifiers to absolute file paths
pub trait ModuleResolver: Send + Sync {
    fn resolve_module(
        &self,
        specifier: &str,
        base_dir: &Path,
    ) -> Result<PathBuf, ModuleResolutionError>;
}

/// Node-style resolution for JSON configuration files
///
/// For a candidate path the resolver tries the exact file, the file with a
/// `.json` extension, and for folders the `main` entry of `package.json`
/// falling back to `index.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeModuleResolver;

impl ModuleResolver for NodeModuleResolver {
    fn resolve_module(
        &self,
        specifier: &str,
        base_dir: &Path,
    ) -> Result<PathBuf, ModuleResolutionError> {
        if specifier.trim().is_empty() {
            return Err(ModuleResolutionError::InvalidSpecifier {
                specifier: specifier.to_string(),
                reason: "specifier is empty".to_string(),
            });
        }

        let not_found = || ModuleResolutionError::NotFound {
            specifier: specifier.to_string(),
            base_dir: base_dir.to_path_buf(),
        };

        if is_path_specifier(specifier) {
            let candidate = resolve_path(base_dir, specifier);
            return resolve_as_file_or_directory(&candidate)?.ok_or_else(not_found);
        }

        let (package_name, subpath) = split_package_specifier(specifier)?;
        for folder in base_dir.ancestors() {
            if folder.file_name().is_some_and(|name| name == NODE_MODULES) {
                continue;
            }
            let package_dir = folder.join(NODE_MODULES).join(package_name);
            if !package_dir.is_dir() {
                continue;
            }
            trace!("Probing package folder {}", package_dir.display());

            let resolved = match subpath {
                Some(subpath) => resolve_as_file_or_directory(&resolve_path(&package_dir, subpath))?,
                None => resolve_as_directory(&package_dir)?,
            };
            if let Some(resolved) = resolved {
                return Ok(resolved);
            }
        }

        Err(not_found())
    }
}

/// Locate the folder of an installed package from `base_dir`
pub fn find_package_folder(package_name: &str, base_dir: &Path) -> Option<PathBuf> {
    base_dir
        .ancestors()
        .filter(|folder| !folder.file_name().is_some_and(|name| name == NODE_MODULES))
        .map(|folder| folder.join(NODE_MODULES).join(package_name))
        .find(|candidate| candidate.join(PACKAGE_JSON).is_file())
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

/// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `Some("sub/path")`)
fn split_package_specifier(specifier: &str) -> Result<(&str, Option<&str>), ModuleResolutionError> {
    let invalid = |reason: &str| ModuleResolutionError::InvalidSpecifier {
        specifier: specifier.to_string(),
        reason: reason.to_string(),
    };

    let name_len = if specifier.starts_with('@') {
        let scope_end = specifier
            .find('/')
            .ok_or_else(|| invalid("scoped package name is missing its package part"))?;
        match specifier[scope_end + 1..].find('/') {
            Some(offset) => scope_end + 1 + offset,
            None => specifier.len(),
        }
    } else {
        specifier.find('/').unwrap_or(specifier.len())
    };

    let package_name = &specifier[..name_len];
    if package_name.is_empty() || package_name.ends_with('/') {
        return Err(invalid("package name is empty"));
    }
    let subpath = specifier[name_len..].trim_start_matches('/');
    Ok((package_name, (!subpath.is_empty()).then_some(subpath)))
}

fn resolve_as_file_or_directory(candidate: &Path) -> Result<Option<PathBuf>, ModuleResolutionError> {
    if let Some(file) = resolve_as_file(candidate) {
        return Ok(Some(file));
    }
    if candidate.is_dir() {
        return resolve_as_directory(candidate);
    }
    Ok(None)
}

fn resolve_as_file(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    let mut with_extension = candidate.as_os_str().to_owned();
    with_extension.push(".json");
    let with_extension = PathBuf::from(with_extension);
    with_extension.is_file().then_some(with_extension)
}

fn resolve_as_directory(folder: &Path) -> Result<Option<PathBuf>, ModuleResolutionError> {
    let manifest_path = folder.join(PACKAGE_JSON);
    if manifest_path.is_file() {
        let invalid = |message: String| ModuleResolutionError::InvalidPackageJson {
            path: manifest_path.clone(),
            message,
        };
        let text = fs::read_to_string(&manifest_path).map_err(|e| invalid(e.to_string()))?;
        let manifest: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
        if let Some(main) = manifest.get("main").and_then(|m| m.as_str()) {
            if let Some(file) = resolve_as_file(&resolve_path(folder, main)) {
                return Ok(Some(file));
            }
        }
    }
    Ok(resolve_as_file(&folder.join("index.json")))
}

/// Finds the nearest enclosing package root (a folder with `package.json`)
///
/// Lookups are memoized per folder for the lifetime of the instance.
#[derive(Debug, Default)]
pub struct PackageJsonLookup {
    cache: DashMap<PathBuf, Option<PathBuf>>,
}

impl PackageJsonLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Package folder containing `path`, searching upward from it
    pub fn try_get_package_folder_for(&self, path: &Path) -> Option<PathBuf> {
        let start = if path.is_file() {
            path.parent()?
        } else {
            path
        };
        self.lookup(start)
    }

    #[cfg(test)]
    pub(crate) fn remember(&self, folder: &Path, package_folder: Option<PathBuf>) {
        self.cache.insert(folder.to_path_buf(), package_folder);
    }

    fn lookup(&self, folder: &Path) -> Option<PathBuf> {
        if let Some(cached) = self.cache.get(folder) {
            return cached.value().clone();
        }

        let result = if folder.join(PACKAGE_JSON).is_file() {
            Some(folder.to_path_buf())
        } else {
            folder.parent().and_then(|parent| self.lookup(parent))
        };

        self.cache.insert(folder.to_path_buf(), result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) -> PathBuf {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_relative_specifiers() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let base = write(root, "config/base.json", "{}");
        let resolver = NodeModuleResolver;

        let from = root.join("config");
        assert_eq!(resolver.resolve_module("./base.json", &from).unwrap(), base);
        assert_eq!(resolver.resolve_module("./base", &from).unwrap(), base);
        assert_eq!(
            resolver
                .resolve_module("../config/base.json", &root.join("src"))
                .unwrap(),
            base
        );

        let err = resolver.resolve_module("./missing.json", &from).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_bare_specifiers_walk_node_modules() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let shared = write(
            root,
            "node_modules/shared-config/profiles/default/tool.json",
            "{}",
        );
        write(root, "node_modules/@acme/base/package.json", r#"{"main": "base.json"}"#);
        let scoped = write(root, "node_modules/@acme/base/base.json", "{}");
        let nested = root.join("packages/app/config");
        fs::create_dir_all(&nested).unwrap();

        let resolver = NodeModuleResolver;
        assert_eq!(
            resolver
                .resolve_module("shared-config/profiles/default/tool.json", &nested)
                .unwrap(),
            shared
        );
        assert_eq!(resolver.resolve_module("@acme/base", &nested).unwrap(), scoped);
        assert!(resolver
            .resolve_module("not-installed/tool.json", &nested)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_invalid_specifiers() {
        let resolver = NodeModuleResolver;
        let err = resolver.resolve_module("", Path::new("/")).unwrap_err();
        assert!(matches!(err, ModuleResolutionError::InvalidSpecifier { .. }));

        let err = resolver.resolve_module("@scope", Path::new("/")).unwrap_err();
        assert!(matches!(err, ModuleResolutionError::InvalidSpecifier { .. }));
    }

    #[test]
    fn test_split_package_specifier() {
        assert_eq!(split_package_specifier("pkg").unwrap(), ("pkg", None));
        assert_eq!(
            split_package_specifier("pkg/a/b.json").unwrap(),
            ("pkg", Some("a/b.json"))
        );
        assert_eq!(
            split_package_specifier("@s/pkg/a.json").unwrap(),
            ("@s/pkg", Some("a.json"))
        );
        assert_eq!(split_package_specifier("@s/pkg").unwrap(), ("@s/pkg", None));
    }

    #[test]
    fn test_package_json_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "project/package.json", "{}");
        let config = write(root, "project/config/deep/tool.json", "{}");

        let lookup = PackageJsonLookup::new();
        assert_eq!(
            lookup.try_get_package_folder_for(&config),
            Some(root.join("project"))
        );
        // memoized folders answer again without change
        assert_eq!(
            lookup.try_get_package_folder_for(&root.join("project/config")),
            Some(root.join("project"))
        );
    }
}
