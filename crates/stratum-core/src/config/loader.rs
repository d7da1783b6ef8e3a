//! Configuration file resolution engine
//!
//! [`ConfigurationFile`] loads one kind of configuration file (described by
//! a [`ConfigurationFileSpec`]) and follows its `extends` chain. Each
//! distinct file is loaded at most once per engine: concurrent and repeated
//! requests share one in-flight computation from the cache. Failed loads
//! are evicted so a later call retries them.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::merge::merge_configuration;
use super::paths::{PathPropertyResolver, value_kind};
use super::spec::ConfigurationFileSpec;
use crate::error::ConfigFileError;
use crate::fs::{FileSystem, LocalFileSystem, absolute_path, parent_dir, resolve_path};
use crate::module_resolver::{ModuleResolver, NodeModuleResolver, PackageJsonLookup};
use crate::provenance::{Annotated, Provenance, annotate_recursively};
use crate::result::{Result, ResultExt};
use crate::rig::FallbackProvider;
use crate::selector::{JsonPathSelector, PathSelector};
use crate::value::{ConfigObject, ConfigValue};

const EXTENDS_PROPERTY: &str = "extends";

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<ConfigObject>>>>;

/// Collaborators used by the engine
#[derive(Clone)]
pub struct ConfigurationFileOptions {
    pub file_system: Arc<dyn FileSystem>,
    pub module_resolver: Arc<dyn ModuleResolver>,
    pub path_selector: Arc<dyn PathSelector>,
}

impl Default for ConfigurationFileOptions {
    fn default() -> Self {
        Self {
            file_system: Arc::new(LocalFileSystem),
            module_resolver: Arc::new(NodeModuleResolver),
            path_selector: Arc::new(JsonPathSelector),
        }
    }
}

/// A fully resolved, merged and validated configuration
///
/// Cheap to clone; clones share the same tree.
#[derive(Debug, Clone)]
pub struct LoadedConfiguration(Arc<ConfigObject>);

impl LoadedConfiguration {
    /// Whether both handles refer to the same loaded tree
    pub fn ptr_eq(&self, other: &LoadedConfiguration) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The root as a [`ConfigValue`]
    pub fn as_value(&self) -> ConfigValue {
        ConfigValue::Object(Arc::clone(&self.0))
    }

    pub fn root(&self) -> &Arc<ConfigObject> {
        &self.0
    }

    /// Convert into a typed value
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.0.to_json())?)
    }
}

impl Annotated for LoadedConfiguration {
    fn annotation(&self) -> Option<&Provenance> {
        Some(self.0.provenance())
    }
}

impl Deref for LoadedConfiguration {
    type Target = ConfigObject;

    fn deref(&self) -> &ConfigObject {
        &self.0
    }
}

/// Loader for one kind of configuration file
///
/// # Example
///
/// ```no_run
/// use stratum_core::{ConfigurationFile, ConfigurationFileSpec};
/// use std::path::Path;
///
/// # async fn run() -> stratum_core::Result<()> {
/// let spec = ConfigurationFileSpec::builder("config/tool.json").build();
/// let loader = ConfigurationFile::new(spec);
/// let config = loader
///     .load_configuration_file_for_project_async(Path::new("."), None)
///     .await?;
/// println!("{}", config.to_json());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigurationFile {
    inner: Arc<Engine>,
}

struct Engine {
    spec: Arc<ConfigurationFileSpec>,
    file_system: Arc<dyn FileSystem>,
    module_resolver: Arc<dyn ModuleResolver>,
    path_selector: Arc<dyn PathSelector>,
    package_lookup: PackageJsonLookup,
    cache: DashMap<PathBuf, SharedLoad>,
    /// In-flight load of the key -> file whose load it is awaiting
    waiting_on: DashMap<PathBuf, PathBuf>,
}

/// Removes a `waiting_on` edge when the awaiting load finishes or is dropped
struct WaitEdge<'a> {
    waiting_on: &'a DashMap<PathBuf, PathBuf>,
    from: PathBuf,
    to: PathBuf,
}

impl<'a> WaitEdge<'a> {
    fn new(waiting_on: &'a DashMap<PathBuf, PathBuf>, from: &Path, to: &Path) -> Self {
        waiting_on.insert(from.to_path_buf(), to.to_path_buf());
        Self {
            waiting_on,
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        }
    }
}

impl Drop for WaitEdge<'_> {
    fn drop(&mut self) {
        self.waiting_on.remove_if(&self.from, |_, to| *to == self.to);
    }
}

impl ConfigurationFile {
    pub fn new(spec: ConfigurationFileSpec) -> Self {
        Self::with_options(spec, ConfigurationFileOptions::default())
    }

    pub fn with_options(spec: ConfigurationFileSpec, options: ConfigurationFileOptions) -> Self {
        Self {
            inner: Arc::new(Engine {
                spec: Arc::new(spec),
                file_system: options.file_system,
                module_resolver: options.module_resolver,
                path_selector: options.path_selector,
                package_lookup: PackageJsonLookup::new(),
                cache: DashMap::new(),
                waiting_on: DashMap::new(),
            }),
        }
    }

    pub fn spec(&self) -> &ConfigurationFileSpec {
        &self.inner.spec
    }

    /// Load the configured file from `project_path`, consulting `fallback` when
    /// the project has no such file
    ///
    /// Fails with [`ConfigFileError::FileNotFound`] when neither location
    /// has the file.
    pub async fn load_configuration_file_for_project_async(
        &self,
        project_path: &Path,
        fallback: Option<Arc<dyn FallbackProvider>>,
    ) -> Result<LoadedConfiguration> {
        let path = self
            .inner
            .spec
            .configuration_file_path_for_project(project_path)?;
        debug!("Loading configuration for project {}", project_path.display());
        self.inner
            .load_with_cache(path, HashSet::new(), fallback)
            .await
            .map(LoadedConfiguration)
    }

    /// Like [`Self::load_configuration_file_for_project_async`], but a
    /// missing file yields `Ok(None)`
    ///
    /// Results are cached per project file path, whichever way they were
    /// found. Once a fallback has supplied the file for a project, later
    /// calls for that project return the same configuration even when they
    /// pass no fallback.
    pub async fn try_load_configuration_file_for_project_async(
        &self,
        project_path: &Path,
        fallback: Option<Arc<dyn FallbackProvider>>,
    ) -> Result<Option<LoadedConfiguration>> {
        self.load_configuration_file_for_project_async(project_path, fallback)
            .await
            .not_found_as_none()
    }

    /// Load a configuration file addressed directly, without fallback
    pub async fn load_configuration_file_async(&self, path: &Path) -> Result<LoadedConfiguration> {
        let path = absolute_path(path).map_err(|e| ConfigFileError::io_error(path, e))?;
        self.inner
            .load_with_cache(path, HashSet::new(), None)
            .await
            .map(LoadedConfiguration)
    }

    pub async fn try_load_configuration_file_async(
        &self,
        path: &Path,
    ) -> Result<Option<LoadedConfiguration>> {
        self.load_configuration_file_async(path).await.not_found_as_none()
    }

    /// File a loaded object or array was produced from
    pub fn get_object_source_file_path<N: Annotated + ?Sized>(node: &N) -> Option<&Path> {
        node.annotation().and_then(Provenance::source_file_path)
    }

    /// Value of `name` as written in its source file
    ///
    /// Array elements are addressed by their index, e.g. `"1"`.
    pub fn get_property_original_value<'a, N: Annotated + ?Sized>(
        node: &'a N,
        name: &str,
    ) -> Option<&'a ConfigValue> {
        node.annotation()?.original_value(name)
    }

    /// File that contributed the current value of `name`
    pub fn get_property_source_file_path<'a, N: Annotated + ?Sized>(
        node: &'a N,
        name: &str,
    ) -> Option<&'a Path> {
        node.annotation()?.property_source_file_path(name)
    }
}

impl Engine {
    fn load_with_cache(
        self: &Arc<Self>,
        path: PathBuf,
        visited: HashSet<PathBuf>,
        fallback: Option<Arc<dyn FallbackProvider>>,
    ) -> BoxFuture<'static, Result<Arc<ConfigObject>>> {
        let engine = Arc::clone(self);
        async move {
            let shared = match engine.cache.entry(path.clone()) {
                Entry::Occupied(entry) => {
                    debug!("Cache hit for {}", path.display());
                    entry.get().clone()
                }
                Entry::Vacant(entry) => {
                    let mut chain = visited.clone();
                    chain.insert(path.clone());
                    let load = Arc::clone(&engine)
                        .load_uncached(path.clone(), chain, fallback)
                        .boxed()
                        .shared();
                    entry.insert(load).value().clone()
                }
            };

            // Checked outside the shared computation: a file extending
            // itself would otherwise wait on its own pending entry.
            if visited.contains(&path) {
                return Err(ConfigFileError::cycle_detected(&path));
            }
            // Another load may already be waiting, directly or through a
            // chain of loads, on a file this one is part of.
            if shared.peek().is_none() && engine.wait_closes_loop(&path, &visited) {
                return Err(ConfigFileError::cycle_detected(&path));
            }

            let result = shared.clone().await;
            if result.is_err() {
                engine.cache.remove_if(&path, |_, cached| cached.ptr_eq(&shared));
            }
            result
        }
        .boxed()
    }

    /// Whether following the in-flight waits from `path` leads back to
    /// `path` itself or to a file in `visited`
    fn wait_closes_loop(&self, path: &Path, visited: &HashSet<PathBuf>) -> bool {
        let mut seen = HashSet::new();
        let mut current = path.to_path_buf();
        while seen.insert(current.clone()) {
            let Some(next) = self.waiting_on.get(&current).map(|edge| edge.value().clone()) else {
                return false;
            };
            if next == path || visited.contains(&next) {
                return true;
            }
            current = next;
        }
        false
    }

    async fn load_uncached(
        self: Arc<Self>,
        path: PathBuf,
        visited: HashSet<PathBuf>,
        fallback: Option<Arc<dyn FallbackProvider>>,
    ) -> Result<Arc<ConfigObject>> {
        let text = match self.file_system.read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(provider) = fallback {
                    if let Some(loaded) = self.load_from_fallback(&path, provider, &visited).await? {
                        return Ok(loaded);
                    }
                }
                debug!("Configuration file not found: {}", path.display());
                return Err(ConfigFileError::file_not_found(path));
            }
            Err(e) => return Err(ConfigFileError::io_error(path, e)),
        };

        let raw: Value =
            json5::from_str(&text).map_err(|e| ConfigFileError::parse_error(&path, e))?;
        if !raw.is_object() {
            return Err(ConfigFileError::invalid_document(
                &path,
                format!(
                    "the root of a configuration file must be an object, got {}",
                    value_kind(&raw)
                ),
            ));
        }

        let mut resolved = raw.clone();
        PathPropertyResolver {
            file: &path,
            selector: self.path_selector.as_ref(),
            module_resolver: self.module_resolver.as_ref(),
            package_lookup: &self.package_lookup,
        }
        .resolve_all(&mut resolved, self.spec.json_path_metadata())?;

        let current = match annotate_recursively(&path, &resolved, &raw) {
            ConfigValue::Object(object) => object,
            other => {
                return Err(ConfigFileError::invalid_document(
                    &path,
                    format!("expected an object, got {}", other.kind_name()),
                ));
            }
        };

        let parent = match current.get(EXTENDS_PROPERTY) {
            None | Some(ConfigValue::Null) => None,
            Some(ConfigValue::String(reference)) if reference.is_empty() => None,
            Some(ConfigValue::String(reference)) => {
                Some(self.load_parent(&path, reference, &visited).await?)
            }
            Some(other) => {
                return Err(ConfigFileError::invalid_document(
                    &path,
                    format!(
                        "the \"{EXTENDS_PROPERTY}\" property must be a string, got {}",
                        other.kind_name()
                    ),
                ));
            }
        };

        let merged = merge_configuration(&path, parent.as_deref(), &current, &self.spec)?;

        self.spec
            .schema()
            .validate(&merged.to_json(), &path.display().to_string())
            .map_err(|source| ConfigFileError::SchemaValidation {
                path: path.clone(),
                source,
            })?;

        debug!("Loaded configuration file {}", path.display());
        Ok(merged)
    }

    async fn load_parent(
        self: &Arc<Self>,
        file: &Path,
        reference: &str,
        visited: &HashSet<PathBuf>,
    ) -> Result<Arc<ConfigObject>> {
        let parent_path = match self
            .module_resolver
            .resolve_module(reference, parent_dir(file))
        {
            Ok(parent_path) => parent_path,
            Err(e) if e.is_not_found() => {
                return Err(ConfigFileError::broken_extends(file, reference));
            }
            Err(source) => {
                return Err(ConfigFileError::ModuleResolution {
                    file: file.to_path_buf(),
                    source,
                });
            }
        };
        debug!("{} extends {}", file.display(), parent_path.display());

        let _edge = WaitEdge::new(&self.waiting_on, file, &parent_path);
        self.load_with_cache(parent_path, visited.clone(), None)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ConfigFileError::broken_extends(file, reference)
                } else {
                    err
                }
            })
    }

    /// `Ok(None)` when the provider is unavailable or lacks the file
    async fn load_from_fallback(
        self: &Arc<Self>,
        primary: &Path,
        provider: Arc<dyn FallbackProvider>,
        visited: &HashSet<PathBuf>,
    ) -> Result<Option<Arc<ConfigObject>>> {
        if !provider.is_available() {
            debug!("Fallback {} is not available", provider.describe());
            return Ok(None);
        }

        let base_folder = provider.resolved_base_folder().await?;
        let candidate = resolve_path(&base_folder, self.spec.project_relative_file_path());
        debug!(
            "Trying {} from {}",
            candidate.display(),
            provider.describe()
        );

        let _edge = WaitEdge::new(&self.waiting_on, primary, &candidate);
        match self.load_with_cache(candidate.clone(), visited.clone(), None).await {
            Ok(loaded) => Ok(Some(loaded)),
            Err(err) if err.is_not_found() => {
                debug!("Fallback candidate {} does not exist", candidate.display());
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
