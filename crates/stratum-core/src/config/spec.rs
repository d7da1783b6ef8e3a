//! Configuration file specifications
//!
//! A [`ConfigurationFileSpec`] describes one kind of configuration file:
//! where it lives in a project, which schema it must satisfy, which of its
//! properties hold paths, and how each top-level property is inherited
//! through `extends`.

use indexmap::IndexMap;
use schemars::JsonSchema;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ConfigFileError;
use crate::fs::{absolute_path, resolve_path};
use crate::result::Result;
use crate::schema::{AcceptAll, JsonSchemaValidator, SchemaValidator};
use crate::value::ConfigValue;

/// Combiner for [`InheritanceType::Custom`]: `(child, parent) -> merged`
pub type InheritanceFunction = Arc<dyn Fn(&ConfigValue, &ConfigValue) -> ConfigValue + Send + Sync>;

/// Rewriter for [`PathResolutionMethod::Custom`]:
/// `(config file, property path, property value) -> new value`
pub type CustomPathResolver = Arc<dyn Fn(&Path, &str, &str) -> String + Send + Sync>;

/// How a property's value is combined with the value inherited via `extends`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InheritanceType {
    /// Parent items followed by child items (arrays only)
    Append,
    /// Recursive shallow merge of two objects
    Merge,
    /// Child value wins
    Replace,
    /// Caller-supplied combiner
    Custom,
}

impl InheritanceType {
    /// Parse a `mergeBehavior` directive keyword
    ///
    /// Only the built-in keywords can appear in files, case-insensitively.
    pub fn from_directive_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "append" => Some(InheritanceType::Append),
            "merge" => Some(InheritanceType::Merge),
            "replace" => Some(InheritanceType::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InheritanceType::Append => "append",
            InheritanceType::Merge => "merge",
            InheritanceType::Replace => "replace",
            InheritanceType::Custom => "custom",
        }
    }
}

impl fmt::Display for InheritanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inheritance policy for one top-level property
#[derive(Clone)]
pub struct PropertyInheritance {
    pub inheritance_type: InheritanceType,
    /// Required when `inheritance_type` is [`InheritanceType::Custom`]
    pub inheritance_function: Option<InheritanceFunction>,
}

impl PropertyInheritance {
    pub fn append() -> Self {
        Self::of(InheritanceType::Append)
    }

    pub fn merge() -> Self {
        Self::of(InheritanceType::Merge)
    }

    pub fn replace() -> Self {
        Self::of(InheritanceType::Replace)
    }

    pub fn custom<F>(combine: F) -> Self
    where
        F: Fn(&ConfigValue, &ConfigValue) -> ConfigValue + Send + Sync + 'static,
    {
        Self {
            inheritance_type: InheritanceType::Custom,
            inheritance_function: Some(Arc::new(combine)),
        }
    }

    fn of(inheritance_type: InheritanceType) -> Self {
        Self {
            inheritance_type,
            inheritance_function: None,
        }
    }
}

impl fmt::Debug for PropertyInheritance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyInheritance")
            .field("inheritance_type", &self.inheritance_type)
            .field("has_function", &self.inheritance_function.is_some())
            .finish()
    }
}

/// Policies applied when neither a directive nor the spec names one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInheritanceDefaults {
    /// Used when both sides are arrays
    pub array: InheritanceType,
    /// Used when both sides are objects
    pub object: InheritanceType,
}

impl Default for PropertyInheritanceDefaults {
    fn default() -> Self {
        Self {
            array: InheritanceType::Append,
            object: InheritanceType::Replace,
        }
    }
}

/// How a string property holding a path is rewritten after parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathResolutionMethod {
    /// Relative to the folder containing the configuration file
    RelativeToConfigFile,
    /// Relative to the nearest folder with a `package.json`
    RelativeToProjectRoot,
    /// Module resolution from the configuration file's folder
    NodeResolve,
    /// Caller-supplied resolver
    Custom,
}

/// Path-property metadata registered for a selector
#[derive(Clone, Default)]
pub struct PathResolutionMetadata {
    /// `None` leaves matched values untouched
    pub method: Option<PathResolutionMethod>,
    /// Required when `method` is [`PathResolutionMethod::Custom`]
    pub custom_resolver: Option<CustomPathResolver>,
}

impl PathResolutionMetadata {
    pub fn new(method: PathResolutionMethod) -> Self {
        Self {
            method: Some(method),
            custom_resolver: None,
        }
    }

    pub fn custom<F>(resolve: F) -> Self
    where
        F: Fn(&Path, &str, &str) -> String + Send + Sync + 'static,
    {
        Self {
            method: Some(PathResolutionMethod::Custom),
            custom_resolver: Some(Arc::new(resolve)),
        }
    }
}

impl fmt::Debug for PathResolutionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathResolutionMetadata")
            .field("method", &self.method)
            .field("has_custom_resolver", &self.custom_resolver.is_some())
            .finish()
    }
}

/// Immutable description of one configuration file kind
#[derive(Clone)]
pub struct ConfigurationFileSpec {
    project_relative_file_path: PathBuf,
    schema: Arc<dyn SchemaValidator>,
    json_path_metadata: IndexMap<String, PathResolutionMetadata>,
    property_inheritance: IndexMap<String, PropertyInheritance>,
    property_inheritance_defaults: PropertyInheritanceDefaults,
}

impl ConfigurationFileSpec {
    /// Start a spec for the file at `project_relative_file_path`
    pub fn builder(project_relative_file_path: impl Into<PathBuf>) -> ConfigurationFileSpecBuilder {
        ConfigurationFileSpecBuilder {
            spec: ConfigurationFileSpec {
                project_relative_file_path: project_relative_file_path.into(),
                schema: Arc::new(AcceptAll),
                json_path_metadata: IndexMap::new(),
                property_inheritance: IndexMap::new(),
                property_inheritance_defaults: PropertyInheritanceDefaults::default(),
            },
        }
    }

    /// Builder whose schema is generated from `T`
    pub fn for_type<T: JsonSchema>(
        project_relative_file_path: impl Into<PathBuf>,
    ) -> Result<ConfigurationFileSpecBuilder> {
        let validator = JsonSchemaValidator::for_type::<T>()?;
        Ok(Self::builder(project_relative_file_path).schema(validator))
    }

    pub fn project_relative_file_path(&self) -> &Path {
        &self.project_relative_file_path
    }

    pub fn schema(&self) -> &dyn SchemaValidator {
        self.schema.as_ref()
    }

    pub fn json_path_metadata(&self) -> &IndexMap<String, PathResolutionMetadata> {
        &self.json_path_metadata
    }

    pub fn property_inheritance(&self) -> &IndexMap<String, PropertyInheritance> {
        &self.property_inheritance
    }

    pub fn property_inheritance_defaults(&self) -> PropertyInheritanceDefaults {
        self.property_inheritance_defaults
    }

    /// Absolute path of this spec's file inside `project_path`
    ///
    /// Relative project paths are taken from the working directory. The
    /// filesystem is not consulted.
    pub fn configuration_file_path_for_project(&self, project_path: &Path) -> Result<PathBuf> {
        let project = absolute_path(project_path)
            .map_err(|e| ConfigFileError::io_error(project_path, e))?;
        Ok(resolve_path(&project, &self.project_relative_file_path))
    }
}

impl fmt::Debug for ConfigurationFileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationFileSpec")
            .field("project_relative_file_path", &self.project_relative_file_path)
            .field("json_path_metadata", &self.json_path_metadata)
            .field("property_inheritance", &self.property_inheritance)
            .field(
                "property_inheritance_defaults",
                &self.property_inheritance_defaults,
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConfigurationFileSpec`]
#[derive(Debug, Clone)]
pub struct ConfigurationFileSpecBuilder {
    spec: ConfigurationFileSpec,
}

impl ConfigurationFileSpecBuilder {
    pub fn schema(mut self, schema: impl SchemaValidator + 'static) -> Self {
        self.spec.schema = Arc::new(schema);
        self
    }

    pub fn shared_schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.spec.schema = schema;
        self
    }

    /// Register a path property; `selector` is a JSONPath expression
    pub fn path_property(
        mut self,
        selector: impl Into<String>,
        metadata: PathResolutionMetadata,
    ) -> Self {
        self.spec.json_path_metadata.insert(selector.into(), metadata);
        self
    }

    /// Set the inheritance policy of a top-level property
    pub fn inheritance(mut self, property: impl Into<String>, policy: PropertyInheritance) -> Self {
        self.spec.property_inheritance.insert(property.into(), policy);
        self
    }

    pub fn inheritance_defaults(mut self, defaults: PropertyInheritanceDefaults) -> Self {
        self.spec.property_inheritance_defaults = defaults;
        self
    }

    pub fn build(self) -> ConfigurationFileSpec {
        self.spec
    }
}
