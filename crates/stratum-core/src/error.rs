//! Error types for configuration file resolution

use crate::module_resolver::ModuleResolutionError;
use crate::schema::SchemaViolation;
use crate::selector::SelectorError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Main error type for configuration loading operations
///
/// The type is `Clone` because a single in-flight load is shared by every
/// caller waiting on the same file; each of them receives the same failure.
#[derive(Debug, Clone, Error)]
pub enum ConfigFileError {
    /// The configuration file (and any fallback candidate) does not exist
    #[error("File does not exist: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Reading the file failed for a reason other than it being absent
    #[error("Cannot read configuration file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Malformed JSON/JSONC text or an unexpected document shape
    #[error("In configuration file '{}': {message}", path.display())]
    Parse {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Arc<json5::Error>>,
    },

    /// The merged configuration does not satisfy the schema
    #[error(
        "Resolved configuration object in '{}' does not match schema: {source}",
        path.display()
    )]
    SchemaValidation {
        path: PathBuf,
        #[source]
        source: SchemaViolation,
    },

    /// The schema itself could not be loaded or compiled
    #[error("Invalid schema {origin}: {message}")]
    InvalidSchema { origin: String, message: String },

    /// The `extends` chain revisits a file within one resolution
    #[error(
        "A loop has been detected in the \"extends\" properties of configuration file at '{}'",
        path.display()
    )]
    CycleDetected { path: PathBuf },

    /// The `extends` target cannot be found
    #[error(
        "In file '{}', file referenced in \"extends\" property (\"{reference}\") cannot be resolved",
        file.display()
    )]
    BrokenExtendsReference { file: PathBuf, reference: String },

    /// Malformed `$<property>.mergeBehavior` directive
    #[error(
        "Issue in processing configuration file property \"{property}\" in '{}': {reason}",
        file.display()
    )]
    MergeDirective {
        file: PathBuf,
        property: String,
        reason: String,
    },

    /// An inheritance policy cannot be applied to the values it was given
    #[error(
        "Issue in processing configuration file property \"{property}\" in '{}': {reason}",
        file.display()
    )]
    InheritancePolicy {
        file: PathBuf,
        property: String,
        reason: String,
    },

    /// No enclosing package root exists for a project-root-relative path
    #[error("Could not find a package root for path '{}'", path.display())]
    PackageRootNotFound { path: PathBuf },

    /// A path property could not be rewritten
    #[error(
        "Cannot resolve path property \"{property_path}\" in '{}': {reason}",
        file.display()
    )]
    PathResolution {
        file: PathBuf,
        property_path: String,
        reason: String,
    },

    /// A path selector could not be evaluated
    #[error("Invalid path selector in '{}': {source}", file.display())]
    Selector {
        file: PathBuf,
        #[source]
        source: SelectorError,
    },

    /// Module resolution failed; a missing `extends` target is reported as
    /// [`ConfigFileError::BrokenExtendsReference`] instead
    #[error("Module resolution failed in '{}': {source}", file.display())]
    ModuleResolution {
        file: PathBuf,
        #[source]
        source: ModuleResolutionError,
    },

    /// The fallback provider could not locate its base folder
    #[error("Fallback configuration {provider} is unusable: {source}")]
    Fallback {
        provider: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A loaded configuration could not be converted to a typed value
    #[error("Cannot deserialize configuration: {source}")]
    Deserialize {
        #[source]
        source: Arc<serde_json::Error>,
    },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Io,
    Parse,
    Schema,
    Cycle,
    Extends,
    MergeDirective,
    Inheritance,
    PathResolution,
    Fallback,
    Deserialize,
}

impl ConfigFileError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigFileError::FileNotFound { .. } => ErrorKind::NotFound,
            ConfigFileError::Io { .. } => ErrorKind::Io,
            ConfigFileError::Parse { .. } => ErrorKind::Parse,
            ConfigFileError::SchemaValidation { .. } => ErrorKind::Schema,
            ConfigFileError::InvalidSchema { .. } => ErrorKind::Schema,
            ConfigFileError::CycleDetected { .. } => ErrorKind::Cycle,
            ConfigFileError::BrokenExtendsReference { .. } => ErrorKind::Extends,
            ConfigFileError::MergeDirective { .. } => ErrorKind::MergeDirective,
            ConfigFileError::InheritancePolicy { .. } => ErrorKind::Inheritance,
            ConfigFileError::PackageRootNotFound { .. } => ErrorKind::PathResolution,
            ConfigFileError::PathResolution { .. } => ErrorKind::PathResolution,
            ConfigFileError::Selector { .. } => ErrorKind::PathResolution,
            ConfigFileError::ModuleResolution { .. } => ErrorKind::PathResolution,
            ConfigFileError::Fallback { .. } => ErrorKind::Fallback,
            ConfigFileError::Deserialize { .. } => ErrorKind::Deserialize,
        }
    }

    /// Whether this is the "file does not exist" failure
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Create a parse error from a JSON5 syntax failure
    pub fn parse_error(path: impl Into<PathBuf>, source: json5::Error) -> Self {
        Self::Parse {
            path: path.into(),
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a parse error for a document that parsed but has the wrong shape
    pub fn invalid_document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn cycle_detected(path: &Path) -> Self {
        Self::CycleDetected {
            path: path.to_path_buf(),
        }
    }

    pub fn broken_extends(file: &Path, reference: impl Into<String>) -> Self {
        Self::BrokenExtendsReference {
            file: file.to_path_buf(),
            reference: reference.into(),
        }
    }

    pub fn merge_directive(
        file: &Path,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MergeDirective {
            file: file.to_path_buf(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    pub fn inheritance_policy(
        file: &Path,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InheritancePolicy {
            file: file.to_path_buf(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    pub fn path_resolution(
        file: &Path,
        property_path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PathResolution {
            file: file.to_path_buf(),
            property_path: property_path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error raised by a fallback provider
    pub fn fallback_error<E>(provider: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Fallback {
            provider: provider.into(),
            source: Arc::new(source),
        }
    }
}

impl From<serde_json::Error> for ConfigFileError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialize {
            source: Arc::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_is_distinguishable() {
        let err = ConfigFileError::file_not_found("/repo/config/tool.json");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "File does not exist: /repo/config/tool.json"
        );

        let broken = ConfigFileError::broken_extends(Path::new("/repo/a.json"), "./b.json");
        assert!(!broken.is_not_found());
        assert_eq!(broken.kind(), ErrorKind::Extends);
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = ConfigFileError::io_error(
            "/repo/config.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_messages_name_the_file() {
        let err = ConfigFileError::cycle_detected(Path::new("/repo/a.json"));
        assert!(err.to_string().contains("/repo/a.json"));
        assert!(err.to_string().contains("loop"));

        let err = ConfigFileError::merge_directive(
            Path::new("/repo/a.json"),
            "$tags.mergeBehavior",
            "unsupported inheritance type \"prepend\"",
        );
        assert!(err.to_string().contains("$tags.mergeBehavior"));
        assert!(err.to_string().contains("/repo/a.json"));
    }
}
