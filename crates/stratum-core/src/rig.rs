//! Fallback configuration locations
//!
//! When a project does not provide a configuration file itself, the loader
//! can look for it in a secondary location owned by someone else. The
//! common case is a *rig*: an installed package holding shared
//! configuration under `profiles/<profile>/`, selected by the project's
//! `config/rig.json`:
//!
//! ```json
//! {
//!   "rigPackageName": "example-rig",
//!   "rigProfile": "web-library"
//! }
//! ```

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use crate::error::ConfigFileError;
use crate::module_resolver::find_package_folder;
use crate::result::Result;

/// Location of the rig configuration file inside a project
pub const RIG_CONFIG_FILE: &str = "config/rig.json";

const DEFAULT_PROFILE: &str = "default";

static PROFILE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9_.-]+$").unwrap());

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@[a-z0-9][a-z0-9._~-]*/)?[a-z0-9][a-z0-9._~-]*$").unwrap()
});

/// Secondary location consulted when a configuration file is missing
#[async_trait]
pub trait FallbackProvider: Send + Sync {
    /// Whether a fallback location exists at all
    fn is_available(&self) -> bool;

    /// Folder the project-relative configuration path is resolved against
    async fn resolved_base_folder(&self) -> Result<PathBuf>;

    /// Short human-readable description, used in logs and errors
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RigConfigError {
    #[error("Cannot read {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("Invalid rig package name \"{name}\": {reason}")]
    InvalidPackageName { name: String, reason: String },

    #[error("Invalid rig profile name \"{name}\": must match [a-z0-9_.-]+")]
    InvalidProfileName { name: String },

    #[error("Rig package \"{name}\" is not installed for project '{}'", project_folder.display())]
    PackageNotInstalled { name: String, project_folder: PathBuf },

    #[error("Rig profile folder does not exist: {}", path.display())]
    ProfileNotFound { path: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RigConfigFile {
    rig_package_name: String,
    rig_profile: Option<String>,
}

/// A project's rig selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigConfig {
    project_folder: PathBuf,
    rig: Option<RigSelection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RigSelection {
    package_name: String,
    profile: String,
}

impl RigConfig {
    /// Read `config/rig.json` from `project_folder`
    ///
    /// A project without that file gets an unavailable rig.
    pub fn load_for_project_folder(
        project_folder: &Path,
    ) -> std::result::Result<Self, RigConfigError> {
        let path = project_folder.join(RIG_CONFIG_FILE);
        let unreadable = |message: String| RigConfigError::Unreadable {
            path: path.clone(),
            message,
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No rig configuration at {}", path.display());
                return Ok(Self {
                    project_folder: project_folder.to_path_buf(),
                    rig: None,
                });
            }
            Err(e) => return Err(unreadable(e.to_string())),
        };

        let file: RigConfigFile = json5::from_str(&text).map_err(|e| unreadable(e.to_string()))?;
        validate_package_name(&file.rig_package_name)?;
        let profile = file.rig_profile.unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        if !PROFILE_NAME.is_match(&profile) {
            return Err(RigConfigError::InvalidProfileName { name: profile });
        }

        Ok(Self {
            project_folder: project_folder.to_path_buf(),
            rig: Some(RigSelection {
                package_name: file.rig_package_name,
                profile,
            }),
        })
    }

    pub fn project_folder(&self) -> &Path {
        &self.project_folder
    }

    pub fn rig_package_name(&self) -> Option<&str> {
        self.rig.as_ref().map(|rig| rig.package_name.as_str())
    }

    pub fn rig_profile(&self) -> Option<&str> {
        self.rig.as_ref().map(|rig| rig.profile.as_str())
    }

    /// `<rig package>/profiles/<profile>`, which must exist on disk
    pub fn profile_folder(&self) -> std::result::Result<PathBuf, RigConfigError> {
        let rig = self.rig.as_ref().ok_or_else(|| RigConfigError::Unreadable {
            path: self.project_folder.join(RIG_CONFIG_FILE),
            message: "the project does not use a rig".to_string(),
        })?;

        let package_folder = find_package_folder(&rig.package_name, &self.project_folder)
            .ok_or_else(|| RigConfigError::PackageNotInstalled {
                name: rig.package_name.clone(),
                project_folder: self.project_folder.clone(),
            })?;
        let profile_folder = package_folder.join("profiles").join(&rig.profile);
        if !profile_folder.is_dir() {
            return Err(RigConfigError::ProfileNotFound {
                path: profile_folder,
            });
        }
        Ok(profile_folder)
    }
}

#[async_trait]
impl FallbackProvider for RigConfig {
    fn is_available(&self) -> bool {
        self.rig.is_some()
    }

    async fn resolved_base_folder(&self) -> Result<PathBuf> {
        self.profile_folder()
            .map_err(|e| ConfigFileError::fallback_error(self.describe(), e))
    }

    fn describe(&self) -> String {
        match &self.rig {
            Some(rig) => format!("rig \"{}\" (profile \"{}\")", rig.package_name, rig.profile),
            None => "no rig".to_string(),
        }
    }
}

fn validate_package_name(name: &str) -> std::result::Result<(), RigConfigError> {
    let invalid = |reason: &str| RigConfigError::InvalidPackageName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.len() > 214 {
        return Err(invalid("package names are limited to 214 characters"));
    }
    if !PACKAGE_NAME.is_match(name) {
        return Err(invalid("not a valid package name"));
    }
    if !name.ends_with("-rig") {
        return Err(invalid("rig package names must end with \"-rig\""));
    }
    Ok(())
}
