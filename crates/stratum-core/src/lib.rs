//! Stratum Core
//!
//! Resolution engine for layered JSON configuration files: `extends`
//! chains, per-property inheritance policies, path-property rewriting,
//! fallback (rig) locations, schema validation and provenance tracking.

pub mod config;
pub mod error;
pub mod fs;
pub mod module_resolver;
pub mod provenance;
pub mod result;
pub mod rig;
pub mod schema;
pub mod selector;
pub mod value;

pub use config::{
    ConfigurationFile, ConfigurationFileOptions, ConfigurationFileSpec,
    ConfigurationFileSpecBuilder, InheritanceType, LoadedConfiguration, PathResolutionMetadata,
    PathResolutionMethod, PropertyInheritance, PropertyInheritanceDefaults,
};
pub use error::{ConfigFileError, ErrorKind};
pub use fs::{FileSystem, LocalFileSystem};
pub use module_resolver::{
    ModuleResolutionError, ModuleResolver, NodeModuleResolver, PackageJsonLookup,
};
pub use provenance::{Annotated, Provenance, ProvenanceEntry, provenance_report};
pub use result::{Result, ResultExt};
pub use rig::{FallbackProvider, RigConfig, RigConfigError};
pub use schema::{AcceptAll, JsonSchemaValidator, SchemaValidator, SchemaViolation};
pub use selector::{JsonPathSelector, PathSelector, SelectorError, SelectorMatch};
pub use value::{ConfigArray, ConfigObject, ConfigValue};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing/logging for the library
///
/// Honors `RUST_LOG`, defaulting to `stratum=info`.
pub fn init_tracing() {
    init_tracing_with("stratum=info");
}

/// Initialize tracing with an explicit default filter directive
///
/// `RUST_LOG` still takes precedence when set. Calling this more than once
/// is harmless.
pub fn init_tracing_with(default_directive: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
