//! Command implementations

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use stratum_core::{
    ConfigurationFile, ConfigurationFileSpec, FallbackProvider, JsonSchemaValidator,
    LoadedConfiguration, PathResolutionMetadata, PathResolutionMethod, PropertyInheritance,
    RigConfig, provenance_report,
};

use crate::LoadArgs;
use crate::output;

/// `stratum resolve`
pub async fn resolve(args: &LoadArgs, compact: bool) -> Result<()> {
    if let Some(loaded) = load(args).await? {
        output::print_json(&loaded.to_json(), compact)?;
    }
    Ok(())
}

/// `stratum trace`
pub async fn trace(args: &LoadArgs) -> Result<()> {
    if let Some(loaded) = load(args).await? {
        output::print_trace(&provenance_report(&loaded), &args.project);
    }
    Ok(())
}

/// `stratum version`
pub fn version() {
    println!("{} {}", stratum_core::NAME, stratum_core::VERSION);
}

fn build_spec(args: &LoadArgs) -> Result<ConfigurationFileSpec> {
    let mut builder = ConfigurationFileSpec::builder(&args.file);

    if let Some(schema_path) = &args.schema {
        let schema = JsonSchemaValidator::from_file(schema_path)
            .with_context(|| format!("Failed to load schema '{}'", schema_path.display()))?;
        builder = builder.schema(schema);
    }

    for property in &args.append {
        builder = builder.inheritance(property, PropertyInheritance::append());
    }
    for property in &args.merge {
        builder = builder.inheritance(property, PropertyInheritance::merge());
    }
    for property in &args.replace {
        builder = builder.inheritance(property, PropertyInheritance::replace());
    }

    let path_properties = [
        (&args.relative_path, PathResolutionMethod::RelativeToConfigFile),
        (&args.project_root_path, PathResolutionMethod::RelativeToProjectRoot),
        (&args.node_resolve, PathResolutionMethod::NodeResolve),
    ];
    for (selectors, method) in path_properties {
        for selector in selectors {
            builder = builder.path_property(selector, PathResolutionMetadata::new(method));
        }
    }

    Ok(builder.build())
}

/// Load the configuration; `None` only for a missing file with `--optional`
async fn load(args: &LoadArgs) -> Result<Option<LoadedConfiguration>> {
    let spec = build_spec(args)?;
    let loader = ConfigurationFile::new(spec);

    let fallback: Option<Arc<dyn FallbackProvider>> = if args.rig {
        let rig = RigConfig::load_for_project_folder(&args.project).with_context(|| {
            format!("Failed to read rig configuration of '{}'", args.project.display())
        })?;
        tracing::debug!("Using fallback {}", rig.describe());
        Some(Arc::new(rig))
    } else {
        None
    };

    let loaded = loader
        .try_load_configuration_file_for_project_async(&args.project, fallback)
        .await
        .with_context(|| {
            format!(
                "Failed to resolve '{}' in project '{}'",
                args.file.display(),
                args.project.display()
            )
        })?;

    match loaded {
        Some(loaded) => Ok(Some(loaded)),
        None if args.optional => Ok(None),
        None => bail!(
            "Configuration file '{}' not found in project '{}'",
            args.file.display(),
            args.project.display()
        ),
    }
}
