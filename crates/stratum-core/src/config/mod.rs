//! Layered configuration files
//!
//! A configuration file can extend another one. The engine resolves the
//! whole chain, merges it bottom-up and validates the result:
//!
//! ```jsonc
//! // config/tool.json
//! {
//!   "$schema": "../node_modules/tool/tool.schema.json",
//!   "extends": "example-rig/profiles/default/config/tool.json",
//!   "outDir": "../lib",
//!   "plugins": ["./local-plugin"],
//!   "$plugins.mergeBehavior": "append",
//!   "options": { "strict": true },
//!   "$options.mergeBehavior": "merge"
//! }
//! ```
//!
//! ## Inheritance
//!
//! Per top-level property, the policy comes from (in order) a
//! `"$<property>.mergeBehavior"` directive in the file, the
//! [`ConfigurationFileSpec`] inheritance table, or [`PropertyInheritanceDefaults`]:
//!
//! - `append`: parent items followed by child items
//! - `merge`: shallow merge of two objects, recursively
//! - `replace`: child value wins
//! - `custom`: caller-supplied combiner, registered in code only
//!
//! ## Path properties
//!
//! Selectors registered with [`PathResolutionMetadata`] rewrite relative
//! paths as each file is parsed, so a path in a base file stays relative to
//! that base file.
//!
//! ## Fallback
//!
//! When a project has no file of its own, a
//! [`FallbackProvider`](crate::rig::FallbackProvider) such as a rig supplies
//! a secondary location.

mod loader;
mod merge;
mod paths;
mod spec;

pub use loader::{ConfigurationFile, ConfigurationFileOptions, LoadedConfiguration};
pub use spec::{
    ConfigurationFileSpec, ConfigurationFileSpecBuilder, CustomPathResolver, InheritanceFunction,
    InheritanceType, PathResolutionMetadata, PathResolutionMethod, PropertyInheritance,
    PropertyInheritanceDefaults,
};
