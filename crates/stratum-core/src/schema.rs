//! Schema validation of merged configuration
//!
//! Validation runs on the plain JSON form of a merged configuration, so
//! provenance never reaches the validator.

use schemars::JsonSchema;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::error::ConfigFileError;
use crate::result::Result;

/// A single schema rule that the instance breaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolationDetail {
    /// JSON pointer of the offending value, empty for the root
    pub instance_path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolationDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

/// Validation failure with every reported problem
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{context}: {}", format_details(.details))]
pub struct SchemaViolation {
    pub context: String,
    pub details: Vec<SchemaViolationDetail>,
}

fn format_details(details: &[SchemaViolationDetail]) -> String {
    details
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates a configuration document
pub trait SchemaValidator: Send + Sync {
    /// `context` names the document in diagnostics, typically its file path
    fn validate(&self, value: &Value, context: &str) -> std::result::Result<(), SchemaViolation>;
}

/// Validator for specs without a schema
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn validate(&self, _value: &Value, _context: &str) -> std::result::Result<(), SchemaViolation> {
        Ok(())
    }
}

/// Compiled JSON Schema validator
pub struct JsonSchemaValidator {
    validator: jsonschema::Validator,
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}

impl JsonSchemaValidator {
    /// Compile an inline schema document
    pub fn from_value(schema: &Value) -> Result<Self> {
        Self::compile(schema, "<inline>")
    }

    /// Load and compile a schema file (JSON with comments allowed)
    pub fn from_file(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigFileError::InvalidSchema {
            origin: origin.clone(),
            message: e.to_string(),
        })?;
        let schema: Value = json5::from_str(&text).map_err(|e| ConfigFileError::InvalidSchema {
            origin: origin.clone(),
            message: e.to_string(),
        })?;
        debug!("Loaded schema from {}", origin);
        Self::compile(&schema, &origin)
    }

    /// Generate the schema from a Rust type
    pub fn for_type<T: JsonSchema>() -> Result<Self> {
        let schema = schemars::schema_for!(T).to_value();
        Self::compile(&schema, &format!("for type {}", T::schema_name()))
    }

    fn compile(schema: &Value, origin: &str) -> Result<Self> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| ConfigFileError::InvalidSchema {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { validator })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, value: &Value, context: &str) -> std::result::Result<(), SchemaViolation> {
        let details: Vec<SchemaViolationDetail> = self
            .validator
            .iter_errors(value)
            .map(|error| SchemaViolationDetail {
                instance_path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        if details.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation {
                context: context.to_string(),
                details,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct BuildOptions {
        out_dir: String,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[test]
    fn test_inline_schema() {
        let validator = JsonSchemaValidator::from_value(&json!({
            "type": "object",
            "properties": {"port": {"type": "integer"}},
            "required": ["port"]
        }))
        .unwrap();

        assert!(validator.validate(&json!({"port": 8080}), "a.json").is_ok());

        let violation = validator
            .validate(&json!({"port": "8080"}), "a.json")
            .unwrap_err();
        assert_eq!(violation.context, "a.json");
        assert_eq!(violation.details.len(), 1);
        assert_eq!(violation.details[0].instance_path, "/port");
        assert!(violation.to_string().starts_with("a.json: /port"));
    }

    #[test]
    fn test_schema_for_type() {
        let validator = JsonSchemaValidator::for_type::<BuildOptions>().unwrap();
        assert!(validator
            .validate(&json!({"outDir": "lib", "tags": ["x"]}), "t")
            .is_ok());
        assert!(validator.validate(&json!({"tags": []}), "t").is_err());
        assert!(validator
            .validate(&json!({"outDir": "lib", "extra": 1}), "t")
            .is_err());
    }

    #[test]
    fn test_schema_from_file_accepts_comments() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tool.schema.json");
        std::fs::write(
            &path,
            "{\n  // comments are allowed\n  \"type\": \"object\",\n}\n",
        )
        .unwrap();

        let validator = JsonSchemaValidator::from_file(&path).unwrap();
        assert!(validator.validate(&json!({}), "x").is_ok());
        assert!(validator.validate(&json!([]), "x").is_err());
    }

    #[test]
    fn test_invalid_schema_is_reported() {
        let err = JsonSchemaValidator::from_value(&json!({"type": 12})).unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidSchema { .. }));

        let err = JsonSchemaValidator::from_file(Path::new("/nonexistent/schema.json")).unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidSchema { .. }));
    }

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.validate(&json!(null), "x").is_ok());
    }
}
