//! `threadweave schema` subcommands

use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use threadweave_core::{JsonSchema, repair_structured, validate_structured};

use crate::SchemaCommands;
use crate::error::CliError;

pub fn run_schema_command(command: SchemaCommands) -> Result<(), CliError> {
    match command {
        SchemaCommands::Validate {
            schema,
            data,
            repair,
        } => {
            let output = validate_files(&schema, &data, repair)?;
            println!("{}", output);
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<Value, CliError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn validate_files(schema: &Path, data: &Path, repair: bool) -> Result<String, CliError> {
    let schema = JsonSchema::from_value(read_json(schema)?)?;
    let data = read_json(data)?;
    validate_document(&schema, &data, repair)
}

/// Validate `data`; with `repair`, fall back to a repaired document that must
/// itself validate.
pub fn validate_document(
    schema: &JsonSchema,
    data: &Value,
    repair: bool,
) -> Result<String, CliError> {
    match validate_structured(data, schema) {
        Ok(()) => {
            info!("Document is valid");
            Ok(serde_json::to_string_pretty(data)?)
        }
        Err(err) if repair => {
            warn!(errors = ?err.errors, "Document invalid, attempting repair");
            let repaired = repair_structured(data, schema);
            validate_structured(&repaired, schema)?;
            Ok(serde_json::to_string_pretty(&repaired)?)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> JsonSchema {
        JsonSchema::from_value(json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "number"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_document_passes() {
        let output = validate_document(&person_schema(), &json!({"name": "Ana"}), false).unwrap();
        assert!(output.contains("Ana"));
    }

    #[test]
    fn test_missing_required_fails_without_repair() {
        let err = validate_document(&person_schema(), &json!({}), false).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VALIDATION");
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_repair_coerces_and_fills() {
        let output = validate_document(&person_schema(), &json!({"age": "25"}), true).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value, json!({"name": "", "age": 25}));
    }

    #[test]
    fn test_validate_files() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.json");
        let data = dir.path().join("data.json");
        std::fs::write(&schema, person_schema().to_value().to_string()).unwrap();
        std::fs::write(&data, r#"{"name": 7}"#).unwrap();

        assert!(validate_files(&schema, &data, false).is_err());
        let repaired: Value =
            serde_json::from_str(&validate_files(&schema, &data, true).unwrap()).unwrap();
        assert_eq!(repaired["name"], json!("7"));
    }
}
