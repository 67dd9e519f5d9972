//! JSON-Schema subset used for tool inputs and structured turn output.
//!
//! Validation and repair are deliberately separate passes. [`CompiledSchema`]
//! reports the first violation at each level of the tree; [`repair_structured`]
//! makes a best-effort reconstruction and never fails, so its result may still
//! be invalid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::error::SchemaValidationError;

/// `$schema` URI stamped by [`normalize_schema`].
pub const SCHEMA_DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

/// One type name or a list of allowed type names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaType {
    One(String),
    Many(Vec<String>),
}

impl SchemaType {
    pub fn names(&self) -> Vec<&str> {
        match self {
            SchemaType::One(name) => vec![name.as_str()],
            SchemaType::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        self.names().contains(&name)
    }

    /// The single declared type, if exactly one is declared.
    pub fn single(&self) -> Option<&str> {
        match self {
            SchemaType::One(name) => Some(name.as_str()),
            SchemaType::Many(names) if names.len() == 1 => Some(names[0].as_str()),
            SchemaType::Many(_) => None,
        }
    }
}

/// `items`: a schema applied to every element, or a tuple of positional schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaItems {
    Tuple(Vec<JsonSchema>),
    Single(Box<JsonSchema>),
}

/// `additionalProperties`: a flag or a schema for undeclared properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<JsonSchema>),
}

/// A JSON Schema restricted to the keywords this crate understands.
///
/// Unknown keywords (`title`, `format`, `minimum`, ...) are kept in `extra` so
/// a schema round-trips unchanged to providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSchema {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema_uri: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, JsonSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<SchemaItems>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl JsonSchema {
    /// Schema with a single declared type.
    pub fn of_type(name: impl Into<String>) -> Self {
        Self {
            schema_type: Some(SchemaType::One(name.into())),
            ..Default::default()
        }
    }

    pub fn object() -> Self {
        Self::of_type("object")
    }

    pub fn string() -> Self {
        Self::of_type("string")
    }

    pub fn number() -> Self {
        Self::of_type("number")
    }

    pub fn boolean() -> Self {
        Self::of_type("boolean")
    }

    pub fn array_of(items: JsonSchema) -> Self {
        Self {
            items: Some(SchemaItems::Single(Box::new(items))),
            ..Self::of_type("array")
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: JsonSchema) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), schema);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(AdditionalProperties::Allowed(allowed));
        self
    }

    /// Parse a schema from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn property(&self, name: &str) -> Option<&JsonSchema> {
        self.properties.as_ref().and_then(|props| props.get(name))
    }

    fn forbids_additional(&self) -> bool {
        matches!(
            self.additional_properties,
            Some(AdditionalProperties::Allowed(false))
        )
    }
}

/// Outcome of [`CompiledSchema::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// A schema prepared for repeated validation.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    schema: JsonSchema,
}

pub fn compile_schema(schema: JsonSchema) -> CompiledSchema {
    CompiledSchema { schema }
}

impl CompiledSchema {
    pub fn schema(&self) -> &JsonSchema {
        &self.schema
    }

    pub fn validate(&self, data: &Value) -> ValidationResult {
        let mut errors = Vec::new();
        let valid = validate_node(data, &self.schema, &mut errors, "root");
        ValidationResult { valid, errors }
    }
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_integral(data: &Value) -> bool {
    match data {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

fn matches_type(data: &Value, schema_type: &SchemaType) -> bool {
    let actual = type_name(data);
    schema_type
        .names()
        .iter()
        .any(|name| *name == actual || (*name == "integer" && is_integral(data)))
}

fn validate_node(data: &Value, schema: &JsonSchema, errors: &mut Vec<String>, path: &str) -> bool {
    if let Some(schema_type) = &schema.schema_type
        && !matches_type(data, schema_type)
    {
        errors.push(format!(
            "{}: expected type {}, got {}",
            path,
            schema_type.names().join("|"),
            type_name(data)
        ));
        return false;
    }

    if let Value::Object(map) = data {
        for key in schema.required.iter().flatten() {
            if !map.contains_key(key) {
                errors.push(format!("{}: missing required property '{}'", path, key));
                return false;
            }
        }

        for (key, prop_schema) in schema.properties.iter().flatten() {
            if let Some(value) = map.get(key)
                && !validate_node(value, prop_schema, errors, &format!("{}.{}", path, key))
            {
                return false;
            }
        }
    }

    if let (Value::Array(items), Some(SchemaItems::Single(item_schema))) = (data, &schema.items) {
        for (i, item) in items.iter().enumerate() {
            if !validate_node(item, item_schema, errors, &format!("{}[{}]", path, i)) {
                return false;
            }
        }
    }

    if let Some(allowed) = &schema.enum_values
        && !allowed.contains(data)
    {
        errors.push(format!(
            "{}: value not in enum {}",
            path,
            Value::Array(allowed.clone())
        ));
        return false;
    }

    true
}

/// Validate `data`, failing with every collected violation.
pub fn validate_structured(data: &Value, schema: &JsonSchema) -> Result<(), SchemaValidationError> {
    let result = compile_schema(schema.clone()).validate(data);
    if result.valid {
        Ok(())
    } else {
        Err(SchemaValidationError::new(result.errors))
    }
}

/// Best-effort reconstruction of `data` so that it conforms to `schema`.
///
/// Declared properties are coerced to their type, missing required properties
/// are filled, and undeclared properties are dropped only when
/// `additionalProperties` is `false`.
pub fn repair_structured(data: &Value, schema: &JsonSchema) -> Value {
    match data {
        Value::Object(map) if declares(schema, "object") => repair_object(map, schema),
        _ => coerce_value(data, schema),
    }
}

fn declares(schema: &JsonSchema, name: &str) -> bool {
    schema
        .schema_type
        .as_ref()
        .is_some_and(|t| t.allows(name))
}

fn repair_object(map: &Map<String, Value>, schema: &JsonSchema) -> Value {
    let mut repaired = Map::new();

    for (key, prop_schema) in schema.properties.iter().flatten() {
        if let Some(value) = map.get(key) {
            repaired.insert(key.clone(), coerce_value(value, prop_schema));
        } else if let Some(default) = &prop_schema.default {
            repaired.insert(key.clone(), default.clone());
        }
    }

    for key in schema.required.iter().flatten() {
        if !repaired.contains_key(key) {
            let filler = schema.property(key).map(fill_value).unwrap_or(Value::Null);
            repaired.insert(key.clone(), filler);
        }
    }

    if !schema.forbids_additional() {
        for (key, value) in map {
            if !repaired.contains_key(key) {
                repaired.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(repaired)
}

/// Value used for a missing required property.
fn fill_value(schema: &JsonSchema) -> Value {
    if let Some(default) = &schema.default {
        return default.clone();
    }
    if let Some(constant) = &schema.const_value {
        return constant.clone();
    }
    if let Some(first) = schema.enum_values.as_ref().and_then(|values| values.first()) {
        return first.clone();
    }
    zero_value(schema.schema_type.as_ref().and_then(SchemaType::single))
}

/// Type-appropriate empty value.
pub fn zero_value(type_name: Option<&str>) -> Value {
    match type_name {
        Some("string") => Value::String(String::new()),
        Some("number") | Some("integer") => json!(0),
        Some("boolean") => Value::Bool(false),
        Some("array") => json!([]),
        Some("object") => json!({}),
        _ => Value::Null,
    }
}

fn number_from_f64(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(json!(f as i64))
    } else {
        serde_json::Number::from_f64(f).map(Value::Number)
    }
}

fn coerce_number(value: &Value) -> Value {
    let parsed = match value {
        Value::Number(_) => return value.clone(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed
        .and_then(number_from_f64)
        .unwrap_or_else(|| value.clone())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn coerce_value(value: &Value, schema: &JsonSchema) -> Value {
    match schema.schema_type.as_ref().and_then(SchemaType::single) {
        Some("number") | Some("integer") => coerce_number(value),
        Some("boolean") => match value {
            Value::String(s) => Value::Bool(s == "true" || s == "1"),
            other => Value::Bool(truthy(other)),
        },
        Some("string") => match value {
            Value::String(_) => value.clone(),
            Value::Null => Value::String("null".to_string()),
            other => Value::String(other.to_string()),
        },
        Some("object") => match value {
            Value::Object(map) => repair_object(map, schema),
            _ => value.clone(),
        },
        Some("array") => match (value, &schema.items) {
            (Value::Array(items), Some(SchemaItems::Single(item_schema))) => Value::Array(
                items
                    .iter()
                    .map(|item| coerce_value(item, item_schema))
                    .collect(),
            ),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Structured-output contract for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutputConfig {
    pub schema: JsonSchema,
    /// Ask the provider to enforce the schema strictly
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

impl StructuredOutputConfig {
    pub fn new(schema: JsonSchema) -> Self {
        Self {
            schema,
            strict: true,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Copy of `schema` with a `$schema` URI, keeping any existing one.
pub fn normalize_schema(schema: &JsonSchema) -> JsonSchema {
    let mut normalized = schema.clone();
    if normalized.schema_uri.is_none() {
        normalized.schema_uri = Some(SCHEMA_DRAFT_2020_12.to_string());
    }
    normalized
}

/// OpenAI `response_format` body.
pub fn to_openai_schema(config: &StructuredOutputConfig) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "response",
            "strict": config.strict,
            "schema": config.schema.to_value(),
        }
    })
}

/// Anthropic takes the schema as-is.
pub fn to_anthropic_schema(config: &StructuredOutputConfig) -> JsonSchema {
    config.schema.clone()
}

/// Gemini function declaration wrapping the schema.
pub fn to_gemini_schema(config: &StructuredOutputConfig) -> Value {
    json!({
        "name": "generate_response",
        "description": "Generate a structured response",
        "parameters": config.schema.to_value(),
    })
}
