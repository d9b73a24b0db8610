// src/schema.rs

use serde_json::{json, Map, Value};

use crate::error::{Result, WatcherError};

const TYPE_NAMES: &[&str] = &[
    "string", "integer", "number", "boolean", "object", "array", "null",
];

/// Structured-output constraint derived from a document's `format` object.
///
/// Two spellings are accepted: a JSON schema (anything carrying `type` or
/// `properties`) or the shorthand `{"field": "typename", ...}`, which becomes
/// an object schema where every listed field is required.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    schema: Value,
}

impl OutputSchema {
    pub fn from_format(format: &Value) -> Result<Self> {
        let obj = format.as_object().ok_or_else(|| {
            WatcherError::InvalidDocument("'format' must be an object".to_string())
        })?;

        if obj.contains_key("type") || obj.contains_key("properties") {
            return Ok(OutputSchema {
                schema: format.clone(),
            });
        }

        let mut properties = Map::new();
        for (field, spec) in obj {
            let property = match spec {
                Value::String(type_name) if TYPE_NAMES.contains(&type_name.as_str()) => {
                    json!({ "type": type_name })
                }
                Value::Object(_) => spec.clone(),
                other => {
                    return Err(WatcherError::InvalidDocument(format!(
                        "unsupported type {} for format field '{}'",
                        other, field
                    )))
                }
            };
            properties.insert(field.clone(), property);
        }
        let required: Vec<Value> = obj.keys().cloned().map(Value::String).collect();

        Ok(OutputSchema {
            schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        })
    }

    pub fn as_json_schema(&self) -> &Value {
        &self.schema
    }

    /// Parses raw model output and checks it against the schema.
    pub fn parse_output(&self, raw: &str, provider: &str, model: &str) -> Result<Map<String, Value>> {
        let value: Value = serde_json::from_str(raw.trim()).map_err(|e| {
            WatcherError::provider(
                provider,
                model,
                None,
                format!("malformed structured output: {}", e),
            )
        })?;
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(WatcherError::provider(
                    provider,
                    model,
                    None,
                    format!("structured output is not an object: {}", other),
                ))
            }
        };
        self.validate(&fields)
            .map_err(|reason| WatcherError::provider(provider, model, None, reason))?;
        Ok(fields)
    }

    /// Checks required fields and the declared top-level property types.
    pub fn validate(&self, fields: &Map<String, Value>) -> std::result::Result<(), String> {
        if let Some(required) = self.schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    return Err(format!(
                        "structured output is missing required field '{}'",
                        name
                    ));
                }
            }
        }

        if let Some(properties) = self.schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                let (Some(value), Some(expected)) = (fields.get(name), property.get("type"))
                else {
                    continue;
                };
                if !type_matches(expected, value) {
                    return Err(format!(
                        "structured output field '{}' expected type {}, got {}",
                        name, expected, value
                    ));
                }
            }
        }
        Ok(())
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(name, value)),
        _ => true,
    }
}

fn single_type_matches(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
