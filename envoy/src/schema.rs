//! JSON-Schema subset validator (§4.6).
//!
//! Supports only: top-level `type: object`, `properties: {name ->
//! {type: string|integer|number|boolean|array|object}}`, and `required:
//! [...]`. Unknown properties are ignored (no `additionalProperties`
//! enforcement). This is intentionally not a general JSON-Schema engine —
//! tools describe their inputs with this subset and nothing more.

use serde_json::Value;

/// A single validation failure, collected per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true, // unrecognized type keywords are not enforced
    }
}

/// Validates `input` against `schema`. Returns `Some(errors)` when any field
/// fails, `None` when the input is valid (including when the schema itself
/// doesn't declare `type: object`, in which case nothing is enforced).
pub fn validate(schema: &Value, input: &Value) -> Option<Vec<ValidationError>> {
    let Some(schema_type) = schema.get("type").and_then(Value::as_str) else {
        return None;
    };
    if schema_type != "object" {
        return None;
    }

    let mut errors = Vec::new();
    let input_obj = input.as_object();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for field in &required {
        let present = input_obj.is_some_and(|o| o.contains_key(*field));
        if !present {
            errors.push(ValidationError {
                field: field.to_string(),
                message: "required field is missing".to_string(),
            });
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            let Some(expected_type) = prop_schema.get("type").and_then(Value::as_str) else {
                continue;
            };
            if let Some(value) = input_obj.and_then(|o| o.get(name)) {
                if !type_matches(expected_type, value) {
                    errors.push(ValidationError {
                        field: name.clone(),
                        message: format!("expected type {expected_type}"),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        None
    } else {
        Some(errors)
    }
}

/// Joins validation errors into the single-string form tools attach to a
/// `ToolResult::Err`.
pub fn errors_to_message(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "count": {"type": "integer"}
            },
            "required": ["path"]
        })
    }

    #[test]
    fn missing_required_is_an_error() {
        let errors = validate(&schema(), &json!({})).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "path");
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let errors = validate(&schema(), &json!({"path": "x", "count": "not a number"})).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "count");
    }

    #[test]
    fn unknown_properties_are_ignored() {
        assert!(validate(&schema(), &json!({"path": "x", "extra": true})).is_none());
    }

    #[test]
    fn valid_input_returns_none() {
        assert!(validate(&schema(), &json!({"path": "x", "count": 3})).is_none());
    }

    #[test]
    fn non_object_schema_is_unchecked() {
        assert!(validate(&json!({"type": "string"}), &json!(42)).is_none());
    }
}
