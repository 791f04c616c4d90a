//! A small declarative JSON-schema subset used to validate tool input/output
//! values (`spec.md` §4.3: "Schemas are declarative validators producing
//! parsed values or a validation failure"). Supports the subset of
//! JSON Schema the kernel's own tools and tests need: `type`, `required`,
//! `properties`, `items`, `enum`, `additionalProperties`.

use serde_json::Value;

/// Checks that a schema node is itself well-formed — grounded in
/// `tandem-tools`'s `validate_tool_schemas`: arrays must declare `items`,
/// and nested schemas (`properties`, `items`, `additionalProperties`) are
/// checked recursively. Run once at registration time.
pub fn validate_schema_node(schema: &Value, path: &str) -> Result<(), String> {
    let Some(obj) = schema.as_object() else {
        return Ok(());
    };
    if let Some(Value::String(ty)) = obj.get("type") {
        if ty == "array" && !obj.contains_key("items") {
            return Err(format!("{path}: array schema missing 'items'"));
        }
    }
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for (key, sub) in props {
            validate_schema_node(sub, &format!("{path}.properties.{key}"))?;
        }
    }
    if let Some(items) = obj.get("items") {
        validate_schema_node(items, &format!("{path}.items"))?;
    }
    if let Some(additional) = obj.get("additionalProperties") {
        if additional.is_object() {
            validate_schema_node(additional, &format!("{path}.additionalProperties"))?;
        }
    }
    for combinator in ["oneOf", "anyOf", "allOf"] {
        if let Some(arr) = obj.get(combinator).and_then(Value::as_array) {
            for (i, sub) in arr.iter().enumerate() {
                validate_schema_node(sub, &format!("{path}.{combinator}[{i}]"))?;
            }
        }
    }
    Ok(())
}

/// Validates `value` against `schema`, returning the first mismatch found.
/// Unknown/unsupported schema keywords are ignored rather than rejected —
/// this is a practical subset, not a full JSON-Schema implementation.
pub fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(Value::Array(variants)) = obj.get("enum") {
        if !variants.iter().any(|v| v == value) {
            return Err(format!("{path}: value not in enum"));
        }
    }

    if let Some(Value::String(ty)) = obj.get("type") {
        let matches = match ty.as_str() {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => true,
        };
        if !matches {
            return Err(format!("{path}: expected type '{ty}', got {value}"));
        }
    }

    if let (Some(required), Some(value_obj)) =
        (obj.get("required").and_then(Value::as_array), value.as_object())
    {
        for key in required {
            if let Some(key) = key.as_str() {
                if !value_obj.contains_key(key) {
                    return Err(format!("{path}: missing required field '{key}'"));
                }
            }
        }
    }

    if let (Some(props), Some(value_obj)) =
        (obj.get("properties").and_then(Value::as_object), value.as_object())
    {
        for (key, sub_schema) in props {
            if let Some(sub_value) = value_obj.get(key) {
                validate_value(sub_schema, sub_value, &format!("{path}.{key}"))?;
            }
        }
    }

    if let (Some(items_schema), Some(value_arr)) = (obj.get("items"), value.as_array()) {
        for (i, item) in value_arr.iter().enumerate() {
            validate_value(items_schema, item, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validator_rejects_array_without_items() {
        let schema = json!({"type": "array"});
        assert!(validate_schema_node(&schema, "$").is_err());
    }

    #[test]
    fn validator_accepts_well_formed_nested_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "input": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["input"],
        });
        assert!(validate_schema_node(&schema, "$").is_ok());
    }

    #[test]
    fn value_validation_catches_missing_required_field() {
        let schema = json!({"type": "object", "required": ["input"]});
        let value = json!({});
        assert!(validate_value(&schema, &value, "$").is_err());
    }

    #[test]
    fn value_validation_accepts_conforming_value() {
        let schema = json!({
            "type": "object",
            "properties": {"input": {"type": "string"}},
            "required": ["input"],
        });
        let value = json!({"input": "hello"});
        assert!(validate_value(&schema, &value, "$").is_ok());
    }
}
