//! Structural validation of tool-call arguments.
//!
//! A tool's declared input schema is translated into checks by pure
//! recursive descent over the closed set of primitive schema kinds: string,
//! number/integer, boolean, null, array, object. Composite keywords the
//! descent does not recognize (`oneOf`, `allOf`, `$ref`, a missing `type`)
//! fall back to accepting the value, so an exotic schema never blocks a
//! call the server itself would accept.

use regex::Regex;
use serde_json::Value;

use toolmux_core::FieldError;

/// Validate arguments against a tool's input schema.
///
/// Returns one [`FieldError`] per failing field; empty means valid.
#[must_use]
pub fn validate_args(schema: &Value, args: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    validate_value(schema, args, "", &mut errors);
    errors
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "arguments" } else { path }
}

fn child_path(path: &str, property: &str) -> String {
    if path.is_empty() {
        property.to_string()
    } else {
        format!("{path}.{property}")
    }
}

fn validate_value(schema: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(kind) = schema.get("type").and_then(Value::as_str) else {
        // No recognizable type keyword: accept anything.
        return;
    };

    match kind {
        "string" => validate_string(schema, value, path, errors),
        "number" => validate_number(schema, value, path, errors, false),
        "integer" => validate_number(schema, value, path, errors, true),
        "boolean" => {
            if !value.is_boolean() {
                errors.push(FieldError::new(display_path(path), "expected a boolean"));
            }
        }
        "null" => {
            if !value.is_null() {
                errors.push(FieldError::new(display_path(path), "expected null"));
            }
        }
        "array" => validate_array(schema, value, path, errors),
        "object" => validate_object(schema, value, path, errors),
        _ => {
            // Unrecognized type keyword: accept.
        }
    }
}

fn validate_string(schema: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(s) = value.as_str() else {
        errors.push(FieldError::new(display_path(path), "expected a string"));
        return;
    };

    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if (s.chars().count() as u64) < min {
            errors.push(FieldError::new(
                display_path(path),
                format!("must be at least {min} characters"),
            ));
        }
    }

    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if s.chars().count() as u64 > max {
            errors.push(FieldError::new(
                display_path(path),
                format!("must be at most {max} characters"),
            ));
        }
    }

    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        // An uncompilable pattern never blocks the call.
        if let Ok(re) = Regex::new(pattern) {
            if !re.is_match(s) {
                errors.push(FieldError::new(
                    display_path(path),
                    format!("does not match pattern '{pattern}'"),
                ));
            }
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.iter().any(|candidate| candidate == value) {
            errors.push(FieldError::new(
                display_path(path),
                "is not one of the allowed values",
            ));
        }
    }
}

fn validate_number(
    schema: &Value,
    value: &Value,
    path: &str,
    errors: &mut Vec<FieldError>,
    integer: bool,
) {
    let Some(n) = value.as_f64() else {
        errors.push(FieldError::new(display_path(path), "expected a number"));
        return;
    };

    if integer && !(value.is_i64() || value.is_u64()) {
        errors.push(FieldError::new(display_path(path), "expected an integer"));
        return;
    }

    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if n < min {
            errors.push(FieldError::new(
                display_path(path),
                format!("must be at least {min}"),
            ));
        }
    }

    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if n > max {
            errors.push(FieldError::new(
                display_path(path),
                format!("must be at most {max}"),
            ));
        }
    }
}

fn validate_array(schema: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(items) = value.as_array() else {
        errors.push(FieldError::new(display_path(path), "expected an array"));
        return;
    };

    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            validate_value(item_schema, item, &format!("{path}[{index}]"), errors);
        }
    }
}

fn validate_object(schema: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(map) = value.as_object() else {
        errors.push(FieldError::new(display_path(path), "expected an object"));
        return;
    };

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for name in &required {
        if !map.contains_key(*name) {
            errors.push(FieldError::new(child_path(path, name), "is required"));
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property_schema) in properties {
            // Declared properties absent from `required` are optional;
            // undeclared extras are accepted untouched.
            if let Some(property_value) = map.get(name) {
                validate_value(
                    property_schema,
                    property_value,
                    &child_path(path, name),
                    errors,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {"type": "string", "minLength": 1},
                "days": {"type": "integer", "minimum": 1, "maximum": 14},
                "units": {"type": "string", "enum": ["metric", "imperial"]},
            },
            "required": ["city"],
        })
    }

    #[test]
    fn test_valid_arguments_pass() {
        let errors = validate_args(
            &weather_schema(),
            &json!({"city": "Oslo", "days": 3, "units": "metric"}),
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_missing_required_lists_field_path() {
        let errors = validate_args(&weather_schema(), &json!({"days": 3}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "city");
        assert_eq!(errors[0].message, "is required");
    }

    #[test]
    fn test_numeric_range_violations() {
        let errors = validate_args(&weather_schema(), &json!({"city": "Oslo", "days": 15}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "days");
        assert!(errors[0].message.contains("at most 14"));

        let errors = validate_args(&weather_schema(), &json!({"city": "Oslo", "days": 0}));
        assert!(errors[0].message.contains("at least 1"));
    }

    #[test]
    fn test_extra_undeclared_properties_accepted() {
        let errors = validate_args(
            &weather_schema(),
            &json!({"city": "Oslo", "verbose": true, "nested": {"x": 1}}),
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_enum_violation() {
        let errors = validate_args(&weather_schema(), &json!({"city": "Oslo", "units": "kelvin"}));
        assert_eq!(errors[0].path, "units");
        assert!(errors[0].message.contains("allowed values"));
    }

    #[test]
    fn test_integer_rejects_fractional() {
        let errors = validate_args(&weather_schema(), &json!({"city": "Oslo", "days": 2.5}));
        assert_eq!(errors[0].path, "days");
        assert_eq!(errors[0].message, "expected an integer");
    }

    #[test]
    fn test_pattern_constraint() {
        let schema = json!({"type": "string", "pattern": "^[a-z]+$"});
        assert!(validate_args(&schema, &json!("abc")).is_empty());
        let errors = validate_args(&schema, &json!("ABC"));
        assert!(errors[0].message.contains("pattern"));
        // Broken patterns never block.
        let broken = json!({"type": "string", "pattern": "["});
        assert!(validate_args(&broken, &json!("anything")).is_empty());
    }

    #[test]
    fn test_array_items_recurse_with_index_paths() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string"}},
            },
        });
        let errors = validate_args(&schema, &json!({"tags": ["ok", 7]}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "tags[1]");
    }

    #[test]
    fn test_nested_object_paths() {
        let schema = json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "object",
                    "properties": {"limit": {"type": "integer"}},
                    "required": ["limit"],
                },
            },
        });
        let errors = validate_args(&schema, &json!({"filter": {}}));
        assert_eq!(errors[0].path, "filter.limit");
    }

    #[test]
    fn test_unrecognized_shapes_accept_anything() {
        assert!(validate_args(&json!({}), &json!({"any": "thing"})).is_empty());
        assert!(validate_args(&json!({"oneOf": []}), &json!(42)).is_empty());
        assert!(validate_args(&json!({"type": "unknown-kind"}), &json!(42)).is_empty());
    }

    #[test]
    fn test_non_object_arguments_against_object_schema() {
        let errors = validate_args(&weather_schema(), &json!("not an object"));
        assert_eq!(errors[0].path, "arguments");
        assert_eq!(errors[0].message, "expected an object");
    }

    #[test]
    fn test_multiple_failures_all_reported() {
        let errors = validate_args(&weather_schema(), &json!({"days": 99, "units": "kelvin"}));
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"city"));
        assert!(paths.contains(&"days"));
        assert!(paths.contains(&"units"));
    }
}
