//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] and reports problems
//! as [`Diagnostic`]s, so the engine can show them next to the offending
//! attribute.
//!
//! # Example
//!
//! ```
//! use freeipa_provider::schema::{Attribute, Schema};
//! use freeipa_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("service", Attribute::required_string())
//!     .with_attribute("force", Attribute::optional_bool());
//!
//! assert!(validate(&schema, &json!({"service": "HTTP"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"service": "HTTP", "force": "yes"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("force".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns an empty list when the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
/// - Attributes unknown to the schema are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(name, attr, obj.get(name), &mut diagnostics);
    }

    for name in obj.keys() {
        if !schema.attributes.contains_key(name) {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("This attribute is not defined in the schema")
                    .with_attribute(name),
            );
        }
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    path: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => {
            let matches = match attr.attr_type {
                AttributeType::String => v.is_string(),
                AttributeType::Int64 => v.is_i64() || v.is_u64(),
                AttributeType::Bool => v.is_boolean(),
            };
            if !matches {
                diagnostics.push(type_error(path, attr.attr_type, v));
            }
        }
    }
}

fn type_error(path: &str, expected: AttributeType, got: &Value) -> Diagnostic {
    let expected = match expected {
        AttributeType::String => "string",
        AttributeType::Int64 => "int64",
        AttributeType::Bool => "bool",
    };
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_schema() -> Schema {
        Schema::v0()
            .with_attribute("service", Attribute::required_string().with_force_new())
            .with_attribute("host", Attribute::required_string().with_force_new())
            .with_attribute("force", Attribute::optional_bool())
            .with_attribute("id", Attribute::computed_string())
    }

    #[test]
    fn test_validate_required_string() {
        let schema = service_schema();

        let diagnostics = validate(&schema, &json!({"service": "HTTP", "host": "a.example.com"}));
        assert!(diagnostics.is_empty());

        let diagnostics = validate(&schema, &json!({"service": "HTTP"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("host".to_string()));

        let diagnostics = validate(&schema, &json!({"service": "HTTP", "host": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"service": 80, "host": "a"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_optional_bool() {
        let schema = service_schema();

        assert!(is_valid(
            &schema,
            &json!({"service": "HTTP", "host": "a", "force": true})
        ));
        assert!(is_valid(
            &schema,
            &json!({"service": "HTTP", "host": "a", "force": null})
        ));

        let diagnostics = validate(&schema, &json!({"service": "HTTP", "host": "a", "force": 1}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("Expected bool, got number")
        );
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = service_schema();
        let diagnostics = validate(&schema, &json!({"service": "HTTP", "host": "a", "id": 7}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_unknown_attribute() {
        let schema = service_schema();
        let diagnostics = validate(
            &schema,
            &json!({"service": "HTTP", "host": "a", "realm": "EXAMPLE.COM"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("realm".to_string()));
    }

    #[test]
    fn test_validate_non_object() {
        let diagnostics = validate(&service_schema(), &json!("HTTP/a"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
    }

    #[test]
    fn test_validate_result() {
        let schema = service_schema();
        assert!(validate_result(&schema, &json!({"service": "HTTP", "host": "a"})).is_ok());
        let err = validate_result(&schema, &json!({})).unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
