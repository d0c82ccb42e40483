//! Dispatch-time argument validation.
//!
//! Applies an [`InputSchema`] to a params map before the handler runs:
//! type checks, required fields, default injection, then the remaining
//! constraints in a fixed order (enum, exclusion, min, max, exclusive
//! min/max, array length, string length, pattern, nested, custom). Errors
//! are path-qualified and collected rather than short-circuited, so a
//! client sees everything wrong with a call at once.
//!
//! Raw-map schemas ([`InputSchema::Raw`]) skip validation entirely.

use regex::Regex;
use serde_json::{Map, Value};

use crate::router::Router;
use wisp_mcp_protocol::{CustomValidator, FieldKind, FieldSchema, InputSchema};

/// Validate `args` against `schema`. On success returns the args with
/// defaults injected; on failure the ordered error list.
pub fn validate(
    schema: &InputSchema,
    args: Map<String, Value>,
    router: &Router,
) -> Result<Map<String, Value>, Vec<String>> {
    let fields = match schema {
        InputSchema::Raw(_) => return Ok(args),
        InputSchema::Fields(fields) => fields,
    };

    let mut out = args;
    let mut errors = Vec::new();
    validate_fields(fields, &mut out, "", router, &mut errors);
    if errors.is_empty() { Ok(out) } else { Err(errors) }
}

fn validate_fields(
    fields: &[(String, FieldSchema)],
    args: &mut Map<String, Value>,
    path: &str,
    router: &Router,
    errors: &mut Vec<String>,
) {
    for (name, field) in fields {
        let field_path = join_path(path, name);
        match args.get_mut(name) {
            Some(value) => validate_value(field, value, &field_path, router, errors),
            None if field.required => {
                errors.push(format!("Missing required field: {}", field_path));
            }
            None => {
                if let Some(default) = &field.default {
                    args.insert(name.clone(), default.clone());
                }
            }
        }
    }
}

fn validate_value(
    field: &FieldSchema,
    value: &mut Value,
    path: &str,
    router: &Router,
    errors: &mut Vec<String>,
) {
    // Type first; nothing else is meaningful on a mistyped value.
    if !type_matches(field, value) {
        errors.push(format!(
            "Field {}: expected {}, got {}",
            path,
            field.type_name(),
            shown(value)
        ));
        return;
    }

    if let Some(allowed) = &field.enum_values {
        if !allowed.contains(value) {
            errors.push(format!(
                "Field {}: {} is not one of the allowed values",
                path,
                shown(value)
            ));
        }
    }

    if let Some(excluded) = &field.not_in {
        if excluded.contains(value) {
            errors.push(format!("Field {}: {} is excluded", path, shown(value)));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = field.minimum {
            if n < min {
                errors.push(format!("Field {}: {} is below minimum {}", path, n, min));
            }
        }
        if let Some(max) = field.maximum {
            if n > max {
                errors.push(format!("Field {}: {} is above maximum {}", path, n, max));
            }
        }
        if let Some(min) = field.exclusive_minimum {
            if n <= min {
                errors.push(format!(
                    "Field {}: {} must be greater than {}",
                    path, n, min
                ));
            }
        }
        if let Some(max) = field.exclusive_maximum {
            if n >= max {
                errors.push(format!("Field {}: {} must be less than {}", path, n, max));
            }
        }
    }

    if let Some(items) = value.as_array() {
        if let Some(min) = field.min_items {
            if items.len() < min {
                errors.push(format!(
                    "Field {}: expected at least {} items, got {}",
                    path,
                    min,
                    items.len()
                ));
            }
        }
        if let Some(max) = field.max_items {
            if items.len() > max {
                errors.push(format!(
                    "Field {}: expected at most {} items, got {}",
                    path,
                    max,
                    items.len()
                ));
            }
        }
    }

    if let Some(s) = value.as_str() {
        let chars = s.chars().count();
        if let Some(min) = field.min_length {
            if chars < min {
                errors.push(format!(
                    "Field {}: expected at least {} characters, got {}",
                    path, min, chars
                ));
            }
        }
        if let Some(max) = field.max_length {
            if chars > max {
                errors.push(format!(
                    "Field {}: expected at most {} characters, got {}",
                    path, max, chars
                ));
            }
        }
        if let Some(pattern) = &field.pattern {
            match Regex::new(pattern) {
                Ok(regex) => {
                    if !regex.is_match(s) {
                        errors.push(format!(
                            "Field {}: {} does not match pattern {}",
                            path,
                            shown(value),
                            pattern
                        ));
                    }
                }
                Err(_) => errors.push(format!("Field {}: invalid pattern {}", path, pattern)),
            }
        }
    }

    // Nested structures after the scalar constraints.
    match &field.kind {
        FieldKind::Array(item_schema) => {
            if let Some(items) = value.as_array_mut() {
                for (index, item) in items.iter_mut().enumerate() {
                    let item_path = format!("{}[{}]", path, index);
                    validate_value(item_schema, item, &item_path, router, errors);
                }
            }
        }
        FieldKind::Object(nested_fields) => {
            if let Some(map) = value.as_object_mut() {
                validate_fields(nested_fields, map, path, router, errors);
            }
        }
        FieldKind::Ref(name) => match router.named_schema(name) {
            Some(InputSchema::Fields(nested_fields)) => {
                if let Some(map) = value.as_object_mut() {
                    validate_fields(&nested_fields, map, path, router, errors);
                }
            }
            Some(InputSchema::Raw(_)) | None => {}
        },
        _ => {}
    }

    // Custom predicate runs last, on an otherwise-valid value.
    if let Some(custom) = &field.custom {
        let check = match custom {
            CustomValidator::Inline(f) => Some(f.clone()),
            CustomValidator::Named(name) => router.named_validator(name),
        };
        match check {
            Some(f) => {
                if let Err(message) = f(value) {
                    errors.push(format!("Field {}: {}", path, message));
                }
            }
            None => errors.push(format!("Field {}: unknown validator", path)),
        }
    }
}

fn type_matches(field: &FieldSchema, value: &Value) -> bool {
    match &field.kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Array(_) => value.is_array(),
        FieldKind::Object(_) | FieldKind::Ref(_) => value.is_object(),
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn shown(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable>".to_string())
}
