//! Input-schema DSL.
//!
//! Tool and prompt arguments are described per field: a semantic type plus
//! constraints (required, default, enum, numeric bounds, lengths, pattern,
//! exclusion set, custom predicate). The dispatch-time engine that applies
//! these lives in `wisp-mcp-server`; this module is the declaration side and
//! the JSON Schema rendering used in `tools/list` advertisements.
//!
//! A schema may instead be a raw JSON property map ([`InputSchema::Raw`]),
//! in which case validation is skipped entirely and the map is advertised
//! verbatim.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Semantic type of one field
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Array with a homogeneous item schema
    Array(Box<FieldSchema>),
    /// Nested object with its own ordered field list
    Object(Vec<(String, FieldSchema)>),
    /// Reference to a named schema registered on the router
    Ref(String),
}

/// A custom per-field predicate: inline closure or a name resolved against
/// the router's named-validator table.
#[derive(Clone)]
pub enum CustomValidator {
    Inline(Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>),
    Named(String),
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomValidator::Inline(_) => write!(f, "CustomValidator::Inline(..)"),
            CustomValidator::Named(name) => write!(f, "CustomValidator::Named({:?})", name),
        }
    }
}

/// One field's declaration
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub kind: FieldKind,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<Value>,
    pub enum_values: Option<Vec<Value>>,
    /// Values explicitly rejected even when otherwise valid
    pub not_in: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub custom: Option<CustomValidator>,
}

impl FieldSchema {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            description: None,
            required: false,
            default: None,
            enum_values: None,
            not_in: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            min_length: None,
            max_length: None,
            pattern: None,
            min_items: None,
            max_items: None,
            custom: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldKind::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn array(items: FieldSchema) -> Self {
        Self::of(FieldKind::Array(Box::new(items)))
    }

    pub fn object(fields: Vec<(String, FieldSchema)>) -> Self {
        Self::of(FieldKind::Object(fields))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::of(FieldKind::Ref(name.into()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn none_of(mut self, values: Vec<Value>) -> Self {
        self.not_in = Some(values);
        self
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn exclusive_min(mut self, minimum: f64) -> Self {
        self.exclusive_minimum = Some(minimum);
        self
    }

    pub fn exclusive_max(mut self, maximum: f64) -> Self {
        self.exclusive_maximum = Some(maximum);
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn items(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.custom = Some(CustomValidator::Inline(Arc::new(f)));
        self
    }

    pub fn with_named_validator(mut self, name: impl Into<String>) -> Self {
        self.custom = Some(CustomValidator::Named(name.into()));
        self
    }

    /// Human name of the expected type, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array(_) => "array",
            FieldKind::Object(_) | FieldKind::Ref(_) => "object",
        }
    }

    /// Render as JSON Schema for capability advertisement.
    pub fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        match &self.kind {
            FieldKind::String => {
                schema.insert("type".into(), "string".into());
                if let Some(min) = self.min_length {
                    schema.insert("minLength".into(), min.into());
                }
                if let Some(max) = self.max_length {
                    schema.insert("maxLength".into(), max.into());
                }
                if let Some(pattern) = &self.pattern {
                    schema.insert("pattern".into(), pattern.clone().into());
                }
            }
            FieldKind::Integer | FieldKind::Number => {
                let name = if matches!(self.kind, FieldKind::Integer) {
                    "integer"
                } else {
                    "number"
                };
                schema.insert("type".into(), name.into());
                if let Some(min) = self.minimum {
                    schema.insert("minimum".into(), min.into());
                }
                if let Some(max) = self.maximum {
                    schema.insert("maximum".into(), max.into());
                }
                if let Some(min) = self.exclusive_minimum {
                    schema.insert("exclusiveMinimum".into(), min.into());
                }
                if let Some(max) = self.exclusive_maximum {
                    schema.insert("exclusiveMaximum".into(), max.into());
                }
            }
            FieldKind::Boolean => {
                schema.insert("type".into(), "boolean".into());
            }
            FieldKind::Array(items) => {
                schema.insert("type".into(), "array".into());
                schema.insert("items".into(), items.to_json_schema());
                if let Some(min) = self.min_items {
                    schema.insert("minItems".into(), min.into());
                }
                if let Some(max) = self.max_items {
                    schema.insert("maxItems".into(), max.into());
                }
            }
            FieldKind::Object(fields) => {
                return InputSchema::Fields(fields.clone()).to_json_schema();
            }
            FieldKind::Ref(name) => {
                schema.insert("type".into(), "object".into());
                schema.insert("$ref".into(), format!("#/definitions/{}", name).into());
            }
        }
        if let Some(description) = &self.description {
            schema.insert("description".into(), description.clone().into());
        }
        if let Some(values) = &self.enum_values {
            schema.insert("enum".into(), Value::Array(values.clone()));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        Value::Object(schema)
    }
}

/// A tool/prompt input declaration: either the field DSL or a raw JSON
/// property map kept for backward compatibility (validation skipped).
#[derive(Debug, Clone)]
pub enum InputSchema {
    Fields(Vec<(String, FieldSchema)>),
    Raw(Value),
}

impl InputSchema {
    pub fn fields(fields: Vec<(&str, FieldSchema)>) -> Self {
        InputSchema::Fields(
            fields
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        InputSchema::Fields(Vec::new())
    }

    pub fn to_json_schema(&self) -> Value {
        match self {
            InputSchema::Raw(value) => value.clone(),
            InputSchema::Fields(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for (name, field) in fields {
                    properties.insert(name.clone(), field.to_json_schema());
                    if field.required {
                        required.push(Value::String(name.clone()));
                    }
                }
                let mut schema = Map::new();
                schema.insert("type".into(), "object".into());
                schema.insert("properties".into(), Value::Object(properties));
                if !required.is_empty() {
                    schema.insert("required".into(), Value::Array(required));
                }
                Value::Object(schema)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_render_required() {
        let schema = InputSchema::fields(vec![
            ("message", FieldSchema::string().required()),
            ("count", FieldSchema::integer().with_default(json!(1))),
        ]);
        let rendered = schema.to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["message"]["type"], "string");
        assert_eq!(rendered["properties"]["count"]["default"], 1);
        assert_eq!(rendered["required"], json!(["message"]));
    }

    #[test]
    fn test_raw_passthrough() {
        let raw = json!({"type": "object", "properties": {"x": {"type": "string"}}});
        let schema = InputSchema::Raw(raw.clone());
        assert_eq!(schema.to_json_schema(), raw);
    }

    #[test]
    fn test_numeric_bounds_render() {
        let field = FieldSchema::number().min(0.0).exclusive_max(10.0);
        let rendered = field.to_json_schema();
        assert_eq!(rendered["minimum"], 0.0);
        assert_eq!(rendered["exclusiveMaximum"], 10.0);
    }

    #[test]
    fn test_nested_object_render() {
        let field = FieldSchema::object(vec![(
            "min_price".to_string(),
            FieldSchema::number().required(),
        )]);
        let rendered = field.to_json_schema();
        assert_eq!(rendered["properties"]["min_price"]["type"], "number");
        assert_eq!(rendered["required"], json!(["min_price"]));
    }
}
