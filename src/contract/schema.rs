// JSON-schema subset used by OpenAPI 3.0 operation objects, plus the typed
// validation error descriptors the API reports to clients.
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Guard against runaway $ref chains in a broken document
const MAX_REF_DEPTH: usize = 16;

/// Kind of validation failure. Clients and tests key on this, never on
/// human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    OperationNotFound,
    MissingParameter,
    InvalidParameter,
    InvalidJson,
    MissingRequiredField,
    TypeMismatch,
    UnknownProperty,
    InvalidValue,
    UnexpectedStatus,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::OperationNotFound => "OperationNotFound",
            ValidationErrorKind::MissingParameter => "MissingParameter",
            ValidationErrorKind::InvalidParameter => "InvalidParameter",
            ValidationErrorKind::InvalidJson => "InvalidJson",
            ValidationErrorKind::MissingRequiredField => "MissingRequiredField",
            ValidationErrorKind::TypeMismatch => "TypeMismatch",
            ValidationErrorKind::UnknownProperty => "UnknownProperty",
            ValidationErrorKind::InvalidValue => "InvalidValue",
            ValidationErrorKind::UnexpectedStatus => "UnexpectedStatus",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation failure with the location it was detected at
/// (e.g. `body.members[2].name` or `query.limit`)
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub location: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, location: impl Into<String>) -> Self {
        Self { kind, location: location.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.location)
    }
}

/// Outcome of a request or response validation pass
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn invalid(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Descriptor names for the `errors` field of a 400/500 body
    pub fn error_names(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.kind.as_str().to_string()).collect()
    }
}

/// `additionalProperties` is either a boolean or a nested schema
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<Schema>),
}

/// Subset of the OpenAPI schema object sufficient for the admin contract:
/// type/required/properties/items/enum/nullable/additionalProperties plus
/// anyOf/oneOf alternatives and `$ref` into `#/components/schemas`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$ref")]
    pub reference: Option<String>,
    #[serde(rename = "type")]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Schema>,
    pub items: Option<Box<Schema>>,
    #[serde(rename = "enum")]
    pub allowed_values: Option<Vec<Value>>,
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, rename = "anyOf")]
    pub any_of: Vec<Schema>,
    #[serde(default, rename = "oneOf")]
    pub one_of: Vec<Schema>,
}

/// Named schemas from `#/components/schemas`, used to resolve `$ref`
pub type SchemaIndex = BTreeMap<String, Schema>;

pub fn resolve_ref<'a>(index: &'a SchemaIndex, reference: &str) -> Option<&'a Schema> {
    let name = reference.strip_prefix("#/components/schemas/")?;
    index.get(name)
}

impl Schema {
    /// Validate `value` against this schema, appending typed descriptors to
    /// `errors`. `location` is the dotted path reported to the client.
    pub fn validate(&self, value: &Value, index: &SchemaIndex, location: &str, errors: &mut Vec<ValidationError>) {
        self.validate_at_depth(value, index, location, errors, 0);
    }

    fn validate_at_depth(
        &self,
        value: &Value,
        index: &SchemaIndex,
        location: &str,
        errors: &mut Vec<ValidationError>,
        depth: usize,
    ) {
        if depth > MAX_REF_DEPTH {
            errors.push(ValidationError::new(ValidationErrorKind::InvalidValue, location));
            return;
        }

        if let Some(reference) = &self.reference {
            match resolve_ref(index, reference) {
                Some(target) => target.validate_at_depth(value, index, location, errors, depth + 1),
                None => errors.push(ValidationError::new(ValidationErrorKind::InvalidValue, location)),
            }
            return;
        }

        if !self.any_of.is_empty() || !self.one_of.is_empty() {
            let alternatives = if self.any_of.is_empty() { &self.one_of } else { &self.any_of };
            let matched = alternatives.iter().any(|alt| {
                let mut scratch = Vec::new();
                alt.validate_at_depth(value, index, location, &mut scratch, depth + 1);
                scratch.is_empty()
            });
            if !matched {
                errors.push(ValidationError::new(ValidationErrorKind::InvalidValue, location));
            }
            return;
        }

        if value.is_null() {
            if !self.nullable {
                errors.push(ValidationError::new(ValidationErrorKind::TypeMismatch, location));
            }
            return;
        }

        if let Some(schema_type) = self.schema_type.as_deref() {
            if !type_matches(schema_type, value) {
                errors.push(ValidationError::new(ValidationErrorKind::TypeMismatch, location));
                return;
            }
        }

        if let Some(allowed) = &self.allowed_values {
            if !allowed.contains(value) {
                errors.push(ValidationError::new(ValidationErrorKind::InvalidValue, location));
                return;
            }
        }

        match value {
            Value::Object(map) => {
                for field in &self.required {
                    if !map.contains_key(field) {
                        let at = format!("{}.{}", location, field);
                        errors.push(ValidationError::new(ValidationErrorKind::MissingRequiredField, at));
                    }
                }
                for (key, entry) in map {
                    let at = format!("{}.{}", location, key);
                    if let Some(property) = self.properties.get(key) {
                        property.validate_at_depth(entry, index, &at, errors, depth + 1);
                    } else {
                        match &self.additional_properties {
                            Some(AdditionalProperties::Allowed(false)) => {
                                errors.push(ValidationError::new(ValidationErrorKind::UnknownProperty, at));
                            }
                            Some(AdditionalProperties::Schema(extra)) => {
                                extra.validate_at_depth(entry, index, &at, errors, depth + 1);
                            }
                            // Schemas without properties are treated as free-form
                            Some(AdditionalProperties::Allowed(true)) | None => {}
                        }
                    }
                }
            }
            Value::Array(entries) => {
                if let Some(items) = &self.items {
                    for (position, entry) in entries.iter().enumerate() {
                        let at = format!("{}[{}]", location, position);
                        items.validate_at_depth(entry, index, &at, errors, depth + 1);
                    }
                }
            }
            _ => {}
        }
    }

    /// Validate a string-typed parameter value (query/path/header), coercing
    /// from its wire representation according to the declared type.
    pub fn validate_parameter(&self, raw: &str, index: &SchemaIndex, location: &str, errors: &mut Vec<ValidationError>) {
        let schema = match self.reference.as_deref().and_then(|r| resolve_ref(index, r)) {
            Some(target) => target,
            None => self,
        };

        let coerced = match schema.schema_type.as_deref() {
            Some("integer") => raw.parse::<i64>().map(Value::from).ok(),
            Some("number") => raw.parse::<f64>().map(Value::from).ok(),
            Some("boolean") => match raw {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            // Strings and untyped parameters arrive as-is
            _ => Some(Value::String(raw.to_string())),
        };

        // Any remaining constraint (enum, anyOf/oneOf, nested $ref shapes)
        // is checked against the coerced value; parameter failures are
        // reported under one kind regardless of which constraint tripped
        match coerced {
            Some(value) => {
                let mut scratch = Vec::new();
                self.validate(&value, index, location, &mut scratch);
                if !scratch.is_empty() {
                    errors.push(ValidationError::new(ValidationErrorKind::InvalidParameter, location));
                }
            }
            None => errors.push(ValidationError::new(ValidationErrorKind::InvalidParameter, location)),
        }
    }
}

fn type_matches(schema_type: &str, value: &Value) -> bool {
    match schema_type {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        // Unknown type keyword: do not reject, the document is authoritative
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(doc: Value) -> Schema {
        serde_json::from_value(doc).expect("schema")
    }

    fn check(s: &Schema, value: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        s.validate(value, &SchemaIndex::new(), "body", &mut errors);
        errors
    }

    #[test]
    fn required_field_missing() {
        let s = schema(json!({"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}));
        let errors = check(&s, &json!({}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::MissingRequiredField);
        assert_eq!(errors[0].location, "body.name");
    }

    #[test]
    fn type_mismatch_on_property() {
        let s = schema(json!({"type": "object", "properties": {"count": {"type": "integer"}}}));
        let errors = check(&s, &json!({"count": "three"}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::TypeMismatch);
    }

    #[test]
    fn unknown_property_rejected_when_closed() {
        let s = schema(json!({"type": "object", "properties": {"a": {"type": "string"}}, "additionalProperties": false}));
        let errors = check(&s, &json!({"a": "x", "b": 1}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::UnknownProperty);
    }

    #[test]
    fn unknown_property_allowed_by_default() {
        let s = schema(json!({"type": "object", "properties": {"a": {"type": "string"}}}));
        assert!(check(&s, &json!({"a": "x", "b": 1})).is_empty());
    }

    #[test]
    fn array_items_checked_per_position() {
        let s = schema(json!({"type": "array", "items": {"type": "integer"}}));
        let errors = check(&s, &json!([1, "two", 3]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location, "body[1]");
    }

    #[test]
    fn enum_violation() {
        let s = schema(json!({"type": "string", "enum": ["active", "inactive"]}));
        let errors = check(&s, &json!("deleted"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidValue);
    }

    #[test]
    fn nullable_permits_null() {
        let s = schema(json!({"type": "string", "nullable": true}));
        assert!(check(&s, &Value::Null).is_empty());
        let strict = schema(json!({"type": "string"}));
        assert_eq!(check(&strict, &Value::Null).len(), 1);
    }

    #[test]
    fn ref_resolution() {
        let mut index = SchemaIndex::new();
        index.insert("User".to_string(), schema(json!({"type": "object", "required": ["id"]})));
        let s = schema(json!({"$ref": "#/components/schemas/User"}));
        let mut errors = Vec::new();
        s.validate(&json!({}), &index, "body", &mut errors);
        assert_eq!(errors[0].kind, ValidationErrorKind::MissingRequiredField);
    }

    #[test]
    fn parameter_coercion() {
        let s = schema(json!({"type": "integer"}));
        let mut errors = Vec::new();
        s.validate_parameter("42", &SchemaIndex::new(), "query.limit", &mut errors);
        assert!(errors.is_empty());
        s.validate_parameter("abc", &SchemaIndex::new(), "query.limit", &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidParameter);
    }

    #[test]
    fn parameter_alternatives_checked() {
        let s = schema(json!({"anyOf": [{"type": "string", "enum": ["asc", "desc"]}, {"type": "string", "enum": ["none"]}]}));
        let mut errors = Vec::new();
        s.validate_parameter("desc", &SchemaIndex::new(), "query.order", &mut errors);
        s.validate_parameter("none", &SchemaIndex::new(), "query.order", &mut errors);
        assert!(errors.is_empty());

        s.validate_parameter("sideways", &SchemaIndex::new(), "query.order", &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidParameter);
    }

    #[test]
    fn parameter_ref_constraints_checked() {
        let mut index = SchemaIndex::new();
        index.insert("Order".to_string(), schema(json!({"type": "string", "enum": ["asc", "desc"]})));
        let s = schema(json!({"$ref": "#/components/schemas/Order"}));
        let mut errors = Vec::new();
        s.validate_parameter("asc", &index, "query.order", &mut errors);
        assert!(errors.is_empty());
        s.validate_parameter("random", &index, "query.order", &mut errors);
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidParameter);
    }

    #[test]
    fn any_of_accepts_either_branch() {
        let s = schema(json!({"anyOf": [{"type": "string"}, {"type": "integer"}]}));
        assert!(check(&s, &json!("x")).is_empty());
        assert!(check(&s, &json!(1)).is_empty());
        assert_eq!(check(&s, &json!(true)).len(), 1);
    }
}
