//! Payload shape checks applied before a channel handler runs

use crate::error::SchemaError;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Required fields and their types. Fields not listed are ignored.
#[derive(Debug, Clone, Default)]
pub struct MessageSchema {
    fields: Vec<(String, FieldType)>,
}

impl MessageSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.push((name.to_string(), field_type));
        self
    }

    /// Check a payload, reporting the first field that does not match
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaError> {
        let object = payload.as_object().ok_or(SchemaError::NotAnObject)?;

        for (name, field_type) in &self.fields {
            match object.get(name) {
                None => return Err(SchemaError::MissingField(name.clone())),
                Some(value) if !field_type.matches(value) => {
                    return Err(SchemaError::WrongType {
                        field: name.clone(),
                        expected: *field_type,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
