//! Normalization of the different ways callers can point at a table.

use crate::error::{ModelError, ModelResult};
use castor_abstraction::{TableDescriptor, TableHandle};
use serde_json::Value;

/// A table given by name, by structured descriptor, or by an existing handle.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Name(String),
    Descriptor(TableDescriptor),
    Handle(TableHandle),
}

impl TableRef {
    /// Canonical descriptor for this reference. The name must not be blank.
    pub fn normalize(self) -> ModelResult<TableDescriptor> {
        let descriptor = match self {
            Self::Name(name) => TableDescriptor::named(name),
            Self::Descriptor(descriptor) => descriptor,
            Self::Handle(handle) => handle.into(),
        };
        if descriptor.name.trim().is_empty() {
            return Err(ModelError::InvalidTableReference(
                "table name must not be empty".to_string(),
            ));
        }
        Ok(descriptor)
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for TableRef {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<TableDescriptor> for TableRef {
    fn from(descriptor: TableDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }
}

impl From<&TableDescriptor> for TableRef {
    fn from(descriptor: &TableDescriptor) -> Self {
        Self::Descriptor(descriptor.clone())
    }
}

impl From<TableHandle> for TableRef {
    fn from(handle: TableHandle) -> Self {
        Self::Handle(handle)
    }
}

impl From<&TableHandle> for TableRef {
    fn from(handle: &TableHandle) -> Self {
        Self::Handle(handle.clone())
    }
}

/// Loosely typed input: a JSON string is a name, a JSON object a descriptor.
impl TryFrom<Value> for TableRef {
    type Error = ModelError;

    fn try_from(value: Value) -> ModelResult<Self> {
        match value {
            Value::String(name) => Ok(Self::Name(name)),
            Value::Object(map) => {
                if !map.get("name").is_some_and(Value::is_string) {
                    return Err(ModelError::InvalidTableReference(
                        "table descriptor requires a string 'name'".to_string(),
                    ));
                }
                serde_json::from_value(Value::Object(map))
                    .map(Self::Descriptor)
                    .map_err(|e| ModelError::InvalidTableReference(e.to_string()))
            }
            other => Err(ModelError::InvalidTableReference(format!(
                "expected a table name, descriptor or handle, got {}",
                json_type(&other)
            ))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
