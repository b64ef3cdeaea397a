//! Resource instances and their identity keys

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::RestError;

/// Name of the field that identifies an instance (`id` unless configured).
/// A dotted name reaches into a nested object (`club.code`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyField(String);

impl KeyField {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Top-level field holding the key (`club` for `club.code`)
    pub fn root(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl Default for KeyField {
    fn default() -> Self {
        Self::new("id")
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity value of one instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstanceKey {
    Number(i64),
    Text(String),
}

impl InstanceKey {
    /// Key from a JSON value; only integers and non-empty strings qualify
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(InstanceKey::Number),
            Value::String(text) if !text.is_empty() => Some(InstanceKey::Text(text.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            InstanceKey::Number(number) => Value::from(*number),
            InstanceKey::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Number(number) => write!(f, "{}", number),
            InstanceKey::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for InstanceKey {
    fn from(value: i64) -> Self {
        InstanceKey::Number(value)
    }
}

impl From<&str> for InstanceKey {
    fn from(value: &str) -> Self {
        InstanceKey::Text(value.to_string())
    }
}

impl From<String> for InstanceKey {
    fn from(value: String) -> Self {
        InstanceKey::Text(value)
    }
}

/// One row of a managed sub-resource, as the server serialized it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceInstance(Map<String, Value>);

impl ResourceInstance {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything other than an object is rejected
    pub fn from_value(value: Value) -> Result<Self, RestError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(RestError::DeserializationError(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn key(&self, key_field: &KeyField) -> Option<InstanceKey> {
        let mut segments = key_field.name().split('.');
        let mut value = self.0.get(segments.next()?)?;
        for segment in segments {
            value = value.as_object()?.get(segment)?;
        }
        InstanceKey::from_value(value)
    }

    /// Overwrite our fields with `other`'s, keeping fields it does not carry
    pub fn merge(&mut self, other: &ResourceInstance) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }
}

impl From<Map<String, Value>> for ResourceInstance {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for ResourceInstance {
    type Error = RestError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<ResourceInstance> for Value {
    fn from(instance: ResourceInstance) -> Self {
        Value::Object(instance.0)
    }
}
