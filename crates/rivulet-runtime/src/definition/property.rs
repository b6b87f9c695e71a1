//! Property declarations and values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::AsRefStr;

/// Concrete property values keyed by property name.
pub type Properties = BTreeMap<String, Value>;

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PropertyType {
    /// Any JSON value.
    #[default]
    Any,
    /// A number.
    Number,
    /// A string.
    String,
    /// A boolean.
    Boolean,
    /// A list of values.
    List,
    /// A keyed mapping of values.
    Map,
}

impl PropertyType {
    /// Returns whether `value` is acceptable for this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
        }
    }
}

/// Declaration of a property on an operator definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Declared type of the property.
    #[serde(rename = "type", default)]
    pub kind: PropertyType,
    /// Value used when none is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropertyDef {
    /// Creates a required property of the given type.
    pub fn required(kind: PropertyType) -> Self {
        Self {
            kind,
            default: None,
        }
    }

    /// Creates an optional property with a default value.
    pub fn with_default(kind: PropertyType, default: impl Into<Value>) -> Self {
        Self {
            kind,
            default: Some(default.into()),
        }
    }
}

/// Returns the truthiness of a property value, used by `when` conditions.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
